mod migrator;
mod versioned_schema;

pub use migrator::{MigrationOutcome, SchemaMigrator};
pub use versioned_schema::*;

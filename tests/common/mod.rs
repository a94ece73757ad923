//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestServer, SOURCE_HEADER};
//!
//! #[tokio::test]
//! async fn test_index_is_served() {
//!     let server = TestServer::spawn().await;
//!     let response = reqwest::get(server.url("/index.html")).await.unwrap();
//!     assert_eq!(response.headers()[SOURCE_HEADER], "network");
//! }
//! ```

mod constants;
mod fixtures;
mod server;

// Public API - this is what tests import
#[allow(unused_imports)]
pub use constants::*;
#[allow(unused_imports)]
pub use fixtures::{cache_config, FixedClock, MockFetcher, TestDevice};
#[allow(unused_imports)]
pub use server::TestServer;
#[allow(unused_imports)]
pub use sheetmusic_catalog::server::SOURCE_HEADER;

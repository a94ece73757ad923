use anyhow::{bail, Result};
use rusqlite::{params, types::Type, Connection};

#[macro_export]
macro_rules! sqlite_column {
    ($name:expr, $sql_type:expr $(, $field:ident = $value:expr)*) => {
        {
            // Allow unused_mut because the variable is only mutated when optional
            // field assignments are passed to the macro (e.g., `is_primary_key = true`)
            #[allow(unused_mut)]
            let mut column = Column {
                name: $name,
                sql_type: $sql_type,
                is_primary_key: false,
                non_null: false,
                default_value: None,
            };
            $(
                column.$field = $value;
            )*
            column
        }
    };
}

#[derive(Debug, PartialEq, Eq)]
pub enum SqlType {
    Text,
    Integer,
    Real,
    Blob,
}

impl SqlType {
    fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Text => "TEXT",
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
            SqlType::Blob => "BLOB",
        }
    }
}

pub struct Column<'a, S: AsRef<str>> {
    pub name: S,
    pub sql_type: &'a SqlType,
    pub is_primary_key: bool,
    pub non_null: bool,
    pub default_value: Option<S>,
}

pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column<'static, &'static str>],
    pub unique_constraints: &'static [&'static [&'static str]],
}

impl Table {
    pub fn create(&self, conn: &Connection) -> Result<()> {
        let mut create_sql = format!("CREATE TABLE {} (", self.name);
        for (column_index, column) in self.columns.iter().enumerate() {
            if column_index > 0 {
                create_sql.push_str(", ");
            }
            create_sql.push_str(&format!("{} {}", column.name, column.sql_type.as_sql()));
            if column.is_primary_key {
                create_sql.push_str(" PRIMARY KEY");
            }
            if column.non_null {
                create_sql.push_str(" NOT NULL");
            }
            if let Some(default_value) = column.default_value {
                create_sql.push_str(&format!(" DEFAULT {}", default_value));
            }
        }

        for unique_constraint in self.unique_constraints {
            create_sql.push_str(&format!(", UNIQUE ({})", unique_constraint.join(", ")));
        }
        create_sql.push_str(");");
        conn.execute(&create_sql, params![])?;
        Ok(())
    }

    fn validate_columns(&self, conn: &Connection) -> Result<()> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", self.name))?;
        let actual_columns: Vec<Column<'_, String>> = stmt
            .query_map(params![], |row| {
                let name = row.get::<usize, String>(1)?;
                let sql_type = match row.get::<_, String>(2)?.as_str() {
                    "TEXT" => &SqlType::Text,
                    "INTEGER" => &SqlType::Integer,
                    "REAL" => &SqlType::Real,
                    "BLOB" => &SqlType::Blob,
                    _ => {
                        return Err(rusqlite::Error::InvalidColumnType(
                            2,
                            "".to_string(),
                            Type::Text,
                        ))
                    }
                };

                Ok(Column {
                    name,
                    sql_type,
                    non_null: row.get::<_, i32>(3)? == 1,
                    default_value: row.get::<_, Option<String>>(4)?,
                    is_primary_key: row.get::<_, i32>(5)? == 1,
                })
            })?
            .collect::<Result<_, _>>()?;

        if actual_columns.is_empty() {
            bail!("Table {} does not exist", self.name);
        }

        if actual_columns.len() != self.columns.len() {
            bail!(
                "Table {} has {} columns, expected {}. Found column names: {}, expected: {}",
                self.name,
                actual_columns.len(),
                self.columns.len(),
                actual_columns
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                self.columns
                    .iter()
                    .map(|c| c.name)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        for (actual_column, expected_column) in actual_columns.iter().zip(self.columns.iter()) {
            if actual_column.name != expected_column.name {
                bail!(
                    "Table {} Column name mismatch: expected {}, got {}",
                    self.name,
                    expected_column.name,
                    actual_column.name
                );
            }
            if actual_column.sql_type != expected_column.sql_type {
                bail!(
                    "Table {} Column {} type mismatch: expected {:?}, got {:?}",
                    self.name,
                    expected_column.name,
                    expected_column.sql_type,
                    actual_column.sql_type
                );
            }
            if actual_column.non_null != expected_column.non_null {
                bail!(
                    "Table {} Column {} non-null mismatch: expected {}, got {}",
                    self.name,
                    expected_column.name,
                    expected_column.non_null,
                    actual_column.non_null
                );
            }

            // Default values might be wrapped in parentheses, so we strip them before comparing
            if actual_column
                .default_value
                .as_ref()
                .map(strip_leading_and_trailing_parentheses)
                != expected_column
                    .default_value
                    .map(strip_leading_and_trailing_parentheses)
            {
                bail!(
                    "Table {} Column {} default value mismatch: expected {:?}, got {:?}",
                    self.name,
                    expected_column.name,
                    expected_column.default_value,
                    actual_column.default_value
                );
            }
            if actual_column.is_primary_key != expected_column.is_primary_key {
                bail!(
                    "Table {} Column {} primary key mismatch: expected {}, got {}",
                    self.name,
                    expected_column.name,
                    expected_column.is_primary_key,
                    actual_column.is_primary_key
                );
            }
        }
        Ok(())
    }
}

/// A secondary index over one column of a table.
///
/// A plain index is an SQLite index on `key_path`. A multi-entry index
/// expects `key_path` to hold a JSON array and keeps one row per element in
/// a side table `{table}_{key_path}` (`record_id`, `value`), indexed on
/// `value`, so a row is discoverable under each element individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: &'static str,
    pub key_path: &'static str,
    pub multi_entry: bool,
}

impl IndexSpec {
    pub const fn single(name: &'static str, key_path: &'static str) -> Self {
        Self {
            name,
            key_path,
            multi_entry: false,
        }
    }

    pub const fn multi_entry(name: &'static str, key_path: &'static str) -> Self {
        Self {
            name,
            key_path,
            multi_entry: true,
        }
    }

    /// Name of the table the SQLite index lives on.
    pub fn indexed_table(&self, table: &str) -> String {
        if self.multi_entry {
            format!("{}_{}", table, self.key_path)
        } else {
            table.to_string()
        }
    }

    pub fn sql_index_name(&self, table: &str) -> String {
        if self.multi_entry {
            format!("idx_{}_{}_value", table, self.key_path)
        } else {
            format!("idx_{}_{}", table, self.key_path)
        }
    }

    pub fn exists(&self, conn: &Connection, table: &str) -> Result<bool> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='index' AND name=?1 AND tbl_name=?2",
            params![self.sql_index_name(table), self.indexed_table(table)],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Creates the index and fills it from the rows already in `table`.
    fn create(&self, conn: &Connection, table: &str) -> Result<()> {
        if !self.multi_entry {
            conn.execute(
                &format!(
                    "CREATE INDEX {} ON {}({});",
                    self.sql_index_name(table),
                    table,
                    self.key_path
                ),
                params![],
            )?;
            return Ok(());
        }

        let side_table = self.indexed_table(table);
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {side} (
                record_id TEXT NOT NULL REFERENCES {table}(id) ON DELETE CASCADE,
                value TEXT NOT NULL
            );
            DELETE FROM {side};
            INSERT INTO {side} (record_id, value)
                SELECT t.id, trim(j.value) FROM {table} t,
                    json_each(CASE WHEN json_valid(t.{key}) THEN t.{key} ELSE '[]' END) j
                WHERE trim(j.value) <> '';
            CREATE INDEX {index} ON {side}(value);
            CREATE INDEX IF NOT EXISTS idx_{side}_record_id ON {side}(record_id);",
            side = side_table,
            table = table,
            key = self.key_path,
            index = self.sql_index_name(table),
        ))?;
        Ok(())
    }

    /// Replaces the multi-entry rows of `record_id` with `values`.
    pub fn replace_entries<S: AsRef<str>>(
        &self,
        conn: &Connection,
        table: &str,
        record_id: &str,
        values: &[S],
    ) -> Result<()> {
        if !self.multi_entry {
            return Ok(());
        }
        let side_table = self.indexed_table(table);
        conn.execute(
            &format!("DELETE FROM {} WHERE record_id = ?1", side_table),
            params![record_id],
        )?;
        let mut stmt = conn.prepare(&format!(
            "INSERT INTO {} (record_id, value) VALUES (?1, ?2)",
            side_table
        ))?;
        for value in values {
            stmt.execute(params![record_id, value.as_ref()])?;
        }
        Ok(())
    }
}

/// Creates every index in `specs` that is not present yet, leaving existing
/// ones untouched. Returns the names of the indexes that were created.
pub fn ensure_indices(
    conn: &Connection,
    table: &str,
    specs: &[IndexSpec],
) -> Result<Vec<&'static str>> {
    let mut created = Vec::new();
    for spec in specs {
        if spec.exists(conn, table)? {
            continue;
        }
        spec.create(conn, table)?;
        created.push(spec.name);
    }
    Ok(created)
}

pub struct VersionedSchema {
    pub version: usize,
    pub tables: &'static [Table],
    pub indices: &'static [IndexSpec],
    pub migration: Option<fn(&Connection) -> Result<()>>,
}

fn strip_leading_and_trailing_parentheses<S: AsRef<str>>(s: S) -> String {
    let s = s.as_ref();
    if s.starts_with('(') && s.ends_with(')') {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

impl VersionedSchema {
    /// Creates all tables and indexes of this version on an empty database.
    pub fn create(&self, conn: &Connection) -> Result<Vec<&'static str>> {
        let mut created = Vec::new();
        for table in self.tables {
            table.create(conn)?;
            created.extend(ensure_indices(conn, table.name, self.indices)?);
        }
        self.stamp_version(conn)?;
        Ok(created)
    }

    pub fn stamp_version(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + self.version),
            [],
        )?;
        Ok(())
    }

    pub fn validate_tables(&self, conn: &Connection) -> Result<()> {
        for table in self.tables {
            table.validate_columns(conn)?;

            let mut stmt = conn.prepare(&format!("PRAGMA index_list({})", table.name))?;
            let unique_indices: Vec<String> = stmt
                .query_map([], |row| {
                    let name: String = row.get(1)?;
                    let is_unique: i32 = row.get(2)?;
                    Ok((name, is_unique))
                })?
                .filter_map(|r| r.ok())
                .filter(|(_, is_unique)| *is_unique == 1)
                .map(|(name, _)| name)
                .collect();

            let mut unique_index_columns: Vec<Vec<String>> = Vec::new();
            for index_name in &unique_indices {
                let mut idx_stmt = conn.prepare(&format!("PRAGMA index_info({})", index_name))?;
                let mut cols: Vec<String> = idx_stmt
                    .query_map([], |row| row.get::<_, String>(2))?
                    .filter_map(|r| r.ok())
                    .collect();
                cols.sort();
                unique_index_columns.push(cols);
            }

            for expected_columns in table.unique_constraints {
                let mut expected_sorted: Vec<&str> = expected_columns.to_vec();
                expected_sorted.sort();
                let found = unique_index_columns.iter().any(|actual| {
                    actual.iter().map(|s| s.as_str()).collect::<Vec<_>>() == expected_sorted
                });
                if !found {
                    bail!(
                        "Table {} is missing unique constraint on columns ({})",
                        table.name,
                        expected_columns.join(", ")
                    );
                }
            }
        }
        Ok(())
    }

    pub fn validate_indices(&self, conn: &Connection) -> Result<()> {
        for table in self.tables {
            for spec in self.indices {
                if !spec.exists(conn, table.name)? {
                    bail!(
                        "Table {} is missing index '{}'",
                        table.name,
                        spec.sql_index_name(table.name)
                    );
                }
            }
        }
        Ok(())
    }

    pub fn validate(&self, conn: &Connection) -> Result<()> {
        self.validate_tables(conn)?;
        self.validate_indices(conn)
    }
}

pub const BASE_DB_VERSION: usize = 99999;

/// Reads `PRAGMA user_version` and strips [`BASE_DB_VERSION`]. Returns 0 for
/// a database that was never versioned.
pub fn read_schema_version(conn: &Connection) -> Result<usize> {
    let raw_version: i64 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if raw_version == 0 {
        return Ok(0);
    }
    let version = raw_version - BASE_DB_VERSION as i64;
    if version < 1 {
        bail!("Database version {} is invalid (expected >= 1)", version);
    }
    Ok(version as usize)
}

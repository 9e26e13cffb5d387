//! Runtime schema reconciliation for the fallback write path.
//!
//! Schema evolution ships as versioned migrations (`core::migration`);
//! this module is the repair layer the ingestor falls back to when a write
//! hits a store whose layout has drifted — a table missing, a column the
//! application expects absent, or a stray NOT NULL column blocking inserts
//! that omit newer optional fields.
//!
//! Every operation here is best-effort: individual DDL failures are warned
//! to stderr and swallowed, and nothing raises on "already exists".

use crate::core::error::{self, EngineError};
use crate::core::schemas::{self, ColumnSpec};
use rusqlite::Connection;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMeta {
    pub nullable: bool,
    pub col_type: String,
    pub default: Option<String>,
}

/// CREATE statements (table + indexes) for tables the reconciler can
/// restore from scratch.
fn create_sql_for(table: &str) -> Option<&'static [&'static str]> {
    match table {
        schemas::REVIEWS_TABLE => Some(&[
            schemas::REVIEWS_SCHEMA,
            schemas::REVIEWS_INDEX_CONTENT,
            schemas::REVIEWS_INDEX_USER,
        ]),
        schemas::REVIEW_VOTES_TABLE => Some(&[
            schemas::REVIEW_VOTES_SCHEMA,
            schemas::REVIEW_VOTES_INDEX_REVIEW,
        ]),
        schemas::CONTENT_TABLE => Some(&[schemas::CONTENT_SCHEMA]),
        _ => None,
    }
}

/// Issue the create-if-absent statement(s) for `table`. Idempotent; safe
/// to call concurrently and repeatedly.
pub fn ensure_table(conn: &Connection, table: &str) {
    let Some(statements) = create_sql_for(table) else {
        eprintln!("Warning: no schema registered for table '{}'", table);
        return;
    };
    for sql in statements {
        if let Err(e) = conn.execute(sql, []) {
            eprintln!("Warning: ensure_table({}) failed: {}", table, e);
        }
    }
}

/// True when `table` exists in the connected database.
pub fn table_exists(conn: &Connection, table: &str) -> bool {
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
        [table],
        |row| row.get::<_, i64>(0),
    )
    .map(|n| n > 0)
    .unwrap_or(false)
}

/// Append each required column that is absent. Existing columns are left
/// untouched — their type is never rewritten.
pub fn ensure_columns(conn: &Connection, table: &str, specs: &[ColumnSpec]) {
    for spec in specs {
        let present: i64 = match conn.query_row(
            "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name=?2",
            rusqlite::params![table, spec.name],
            |row| row.get(0),
        ) {
            Ok(n) => n,
            Err(e) => {
                eprintln!(
                    "Warning: column check {}.{} failed: {}",
                    table, spec.name, e
                );
                continue;
            }
        };
        if present == 0 {
            let sql = format!("ALTER TABLE {} ADD COLUMN {}", table, spec.ddl);
            if let Err(e) = conn.execute(&sql, []) {
                eprintln!(
                    "Warning: add column {}.{} failed: {}",
                    table, spec.name, e
                );
            }
        }
    }
}

/// Return the set of existing columns for `table`, ensuring the table
/// first when it is absent. Empty on persistent failure.
pub fn column_metadata(conn: &Connection, table: &str) -> FxHashMap<String, ColumnMeta> {
    if !table_exists(conn, table) {
        ensure_table(conn, table);
    }

    let mut meta = FxHashMap::default();
    let read = || -> Result<FxHashMap<String, ColumnMeta>, EngineError> {
        let mut stmt = conn.prepare(
            "SELECT name, \"notnull\", type, dflt_value FROM pragma_table_info(?1)",
        )?;
        let rows = stmt.query_map([table], |row| {
            let name: String = row.get(0)?;
            let notnull: i64 = row.get(1)?;
            let col_type: String = row.get(2)?;
            let default: Option<String> = row.get(3)?;
            Ok((
                name,
                ColumnMeta {
                    nullable: notnull == 0,
                    col_type,
                    default,
                },
            ))
        })?;
        let mut out = FxHashMap::default();
        for r in rows {
            let (name, m) = r?;
            out.insert(name, m);
        }
        Ok(out)
    };
    match read() {
        Ok(out) => meta = out,
        Err(e) => eprintln!("Warning: column_metadata({}) failed: {}", table, e),
    }
    meta
}

/// Loosen every NOT NULL column outside `protected` that lacks a default
/// to nullable-with-null-default, so forward/backward schema drift cannot
/// block inserts that omit newer optional fields.
///
/// SQLite has no MODIFY COLUMN; relaxation is a table rebuild — rewrite
/// the stored CREATE statement without the offending NOT NULL clauses,
/// copy the rows across, swap the tables, and re-create the known indexes.
pub fn relax_required_columns(conn: &Connection, table: &str, protected: &[&str]) {
    let meta = column_metadata(conn, table);
    let candidates: Vec<String> = meta
        .iter()
        .filter(|(name, m)| {
            !protected.contains(&name.as_str()) && !m.nullable && m.default.is_none()
        })
        .map(|(name, _)| name.clone())
        .collect();

    if candidates.is_empty() {
        return;
    }

    if let Err(e) = rebuild_without_not_null(conn, table, &candidates) {
        eprintln!(
            "Warning: relax_required_columns({}) failed: {}",
            table, e
        );
    }
}

fn rebuild_without_not_null(
    conn: &Connection,
    table: &str,
    columns: &[String],
) -> Result<(), EngineError> {
    let create_sql: String = conn.query_row(
        "SELECT sql FROM sqlite_master WHERE type='table' AND name=?1",
        [table],
        |row| row.get(0),
    )?;

    let mut relaxed_sql = create_sql;
    for col in columns {
        // Strip the NOT NULL clause from this column's definition. Column
        // types in this store are single-word (TEXT/INTEGER/REAL), so the
        // definition never contains a comma before the constraint.
        let pattern = format!(r#"(?i)((?:"|`)?\b{}\b(?:"|`)?[^,\n]*?)\s+NOT\s+NULL"#, regex::escape(col));
        let re = regex::Regex::new(&pattern)
            .map_err(|e| error::EngineError::ValidationError(e.to_string()))?;
        relaxed_sql = re.replace(&relaxed_sql, "$1").into_owned();
    }

    let tmp_table = format!("{}_relax_new", table);
    let name_re = regex::Regex::new(r#"(?i)CREATE\s+TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?("|`)?\w+("|`)?"#)
        .map_err(|e| error::EngineError::ValidationError(e.to_string()))?;
    let relaxed_sql = name_re
        .replace(&relaxed_sql, format!("CREATE TABLE {}", tmp_table).as_str())
        .into_owned();

    let tx = conn.unchecked_transaction()?;
    tx.execute(&relaxed_sql, [])?;
    tx.execute(
        &format!("INSERT INTO {} SELECT * FROM {}", tmp_table, table),
        [],
    )?;
    tx.execute(&format!("DROP TABLE {}", table), [])?;
    tx.execute(
        &format!("ALTER TABLE {} RENAME TO {}", tmp_table, table),
        [],
    )?;
    tx.commit()?;

    // Table-level constraints travel with the rewritten CREATE statement;
    // standalone indexes were dropped with the old table.
    if let Some(statements) = create_sql_for(table) {
        for sql in statements.iter().skip(1) {
            if let Err(e) = conn.execute(sql, []) {
                eprintln!("Warning: index re-create on {} failed: {}", table, e);
            }
        }
    }
    Ok(())
}

/// Targeted repair pass for an unknown-column write failure: re-run the
/// column reconciliation that covers the named column. An unrecognized
/// name gets both passes — the failure may come from a legacy trigger on
/// either surface.
pub fn repair_for_column(conn: &Connection, column: &str) {
    let in_reviews = schemas::REVIEWS_COLUMNS.iter().any(|c| c.name == column);
    let in_content = schemas::CONTENT_AGGREGATE_COLUMNS
        .iter()
        .any(|c| c.name == column);

    if in_reviews || !in_content {
        ensure_table(conn, schemas::REVIEWS_TABLE);
        ensure_columns(conn, schemas::REVIEWS_TABLE, schemas::REVIEWS_COLUMNS);
    }
    if in_content || !in_reviews {
        ensure_table(conn, schemas::CONTENT_TABLE);
        ensure_columns(
            conn,
            schemas::CONTENT_TABLE,
            schemas::CONTENT_AGGREGATE_COLUMNS,
        );
    }
}

#[derive(clap::Parser, Debug)]
#[clap(name = "schema", about = "Inspect and repair the store layout.")]
pub struct SchemaCli {
    #[clap(subcommand)]
    pub command: SchemaCommand,
}

#[derive(clap::Subcommand, Debug)]
pub enum SchemaCommand {
    /// Ensure all known tables and columns exist; relax stray NOT NULLs.
    Repair,
    /// Show column metadata for the review surface.
    Status,
}

pub fn run_schema_cli(
    store: &crate::core::store::Store,
    cli: SchemaCli,
) -> Result<(), EngineError> {
    let broker = crate::core::broker::DbBroker::new(&store.root);
    let db_path = crate::core::db::catalog_db_path(&store.root);

    match cli.command {
        SchemaCommand::Repair => {
            broker.with_conn(&db_path, "reelscore", "schema.repair", |conn| {
                ensure_table(conn, schemas::REVIEWS_TABLE);
                ensure_columns(conn, schemas::REVIEWS_TABLE, schemas::REVIEWS_COLUMNS);
                ensure_table(conn, schemas::REVIEW_VOTES_TABLE);
                ensure_columns(conn, schemas::REVIEW_VOTES_TABLE, schemas::REVIEW_VOTES_COLUMNS);
                ensure_table(conn, schemas::CONTENT_TABLE);
                ensure_columns(conn, schemas::CONTENT_TABLE, schemas::CONTENT_AGGREGATE_COLUMNS);
                relax_required_columns(
                    conn,
                    schemas::REVIEWS_TABLE,
                    schemas::REVIEWS_PROTECTED_COLUMNS,
                );
                Ok(())
            })?;
            println!("Schema repaired");
        }
        SchemaCommand::Status => {
            broker.with_read(&db_path, |conn| {
                for table in [schemas::REVIEWS_TABLE, schemas::REVIEW_VOTES_TABLE, schemas::CONTENT_TABLE] {
                    println!("{}:", table);
                    let meta = column_metadata(conn, table);
                    let mut names: Vec<_> = meta.keys().collect();
                    names.sort();
                    for name in names {
                        let m = &meta[name];
                        println!(
                            "  {} {} {}{}",
                            name,
                            m.col_type,
                            if m.nullable { "NULL" } else { "NOT NULL" },
                            m.default
                                .as_deref()
                                .map(|d| format!(" DEFAULT {}", d))
                                .unwrap_or_default()
                        );
                    }
                }
                Ok(())
            })?;
        }
    }
    Ok(())
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "schema",
        "version": "0.1.0",
        "description": "Detect and repair drifted table/column layout before writes",
        "commands": [
            { "name": "repair", "description": "Ensure all known tables and columns exist" },
            { "name": "status", "description": "Show column metadata for the review surface" }
        ],
        "storage": ["catalog.db"]
    })
}

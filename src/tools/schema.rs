//! Schema tools: `list_tables` and `describe_table`.

use crate::db::{DatabaseError, SqlDatabase};

use super::ToolError;

pub(super) async fn list_tables(db: &dyn SqlDatabase) -> Result<String, ToolError> {
    let tables = db.list_tables().await?;
    if tables.is_empty() {
        return Ok("No tables found in the database.".to_string());
    }
    Ok(tables.join(", "))
}

/// Describe one or more comma-separated tables: DDL plus a few sample rows.
pub(super) async fn describe_table(
    db: &dyn SqlDatabase,
    argument: &str,
    sample_rows: usize,
) -> Result<String, ToolError> {
    let names: Vec<&str> = argument
        .split(',')
        .map(|n| n.trim().trim_matches(|c: char| c == '"' || c == '`' || c == '\''))
        .filter(|n| !n.is_empty())
        .collect();
    if names.is_empty() {
        return Err(ToolError::InvalidArgument(
            "describe_table requires at least one table name".to_string(),
        ));
    }

    let mut sections = Vec::with_capacity(names.len());
    let mut missing = Vec::new();
    for name in names {
        match db.describe_table(name, sample_rows).await {
            Ok(description) => sections.push(format!(
                "{}\n\n/*\n{} rows from {} table:\n{}\n*/",
                description.ddl,
                description.sample.rows.len(),
                description.name,
                description.sample.to_tsv()
            )),
            Err(DatabaseError::TableNotFound(table)) => missing.push(table),
            Err(other) => return Err(other.into()),
        }
    }

    if !missing.is_empty() {
        return Err(ToolError::InvalidArgument(format!(
            "table_names {{{}}} not found in database",
            missing.join(", ")
        )));
    }
    Ok(sections.join("\n\n"))
}

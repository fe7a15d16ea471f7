//! Query tools: `check_query` (prepare only) and `execute_query`.
//!
//! Both run the keyword guard before the driver sees the text.

use crate::db::SqlDatabase;

use super::{check_read_only, ToolError};

pub(super) async fn check_query(db: &dyn SqlDatabase, sql: &str) -> Result<String, ToolError> {
    check_read_only(sql)?;
    db.check(sql).await?;
    Ok("The query is valid.".to_string())
}

pub(super) async fn execute_query(
    db: &dyn SqlDatabase,
    sql: &str,
    max_rows: usize,
) -> Result<String, ToolError> {
    check_read_only(sql)?;
    let result = db.query(sql, max_rows).await?;

    if result.rows.is_empty() {
        return Ok("The query returned no rows.".to_string());
    }
    let mut text = result.to_string();
    if result.truncated {
        text.push_str(&format!("\n(showing the first {} rows)", result.rows.len()));
    }
    Ok(text)
}

//! Keyword guard that keeps mutating statements away from the driver.
//!
//! The SQL text is tokenized with comments, string literals and quoted
//! identifiers removed, split on `;`, and every statement is checked twice:
//! its first keyword must start a read-only query, and no keyword anywhere in
//! it may belong to a data- or schema-changing statement. This is a
//! heuristic; the backends additionally run queries on read-only
//! connections/transactions.

use thiserror::Error;

/// Keywords that may open a statement.
const READ_ONLY_LEADERS: &[&str] = &["SELECT", "WITH", "VALUES", "SHOW", "EXPLAIN", "DESCRIBE", "DESC"];

/// Keywords rejected wherever they appear in a statement.
const MUTATING_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "TRUNCATE", "CREATE", "MERGE", "UPSERT",
    "GRANT", "REVOKE", "EXEC", "EXECUTE", "CALL", "COPY", "ATTACH", "DETACH", "INTO", "VACUUM",
    "REINDEX",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UnsafeQuery {
    #[error("no SQL statement provided")]
    Empty,

    #[error("{0} statements are not allowed, only read-only queries may be executed")]
    Mutating(String),

    #[error("statements starting with {0} are not allowed, only SELECT queries may be executed")]
    NotAQuery(String),

    #[error("unterminated string literal, quoted identifier or comment")]
    Unterminated,
}

/// Reject anything that is not a plain read-only query.
pub fn check_read_only(sql: &str) -> Result<(), UnsafeQuery> {
    let statements = keyword_statements(sql)?;
    if statements.is_empty() {
        return Err(UnsafeQuery::Empty);
    }

    for keywords in &statements {
        if let Some(hit) = keywords
            .iter()
            .find(|k| MUTATING_KEYWORDS.contains(&k.as_str()))
        {
            return Err(UnsafeQuery::Mutating(hit.clone()));
        }
        let leader = &keywords[0];
        if !READ_ONLY_LEADERS.contains(&leader.as_str()) {
            return Err(UnsafeQuery::NotAQuery(leader.clone()));
        }
    }
    Ok(())
}

/// Upper-cased bare words of each non-empty statement.
fn keyword_statements(sql: &str) -> Result<Vec<Vec<String>>, UnsafeQuery> {
    let chars: Vec<char> = sql.chars().collect();
    let mut statements = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut word = String::new();
    let mut i = 0;

    let flush = |word: &mut String, current: &mut Vec<String>| {
        if !word.is_empty() {
            current.push(word.to_uppercase());
            word.clear();
        }
    };

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if c.is_alphanumeric() || c == '_' {
            word.push(c);
            i += 1;
            continue;
        }
        // `E'...'` is a PostgreSQL escape string; the prefix is not a keyword.
        if c == '\'' && word.eq_ignore_ascii_case("e") {
            word.clear();
            i = skip_escape_string(&chars, i)?;
            continue;
        }
        flush(&mut word, &mut current);

        match c {
            '-' if next == Some('-') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if next == Some('*') => {
                i = skip_block_comment(&chars, i)?;
            }
            '\'' | '"' | '`' => {
                i = skip_quoted(&chars, i, c)?;
            }
            '[' => {
                i = skip_quoted(&chars, i, ']')?;
            }
            '$' => {
                i = skip_dollar_quoted(&chars, i)?;
            }
            ';' => {
                if !current.is_empty() {
                    statements.push(std::mem::take(&mut current));
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    flush(&mut word, &mut current);
    if !current.is_empty() {
        statements.push(current);
    }
    Ok(statements)
}

/// Skip a `/* ... */` comment (nesting allowed). Returns the index after it.
fn skip_block_comment(chars: &[char], start: usize) -> Result<usize, UnsafeQuery> {
    let mut depth = 0usize;
    let mut i = start;
    while i + 1 < chars.len() {
        match (chars[i], chars[i + 1]) {
            ('/', '*') => {
                depth += 1;
                i += 2;
            }
            ('*', '/') => {
                depth -= 1;
                i += 2;
                if depth == 0 {
                    return Ok(i);
                }
            }
            _ => i += 1,
        }
    }
    Err(UnsafeQuery::Unterminated)
}

/// Skip a quoted run opened at `start`. A doubled closing quote is the only
/// escape: standard SQL strings treat backslash as an ordinary character.
fn skip_quoted(chars: &[char], start: usize, close: char) -> Result<usize, UnsafeQuery> {
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == close {
            if chars.get(i + 1) == Some(&close) {
                i += 2;
                continue;
            }
            return Ok(i + 1);
        }
        i += 1;
    }
    Err(UnsafeQuery::Unterminated)
}

/// Skip the body of an `E'...'` string, where backslash escapes the next char.
fn skip_escape_string(chars: &[char], start: usize) -> Result<usize, UnsafeQuery> {
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '\'' if chars.get(i + 1) == Some(&'\'') => i += 2,
            '\'' => return Ok(i + 1),
            _ => i += 1,
        }
    }
    Err(UnsafeQuery::Unterminated)
}

/// Skip a PostgreSQL dollar-quoted string (`$$...$$` or `$tag$...$tag$`).
/// A lone `$` (e.g. a positional parameter) is left alone.
fn skip_dollar_quoted(chars: &[char], start: usize) -> Result<usize, UnsafeQuery> {
    let mut end_tag = start + 1;
    while end_tag < chars.len() && (chars[end_tag].is_alphanumeric() || chars[end_tag] == '_') {
        end_tag += 1;
    }
    if end_tag >= chars.len() || chars[end_tag] != '$' {
        return Ok(start + 1);
    }
    let tag: Vec<char> = chars[start..=end_tag].to_vec();
    let mut i = end_tag + 1;
    while i + tag.len() <= chars.len() {
        if chars[i..i + tag.len()] == tag[..] {
            return Ok(i + tag.len());
        }
        i += 1;
    }
    Err(UnsafeQuery::Unterminated)
}

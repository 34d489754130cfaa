use sqlx::{Pool, Postgres};

use crate::Result;

const CORE_SCHEMA: &str = include_str!("../sql/0001_init.sql");

/// Splits on semicolons outside `$$ ... $$` blocks and drops comment-only
/// statements.
fn split_statements(ddl: &str) -> Vec<String> {
    let mut stmts: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut chars = ddl.chars().peekable();
    let mut in_dollar = false;
    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'$') {
            in_dollar = !in_dollar;
            buf.push_str("$$");
            chars.next();
            continue;
        }
        if ch == ';' && !in_dollar {
            push_statement(&mut stmts, &buf);
            buf.clear();
        } else {
            buf.push(ch);
        }
    }
    push_statement(&mut stmts, &buf);
    stmts
}

fn push_statement(stmts: &mut Vec<String>, raw: &str) {
    let has_code = raw
        .lines()
        .map(str::trim)
        .any(|line| !line.is_empty() && !line.starts_with("--"));
    if has_code {
        stmts.push(raw.trim().to_string());
    }
}

pub async fn migrate_core_schema(pool: &Pool<Postgres>) -> Result<()> {
    for stmt in split_statements(CORE_SCHEMA) {
        sqlx::query(&stmt).execute(pool).await?;
    }
    Ok(())
}

/// Empties both tables and restarts their id sequences.
pub async fn reset_tables(pool: &Pool<Postgres>) -> Result<()> {
    sqlx::query("truncate cities, countries restart identity")
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_schema_into_statements() {
        let stmts = split_statements(CORE_SCHEMA);
        assert!(stmts[0].starts_with("-- Reference data"));
        assert!(stmts.iter().any(|s| s.contains("create table if not exists cities")));
        assert!(stmts.iter().all(|s| !s.ends_with(';')));
    }

    #[test]
    fn keeps_dollar_quoted_bodies_whole() {
        let stmts = split_statements("select 1; do $$ begin perform 1; end $$; -- trailing\n");
        assert_eq!(stmts, vec!["select 1", "do $$ begin perform 1; end $$"]);
    }
}

//! Applies SQL files through the `exec_sql` database function.

use anyhow::Result;
use serde_json::json;
use tracing::{error, info, warn};

use crate::supabase::SupabaseClient;

pub const EXEC_SQL_FUNCTION: &str = "exec_sql";

/// Anything that can run raw SQL. The hosted project does it via RPC.
pub trait SqlExecutor {
    fn exec_sql(&self, sql: &str) -> Result<()>;
}

impl SqlExecutor for SupabaseClient {
    fn exec_sql(&self, sql: &str) -> Result<()> {
        self.rpc(EXEC_SQL_FUNCTION, &json!({ "query": sql }))?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The whole file ran as one call.
    Whole,
    /// The whole-file call failed and statements were run one by one.
    Split { ok: usize, failed: usize },
}

impl MigrationOutcome {
    pub fn is_clean(&self) -> bool {
        match self {
            MigrationOutcome::Whole => true,
            MigrationOutcome::Split { failed, .. } => *failed == 0,
        }
    }
}

/// Splits a script on top-level `;`. Quoted strings, quoted identifiers and
/// dollar-quoted bodies are kept intact; comments outside them are dropped.
pub fn split_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut rest = sql;

    while let Some(ch) = rest.chars().next() {
        if rest.starts_with("--") {
            let end = rest.find('\n').unwrap_or(rest.len());
            rest = &rest[end..];
            continue;
        }
        if rest.starts_with("/*") {
            let end = rest[2..].find("*/").map(|i| i + 4).unwrap_or(rest.len());
            rest = &rest[end..];
            continue;
        }
        if ch == '\'' || ch == '"' {
            let len = quoted_len(rest, ch);
            current.push_str(&rest[..len]);
            rest = &rest[len..];
            continue;
        }
        if ch == '$' {
            if let Some(tag) = dollar_tag(rest) {
                let body_start = tag.len();
                let len = rest[body_start..]
                    .find(tag)
                    .map(|i| body_start + i + tag.len())
                    .unwrap_or(rest.len());
                current.push_str(&rest[..len]);
                rest = &rest[len..];
                continue;
            }
        }
        if ch == ';' {
            push_statement(&mut statements, &current);
            current.clear();
        } else {
            current.push(ch);
        }
        rest = &rest[ch.len_utf8()..];
    }
    push_statement(&mut statements, &current);
    statements
}

fn push_statement(statements: &mut Vec<String>, raw: &str) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        statements.push(trimmed.to_string());
    }
}

/// Length of a quoted run starting at `input[0] == quote`; doubled quotes
/// are escapes. An unterminated quote runs to the end.
fn quoted_len(input: &str, quote: char) -> usize {
    let mut chars = input.char_indices().skip(1).peekable();
    while let Some((i, ch)) = chars.next() {
        if ch == quote {
            if chars.peek().is_some_and(|(_, next)| *next == quote) {
                chars.next();
                continue;
            }
            return i + ch.len_utf8();
        }
    }
    input.len()
}

/// Returns the opening tag (`$$` or `$name$`) if `input` starts with one.
fn dollar_tag(input: &str) -> Option<&str> {
    let close = input[1..].find('$')? + 1;
    let name = &input[1..close];
    let valid = name
        .chars()
        .enumerate()
        .all(|(i, c)| c == '_' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit()));
    valid.then(|| &input[..=close])
}

/// Runs `sql` in one call; if that fails, retries statement by statement,
/// logging every failure and carrying on.
pub fn run_migration<E: SqlExecutor>(executor: &E, sql: &str) -> MigrationOutcome {
    match executor.exec_sql(sql) {
        Ok(()) => {
            info!("migration applied in one call");
            return MigrationOutcome::Whole;
        }
        Err(err) => warn!("whole-file execution failed, retrying per statement: {err:#}"),
    }

    let statements = split_statements(sql);
    info!("found {} statements", statements.len());
    let (mut ok, mut failed) = (0, 0);
    for (index, statement) in statements.iter().enumerate() {
        match executor.exec_sql(statement) {
            Ok(()) => {
                ok += 1;
                info!("statement {} succeeded", index + 1);
            }
            Err(err) => {
                failed += 1;
                error!("statement {} failed: {err:#}", index + 1);
            }
        }
    }
    MigrationOutcome::Split { ok, failed }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use anyhow::bail;

    use super::*;

    #[test]
    fn splits_on_top_level_semicolons() {
        let sql = "CREATE TABLE a (id int);\n-- comment; ignored\nINSERT INTO a VALUES (1);;\n";
        assert_eq!(
            split_statements(sql),
            vec!["CREATE TABLE a (id int)", "INSERT INTO a VALUES (1)"]
        );
    }

    #[test]
    fn quotes_and_dollar_bodies_survive() {
        let sql = r#"
            INSERT INTO t VALUES ('a;b', 'it''s; fine');
            CREATE FUNCTION f() RETURNS void AS $$
            BEGIN
                PERFORM 1; PERFORM 2;
            END;
            $$ LANGUAGE plpgsql;
            CREATE POLICY "x;y" ON t USING (true) /* block; comment */;
            SELECT $body$ ; $body$
        "#;
        let statements = split_statements(sql);
        assert_eq!(statements.len(), 4, "{statements:#?}");
        assert_eq!(statements[0], "INSERT INTO t VALUES ('a;b', 'it''s; fine')");
        assert!(statements[1].contains("PERFORM 1; PERFORM 2;"));
        assert!(statements[1].ends_with("$$ LANGUAGE plpgsql"));
        assert_eq!(statements[2], r#"CREATE POLICY "x;y" ON t USING (true)"#);
        assert_eq!(statements[3], "SELECT $body$ ; $body$");
    }

    #[test]
    fn positional_parameters_are_not_dollar_quotes() {
        assert_eq!(
            split_statements("SELECT $1; SELECT 2"),
            vec!["SELECT $1", "SELECT 2"]
        );
    }

    struct Recorder {
        calls: RefCell<Vec<String>>,
        reject: Vec<&'static str>,
    }

    impl SqlExecutor for Recorder {
        fn exec_sql(&self, sql: &str) -> Result<()> {
            self.calls.borrow_mut().push(sql.to_string());
            if self.reject.iter().any(|needle| sql.contains(needle)) {
                bail!("rejected");
            }
            Ok(())
        }
    }

    #[test]
    fn whole_file_runs_once_when_it_succeeds() {
        let recorder = Recorder {
            calls: RefCell::new(Vec::new()),
            reject: Vec::new(),
        };
        assert_eq!(run_migration(&recorder, "SELECT 1; SELECT 2;"), MigrationOutcome::Whole);
        assert_eq!(recorder.calls.borrow().len(), 1);
    }

    #[test]
    fn falls_back_to_statements_and_keeps_going() {
        let recorder = Recorder {
            calls: RefCell::new(Vec::new()),
            reject: vec!["broken"],
        };
        let outcome = run_migration(&recorder, "SELECT 1; SELECT broken; SELECT 3");
        assert_eq!(outcome, MigrationOutcome::Split { ok: 2, failed: 1 });
        assert!(!outcome.is_clean());
        assert_eq!(recorder.calls.borrow().len(), 4);
    }
}

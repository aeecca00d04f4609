//! Row-level-security check for the `error_logs` table.
//!
//! The browser reports client errors with the anon key, so the table must
//! accept anonymous inserts without being readable back. The check writes a
//! row with each key and cleans up with the privileged one.

use std::fmt;

use anyhow::Error;
use chrono::Utc;
use serde_json::{Value, json};
use tracing::{error, info, warn};

use crate::catalog::{Table, now_timestamp};
use crate::store::{Filter, Query, Row, RowStore};
use crate::supabase::SupabaseError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Passed,
    Failed(String),
    Skipped,
}

impl Step {
    pub fn passed(&self) -> bool {
        matches!(self, Step::Passed)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Passed => f.write_str("ok"),
            Step::Failed(reason) => write!(f, "failed: {reason}"),
            Step::Skipped => f.write_str("skipped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessReport {
    pub admin_insert: Step,
    pub anon_insert: Step,
    pub anon_read: Step,
    pub table_missing: bool,
}

impl AccessReport {
    pub fn all_passed(&self) -> bool {
        self.admin_insert.passed() && self.anon_insert.passed() && self.anon_read.passed()
    }
}

pub fn test_row(id: &str, who: &str) -> Row {
    let mut row = Row::new();
    row.insert("id".into(), json!(id));
    row.insert("message".into(), json!(format!("Test error from access check ({who})")));
    row.insert("severity".into(), json!("low"));
    row.insert("category".into(), json!("system"));
    row.insert("timestamp".into(), json!(now_timestamp()));
    row
}

fn missing_table(err: &Error) -> bool {
    match err.downcast_ref::<SupabaseError>() {
        Some(api) => api.is_missing_table(),
        None => err.to_string().contains("does not exist"),
    }
}

fn permission_denied(err: &Error) -> bool {
    match err.downcast_ref::<SupabaseError>() {
        Some(api) => api.is_permission_denied(),
        None => err.to_string().contains("row-level security"),
    }
}

pub fn check_error_logs<A: RowStore, N: RowStore>(admin: &A, anon: &N) -> AccessReport {
    let table = Table::ErrorLogs.name();
    let stamp = Utc::now().timestamp_millis();
    let mut report = AccessReport {
        admin_insert: Step::Skipped,
        anon_insert: Step::Skipped,
        anon_read: Step::Skipped,
        table_missing: false,
    };

    info!("testing privileged insert into {table}");
    let admin_id = format!("test-{stamp}");
    match admin.insert(table, &[test_row(&admin_id, "admin")]) {
        Ok(_) => {
            report.admin_insert = Step::Passed;
            cleanup(admin, table, &admin_id);
        }
        Err(err) => {
            error!("privileged insert failed: {err:#}");
            report.table_missing = missing_table(&err);
            report.admin_insert = Step::Failed(format!("{err:#}"));
            if report.table_missing {
                error!("table {table} does not exist");
                return report;
            }
        }
    }

    info!("testing anonymous insert into {table}");
    let anon_id = format!("test-anon-{stamp}");
    match anon.insert_minimal(table, &[test_row(&anon_id, "anon")]) {
        Ok(()) => {
            report.anon_insert = Step::Passed;
            cleanup(admin, table, &anon_id);
        }
        Err(err) => {
            if permission_denied(&err) {
                warn!("RLS policy blocks anonymous inserts; apply the error_logs policy");
            }
            report.anon_insert = Step::Failed(format!("{err:#}"));
        }
    }

    info!("testing anonymous read of {table}");
    report.anon_read = match anon.select(table, &Query::all().columns("id").limit(1)) {
        Ok(_) => Step::Passed,
        Err(err) => Step::Failed(format!("{err:#}")),
    };
    report
}

fn cleanup<A: RowStore>(admin: &A, table: &str, id: &str) {
    if let Err(err) = admin.delete(table, &[Filter::eq("id", Value::from(id))]) {
        warn!("could not remove test row {id}: {err:#}");
    }
}

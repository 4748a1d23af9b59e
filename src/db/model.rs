//! Ledger entities. Rows describe finished dispatch runs; the workflow itself
//! never touches the ledger.

use crate::dispatch::{DispatchReport, DispatchSettings};
use crate::error::DispatchError;
use crate::model::RunOutcome;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// One dispatch run as written to `dispatch_runs`.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub source_id: i64,
    pub group_id: i64,
    pub renderer: String,
    pub test_mode: bool,
    pub created_by: Option<i64>,
    pub outcome: RunOutcome,
    pub items_sent: i64,
    pub mailing_id: Option<i64>,
    /// Items that went out but could not be marked consumed.
    pub unmarked_items: Vec<i64>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn from_result(
        run_id: Uuid,
        settings: &DispatchSettings,
        result: &Result<DispatchReport, DispatchError>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let mut record = Self {
            run_id,
            source_id: settings.source_id,
            group_id: settings.group_id,
            renderer: settings.renderer.clone(),
            test_mode: settings.test_mode,
            created_by: settings.created_by,
            outcome: RunOutcome::Failed,
            items_sent: 0,
            mailing_id: None,
            unmarked_items: Vec::new(),
            error: None,
            started_at,
            finished_at: Utc::now(),
        };
        match result {
            Err(err) => {
                record.mailing_id = err.mailing().map(|h| h.0);
                record.error = Some(format!("{:#}", err));
            }
            Ok(report) => {
                record.items_sent = report.items_sent as i64;
                record.mailing_id = report.mailing.map(|h| h.0);
                if let Some(partial) = &report.partial {
                    record.unmarked_items = partial.item_ids();
                    record.error = Some(partial.to_string());
                }
                record.outcome = outcome_of(report);
            }
        }
        record
    }
}

fn outcome_of(report: &DispatchReport) -> RunOutcome {
    match (report.mailing, report.submitted, &report.partial) {
        (None, _, _) => RunOutcome::Empty,
        (Some(_), false, _) => RunOutcome::Draft,
        (Some(_), true, Some(_)) => RunOutcome::Partial,
        (Some(_), true, None) => RunOutcome::Sent,
    }
}

/// A ledger row read back with its primary key.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRun {
    pub id: i64,
    pub record: RunRecord,
}

//! Error types surfaced by the dispatch workflow.
use crate::model::MailingHandle;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: i64 },
    #[error("Invalid configuration: {0}")]
    Configuration(String),
    #[error("Unknown renderer variant: {0}")]
    UnknownRenderer(String),
    /// The mailing exists in the CRM as a draft but was never scheduled.
    #[error("mailing {mailing} was created but not submitted: {cause:#}")]
    Submit {
        mailing: MailingHandle,
        cause: anyhow::Error,
    },
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl DispatchError {
    /// Mailing left behind by a failed run, if any.
    pub fn mailing(&self) -> Option<MailingHandle> {
        match self {
            DispatchError::Submit { mailing, .. } => Some(*mailing),
            _ => None,
        }
    }
}

/// One item whose consumption record could not be updated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumptionFailure {
    pub item_id: i64,
    pub consumption_key: i64,
    pub reason: String,
}

/// Raised after a mailing was submitted but some items were not marked
/// consumed. The mailing is already out, so this never aborts a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to mark {} item(s) consumed: {}", .failures.len(), joined_ids(.failures))]
pub struct PartialConsumptionError {
    pub failures: Vec<ConsumptionFailure>,
}

impl PartialConsumptionError {
    pub fn item_ids(&self) -> Vec<i64> {
        self.failures.iter().map(|f| f.item_id).collect()
    }
}

fn joined_ids(failures: &[ConsumptionFailure]) -> String {
    failures
        .iter()
        .map(|f| f.item_id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

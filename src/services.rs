//! Seams to the CRM that owns sources, groups, items and mailings.
//!
//! The workflow only talks to these traits. `crate::civicrm::CiviClient`
//! implements all of them over the CiviCRM REST API; tests use in-memory
//! recorders.

use crate::model::{
    GroupDescriptor, Item, MailingHandle, MailingRequest, SenderIdentity, SourceDescriptor,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::sync::Arc;

#[async_trait]
pub trait SourceRegistry: Send + Sync {
    /// `Ok(None)` when no source has this id.
    async fn resolve_source(&self, source_id: i64) -> Result<Option<SourceDescriptor>>;
}

#[async_trait]
pub trait GroupRegistry: Send + Sync {
    /// Only active groups of the mailing-list type resolve; anything else is
    /// `Ok(None)`.
    async fn resolve_group(&self, group_id: i64) -> Result<Option<GroupDescriptor>>;
}

#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Snapshot of the source's unconsumed items, in store order.
    async fn fetch_unconsumed(&self, source_id: i64) -> Result<Vec<Item>>;

    /// Flag one consumption record as consumed. Marking an already consumed
    /// record again succeeds.
    async fn mark_consumed(&self, consumption_key: i64) -> Result<()>;
}

#[async_trait]
pub trait MailingService: Send + Sync {
    async fn create_mailing(&self, request: &MailingRequest) -> Result<MailingHandle>;

    async fn submit_mailing(
        &self,
        handle: MailingHandle,
        scheduled_at: DateTime<Local>,
    ) -> Result<()>;
}

#[async_trait]
pub trait SenderDefaults: Send + Sync {
    /// The site-wide default sender, or `None` if unset or unparseable.
    async fn default_sender(&self) -> Result<Option<SenderIdentity>>;
}

/// The set of backends a workflow runs against.
#[derive(Clone)]
pub struct Collaborators {
    pub sources: Arc<dyn SourceRegistry>,
    pub groups: Arc<dyn GroupRegistry>,
    pub items: Arc<dyn ItemStore>,
    pub mailings: Arc<dyn MailingService>,
    pub sender_defaults: Arc<dyn SenderDefaults>,
}

impl Collaborators {
    /// Use one backend for every role.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: SourceRegistry + GroupRegistry + ItemStore + MailingService + SenderDefaults + 'static,
    {
        Self {
            sources: backend.clone(),
            groups: backend.clone(),
            items: backend.clone(),
            mailings: backend.clone(),
            sender_defaults: backend,
        }
    }
}

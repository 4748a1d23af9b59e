//! The dispatch workflow: batch unconsumed items into one mailing, send it,
//! then mark the items consumed.
use crate::error::{ConsumptionFailure, DispatchError, PartialConsumptionError};
use crate::model::{
    GroupDescriptor, Item, MailingHandle, MailingRequest, SenderIdentity, SourceDescriptor,
};
use crate::renderer::{
    RenderContext, Renderer, RendererOptions, RendererRegistry, DEFAULT_VARIANT,
};
use crate::services::Collaborators;
use chrono::{Local, NaiveDate};
use tracing::{info, instrument, warn};

pub type Result<T> = std::result::Result<T, DispatchError>;

/// Inputs of one dispatch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSettings {
    pub source_id: i64,
    pub group_id: i64,
    /// Create the mailing but neither submit it nor mark items consumed.
    pub test_mode: bool,
    pub renderer: String,
    pub renderer_options: RendererOptions,
    /// Contact recorded as the mailing's creator.
    pub created_by: Option<i64>,
    /// Takes precedence over the site default sender.
    pub sender: Option<SenderIdentity>,
}

impl DispatchSettings {
    pub fn new(source_id: i64, group_id: i64) -> Self {
        Self {
            source_id,
            group_id,
            test_mode: false,
            renderer: DEFAULT_VARIANT.to_string(),
            renderer_options: RendererOptions::new(),
            created_by: None,
            sender: None,
        }
    }
}

/// What a run did.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    /// Items included in the mailing, whether or not they were all marked.
    pub items_sent: usize,
    pub mailing: Option<MailingHandle>,
    pub request: Option<MailingRequest>,
    pub submitted: bool,
    pub partial: Option<PartialConsumptionError>,
}

impl DispatchReport {
    fn empty() -> Self {
        Self {
            items_sent: 0,
            mailing: None,
            request: None,
            submitted: false,
            partial: None,
        }
    }
}

pub struct DispatchWorkflow {
    settings: DispatchSettings,
    source: SourceDescriptor,
    group: GroupDescriptor,
    sender: Option<SenderIdentity>,
    renderer: Box<dyn Renderer>,
    backends: Collaborators,
}

impl std::fmt::Debug for DispatchWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchWorkflow")
            .field("settings", &self.settings)
            .field("source", &self.source)
            .field("group", &self.group)
            .field("sender", &self.sender)
            .finish_non_exhaustive()
    }
}

impl DispatchWorkflow {
    /// Resolve source, group, sender and renderer. Nothing is written to the
    /// CRM here.
    #[instrument(skip_all, fields(source_id = settings.source_id, group_id = settings.group_id))]
    pub async fn prepare(
        settings: DispatchSettings,
        backends: Collaborators,
        renderers: &RendererRegistry,
    ) -> Result<Self> {
        let source = backends
            .sources
            .resolve_source(settings.source_id)
            .await?
            .ok_or(DispatchError::NotFound {
                kind: "news source",
                id: settings.source_id,
            })?;
        let group = backends
            .groups
            .resolve_group(settings.group_id)
            .await?
            .ok_or(DispatchError::NotFound {
                kind: "mailing group",
                id: settings.group_id,
            })?;

        let sender = match &settings.sender {
            Some(explicit) => Some(explicit.clone()),
            None => backends.sender_defaults.default_sender().await?,
        };
        if sender.is_none() {
            warn!("no default sender configured; mailing creation will fail");
        }

        let renderer = renderers
            .create(&settings.renderer, &settings.renderer_options)
            .ok_or_else(|| DispatchError::UnknownRenderer(settings.renderer.clone()))??;

        Ok(Self {
            settings,
            source,
            group,
            sender,
            renderer,
            backends,
        })
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    pub fn source(&self) -> &SourceDescriptor {
        &self.source
    }

    pub fn group(&self) -> &GroupDescriptor {
        &self.group
    }

    /// Run the workflow once.
    #[instrument(
        skip_all,
        fields(source_id = self.source.id, group_id = self.group.id, test_mode = self.settings.test_mode)
    )]
    pub async fn process(&self) -> Result<DispatchReport> {
        let items = self
            .backends
            .items
            .fetch_unconsumed(self.source.id)
            .await?;
        if items.is_empty() {
            info!("no unconsumed items; nothing to send");
            return Ok(DispatchReport::empty());
        }

        let request = self.build_request(&items, Local::now().date_naive())?;
        let handle = self.backends.mailings.create_mailing(&request).await?;
        info!(mailing_id = handle.0, items = items.len(), "mailing created");

        let mut report = DispatchReport {
            items_sent: items.len(),
            mailing: Some(handle),
            request: Some(request),
            submitted: false,
            partial: None,
        };
        if self.settings.test_mode {
            info!(mailing_id = handle.0, "test mode: mailing left unsent");
            return Ok(report);
        }

        self.backends
            .mailings
            .submit_mailing(handle, Local::now())
            .await
            .map_err(|cause| DispatchError::Submit {
                mailing: handle,
                cause,
            })?;
        report.submitted = true;
        info!(mailing_id = handle.0, "mailing submitted");

        report.partial = self.mark_consumed(&items).await;
        if let Some(partial) = &report.partial {
            warn!(
                mailing_id = handle.0,
                failed = ?partial.item_ids(),
                "mailing sent but some items were not marked consumed"
            );
        }
        Ok(report)
    }

    /// Build the mailing for a non-empty batch. Fails when no sender email
    /// is known.
    pub fn build_request(&self, items: &[Item], today: NaiveDate) -> Result<MailingRequest> {
        let sender = self.sender.clone().ok_or_else(|| {
            DispatchError::Configuration("missing FROM email address".to_string())
        })?;
        let ctx = RenderContext {
            source: &self.source,
            group: &self.group,
        };
        Ok(MailingRequest {
            name: mailing_name(items.len(), &self.group.title, today),
            subject: self.renderer.subject(&ctx, items),
            body_html: self.renderer.html(&ctx, items),
            group_id: self.group.id,
            sender,
            created_by: self.settings.created_by,
        })
    }

    /// Best effort: every item is attempted even after a failure.
    async fn mark_consumed(&self, items: &[Item]) -> Option<PartialConsumptionError> {
        let mut failures = Vec::new();
        for item in items {
            if let Err(err) = self.backends.items.mark_consumed(item.consumption_key).await {
                warn!(
                    ?err,
                    item_id = item.id,
                    consumption_key = item.consumption_key,
                    "failed to mark item consumed"
                );
                failures.push(ConsumptionFailure {
                    item_id: item.id,
                    consumption_key: item.consumption_key,
                    reason: format!("{:#}", err),
                });
            }
        }
        if failures.is_empty() {
            None
        } else {
            Some(PartialConsumptionError { failures })
        }
    }
}

/// Internal name of the mailing, e.g. `3 items: Weekly digest 7 Mar 2025`.
pub fn mailing_name(count: usize, group_title: &str, date: NaiveDate) -> String {
    let prefix = if count == 1 {
        "1 item: ".to_string()
    } else {
        format!("{} items: ", count)
    };
    format!("{}{} {}", prefix, group_title, date.format("%-d %b %Y"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mailing_name_matches_count() {
        let d = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        assert_eq!(mailing_name(1, "Test group 1", d), "1 item: Test group 1 7 Mar 2025");
        assert_eq!(mailing_name(12, "Digest", d), "12 items: Digest 7 Mar 2025");
    }

    #[test]
    fn settings_default_to_baseline_and_live_mode() {
        let s = DispatchSettings::new(1, 2);
        assert_eq!(s.renderer, "baseline");
        assert!(!s.test_mode);
        assert!(s.sender.is_none());
    }
}

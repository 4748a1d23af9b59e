//! CiviCRM APIv3 REST client implementing the workflow's backend traits.
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use reqwest::{Client, Url};
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use tracing::debug;

use crate::config::Civicrm;
use crate::model::{
    GroupDescriptor, Item, MailingHandle, MailingRequest, SenderIdentity, SourceDescriptor,
};
use crate::sender;
use crate::services::{GroupRegistry, ItemStore, MailingService, SenderDefaults, SourceRegistry};

const REST_PATH: &str = "civicrm/ajax/rest";
const CIVI_DATETIME: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Clone)]
pub struct CiviClient {
    http: Client,
    endpoint: Url,
    api_key: String,
    site_key: String,
}

impl fmt::Debug for CiviClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CiviClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl CiviClient {
    pub fn from_config(cfg: &Civicrm) -> Result<Self> {
        let base = Url::parse(cfg.base_url.trim()).context("invalid civicrm.base_url")?;
        let http = Client::builder()
            .user_agent("newsstore-mailer/0.1")
            .timeout(Duration::from_secs(cfg.timeout_seconds))
            .build()
            .context("failed to build HTTP client")?;
        Self::with_client(http, base, cfg.api_key.clone(), cfg.site_key.clone())
    }

    pub fn with_client(
        http: Client,
        base_url: Url,
        api_key: String,
        site_key: String,
    ) -> Result<Self> {
        // A base without a trailing slash would lose its last path segment on join.
        let mut base_url = base_url;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let endpoint = base_url
            .join(REST_PATH)
            .context("invalid CiviCRM base URL")?;
        Ok(Self {
            http,
            endpoint,
            api_key,
            site_key,
        })
    }

    pub fn build_request(
        &self,
        entity: &str,
        action: &str,
        params: &Value,
    ) -> Result<reqwest::Request> {
        let json = serde_json::to_string(params).context("failed to encode API params")?;
        self.http
            .post(self.endpoint.clone())
            .header("X-Requested-With", "XMLHttpRequest")
            .form(&[
                ("entity", entity),
                ("action", action),
                ("api_key", self.api_key.as_str()),
                ("key", self.site_key.as_str()),
                ("json", json.as_str()),
            ])
            .build()
            .context("failed to build CiviCRM request")
    }

    async fn call(&self, entity: &str, action: &str, params: Value) -> Result<Value> {
        let request = self.build_request(entity, action, &params)?;
        debug!(entity, action, payload = %params, "sending civicrm request");
        let res = self
            .http
            .execute(request)
            .await
            .with_context(|| format!("failed to reach CiviCRM for {}.{}", entity, action))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("civicrm {}.{} http {}: {}", entity, action, status, body));
        }
        let body = res.text().await.context("failed to read CiviCRM response")?;
        parse_response(&body).with_context(|| format!("{}.{} failed", entity, action))
    }
}

/// Decode an APIv3 response envelope, turning `is_error` into `Err`.
pub fn parse_response(body: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(body).context("invalid CiviCRM response JSON")?;
    if truthy(&value["is_error"]) {
        let msg = value["error_message"]
            .as_str()
            .unwrap_or("unknown API error")
            .to_string();
        return Err(anyhow!(msg));
    }
    Ok(value)
}

/// Rows of `values`, whether returned as a list (`sequential=1`) or keyed by id.
pub fn values_of(response: &Value) -> Vec<&Value> {
    match &response["values"] {
        Value::Array(rows) => rows.iter().collect(),
        Value::Object(map) => map.values().collect(),
        _ => Vec::new(),
    }
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64().map(|n| n != 0).unwrap_or(false),
        Value::String(s) => !s.is_empty() && s != "0",
        _ => false,
    }
}

/// CiviCRM returns ids both as numbers and as numeric strings.
fn as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn required_id(row: &Value, field: &str) -> Result<i64> {
    as_i64(&row[field]).ok_or_else(|| anyhow!("missing or invalid '{}' in {}", field, row))
}

pub fn item_from_row(row: &Value) -> Result<Item> {
    Ok(Item {
        id: required_id(row, "id")?,
        title: as_text(&row["title"]),
        teaser: as_text(&row["teaser"]),
        uri: as_text(&row["uri"]),
        consumption_key: required_id(row, "newsstoreconsumed_id")?,
    })
}

/// Every unconsumed item of the source; `limit: 0` lifts the API's default row cap.
pub fn fetch_unconsumed_params(source_id: i64) -> Value {
    json!({
        "sequential": 1,
        "source": source_id,
        "is_consumed": 0,
        "options": { "limit": 0 },
    })
}

/// Update of an existing consumption record by id. Repeating it changes nothing.
pub fn mark_consumed_params(consumption_key: i64) -> Value {
    json!({ "id": consumption_key, "is_consumed": 1 })
}

pub fn mailing_create_params(request: &MailingRequest) -> Value {
    let mut params = json!({
        "sequential": 1,
        "name": request.name,
        "from_name": request.sender.name.clone().unwrap_or_default(),
        "from_email": request.sender.email,
        "subject": request.subject,
        "body_html": request.body_html,
        "groups": { "include": [request.group_id] },
        "header_id": "",
        "footer_id": "",
    });
    if let Some(contact_id) = request.created_by {
        params["created_id"] = json!(contact_id);
    }
    params
}

pub fn mailing_submit_params(handle: MailingHandle, scheduled_at: DateTime<Local>) -> Value {
    let at = scheduled_at.format(CIVI_DATETIME).to_string();
    json!({
        "id": handle.0,
        "scheduled_date": at,
        "approval_date": at,
    })
}

#[async_trait]
impl SourceRegistry for CiviClient {
    async fn resolve_source(&self, source_id: i64) -> Result<Option<SourceDescriptor>> {
        let res = self
            .call("NewsStoreSource", "get", json!({ "sequential": 1, "id": source_id }))
            .await?;
        let Some(row) = values_of(&res).into_iter().next() else {
            return Ok(None);
        };
        Ok(Some(SourceDescriptor {
            id: required_id(row, "id")?,
            name: as_text(&row["name"]),
            uri: row["uri"].as_str().map(str::to_string),
        }))
    }
}

#[async_trait]
impl GroupRegistry for CiviClient {
    async fn resolve_group(&self, group_id: i64) -> Result<Option<GroupDescriptor>> {
        let res = self
            .call(
                "Group",
                "get",
                json!({
                    "sequential": 1,
                    "id": group_id,
                    "group_type": "Mailing List",
                    "is_active": 1,
                }),
            )
            .await?;
        let Some(row) = values_of(&res).into_iter().next() else {
            return Ok(None);
        };
        Ok(Some(GroupDescriptor {
            id: required_id(row, "id")?,
            title: as_text(&row["title"]),
        }))
    }
}

#[async_trait]
impl ItemStore for CiviClient {
    async fn fetch_unconsumed(&self, source_id: i64) -> Result<Vec<Item>> {
        let res = self
            .call(
                "NewsStoreItem",
                "getwithusage",
                fetch_unconsumed_params(source_id),
            )
            .await?;
        values_of(&res).into_iter().map(item_from_row).collect()
    }

    async fn mark_consumed(&self, consumption_key: i64) -> Result<()> {
        self.call(
            "NewsStoreConsumed",
            "create",
            mark_consumed_params(consumption_key),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl MailingService for CiviClient {
    async fn create_mailing(&self, request: &MailingRequest) -> Result<MailingHandle> {
        let res = self
            .call("Mailing", "create", mailing_create_params(request))
            .await?;
        as_i64(&res["id"])
            .map(MailingHandle)
            .ok_or_else(|| anyhow!("Mailing.create returned no id"))
    }

    async fn submit_mailing(
        &self,
        handle: MailingHandle,
        scheduled_at: DateTime<Local>,
    ) -> Result<()> {
        self.call("Mailing", "submit", mailing_submit_params(handle, scheduled_at))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SenderDefaults for CiviClient {
    async fn default_sender(&self) -> Result<Option<SenderIdentity>> {
        let res = self
            .call(
                "OptionValue",
                "get",
                json!({
                    "sequential": 1,
                    "return": ["label", "is_default"],
                    "is_default": 1,
                    "option_group_id": "from_email_address",
                }),
            )
            .await?;
        Ok(values_of(&res)
            .into_iter()
            .next()
            .and_then(|row| row["label"].as_str())
            .and_then(sender::parse_from_label))
    }
}

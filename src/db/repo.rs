use super::model::{RunRecord, StoredRun};
use crate::model::RunOutcome;
use anyhow::{anyhow, Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::instrument;
use uuid::Uuid;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let options = SqliteConnectOptions::from_str(&normalized)
        .with_context(|| format!("invalid database url: {}", normalized))?
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(options).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched. Returns possibly-updated URL.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[instrument(skip_all, fields(run_id = %record.run_id))]
pub async fn record_run(pool: &Pool, record: &RunRecord) -> Result<i64> {
    let unmarked = if record.unmarked_items.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&record.unmarked_items)?)
    };
    let rec = sqlx::query(
        "INSERT INTO dispatch_runs (run_id, source_id, group_id, renderer, test_mode, created_by, outcome, items_sent, mailing_id, unmarked_items, error, started_at, finished_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(record.run_id.to_string())
    .bind(record.source_id)
    .bind(record.group_id)
    .bind(&record.renderer)
    .bind(record.test_mode)
    .bind(record.created_by)
    .bind(record.outcome.as_str())
    .bind(record.items_sent)
    .bind(record.mailing_id)
    .bind(unmarked)
    .bind(record.error.as_deref())
    .bind(record.started_at)
    .bind(record.finished_at)
    .fetch_one(pool)
    .await?;
    Ok(rec.get("id"))
}

/// Most recent runs first, optionally limited to one source.
#[instrument(skip_all)]
pub async fn recent_runs(
    pool: &Pool,
    source_id: Option<i64>,
    limit: i64,
) -> Result<Vec<StoredRun>> {
    let rows = sqlx::query(
        "SELECT id, run_id, source_id, group_id, renderer, test_mode, created_by, outcome, items_sent, mailing_id, unmarked_items, error, started_at, finished_at \
         FROM dispatch_runs WHERE (? IS NULL OR source_id = ?) ORDER BY id DESC LIMIT ?",
    )
    .bind(source_id)
    .bind(source_id)
    .bind(limit.max(0))
    .fetch_all(pool)
    .await?;
    rows.iter().map(stored_run_from_row).collect()
}

fn stored_run_from_row(row: &SqliteRow) -> Result<StoredRun> {
    let run_id: String = row.get("run_id");
    let outcome: String = row.get("outcome");
    let unmarked: Option<String> = row.get("unmarked_items");
    let unmarked_items = match unmarked {
        Some(json) => serde_json::from_str(&json).context("corrupt unmarked_items")?,
        None => Vec::new(),
    };
    Ok(StoredRun {
        id: row.get("id"),
        record: RunRecord {
            run_id: Uuid::parse_str(&run_id).context("corrupt run_id")?,
            source_id: row.get("source_id"),
            group_id: row.get("group_id"),
            renderer: row.get("renderer"),
            test_mode: row.get("test_mode"),
            created_by: row.get("created_by"),
            outcome: RunOutcome::parse(&outcome)
                .ok_or_else(|| anyhow!("unknown outcome '{}'", outcome))?,
            items_sent: row.get("items_sent"),
            mailing_id: row.get("mailing_id"),
            unmarked_items,
            error: row.get("error"),
            started_at: row.get("started_at"),
            finished_at: row.get("finished_at"),
        },
    })
}

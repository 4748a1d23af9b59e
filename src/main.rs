use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use newsstore_mailer::civicrm::CiviClient;
use newsstore_mailer::config::{self, Config};
use newsstore_mailer::db::{self, RunRecord};
use newsstore_mailer::renderer::RendererRegistry;
use newsstore_mailer::services::Collaborators;
use newsstore_mailer::{DispatchSettings, DispatchWorkflow};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Mail every unconsumed item of a news source to a mailing group
    Send(SendArgs),
    /// Print recent dispatch runs from the local ledger
    History {
        /// Only show runs for this news source
        #[arg(long)]
        source_id: Option<i64>,
        #[arg(long, default_value = "20")]
        limit: i64,
    },
}

#[derive(Debug, clap::Args)]
struct SendArgs {
    /// News store source to drain
    #[arg(long)]
    source_id: i64,
    /// Mailing-list group to send to
    #[arg(long)]
    group_id: i64,
    /// Create the mailing but do not send it or mark items consumed
    #[arg(long)]
    test_mode: bool,
    /// Renderer variant (defaults to mailer.renderer from the config)
    #[arg(long)]
    renderer: Option<String>,
    /// Contact id recorded as the mailing's creator
    #[arg(long)]
    created_by: Option<i64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| cfg.ledger_url());

    match args.command {
        Command::Send(send) => {
            let pool = ledger_for_send(&cfg, &database_url).await;
            run_send(&cfg, pool.as_ref(), send).await
        }
        Command::History { source_id, limit } => {
            let pool = open_ledger(&cfg, &database_url).await?;
            for run in db::recent_runs(&pool, source_id, limit).await? {
                let r = &run.record;
                println!(
                    "{} {} source={} group={} outcome={} items={} mailing={} unmarked={:?}",
                    r.started_at.format("%Y-%m-%d %H:%M:%S"),
                    r.run_id,
                    r.source_id,
                    r.group_id,
                    r.outcome.as_str(),
                    r.items_sent,
                    r.mailing_id.map(|id| id.to_string()).unwrap_or_else(|| "-".into()),
                    r.unmarked_items,
                );
            }
            Ok(())
        }
    }
}

async fn open_ledger(cfg: &Config, database_url: &str) -> Result<db::Pool> {
    cfg.ensure_dirs()?;
    let pool = db::init_pool(database_url).await?;
    db::run_migrations(&pool).await?;
    Ok(pool)
}

/// The ledger is an audit log; a mailing still goes out without it.
async fn ledger_for_send(cfg: &Config, database_url: &str) -> Option<db::Pool> {
    match open_ledger(cfg, database_url).await {
        Ok(pool) => Some(pool),
        Err(err) => {
            warn!(?err, "run ledger unavailable; dispatch runs will not be recorded");
            None
        }
    }
}

async fn run_send(cfg: &Config, pool: Option<&db::Pool>, send: SendArgs) -> Result<()> {
    let client = Arc::new(CiviClient::from_config(&cfg.civicrm)?);
    let backends = Collaborators::from_backend(client);
    let registry = RendererRegistry::default();

    let settings = DispatchSettings {
        source_id: send.source_id,
        group_id: send.group_id,
        test_mode: send.test_mode,
        renderer: send.renderer.unwrap_or_else(|| cfg.mailer.renderer.clone()),
        renderer_options: cfg.mailer.renderer_options.clone(),
        created_by: send.created_by,
        sender: cfg.mailer.sender(),
    };

    let run_id = Uuid::new_v4();
    let started_at = Utc::now();
    let result = async {
        let workflow = DispatchWorkflow::prepare(settings.clone(), backends, &registry).await?;
        workflow.process().await
    }
    .instrument(info_span!("dispatch", %run_id))
    .await;

    let record = RunRecord::from_result(run_id, &settings, &result, started_at);
    if let Some(pool) = pool {
        if let Err(err) = db::record_run(pool, &record).await {
            warn!(?err, %run_id, "failed to record dispatch run");
        }
    }

    match result {
        Ok(report) => {
            if let Some(partial) = &report.partial {
                warn!(%run_id, "{}", partial);
            }
            info!(
                %run_id,
                items_sent = report.items_sent,
                outcome = record.outcome.as_str(),
                "dispatch finished"
            );
            println!("items_sent={}", report.items_sent);
            Ok(())
        }
        Err(err) => {
            error!(?err, %run_id, "dispatch failed");
            Err(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_data_dir(data_dir: &str) -> Config {
        let mut cfg: Config = serde_yaml::from_str(config::example()).unwrap();
        cfg.app.data_dir = data_dir.to_string();
        cfg
    }

    #[tokio::test]
    async fn open_ledger_creates_and_migrates() {
        let td = tempfile::tempdir().unwrap();
        let cfg = config_with_data_dir(&td.path().join("data").to_string_lossy());
        let pool = open_ledger(&cfg, &cfg.ledger_url()).await.unwrap();
        assert!(db::recent_runs(&pool, None, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unwritable_ledger_does_not_block_send() {
        // A directory cannot be created beneath a regular file.
        let file = tempfile::NamedTempFile::new().unwrap();
        let cfg = config_with_data_dir(&file.path().join("data").to_string_lossy());
        assert!(open_ledger(&cfg, &cfg.ledger_url()).await.is_err());
        assert!(ledger_for_send(&cfg, &cfg.ledger_url()).await.is_none());
    }
}

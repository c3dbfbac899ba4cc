use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use dotenvy::dotenv;
use reqwest::Client;
use sqlx::migrate::MigrateDatabase;
use sqlx::Sqlite;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reddit_leadgen::config::AppConfig;
use reddit_leadgen::db_connection::{connect_with_retry, ConnectionConfig};
use reddit_leadgen::models::PollTrigger;
use reddit_leadgen::poll_engine::{EmailSink, PollEngine};
use reddit_leadgen::services::{DatabaseService, SqliteDatabaseService};

/// Run a single poll for one campaign and print the resulting job.
#[derive(Parser, Debug)]
#[command(name = "poll-now")]
struct Cli {
    /// Campaign id to poll.
    campaign_id: i64,
}

struct LoggingEmailSink;

impl EmailSink for LoggingEmailSink {
    fn send(&self, to_email: &str, subject: &str, _html_body: &str) -> Result<bool> {
        tracing::info!(to_email, subject, "poll summary email (sink not configured)");
        Ok(true)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let cfg = AppConfig::from_env()?;

    if !Sqlite::database_exists(&cfg.database_url).await? {
        Sqlite::create_database(&cfg.database_url).await?;
    }

    let connect_options = cfg
        .database_url
        .parse::<sqlx::sqlite::SqliteConnectOptions>()?
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = connect_with_retry(connect_options, 5, Duration::from_secs(300), Some(ConnectionConfig::from_env()))
        .await
        .with_context(|| format!("failed to connect to {}", cfg.database_url))?;

    sqlx::migrate!().run(&pool).await.expect("failed to run migrations");

    let http = Client::builder().user_agent(cfg.reddit_user_agent.clone()).build()?;

    let db: Arc<dyn DatabaseService> = Arc::new(SqliteDatabaseService::new(pool));
    let reddit: Arc<dyn reddit_leadgen::reddit_source::RedditSource> =
        Arc::from(reddit_leadgen::reddit_source::build(&cfg, http.clone()));
    let llm: Arc<dyn reddit_leadgen::llm::LlmClient> =
        Arc::from(reddit_leadgen::llm::build(&cfg, http));
    let scoring = Arc::new(reddit_leadgen::batch_scoring::BatchScoringService::new(
        llm,
        cfg.default_batch_size,
        cfg.max_concurrent,
    ));
    let engine = PollEngine::new(db, reddit, scoring, Arc::new(LoggingEmailSink), cfg);

    let job = engine.run_poll(cli.campaign_id, PollTrigger::Manual).await?;
    println!("{job:#?}");
    Ok(())
}

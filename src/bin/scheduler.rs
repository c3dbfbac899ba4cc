use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Timelike;
use dotenvy::dotenv;
use reqwest::Client;
use sqlx::migrate::MigrateDatabase;
use sqlx::Sqlite;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reddit_leadgen::config::AppConfig;
use reddit_leadgen::db_connection::{connect_with_retry, ConnectionConfig};
use reddit_leadgen::poll_engine::{EmailSink, PollEngine};
use reddit_leadgen::scheduler::Scheduler;
use reddit_leadgen::services::{DatabaseService, SqliteDatabaseService};
use reddit_leadgen::shutdown::{race_with_shutdown, ShutdownRace};

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
    let engine = Arc::new(PollEngine::new(
        db.clone(),
        reddit,
        scoring,
        Arc::new(LoggingEmailSink),
        cfg.clone(),
    ));
    let scheduler = Scheduler::new(db, engine, cfg);

    tracing::info!("scheduler started, ticking hourly");
    loop {
        let hour = chrono::Utc::now().hour();
        match scheduler.tick(hour).await {
            Ok(stats) => tracing::info!(?stats, "scheduler tick complete"),
            Err(e) => tracing::error!(error = %e, "scheduler tick failed"),
        }

        match race_with_shutdown(tokio::time::sleep(Duration::from_secs(3600))).await? {
            ShutdownRace::Shutdown => {
                tracing::info!("shutdown requested, exiting");
                break;
            }
            ShutdownRace::Completed(()) => {}
        }
    }

    Ok(())
}

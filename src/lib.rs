pub mod batch_scoring;
pub mod campaign_service;
pub mod config;
pub mod db_connection;
pub mod error;
pub mod llm;
pub mod models;
pub mod plan_limits;
pub mod poll_engine;
pub mod rate_limiter;
pub mod reddit_source;
pub mod scheduler;
pub mod services;
pub mod shutdown;
pub mod usage;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub redis_url: String,
    pub marketplace_a_secret: String,
    pub marketplace_b_api: String,
    pub marketplace_b_api_key: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("PORT must be a valid number")?;

        let redis_host = env::var("REDIS_HOST").unwrap_or_else(|_| "localhost".to_string());
        let redis_port = env::var("REDIS_PORT").unwrap_or_else(|_| "6379".to_string());
        let redis_url = format!("redis://{redis_host}:{redis_port}");

        let db_host = env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string());
        let db_port = env::var("DB_PORT").unwrap_or_else(|_| "5432".to_string());
        let db_name = env::var("DB_NAME").unwrap_or_else(|_| "inventory_sync".to_string());
        let db_user = env::var("DB_USER").unwrap_or_else(|_| "postgres".to_string());
        let db_password = env::var("DB_PASSWORD").context("DB_PASSWORD must be set")?;
        let database_url =
            format!("postgres://{db_user}:{db_password}@{db_host}:{db_port}/{db_name}");

        Ok(Self {
            port,
            database_url,
            redis_url,
            marketplace_a_secret: env::var("MARKETPLACE_A_SECRET")
                .context("MARKETPLACE_A_SECRET must be set")?,
            marketplace_b_api: env::var("MARKETPLACE_B_API")
                .context("MARKETPLACE_B_API must be set")?,
            marketplace_b_api_key: env::var("MARKETPLACE_B_API_KEY")
                .context("MARKETPLACE_B_API_KEY must be set")?,
        })
    }
}

use dotenvy::dotenv;
use std::env;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub port: u16,
    pub auth_service_url: String,
    pub broadcast_service_url: String,
    pub order_service_url: String,
    pub recording_service_url: String,
    /// Seconds an idempotency admission stays reserved.
    pub idempotency_ttl_seconds: u64,
    /// Interval between offer expiry sweeps.
    pub offer_sweep_interval_seconds: u64,
    pub chat_rate_limit_max: u32,
    pub chat_rate_limit_window_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| AppError::Config("DATABASE_URL missing".into()))?;
        let redis_url = env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3000);

        let auth_service_url =
            env::var("AUTH_SERVICE_URL").unwrap_or_else(|_| "http://auth-service:3001".into());
        let broadcast_service_url = env::var("BROADCAST_DIRECTORY_URL")
            .unwrap_or_else(|_| "http://broadcast-directory:3002".into());
        let order_service_url =
            env::var("ORDER_SERVICE_URL").unwrap_or_else(|_| "http://order-service:3003".into());
        let recording_service_url = env::var("RECORDING_SERVICE_URL")
            .unwrap_or_else(|_| "http://recording-service:3004".into());

        let idempotency_ttl_seconds = env::var("IDEMPOTENCY_TTL_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(86_400);
        let offer_sweep_interval_seconds = env::var("OFFER_SWEEP_INTERVAL_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);
        let chat_rate_limit_max = env::var("CHAT_RATE_LIMIT_MAX")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);
        let chat_rate_limit_window_seconds = env::var("CHAT_RATE_LIMIT_WINDOW_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);

        Ok(Self {
            database_url,
            redis_url,
            port,
            auth_service_url,
            broadcast_service_url,
            order_service_url,
            recording_service_url,
            idempotency_ttl_seconds,
            offer_sweep_interval_seconds,
            chat_rate_limit_max,
            chat_rate_limit_window_seconds,
        })
    }
}

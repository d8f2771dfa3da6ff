//! Core types for the mp3 server

use serde::{Deserialize, Serialize};

/// Store section of the health response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreHealth {
    pub artifacts: usize,
    pub total_size: u64,
    pub budget_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    pub in_flight: usize,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub store: StoreHealth,
}

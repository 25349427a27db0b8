pub mod backtester;
pub mod commands;
pub mod config;
pub mod error;
pub mod expiry;
pub mod http_client;
pub mod market_data;
pub mod models;
pub mod performance;
pub mod pricing;
pub mod progress;
pub mod report;
pub mod retry;
pub mod signals;
pub mod strike;
pub mod upstox;

//! # papertrader
//!
//! Simulated stock-trading backend: on-demand technical-indicator analysis
//! plus autonomous "machine trader" accounts that buy and sell from a
//! watchlist on a fixed scoring rule, driven by external cron webhooks.
//!
//! See `routes` for the REST surface and `engine` for the decision core.

pub mod auth;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod limiter;
pub mod market;
pub mod models;
pub mod routes;
pub mod state;

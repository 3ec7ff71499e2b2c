//! merenda Library
//!
//! Re-exports modules for integration testing and external use.

pub mod api;
pub mod domain;
pub mod engine;
pub mod gateway;
pub mod notifier;
pub mod reconcile;
pub mod store;
pub mod validation;

// Private modules (used only by the main.rs binary)
pub mod config;
pub mod db;
mod error;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use domain::{DomainError, Money, MoneyError, Order, OrderStatus, Wallet};

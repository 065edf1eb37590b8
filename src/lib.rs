// FuelEU Compliance Ledger - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod error;       // Error taxonomy shared by every layer
pub mod entities;    // Domain model: routes, compliance snapshots, bank entries
pub mod calculator;  // Compliance balance from reported emissions
pub mod ledger;      // Banking ledger: adjusted balances + FIFO pool
pub mod comparison;  // Routes vs. the baseline of their year
pub mod db;          // SQLite store + CSV ingestion + audit trail
pub mod services;    // Use cases inside transactions
pub mod config;      // Environment configuration
pub mod logging;     // tracing subscriber setup

#[cfg(feature = "server")]
pub mod api;         // axum router

// Re-export commonly used types
pub use calculator::{ComplianceCalculator, TargetSchedule, ENERGY_PER_TONNE_MJ};
pub use comparison::{ComparisonEngine, ComparisonRow};
pub use config::{Config, LogFormat};
pub use db::{
    Event, ImportStats, NewRoute,
    open_database, setup_database, load_routes_csv, load_ship_reports_csv,
};
pub use entities::{BankEntry, BankRecord, PoolStatus, Route, ShipCompliance, ShipReport};
pub use error::{ComplianceError, Result};
pub use ledger::{ShipLedger, BALANCE_TOLERANCE, RELATIVE_TOLERANCE};
pub use services::ComplianceService;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

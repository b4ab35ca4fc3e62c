//! Address Screening
//!
//! Screens cryptocurrency addresses from a CSV file against a remote
//! risk-scoring API and writes an enriched CSV with risk ratings and
//! per-category exposure.
//!
//! # Pipeline
//!
//! ```text
//! CSV rows ─▶ BatchRunner ─▶ RateLimiter ─▶ ConcurrencyGate ─▶ RiskClient
//!                 │                                              │
//!                 ◀──────────── outcome per row (ordered) ◀──────┘
//!                 │
//!                 ▼
//!           RecordMapper ─▶ CSV writer
//! ```
//!
//! # Invariants
//!
//! - One output row per input row, in input order
//! - A failing address never aborts the batch
//! - At most `rate_limit` calls in any rolling second
//! - At most `max_concurrent` calls in flight

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

pub mod categories;
pub mod client;
pub mod config;
pub mod csv_io;
pub mod error;
pub mod gate;
pub mod mapper;
pub mod pipeline;
pub mod rate_limiter;
pub mod retry;
pub mod runner;
pub mod types;

pub use categories::CategoryCatalog;
pub use client::{HttpRiskClient, RiskClient};
pub use config::{CategorySource, Config};
pub use error::{Result, ScreenError, ScreeningError, ScreeningErrorKind};
pub use gate::ConcurrencyGate;
pub use mapper::RecordMapper;
pub use pipeline::{screen_file, screen_file_with};
pub use rate_limiter::RateLimiter;
pub use runner::{BatchRunner, RunReport};
pub use types::{
    AddressRecord, Exposure, Outcome, OutputRow, RiskRating, RiskResult, RunSummary, ScreenStatus,
};

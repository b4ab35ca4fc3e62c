use crate::error::ScreeningError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// One input row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRecord {
    /// 0-based position in the input file
    pub index: usize,
    pub address: String,
    /// Every input column in file order, the address column included
    pub columns: Vec<(String, String)>,
}

impl AddressRecord {
    pub fn new(index: usize, address: impl Into<String>) -> Self {
        let address = address.into();
        Self {
            index,
            columns: vec![("address".to_string(), address.clone())],
            address,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ScreenStatus {
    Complete,
    Error,
}

/// Risk rating assigned by the screening service
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RiskRating {
    Low,
    Medium,
    High,
    Severe,
    Unknown,
}

impl RiskRating {
    pub fn as_str(&self) -> &str {
        match self {
            RiskRating::Low => "Low",
            RiskRating::Medium => "Medium",
            RiskRating::High => "High",
            RiskRating::Severe => "Severe",
            RiskRating::Unknown => "Unknown",
        }
    }
}

impl FromStr for RiskRating {
    type Err = std::convert::Infallible;

    // Ratings the service adds later land in Unknown rather than failing the row
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "low" => RiskRating::Low,
            "medium" => RiskRating::Medium,
            "high" => RiskRating::High,
            "severe" => RiskRating::Severe,
            _ => RiskRating::Unknown,
        })
    }
}

impl fmt::Display for RiskRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exposure amounts for one category
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Exposure {
    pub direct: Option<Decimal>,
    pub indirect: Option<Decimal>,
}

/// Outcome of screening one address
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RiskResult {
    pub status: ScreenStatus,
    pub risk: Option<RiskRating>,
    pub risk_reason: Option<String>,
    pub primary_category: Option<String>,
    pub entity_name: Option<String>,
    /// Keyed by category name as returned by the service
    pub exposures: BTreeMap<String, Exposure>,
}

impl RiskResult {
    pub fn complete(risk: RiskRating) -> Self {
        Self {
            status: ScreenStatus::Complete,
            risk: Some(risk),
            risk_reason: None,
            primary_category: None,
            entity_name: None,
            exposures: BTreeMap::new(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.risk_reason = Some(reason.into());
        self
    }

    pub fn with_cluster(mut self, name: impl Into<String>, category: impl Into<String>) -> Self {
        self.entity_name = Some(name.into());
        self.primary_category = Some(category.into());
        self
    }

    pub fn with_direct(mut self, category: &str, value: Decimal) -> Self {
        self.exposures.entry(category.to_string()).or_default().direct = Some(value);
        self
    }

    pub fn with_indirect(mut self, category: &str, value: Decimal) -> Self {
        self.exposures.entry(category.to_string()).or_default().indirect = Some(value);
        self
    }
}

/// Per-address outcome handed from the runner to the mapper
pub type Outcome = std::result::Result<RiskResult, ScreeningError>;

/// One flattened output row, values aligned with the run header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRow {
    pub values: Vec<String>,
}

impl OutputRow {
    /// Value of a named column, given the run's header
    pub fn get<'a>(&'a self, header: &[String], column: &str) -> Option<&'a str> {
        header
            .iter()
            .position(|h| h == column)
            .and_then(|i| self.values.get(i))
            .map(String::as_str)
    }
}

/// Totals reported at the end of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub total: usize,
    pub complete: usize,
    pub errors: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

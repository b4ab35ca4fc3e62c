//! Record mapper: flattens a screening outcome into an output row
//!
//! Column layout of every row in a run:
//! passthrough input columns, `screenStatus`, `risk`, `riskReason`,
//! `category`, `name`, then `{category}_direct` (and `{category}_indirect`
//! when indirect exposure is enabled) for each catalog category.
//!
//! Missing values are written as empty cells, never as zero: an empty
//! exposure cell means "none reported", `0` means "zero confirmed".

use crate::categories::CategoryCatalog;
use crate::error::{Result, ScreenError};
use crate::types::{AddressRecord, Outcome, OutputRow, RiskResult};
use std::collections::HashSet;
use tracing::debug;

pub const SCREEN_STATUS: &str = "screenStatus";
pub const STATUS_COMPLETE: &str = "complete";
pub const RISK_COLUMNS: [&str; 4] = ["risk", "riskReason", "category", "name"];

#[derive(Debug, Clone)]
pub struct RecordMapper {
    catalog: CategoryCatalog,
    include_indirect: bool,
    header: Vec<String>,
    passthrough: usize,
}

impl RecordMapper {
    /// Fails when an input column would collide with a generated one
    pub fn new(input_columns: &[String], catalog: CategoryCatalog, include_indirect: bool) -> Result<Self> {
        let mut header = input_columns.to_vec();
        header.push(SCREEN_STATUS.to_string());
        header.extend(RISK_COLUMNS.iter().map(|c| c.to_string()));
        for category in catalog.names() {
            header.push(format!("{}_direct", category));
            if include_indirect {
                header.push(format!("{}_indirect", category));
            }
        }

        let mut seen = HashSet::with_capacity(header.len());
        if let Some(duplicate) = header.iter().find(|h| !seen.insert(h.as_str())) {
            return Err(ScreenError::Input(format!(
                "input column '{}' collides with an output column",
                duplicate
            )));
        }

        Ok(Self {
            catalog,
            include_indirect,
            header,
            passthrough: input_columns.len(),
        })
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn catalog(&self) -> &CategoryCatalog {
        &self.catalog
    }

    pub fn map(&self, record: &AddressRecord, outcome: &Outcome) -> OutputRow {
        let mut values = Vec::with_capacity(self.header.len());
        values.extend(record.columns.iter().map(|(_, v)| v.clone()));
        values.resize(self.passthrough, String::new());

        match outcome {
            Ok(result) => {
                values.push(STATUS_COMPLETE.to_string());
                self.push_result(&mut values, record, result);
            }
            Err(error) => {
                values.push(error.status_text());
                values.resize(self.header.len(), String::new());
            }
        }

        OutputRow { values }
    }

    /// Map a whole batch; `records` and `outcomes` are parallel
    pub fn map_all(&self, records: &[AddressRecord], outcomes: &[Outcome]) -> Vec<OutputRow> {
        records
            .iter()
            .zip(outcomes)
            .map(|(record, outcome)| self.map(record, outcome))
            .collect()
    }

    fn push_result(&self, values: &mut Vec<String>, record: &AddressRecord, result: &RiskResult) {
        values.push(result.risk.map(|r| r.to_string()).unwrap_or_default());
        values.push(result.risk_reason.clone().unwrap_or_default());
        values.push(result.primary_category.clone().unwrap_or_default());
        values.push(result.entity_name.clone().unwrap_or_default());

        for category in self.catalog.names() {
            let exposure = result.exposures.get(category);
            values.push(
                exposure
                    .and_then(|e| e.direct)
                    .map(|v| v.normalize().to_string())
                    .unwrap_or_default(),
            );
            if self.include_indirect {
                values.push(
                    exposure
                        .and_then(|e| e.indirect)
                        .map(|v| v.normalize().to_string())
                        .unwrap_or_default(),
                );
            }
        }

        for category in result.exposures.keys() {
            if !self.catalog.contains(category) {
                debug!(
                    "Row {}: category '{}' not in catalog, not written",
                    record.index, category
                );
            }
        }
    }
}

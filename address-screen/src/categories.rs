//! Exposure category catalog
//!
//! The catalog fixes the exposure columns of a run. Every output row gets
//! one column per catalog category (two with indirect exposure), whether or
//! not that address has exposure in the category.

use crate::client::HttpRiskClient;
use crate::config::CategorySource;
use crate::error::Result;
use tracing::info;

/// Category names as reported by the screening service, sorted
pub const DEFAULT_CATEGORIES: &[&str] = &[
    "atm",
    "bridge",
    "child abuse material",
    "darknet market",
    "decentralized exchange",
    "erc20 token",
    "exchange",
    "fraud shop",
    "gambling",
    "high risk exchange",
    "high risk jurisdiction",
    "hosted wallet",
    "ico",
    "illicit actor-org",
    "infrastructure as a service",
    "lending contract",
    "malware",
    "merchant services",
    "mining",
    "mining pool",
    "mixing",
    "no kyc exchange",
    "other",
    "p2p exchange",
    "protocol privacy",
    "ransomware",
    "sanctioned entity",
    "sanctioned jurisdiction",
    "scam",
    "seizures",
    "smart contract",
    "special measures",
    "stolen funds",
    "terrorist financing",
    "token smart contract",
    "unnamed service",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryCatalog {
    names: Vec<String>,
}

impl CategoryCatalog {
    /// Catalog from arbitrary names; sorted and deduplicated
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = names
            .into_iter()
            .map(Into::into)
            .filter(|n| !n.is_empty())
            .collect();
        names.sort();
        names.dedup();
        Self { names }
    }

    pub fn embedded() -> Self {
        Self::new(DEFAULT_CATEGORIES.iter().copied())
    }

    /// Resolve the catalog for a run according to the configured source
    pub async fn load(source: CategorySource, client: &HttpRiskClient) -> Result<Self> {
        let catalog = match source {
            CategorySource::Fixed => Self::embedded(),
            CategorySource::Remote => Self::new(client.fetch_categories().await?),
        };
        info!("Using {} exposure categories ({:?})", catalog.len(), source);
        Ok(catalog)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.binary_search_by(|n| n.as_str().cmp(name)).is_ok()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

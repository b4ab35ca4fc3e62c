//! Risk client: the remote screening capability
//!
//! [`RiskClient`] is the seam the batch runner depends on. [`HttpRiskClient`]
//! talks to the Chainalysis Address Screening API over HTTPS, with its own
//! per-attempt timeout and bounded retries. Every attempt, retries included,
//! takes a grant from the rate limiter first.

use crate::config::Config;
use crate::error::{Result, ScreenError, ScreeningError};
use crate::rate_limiter::RateLimiter;
use crate::retry::{AttemptError, RetryConfig, RetryStrategy};
use crate::types::{RiskRating, RiskResult, ScreenStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, RETRY_AFTER};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const ENTITIES_PATH: &str = "/api/risk/v2/entities";
const CATEGORIES_PATH: &str = "/api/kyt/v2/categories";

/// Submit an address, get a risk result or an error
#[async_trait]
pub trait RiskClient: Send + Sync {
    async fn screen(&self, address: &str, include_indirect: bool) -> std::result::Result<RiskResult, ScreeningError>;

    /// True when the client takes a rate-limiter grant before every attempt
    /// itself, so the runner must not take another one per address
    fn limits_each_attempt(&self) -> bool {
        false
    }
}

/// `Retry-After` as delay-seconds or an HTTP-date; past dates mean no wait
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

/// Reject addresses that cannot be sent as a single path segment
pub fn validate_address(address: &str) -> std::result::Result<(), ScreeningError> {
    if address.trim().is_empty() {
        return Err(ScreeningError::invalid_address("empty address"));
    }
    if let Some(c) = address
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || matches!(c, '/' | '?' | '#' | '%' | '\\'))
    {
        return Err(ScreeningError::invalid_address(format!(
            "unexpected character {:?}",
            c
        )));
    }
    if address.len() > 128 {
        return Err(ScreeningError::invalid_address(format!(
            "{} characters is longer than any supported address",
            address.len()
        )));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntityResponse {
    risk: Option<String>,
    risk_reason: Option<String>,
    status: Option<String>,
    cluster: Option<ClusterResponse>,
    #[serde(default)]
    exposures: Option<Vec<ExposureResponse>>,
}

#[derive(Debug, Deserialize)]
struct ClusterResponse {
    name: Option<String>,
    category: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExposureResponse {
    category: String,
    value: Option<Decimal>,
    exposure_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CategoriesResponse {
    categories: Vec<CategoryEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CategoryEntry {
    category_name: Option<String>,
}

impl EntityResponse {
    fn into_risk_result(self, include_indirect: bool) -> std::result::Result<RiskResult, ScreeningError> {
        // A missing status means the service had nothing pending
        if let Some(status) = self.status.as_deref() {
            if !status.eq_ignore_ascii_case("complete") {
                return Err(ScreeningError::incomplete(status));
            }
        }

        let (entity_name, primary_category) = match self.cluster {
            Some(cluster) => (cluster.name, cluster.category),
            None => (None, None),
        };

        let mut exposures: BTreeMap<String, crate::types::Exposure> = BTreeMap::new();
        for exposure in self.exposures.unwrap_or_default() {
            let Some(value) = exposure.value else {
                continue;
            };
            let kind = exposure.exposure_type.as_deref().unwrap_or("direct");
            // Repeated categories overwrite the earlier value
            if kind.eq_ignore_ascii_case("indirect") {
                if include_indirect {
                    exposures.entry(exposure.category).or_default().indirect = Some(value);
                }
            } else if kind.eq_ignore_ascii_case("direct") {
                exposures.entry(exposure.category).or_default().direct = Some(value);
            } else {
                debug!("Ignoring exposure of unknown type {} for {}", kind, exposure.category);
            }
        }

        Ok(RiskResult {
            status: ScreenStatus::Complete,
            risk: self
                .risk
                .filter(|r| !r.trim().is_empty())
                .map(|r| r.parse().unwrap_or(RiskRating::Unknown)),
            risk_reason: self.risk_reason.filter(|r| !r.is_empty()),
            primary_category: primary_category.filter(|c| !c.is_empty()),
            entity_name: entity_name.filter(|n| !n.is_empty()),
            exposures,
        })
    }
}

/// Chainalysis API client
#[derive(Debug, Clone)]
pub struct HttpRiskClient {
    http: Client,
    base_url: String,
    request_timeout_secs: u64,
    retry: RetryStrategy,
    /// Shared by every clone, so the catalog fetch and all screening
    /// attempts draw from one budget
    limiter: Arc<RateLimiter>,
}

impl HttpRiskClient {
    pub fn new(config: &Config) -> Result<Self> {
        let retry = RetryStrategy::new(RetryConfig {
            max_retries: config.max_retries,
            ..RetryConfig::default()
        });
        Self::with_retry(config, retry)
    }

    pub fn with_retry(config: &Config, retry: RetryStrategy) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut token = HeaderValue::from_str(&config.api_key)
            .map_err(|_| ScreenError::Config("API key contains invalid header characters".to_string()))?;
        token.set_sensitive(true);
        headers.insert("Token", token);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .timeout(config.request_timeout())
            .default_headers(headers)
            .user_agent(concat!("address-screen/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ScreenError::Config(format!("Failed to create HTTP client: {}", e)))?;
        let rate = NonZeroU32::new(config.rate_limit)
            .ok_or_else(|| ScreenError::Config("rate limit must be at least 1".to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            request_timeout_secs: config.request_timeout_secs,
            retry,
            limiter: Arc::new(RateLimiter::per_second(rate)),
        })
    }

    /// Fetch the exposure category names offered by the service, sorted
    pub async fn fetch_categories(&self) -> Result<Vec<String>> {
        let url = format!("{}{}", self.base_url, CATEGORIES_PATH);
        let response: CategoriesResponse = self
            .retry
            .execute_with_retry(|| self.get_json(&url), "fetch_categories")
            .await
            .map_err(|e| ScreenError::Catalog(e.to_string()))?;

        let mut categories: Vec<String> = response
            .categories
            .into_iter()
            .filter_map(|c| c.category_name)
            .filter(|name| !name.is_empty())
            .collect();
        categories.sort();
        categories.dedup();

        if categories.is_empty() {
            return Err(ScreenError::Catalog("no categories returned".to_string()));
        }
        info!("Fetched {} categories from API", categories.len());
        Ok(categories)
    }

    /// One GET attempt; status and body decoding mapped to screening errors
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> std::result::Result<T, AttemptError> {
        self.limiter.acquire().await;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| parse_retry_after(v, Utc::now()));
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptError {
                error: ScreeningError::api(status.as_u16(), body),
                retry_after,
            });
        }

        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        serde_json::from_str(&body).map_err(|e| {
            AttemptError::from(ScreeningError::malformed(e.to_string()).with_detail(body))
        })
    }

    fn transport_error(&self, err: reqwest::Error) -> AttemptError {
        let error = if err.is_timeout() {
            ScreeningError::timeout(self.request_timeout_secs)
        } else {
            ScreeningError::transport(err.to_string())
        };
        AttemptError::from(error)
    }
}

#[async_trait]
impl RiskClient for HttpRiskClient {
    async fn screen(&self, address: &str, include_indirect: bool) -> std::result::Result<RiskResult, ScreeningError> {
        validate_address(address)?;

        let url = format!("{}{}/{}", self.base_url, ENTITIES_PATH, address);
        let response: EntityResponse = self
            .retry
            .execute_with_retry(|| self.get_json(&url), "screen_address")
            .await?;

        response.into_risk_result(include_indirect)
    }

    fn limits_each_attempt(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value, include_indirect: bool) -> std::result::Result<RiskResult, ScreeningError> {
        serde_json::from_value::<EntityResponse>(value)
            .unwrap()
            .into_risk_result(include_indirect)
    }

    #[test]
    fn test_full_response_mapped() {
        let result = parse(
            json!({
                "address": "1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2",
                "risk": "Severe",
                "riskReason": "Identified as Sanctioned Entity",
                "status": "COMPLETE",
                "cluster": { "name": "Example Mixer", "category": "mixing" },
                "exposures": [
                    { "category": "mixing", "value": 1250.5, "exposureType": "direct" },
                    { "category": "mixing", "value": 20, "exposureType": "indirect" },
                    { "category": "exchange", "value": 3.25, "exposureType": "indirect" }
                ]
            }),
            true,
        )
        .unwrap();

        assert_eq!(result.status, ScreenStatus::Complete);
        assert_eq!(result.risk, Some(RiskRating::Severe));
        assert_eq!(result.risk_reason.as_deref(), Some("Identified as Sanctioned Entity"));
        assert_eq!(result.entity_name.as_deref(), Some("Example Mixer"));
        assert_eq!(result.primary_category.as_deref(), Some("mixing"));
        assert_eq!(result.exposures["mixing"].direct, Some(Decimal::new(12505, 1)));
        assert_eq!(result.exposures["mixing"].indirect, Some(Decimal::new(20, 0)));
        assert_eq!(result.exposures["exchange"].direct, None);
    }

    #[test]
    fn test_indirect_dropped_when_disabled() {
        let result = parse(
            json!({
                "risk": "Low",
                "status": "COMPLETE",
                "exposures": [
                    { "category": "exchange", "value": 10, "exposureType": "direct" },
                    { "category": "gambling", "value": 5, "exposureType": "indirect" }
                ]
            }),
            false,
        )
        .unwrap();

        assert_eq!(result.exposures.len(), 1);
        assert!(result.exposures.values().all(|e| e.indirect.is_none()));
    }

    #[test]
    fn test_duplicate_category_overwrites() {
        let result = parse(
            json!({
                "risk": "High",
                "exposures": [
                    { "category": "scam", "value": 1, "exposureType": "direct" },
                    { "category": "scam", "value": 2, "exposureType": "direct" }
                ]
            }),
            true,
        )
        .unwrap();
        assert_eq!(result.exposures["scam"].direct, Some(Decimal::new(2, 0)));
    }

    #[test]
    fn test_sparse_response() {
        let result = parse(json!({ "risk": "Low", "cluster": null, "exposures": null }), true).unwrap();
        assert_eq!(result.risk, Some(RiskRating::Low));
        assert!(result.entity_name.is_none());
        assert!(result.primary_category.is_none());
        assert!(result.exposures.is_empty());
    }

    #[test]
    fn test_pending_screening_is_incomplete() {
        let err = parse(json!({ "risk": null, "status": "IN_PROGRESS" }), true).unwrap_err();
        assert_eq!(err.kind, crate::error::ScreeningErrorKind::Incomplete);
    }

    #[test]
    fn test_address_validation() {
        assert!(validate_address("1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2").is_ok());
        assert!(validate_address("0x742d35Cc6634C0532925a3b844Bc454e4438f44e").is_ok());

        assert!(validate_address("").is_err());
        assert!(validate_address("   ").is_err());
        assert!(validate_address("invalid address").is_err());
        assert!(validate_address("../../admin").is_err());
        assert!(validate_address("abc?x=1").is_err());
        assert!(validate_address(&"a".repeat(200)).is_err());
    }

    #[test]
    fn test_retry_after_seconds_and_http_date() {
        let now = DateTime::parse_from_rfc3339("2015-10-21T07:28:00Z")
            .unwrap()
            .with_timezone(&Utc);

        assert_eq!(parse_retry_after("120", now), Some(Duration::from_secs(120)));
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:29:30 GMT", now),
            Some(Duration::from_secs(90))
        );
        // Already passed
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:00:00 GMT", now),
            Some(Duration::ZERO)
        );
        assert_eq!(parse_retry_after("soon", now), None);
    }
}

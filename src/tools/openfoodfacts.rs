//! OpenFoodFacts product lookup.
//!
//! Wraps the public barcode API with an in-memory TTL cache and a
//! fixed-window rate limiter. Lookup failures of any kind (timeout, HTTP
//! error, unknown barcode) come back as `found: false` — a missing product
//! is a normal answer, not an error.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::config::OpenFoodFactsConfig;
use crate::tools::extract;

#[derive(Debug, Error)]
#[error("Rate limit exceeded for OpenFoodFacts. Max {0} requests per minute.")]
pub struct RateLimitExceeded(pub u32);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductRecord {
    pub found: bool,
    pub barcode: String,
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub brands: String,
    #[serde(default)]
    pub ingredients_text: String,
    #[serde(default)]
    pub allergens: String,
    #[serde(default)]
    pub traces: String,
    #[serde(default)]
    pub nutriments: serde_json::Map<String, serde_json::Value>,
}

impl ProductRecord {
    fn not_found(barcode: &str) -> Self {
        Self {
            found: false,
            barcode: barcode.to_string(),
            ..Default::default()
        }
    }

    pub fn extract_ingredients(&self) -> Vec<String> {
        if !self.found || self.ingredients_text.is_empty() {
            return Vec::new();
        }
        extract::extract_ingredients(&self.ingredients_text)
    }
}

struct CacheEntry {
    record: ProductRecord,
    expires: Instant,
}

struct RateWindow {
    count: u32,
    window_start: Instant,
}

pub struct OpenFoodFactsClient {
    client: reqwest::Client,
    base_url: String,
    rate_limit_per_minute: u32,
    cache_ttl: Duration,
    cache: Mutex<HashMap<String, CacheEntry>>,
    window: Mutex<RateWindow>,
}

impl OpenFoodFactsClient {
    pub fn new(config: &OpenFoodFactsConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: config.base_url.clone(),
            rate_limit_per_minute: config.rate_limit_per_minute,
            cache_ttl: Duration::from_secs(config.cache_ttl_seconds),
            cache: Mutex::new(HashMap::new()),
            window: Mutex::new(RateWindow {
                count: 0,
                window_start: Instant::now(),
            }),
        }
    }

    pub async fn fetch_by_barcode(&self, barcode: &str) -> Result<ProductRecord, RateLimitExceeded> {
        if let Some(cached) = self.cache_get(barcode) {
            info!("Cache hit for product {}", barcode);
            return Ok(cached);
        }

        self.check_rate_limit()?;

        let url = format!("{}/api/v0/product/{}.json", self.base_url, barcode);
        let record = match self.fetch(&url, barcode).await {
            Ok(record) => record,
            Err(e) => {
                warn!("OpenFoodFacts fetch failed for {}: {}", barcode, e);
                ProductRecord::not_found(barcode)
            }
        };

        if record.found {
            self.cache_put(barcode, &record);
        }
        Ok(record)
    }

    async fn fetch(&self, url: &str, barcode: &str) -> Result<ProductRecord, reqwest::Error> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            warn!(
                "OpenFoodFacts returned {} for {}",
                response.status(),
                barcode
            );
            return Ok(ProductRecord::not_found(barcode));
        }

        let data: serde_json::Value = response.json().await?;
        if data["status"].as_i64() == Some(0) {
            info!("Product not found for barcode {}", barcode);
            return Ok(ProductRecord::not_found(barcode));
        }

        let product = &data["product"];
        let nutriments = product["nutriments"]
            .as_object()
            .cloned()
            .unwrap_or_default();

        Ok(ProductRecord {
            found: true,
            barcode: barcode.to_string(),
            product_name: product["product_name"].as_str().unwrap_or("").to_string(),
            brands: product["brands"].as_str().unwrap_or("").to_string(),
            ingredients_text: product["ingredients_text"].as_str().unwrap_or("").to_string(),
            allergens: product["allergens"].as_str().unwrap_or("").to_string(),
            traces: product["traces"].as_str().unwrap_or("").to_string(),
            nutriments,
        })
    }

    fn cache_get(&self, barcode: &str) -> Option<ProductRecord> {
        let mut cache = self.cache.lock().unwrap();
        match cache.get(barcode) {
            Some(entry) if entry.expires > Instant::now() => Some(entry.record.clone()),
            Some(_) => {
                cache.remove(barcode);
                None
            }
            None => None,
        }
    }

    fn cache_put(&self, barcode: &str, record: &ProductRecord) {
        let mut cache = self.cache.lock().unwrap();
        cache.insert(
            barcode.to_string(),
            CacheEntry {
                record: record.clone(),
                expires: Instant::now() + self.cache_ttl,
            },
        );
    }

    fn check_rate_limit(&self) -> Result<(), RateLimitExceeded> {
        let mut window = self.window.lock().unwrap();
        if window.window_start.elapsed() >= Duration::from_secs(60) {
            window.count = 0;
            window.window_start = Instant::now();
        }
        if window.count >= self.rate_limit_per_minute {
            return Err(RateLimitExceeded(self.rate_limit_per_minute));
        }
        window.count += 1;
        Ok(())
    }
}

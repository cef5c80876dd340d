//! Client for the marketplace-data proxy
//!
//! The proxy fronts the paid product APIs and answers with a uniform
//! `{success, data, error?}` envelope. Every failure, transport or reported,
//! surfaces as [`ResolutionError::RemoteApiFailure`] for the marketplace asked.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::{CandidateRecord, Marketplace, ProductRecord};
use crate::error::{ResolutionError, ResolutionResult};
use crate::infrastructure::config::{HttpConfig, RemoteApiConfig};
use crate::infrastructure::simple_http_client::HttpClient;

/// Body of `POST {base}/search/{marketplace}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asin: Option<String>,
}

impl SearchRequest {
    pub fn for_product(product: &ProductRecord) -> Self {
        Self {
            query: Some(product.search_query()).filter(|q| !q.is_empty()),
            upc: product.upc.clone(),
            asin: product.asin.clone(),
        }
    }
}

/// Body of `POST {base}/search/multi`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MultiSearchRequest {
    pub source_marketplace: Marketplace,
    pub product_id: String,
    pub product_title: String,
    pub product_brand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_marketplace: Option<Marketplace>,
}

impl MultiSearchRequest {
    pub fn for_product(product: &ProductRecord, selected_marketplace: Option<Marketplace>) -> Self {
        Self {
            source_marketplace: product.marketplace,
            product_id: product.product_id.clone(),
            product_title: product.title.clone(),
            product_brand: product.brand.clone(),
            selected_marketplace,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    success: bool,
    #[serde(default = "Option::default")]
    data: Option<T>,
    #[serde(default)]
    error: Option<String>,
}

impl<T> ApiEnvelope<T> {
    fn into_result(self, marketplace: Marketplace) -> ResolutionResult<T> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (true, None) => Err(ResolutionError::RemoteApiFailure {
                marketplace,
                message: "response carried no data".to_string(),
            }),
            (false, _) => Err(ResolutionError::RemoteApiFailure {
                marketplace,
                message: self.error.unwrap_or_else(|| "unknown error".to_string()),
            }),
        }
    }
}

/// Lookup of candidates on other marketplaces through a product-data service
#[async_trait]
pub trait ProductSearchApi: Send + Sync {
    async fn search_marketplace(&self, marketplace: Marketplace, request: &SearchRequest) -> ResolutionResult<Vec<CandidateRecord>>;

    async fn search_multi(&self, request: &MultiSearchRequest) -> ResolutionResult<BTreeMap<Marketplace, Vec<CandidateRecord>>>;
}

pub struct RemoteApiClient {
    http: HttpClient,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl RemoteApiClient {
    pub fn new(config: &RemoteApiConfig, http: &HttpConfig) -> ResolutionResult<Self> {
        Ok(Self {
            http: HttpClient::from_http_config(http)?.with_context_label("remote-api"),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout: Duration::from_secs(config.timeout_seconds),
        })
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn post<B, T>(&self, path: &str, body: &B, marketplace: Marketplace) -> ResolutionResult<T>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(path);
        debug!("POST {}", url);
        let envelope: ApiEnvelope<T> = self
            .http
            .post_json(&url, body, self.api_key.as_deref(), self.timeout)
            .await
            .map_err(|e| {
                warn!("Remote API call to {} failed: {}", url, e);
                ResolutionError::RemoteApiFailure {
                    marketplace,
                    message: e.to_string(),
                }
            })?;
        envelope.into_result(marketplace)
    }
}

#[async_trait]
impl ProductSearchApi for RemoteApiClient {
    async fn search_marketplace(&self, marketplace: Marketplace, request: &SearchRequest) -> ResolutionResult<Vec<CandidateRecord>> {
        let mut candidates: Vec<CandidateRecord> = self
            .post(&format!("search/{}", marketplace.as_str()), request, marketplace)
            .await?;
        normalize(&mut candidates);
        Ok(candidates)
    }

    async fn search_multi(&self, request: &MultiSearchRequest) -> ResolutionResult<BTreeMap<Marketplace, Vec<CandidateRecord>>> {
        let marketplace = request.selected_marketplace.unwrap_or(request.source_marketplace);
        let mut found: BTreeMap<Marketplace, Vec<CandidateRecord>> = self.post("search/multi", request, marketplace).await?;
        found.values_mut().for_each(|candidates| normalize(candidates));
        Ok(found)
    }
}

/// API order is the ranking position; ids come from the per-marketplace fields
fn normalize(candidates: &mut [CandidateRecord]) {
    for (position, candidate) in candidates.iter_mut().enumerate() {
        candidate.position = position;
        candidate.resolve_product_id();
    }
}

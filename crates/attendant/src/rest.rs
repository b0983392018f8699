//! PostgREST client for the backend's `rest/v1` API.
//!
//! Every request carries the project's `apikey` header and a bearer token.
//! Menu products and delivery zones change rarely and are cached with `moka`
//! (5-minute TTL); orders are always fetched fresh. Status writes are
//! conditional on the status the caller last saw.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use forno_core::{DeliveryZone, Order, OrderId, OrderStatus, Product};
use moka::future::Cache;
use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

use crate::backend::Backend;
use crate::config::SupabaseConfig;

const REST_PATH: &str = "rest/v1/";
const ORDER_SELECT: &str = "*,order_items(*)";
const BODY_EXCERPT: usize = 200;

/// Errors from the REST API.
#[derive(Debug, Error)]
pub enum RestError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Rate limited by the backend.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The project URL cannot be turned into an API URL.
    #[error("invalid backend URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl RestError {
    /// Whether retrying the same request may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) | Self::RateLimited(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Parse(_) | Self::NotFound(_) | Self::InvalidUrl(_) => false,
        }
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
enum CacheKey {
    Menu,
    Zones,
}

#[derive(Debug, Clone)]
enum CacheValue {
    Menu(Vec<Product>),
    Zones(Vec<DeliveryZone>),
}

/// Client for the backend REST API.
///
/// Cheap to clone; clones share the HTTP connection pool and the cache.
#[derive(Clone)]
pub struct RestClient {
    inner: Arc<RestClientInner>,
}

struct RestClientInner {
    client: reqwest::Client,
    base: Url,
    api_key: SecretString,
    bearer: SecretString,
    cache: Cache<CacheKey, CacheValue>,
}

impl RestClient {
    /// Create a client for the configured project.
    ///
    /// # Errors
    ///
    /// Returns [`RestError::InvalidUrl`] if the project URL cannot be a base
    /// for API paths.
    pub fn new(config: &SupabaseConfig) -> Result<Self, RestError> {
        let cache = Cache::builder()
            .max_capacity(16)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();

        Ok(Self {
            inner: Arc::new(RestClientInner {
                client: reqwest::Client::new(),
                base: rest_base(&config.url)?,
                api_key: config.anon_key.clone(),
                bearer: config.bearer().clone(),
                cache,
            }),
        })
    }

    fn url(&self, table: &str, query: &[(&str, &str)]) -> Result<Url, RestError> {
        let mut url = self.inner.base.join(table)?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.inner
            .client
            .request(method, url)
            .header("apikey", self.inner.api_key.expose_secret())
            .bearer_auth(self.inner.bearer.expose_secret())
            .header("Accept", "application/json")
    }

    /// `orders?id=eq.{id}&status=eq.{from}`: the PATCH only lands while the
    /// order is still in `from`.
    fn status_update_url(&self, id: OrderId, from: OrderStatus) -> Result<Url, RestError> {
        let id = format!("eq.{id}");
        let status = format!("eq.{from}");
        self.url(
            "orders",
            &[
                ("id", id.as_str()),
                ("status", status.as_str()),
                ("select", ORDER_SELECT),
            ],
        )
    }

    /// Send a request and decode the JSON body.
    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, RestError> {
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(RestError::RateLimited(retry_after));
        }

        // Read the body as text first for better error diagnostics
        let body = response.text().await?;

        if !status.is_success() {
            tracing::error!(
                status = %status,
                body = %excerpt(&body, 500),
                "backend returned non-success status"
            );
            return Err(RestError::Status {
                status: status.as_u16(),
                body: excerpt(&body, BODY_EXCERPT),
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %excerpt(&body, 500),
                "failed to parse backend response"
            );
            RestError::Parse(e)
        })
    }
}

#[async_trait]
impl Backend for RestClient {
    #[instrument(skip(self))]
    async fn active_orders(&self) -> Result<Vec<Order>, RestError> {
        let url = self.url(
            "orders",
            &[
                ("select", ORDER_SELECT),
                ("status", "not.in.(delivered,cancelled)"),
                ("order", "created_at.desc"),
            ],
        )?;
        let orders: Vec<Order> = self.execute(self.request(Method::GET, url)).await?;
        debug!(count = orders.len(), "active orders loaded");
        Ok(orders)
    }

    #[instrument(skip_all, fields(order_id = %id))]
    async fn order(&self, id: OrderId) -> Result<Order, RestError> {
        let filter = format!("eq.{id}");
        let url = self.url(
            "orders",
            &[("select", ORDER_SELECT), ("id", filter.as_str()), ("limit", "1")],
        )?;
        let rows: Vec<Order> = self.execute(self.request(Method::GET, url)).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| RestError::NotFound(format!("order {id}")))
    }

    #[instrument(skip_all, fields(order_id = %id, from = %from, to = %to))]
    async fn update_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<Option<Order>, RestError> {
        let url = self.status_update_url(id, from)?;
        let body = serde_json::json!({
            "status": to,
            "updated_at": Utc::now(),
        });
        let request = self
            .request(Method::PATCH, url)
            .header("Prefer", "return=representation")
            .json(&body);
        let rows: Vec<Order> = self.execute(request).await?;
        if rows.is_empty() {
            debug!("status write matched no row");
        }
        Ok(rows.into_iter().next())
    }

    #[instrument(skip(self))]
    async fn menu(&self) -> Result<Vec<Product>, RestError> {
        if let Some(CacheValue::Menu(products)) = self.inner.cache.get(&CacheKey::Menu).await {
            debug!("Cache hit for menu");
            return Ok(products);
        }

        let url = self.url("products", &[("select", "*"), ("order", "name.asc")])?;
        let products: Vec<Product> = self.execute(self.request(Method::GET, url)).await?;

        self.inner
            .cache
            .insert(CacheKey::Menu, CacheValue::Menu(products.clone()))
            .await;
        Ok(products)
    }

    #[instrument(skip(self))]
    async fn delivery_zones(&self) -> Result<Vec<DeliveryZone>, RestError> {
        if let Some(CacheValue::Zones(zones)) = self.inner.cache.get(&CacheKey::Zones).await {
            debug!("Cache hit for delivery zones");
            return Ok(zones);
        }

        let url = self.url(
            "delivery_zones",
            &[("select", "*"), ("active", "eq.true"), ("order", "name.asc")],
        )?;
        let zones: Vec<DeliveryZone> = self.execute(self.request(Method::GET, url)).await?;

        self.inner
            .cache
            .insert(CacheKey::Zones, CacheValue::Zones(zones.clone()))
            .await;
        Ok(zones)
    }
}

/// `{project}/rest/v1/`, keeping any path prefix on the project URL.
fn rest_base(project: &Url) -> Result<Url, url::ParseError> {
    let mut base = project.clone();
    let prefix = base.path().trim_end_matches('/').to_string();
    base.set_path(&format!("{prefix}/"));
    base.set_query(None);
    base.set_fragment(None);
    base.join(REST_PATH)
}

fn excerpt(body: &str, limit: usize) -> String {
    body.chars().take(limit).collect()
}

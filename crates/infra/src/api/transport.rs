//! HTTP transport for the remote catalog API
//!
//! Implements the engine's `RemoteTransport` port over reqwest. The
//! transport is deliberately thin: it builds authenticated requests, maps
//! HTTP statuses into the error taxonomy (parsing `Retry-After` on 429),
//! and translates wire payloads to and from domain types. Retry, backoff,
//! and budget decisions stay in the engine.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use skubridge_core::ports::RemoteTransport;
use skubridge_domain::{
    Batch, BatchOutcome, ChangeKind, ItemOutcome, ProductId, RateLimitSignal, RemotePage,
    RemoteProduct, Result as DomainResult,
};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::auth::AccessTokenProvider;
use super::errors::ApiError;

/// Configuration for the catalog transport
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Base URL of the remote catalog API (e.g., "https://shop.example.com/api/v1")
    pub base_url: String,
    /// Timeout per request
    pub timeout: Duration,
    /// Records requested per page
    pub page_size: usize,
}

impl HttpTransportConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(30),
            page_size: 100,
        }
    }
}

/// `RemoteTransport` implementation over HTTP
pub struct HttpCatalogTransport {
    http: reqwest::Client,
    auth: Arc<dyn AccessTokenProvider>,
    config: HttpTransportConfig,
}

impl HttpCatalogTransport {
    /// Create a transport
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Config` if the HTTP client cannot be built.
    pub fn new(
        config: HttpTransportConfig,
        auth: Arc<dyn AccessTokenProvider>,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ApiError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { http, auth, config })
    }

    async fn authed(&self, method: Method, url: &str) -> Result<RequestBuilder, ApiError> {
        let token = self.auth.access_token().await?;
        Ok(self
            .http
            .request(method, url)
            .bearer_auth(token)
            .header("Content-Type", "application/json"))
    }

    /// Send a request, mapping transport failures and non-success statuses
    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::Timeout(self.config.timeout)
            } else {
                ApiError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = parse_retry_after(response.headers());
        let body = response.text().await.unwrap_or_default();
        Err(map_status_error(status, retry_after, &body))
    }
}

fn map_status_error(status: StatusCode, retry_after: Option<Duration>, body: &str) -> ApiError {
    let message = if body.is_empty() {
        format!("remote returned status {status}")
    } else {
        format!("remote returned status {status}: {body}")
    };

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        ApiError::Auth(message)
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ApiError::RateLimit { message, retry_after }
    } else if status.is_server_error() {
        ApiError::Server(message)
    } else if status.is_client_error() {
        ApiError::Client(message)
    } else {
        ApiError::Network(message)
    }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

// Wire payloads. The remote dictates this shape; domain types never cross
// the HTTP boundary directly.

#[derive(Debug, Deserialize)]
struct PageDto {
    products: Vec<ProductDto>,
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProductDto {
    id: String,
    sku: String,
    #[serde(default)]
    fields: BTreeMap<String, String>,
}

impl From<ProductDto> for RemoteProduct {
    fn from(dto: ProductDto) -> Self {
        RemoteProduct {
            remote_id: dto.id,
            product_id: ProductId::new(dto.sku),
            fields: dto.fields,
        }
    }
}

#[derive(Debug, Serialize)]
struct BatchRequestDto<'a> {
    operations: Vec<OperationDto<'a>>,
}

#[derive(Debug, Serialize)]
struct OperationDto<'a> {
    change_id: Uuid,
    sku: &'a str,
    kind: ChangeKind,
    /// Proposed field values; `null` clears the field remotely
    fields: BTreeMap<&'a str, Option<&'a str>>,
}

#[derive(Debug, Deserialize)]
struct BatchResponseDto {
    results: Vec<ItemResultDto>,
    #[serde(default)]
    retry_after_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ItemResultDto {
    change_id: Uuid,
    status: ItemStatusDto,
    #[serde(default)]
    remote_id: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    retryable: bool,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
enum ItemStatusDto {
    Ok,
    Error,
}

impl From<ItemResultDto> for ItemOutcome {
    fn from(dto: ItemResultDto) -> Self {
        match dto.status {
            ItemStatusDto::Ok => ItemOutcome::Pushed { remote_id: dto.remote_id },
            ItemStatusDto::Error => ItemOutcome::Failed {
                message: dto.message.unwrap_or_else(|| "remote rejected item".to_string()),
                retryable: dto.retryable,
            },
        }
    }
}

#[async_trait]
impl RemoteTransport for HttpCatalogTransport {
    #[instrument(skip(self), fields(cursor = cursor.as_deref().unwrap_or("start")))]
    async fn fetch_page(&self, cursor: Option<String>) -> DomainResult<RemotePage> {
        let url = format!("{}/products", self.config.base_url);
        let mut request = self
            .authed(Method::GET, &url)
            .await?
            .query(&[("limit", self.config.page_size.to_string())]);
        if let Some(cursor) = &cursor {
            request = request.query(&[("cursor", cursor)]);
        }

        let response = self.send(request).await?;
        let page: PageDto = response
            .json()
            .await
            .map_err(|e| ApiError::Client(format!("Failed to parse page response: {e}")))?;

        debug!(records = page.products.len(), more = page.next_cursor.is_some(), "Fetched page");
        Ok(RemotePage {
            records: page.products.into_iter().map(RemoteProduct::from).collect(),
            next_cursor: page.next_cursor,
        })
    }

    #[instrument(skip(self, batch), fields(items = batch.len()))]
    async fn push_batch(&self, batch: &Batch) -> DomainResult<BatchOutcome> {
        let operations = batch
            .changes
            .iter()
            .map(|change| OperationDto {
                change_id: change.id,
                sku: change.product_id.as_str(),
                kind: change.kind,
                fields: change
                    .diff
                    .iter()
                    .map(|delta| (delta.field.as_str(), delta.new.as_deref()))
                    .collect(),
            })
            .collect();

        let url = format!("{}/products/batch", self.config.base_url);
        let request = self
            .authed(Method::POST, &url)
            .await?
            .json(&BatchRequestDto { operations });

        let response = self.send(request).await?;
        let result: BatchResponseDto = response
            .json()
            .await
            .map_err(|e| ApiError::Client(format!("Failed to parse batch response: {e}")))?;

        debug!(results = result.results.len(), "Batch push response received");
        Ok(BatchOutcome {
            items: result
                .results
                .into_iter()
                .map(|dto| (dto.change_id, ItemOutcome::from(dto)))
                .collect(),
            rate_limited: result.retry_after_secs.map(|secs| RateLimitSignal {
                retry_after: Some(Duration::from_secs(secs)),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use skubridge_domain::{ErrorClass, FieldDelta, StagedChange, SyncError};
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::super::auth::StaticTokenProvider;
    use super::*;

    fn transport(server: &MockServer) -> HttpCatalogTransport {
        HttpCatalogTransport::new(
            HttpTransportConfig::new(server.uri()),
            Arc::new(StaticTokenProvider::new("test-token")),
        )
        .unwrap()
    }

    fn batch_of(changes: Vec<StagedChange>) -> Batch {
        Batch { estimated_cost: changes.len() as u32, changes }
    }

    fn update_change(sku: &str) -> StagedChange {
        StagedChange::new(
            ProductId::new(sku),
            ChangeKind::Update,
            vec![FieldDelta::new("price", Some("10.00".into()), Some("12.50".into()))],
            Uuid::new_v4(),
        )
    }

    #[tokio::test]
    async fn test_fetch_page_maps_records_and_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/products"))
            .and(header("Authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "products": [
                    {"id": "gid://1", "sku": "SKU-1", "fields": {"price": "12.50"}},
                    {"id": "gid://2", "sku": "SKU-2", "fields": {"price": "8.00"}}
                ],
                "next_cursor": "page-2"
            })))
            .mount(&server)
            .await;

        let page = transport(&server).fetch_page(None).await.unwrap();

        assert_eq!(page.records.len(), 2);
        assert_eq!(page.records[0].remote_id, "gid://1");
        assert_eq!(page.records[0].product_id, ProductId::new("SKU-1"));
        assert_eq!(page.records[0].fields.get("price").map(String::as_str), Some("12.50"));
        assert_eq!(page.next_cursor.as_deref(), Some("page-2"));
    }

    #[tokio::test]
    async fn test_fetch_page_sends_cursor_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/products"))
            .and(query_param("cursor", "page-7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "products": [],
                "next_cursor": null
            })))
            .mount(&server)
            .await;

        let page = transport(&server).fetch_page(Some("page-7".to_string())).await.unwrap();
        assert!(page.records.is_empty());
        assert!(page.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_fatal_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/products"))
            .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
            .mount(&server)
            .await;

        let err = transport(&server).fetch_page(None).await.unwrap_err();
        assert!(matches!(err, SyncError::Auth(_)));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_429_carries_retry_after_hint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/products"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("Retry-After", "5")
                    .set_body_string("throttled"),
            )
            .mount(&server)
            .await;

        let err = transport(&server).fetch_page(None).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::RateLimit);
        assert_eq!(err.retry_after_secs(), Some(5));
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/products"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = transport(&server).fetch_page(None).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Transient);
    }

    #[tokio::test]
    async fn test_malformed_page_body_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/products"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = transport(&server).fetch_page(None).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Permanent);
    }

    #[tokio::test]
    async fn test_push_batch_maps_per_item_outcomes() {
        let server = MockServer::start().await;
        let ok = update_change("SKU-1");
        let bad = update_change("SKU-2");

        Mock::given(method("POST"))
            .and(path("/products/batch"))
            .and(header("Authorization", "Bearer test-token"))
            .and(body_partial_json(json!({
                "operations": [
                    {"sku": "SKU-1", "kind": "update", "fields": {"price": "12.50"}},
                    {"sku": "SKU-2", "kind": "update", "fields": {"price": "12.50"}}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {"change_id": ok.id, "status": "ok", "remote_id": "gid://1"},
                    {"change_id": bad.id, "status": "error", "message": "price out of range", "retryable": false}
                ]
            })))
            .mount(&server)
            .await;

        let outcome =
            transport(&server).push_batch(&batch_of(vec![ok.clone(), bad.clone()])).await.unwrap();

        assert_eq!(outcome.succeeded(), 1);
        assert_eq!(outcome.failed(), 1);
        assert!(outcome.rate_limited.is_none());
        assert_eq!(
            outcome.items[0],
            (ok.id, ItemOutcome::Pushed { remote_id: Some("gid://1".to_string()) })
        );
        assert_eq!(
            outcome.items[1],
            (bad.id, ItemOutcome::Failed {
                message: "price out of range".to_string(),
                retryable: false
            })
        );
    }

    #[tokio::test]
    async fn test_push_batch_surfaces_throttle_signal() {
        let server = MockServer::start().await;
        let change = update_change("SKU-1");

        Mock::given(method("POST"))
            .and(path("/products/batch"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"change_id": change.id, "status": "ok"}],
                "retry_after_secs": 3
            })))
            .mount(&server)
            .await;

        let outcome = transport(&server).push_batch(&batch_of(vec![change])).await.unwrap();

        assert_eq!(outcome.succeeded(), 1);
        let signal = outcome.rate_limited.expect("throttle signal");
        assert_eq!(signal.retry_after, Some(Duration::from_secs(3)));
    }

    #[tokio::test]
    async fn test_push_batch_delete_sends_null_fields() {
        let server = MockServer::start().await;
        let delete = StagedChange::new(
            ProductId::new("SKU-GONE"),
            ChangeKind::Delete,
            vec![FieldDelta::new("price", Some("9.99".into()), None)],
            Uuid::new_v4(),
        );

        Mock::given(method("POST"))
            .and(path("/products/batch"))
            .and(body_partial_json(json!({
                "operations": [{"sku": "SKU-GONE", "kind": "delete", "fields": {"price": null}}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"change_id": delete.id, "status": "ok"}]
            })))
            .mount(&server)
            .await;

        let outcome = transport(&server).push_batch(&batch_of(vec![delete])).await.unwrap();
        assert_eq!(outcome.succeeded(), 1);
    }
}

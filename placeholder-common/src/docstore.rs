//! Client for the document store, which owns published content and answers identifier
//! lookups for content coming from other systems.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, redirect, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::error::DocStoreError;
use crate::message::TRANSACTION_ID_HEADER;
use crate::model::Brand;

#[derive(Debug, Clone)]
pub struct HttpClientSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub pool_idle_timeout: Duration,
    pub max_idle_per_host: usize,
}

impl Default for HttpClientSettings {
    fn default() -> Self {
        HttpClientSettings {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            pool_idle_timeout: Duration::from_secs(90),
            max_idle_per_host: 100,
        }
    }
}

/// Build the HTTP client shared by every document store call.
/// Redirects are never followed: identifier lookups answer with a 301 whose
/// `Location` carries the data we are after.
pub fn build_http_client(settings: &HttpClientSettings) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent("methode-content-placeholder-mapper")
        .redirect(redirect::Policy::none())
        .connect_timeout(settings.connect_timeout)
        .timeout(settings.request_timeout)
        .pool_idle_timeout(settings.pool_idle_timeout)
        .pool_max_idle_per_host(settings.max_idle_per_host)
        .build()
}

/// The subset of a stored content document we care about.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct DocStoreContent {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub brands: Vec<Brand>,
}

/// Raw answer to an identifier lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentQueryResponse {
    pub status: StatusCode,
    pub location: Option<String>,
}

#[async_trait]
pub trait DocStoreClient: Send + Sync {
    async fn content_query(
        &self,
        authority: &str,
        identifier: &str,
        transaction_id: &str,
    ) -> Result<ContentQueryResponse, DocStoreError>;

    async fn get_content(
        &self,
        uuid: &str,
        transaction_id: &str,
    ) -> Result<DocStoreContent, DocStoreError>;

    /// `Ok(false)` for any answer other than 200. Only transport failures are errors.
    async fn content_exists(&self, uuid: &str, transaction_id: &str)
        -> Result<bool, DocStoreError>;
}

#[derive(Clone)]
pub struct HttpDocStoreClient {
    client: reqwest::Client,
    address: String,
}

impl HttpDocStoreClient {
    pub fn new(client: reqwest::Client, address: &str) -> Self {
        Self {
            client,
            address: address.trim_end_matches('/').to_owned(),
        }
    }

    fn content_url(&self, uuid: &str) -> String {
        format!("{}/content/{}", self.address, uuid)
    }

    /// Check the document store's good-to-go endpoint.
    pub async fn connectivity_check(&self) -> Result<(), DocStoreError> {
        let url = format!("{}/__gtg", self.address);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| DocStoreError::Request {
                target: url.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            status => Err(DocStoreError::UnexpectedStatus {
                target: url,
                status: status.as_u16(),
            }),
        }
    }
}

#[async_trait]
impl DocStoreClient for HttpDocStoreClient {
    async fn content_query(
        &self,
        authority: &str,
        identifier: &str,
        transaction_id: &str,
    ) -> Result<ContentQueryResponse, DocStoreError> {
        let url = format!("{}/content-query", self.address);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("identifierAuthority", authority),
                ("identifierValue", identifier),
            ])
            .header(TRANSACTION_ID_HEADER, transaction_id)
            .send()
            .await
            .map_err(|source| DocStoreError::Request {
                target: format!("authority={} identifier={}", authority, identifier),
                source,
            })?;

        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        debug!(
            transaction_id,
            authority,
            identifier,
            status = response.status().as_u16(),
            "content query answered"
        );

        Ok(ContentQueryResponse {
            status: response.status(),
            location,
        })
    }

    async fn get_content(
        &self,
        uuid: &str,
        transaction_id: &str,
    ) -> Result<DocStoreContent, DocStoreError> {
        let response = self
            .client
            .get(self.content_url(uuid))
            .header(TRANSACTION_ID_HEADER, transaction_id)
            .send()
            .await
            .map_err(|source| DocStoreError::Request {
                target: format!("uuid={}", uuid),
                source,
            })?;

        if response.status() != StatusCode::OK {
            return Err(DocStoreError::UnexpectedStatus {
                target: format!("uuid={}", uuid),
                status: response.status().as_u16(),
            });
        }

        response
            .json::<DocStoreContent>()
            .await
            .map_err(|source| DocStoreError::Body {
                target: format!("uuid={}", uuid),
                source,
            })
    }

    async fn content_exists(
        &self,
        uuid: &str,
        transaction_id: &str,
    ) -> Result<bool, DocStoreError> {
        let response = self
            .client
            .get(self.content_url(uuid))
            .header(TRANSACTION_ID_HEADER, transaction_id)
            .send()
            .await
            .map_err(|source| DocStoreError::Request {
                target: format!("uuid={}", uuid),
                source,
            })?;

        Ok(response.status() == StatusCode::OK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FT_BRAND;
    use httpmock::MockServer;
    use serde_json::json;

    const TID: &str = "tid_test123";
    const UUID: &str = "5414b08f-5ae1-3bd6-9901-a9dd1bf9db03";

    fn test_client(server: &MockServer) -> HttpDocStoreClient {
        let client = build_http_client(&HttpClientSettings::default())
            .expect("failed to build test http client");
        HttpDocStoreClient::new(client, &server.base_url())
    }

    #[tokio::test]
    async fn test_content_query_does_not_follow_redirects() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method("GET")
                    .path("/content-query")
                    .query_param("identifierAuthority", "http://api.ft.com/system/FT-LABS-WP-1-24")
                    .query_param("identifierValue", "http://ftalphaville.ft.com/?p=2193913")
                    .header(TRANSACTION_ID_HEADER, TID);
                then.status(301)
                    .header("Location", format!("http://localhost:1/content/{}", UUID));
            })
            .await;

        let response = test_client(&server)
            .content_query(
                "http://api.ft.com/system/FT-LABS-WP-1-24",
                "http://ftalphaville.ft.com/?p=2193913",
                TID,
            )
            .await
            .expect("content query failed");

        mock.assert_async().await;
        assert_eq!(response.status, StatusCode::MOVED_PERMANENTLY);
        assert_eq!(
            response.location.as_deref(),
            Some("http://localhost:1/content/5414b08f-5ae1-3bd6-9901-a9dd1bf9db03")
        );
    }

    #[tokio::test]
    async fn test_content_query_not_found() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method("GET").path("/content-query");
                then.status(404);
            })
            .await;

        let response = test_client(&server)
            .content_query("authority", "identifier", TID)
            .await
            .expect("content query failed");

        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.location, None);
    }

    #[tokio::test]
    async fn test_get_content() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method("GET")
                    .path(format!("/content/{}", UUID))
                    .header(TRANSACTION_ID_HEADER, TID);
                then.status(200).json_body(json!({
                    "uuid": UUID,
                    "title": "Some blog post",
                    "brands": [{"id": FT_BRAND}, {"id": "http://api.ft.com/things/89d15f70-640d-11e4-9803-0800200c9a66"}]
                }));
            })
            .await;

        let content = test_client(&server)
            .get_content(UUID, TID)
            .await
            .expect("get content failed");

        mock.assert_async().await;
        assert_eq!(content.uuid, UUID);
        assert_eq!(
            content.brands,
            vec![
                Brand::ft(),
                Brand {
                    id: "http://api.ft.com/things/89d15f70-640d-11e4-9803-0800200c9a66".to_owned()
                }
            ]
        );
    }

    #[tokio::test]
    async fn test_get_content_unexpected_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method("GET").path(format!("/content/{}", UUID));
                then.status(503);
            })
            .await;

        let error = test_client(&server)
            .get_content(UUID, TID)
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            DocStoreError::UnexpectedStatus { status: 503, .. }
        ));
    }

    #[tokio::test]
    async fn test_content_exists() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method("GET").path(format!("/content/{}", UUID));
                then.status(200).json_body(json!({ "uuid": UUID }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method("GET")
                    .path("/content/0b9f3f6e-0000-4000-8000-000000000000");
                then.status(404);
            })
            .await;

        let client = test_client(&server);

        assert!(client.content_exists(UUID, TID).await.unwrap());
        assert!(!client
            .content_exists("0b9f3f6e-0000-4000-8000-000000000000", TID)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_content_exists_transport_failure() {
        let client = build_http_client(&HttpClientSettings::default()).unwrap();
        // Nothing listens on port 1.
        let client = HttpDocStoreClient::new(client, "http://127.0.0.1:1");

        assert!(matches!(
            client.content_exists(UUID, TID).await,
            Err(DocStoreError::Request { .. })
        ));
    }

    #[tokio::test]
    async fn test_connectivity_check() {
        let server = MockServer::start_async().await;
        let gtg = server
            .mock_async(|when, then| {
                when.method("GET").path("/__gtg");
                then.status(200).body("OK");
            })
            .await;

        let client = test_client(&server);
        assert!(client.connectivity_check().await.is_ok());

        gtg.delete_async().await;
        server
            .mock_async(|when, then| {
                when.method("GET").path("/__gtg");
                then.status(503);
            })
            .await;

        assert!(matches!(
            client.connectivity_check().await,
            Err(DocStoreError::UnexpectedStatus { status: 503, .. })
        ));
    }
}

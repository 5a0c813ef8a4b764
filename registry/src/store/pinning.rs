//! IPFS pinning service with a read gateway.
//!
//! Documents are published through a `pinJSONToIPFS`-style endpoint that
//! answers with the pinned `IpfsHash`, and read back through
//! `GET {gateway}/ipfs/{cid}`.

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use super::{ContentStore, StoreError};
use crate::content_id::ContentId;

/// Connection settings for a pinning service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinningGatewayConfig {
    /// Pinning API base URL
    pub api_url: String,
    /// Read gateway base URL
    pub gateway_url: String,
    /// API key header value
    #[serde(default)]
    pub api_key: Option<String>,
    /// API secret header value
    #[serde(default)]
    pub secret_key: Option<String>,
    /// Name attached to pinned documents
    #[serde(default = "default_pin_name")]
    pub pin_name: String,
}

fn default_pin_name() -> String {
    "kisan-ledger".to_string()
}

impl Default for PinningGatewayConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.pinata.cloud".to_string(),
            gateway_url: "https://gateway.pinata.cloud".to_string(),
            api_key: None,
            secret_key: None,
            pin_name: default_pin_name(),
        }
    }
}

/// HTTP-backed content store.
pub struct PinningGatewayStore {
    config: PinningGatewayConfig,
    client: Client,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PinRequest {
    pinata_content: serde_json::Value,
    pinata_metadata: PinMetadata,
}

#[derive(Debug, Serialize)]
struct PinMetadata {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PinResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
}

impl PinningGatewayStore {
    pub fn new(mut config: PinningGatewayConfig, timeout: Duration) -> Result<Self, StoreError> {
        let mut headers = header::HeaderMap::new();
        if let Some(ref api_key) = config.api_key {
            headers.insert(
                "pinata_api_key",
                header::HeaderValue::from_str(api_key)
                    .map_err(|e| StoreError::Unreachable(format!("invalid API key: {}", e)))?,
            );
        }
        if let Some(ref secret) = config.secret_key {
            headers.insert(
                "pinata_secret_api_key",
                header::HeaderValue::from_str(secret)
                    .map_err(|e| StoreError::Unreachable(format!("invalid API secret: {}", e)))?,
            );
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Unreachable(format!("HTTP client: {}", e)))?;

        config.api_url = config.api_url.trim_end_matches('/').to_string();
        config.gateway_url = config.gateway_url.trim_end_matches('/').to_string();

        info!(api = %config.api_url, gateway = %config.gateway_url, "Initialized pinning store");

        Ok(Self { config, client })
    }
}

#[async_trait]
impl ContentStore for PinningGatewayStore {
    fn name(&self) -> &str {
        "pinning"
    }

    async fn fetch(&self, cid: &ContentId) -> Result<Vec<u8>, StoreError> {
        let response = self
            .client
            .get(self.gateway_link(cid))
            .send()
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;

        match response.status() {
            status if status.is_success() => {
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| StoreError::Unreachable(e.to_string()))?;
                debug!(cid = %cid, size = bytes.len(), "Fetched document");
                Ok(bytes.to_vec())
            }
            StatusCode::NOT_FOUND | StatusCode::GONE => Err(StoreError::NotFound(cid.clone())),
            status => Err(StoreError::Unreachable(format!("gateway returned {}", status))),
        }
    }

    async fn publish(&self, bytes: Vec<u8>) -> Result<ContentId, StoreError> {
        let content: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::PublishFailed(format!("not a JSON document: {}", e)))?;

        let request = PinRequest {
            pinata_content: content,
            pinata_metadata: PinMetadata {
                name: self.config.pin_name.clone(),
            },
        };

        let response = self
            .client
            .post(format!("{}/pinning/pinJSONToIPFS", self.config.api_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| StoreError::PublishFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::PublishFailed(format!("HTTP {}: {}", status, body)));
        }

        let pinned: PinResponse = response
            .json()
            .await
            .map_err(|e| StoreError::PublishFailed(format!("invalid pin response: {}", e)))?;

        let cid = ContentId::new(pinned.ipfs_hash);
        info!(cid = %cid, size = bytes.len(), "Pinned document");
        Ok(cid)
    }

    fn gateway_link(&self, cid: &ContentId) -> String {
        format!("{}/ipfs/{}", self.config.gateway_url, cid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store(server: &MockServer) -> PinningGatewayStore {
        PinningGatewayStore::new(
            PinningGatewayConfig {
                api_url: server.uri(),
                gateway_url: format!("{}/", server.uri()),
                api_key: Some("key".to_string()),
                secret_key: Some("secret".to_string()),
                pin_name: "test".to_string(),
            },
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_publish_returns_ipfs_hash() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/pinning/pinJSONToIPFS"))
            .and(header("pinata_api_key", "key"))
            .and(header("pinata_secret_api_key", "secret"))
            .and(body_partial_json(serde_json::json!({
                "pinataContent": { "participants": [] }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "IpfsHash": "QmPinned",
                "PinSize": 42
            })))
            .expect(1)
            .mount(&server)
            .await;

        let cid = store(&server)
            .publish(b"{\"participants\": []}".to_vec())
            .await
            .unwrap();
        assert_eq!(cid, ContentId::from("QmPinned"));
    }

    #[tokio::test]
    async fn test_publish_keeps_float_precision() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "IpfsHash": "QmPrecise"
            })))
            .mount(&server)
            .await;

        let document = br#"{"confidence": 0.9251287335186839, "income": 48213.40333333333}"#;
        store(&server).publish(document.to_vec()).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        let content = &body["pinataContent"];
        assert_eq!(content["confidence"].as_f64(), Some(0.9251287335186839));
        assert_eq!(content["income"].as_f64(), Some(48213.40333333333));
    }

    #[tokio::test]
    async fn test_rejected_publish() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let result = store(&server).publish(b"{}".to_vec()).await;
        assert!(matches!(result, Err(StoreError::PublishFailed(_))));
    }

    #[tokio::test]
    async fn test_fetch_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ipfs/QmFound"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"ok\": true}"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ipfs/QmMissing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ipfs/QmBroken"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let store = store(&server);
        assert_eq!(
            store.fetch(&ContentId::from("QmFound")).await.unwrap(),
            b"{\"ok\": true}"
        );
        assert!(matches!(
            store.fetch(&ContentId::from("QmMissing")).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.fetch(&ContentId::from("QmBroken")).await,
            Err(StoreError::Unreachable(_))
        ));
        assert_eq!(
            store.gateway_link(&ContentId::from("QmFound")),
            format!("{}/ipfs/QmFound", server.uri())
        );
    }

    #[tokio::test]
    async fn test_unreachable_gateway() {
        let store = PinningGatewayStore::new(
            PinningGatewayConfig {
                api_url: "http://127.0.0.1:9".to_string(),
                gateway_url: "http://127.0.0.1:9".to_string(),
                ..Default::default()
            },
            Duration::from_secs(2),
        )
        .unwrap();

        assert!(matches!(
            store.fetch(&ContentId::from("QmAnything")).await,
            Err(StoreError::Unreachable(_))
        ));
    }
}

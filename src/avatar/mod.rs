//! Avatar generation for try-on requests
//!
//! The relay forwards a try-on request to a downstream avatar service and
//! broadcasts the resulting image URL. Without a configured service a
//! placeholder generator answers locally.

use crate::config::AvatarSettings;
use crate::error::{RelayError, Result};
use crate::types::{AvatarResult, ProductInfo, TryOnRequest};
use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Base URL of the placeholder image service
const PLACEHOLDER_BASE_URL: &str = "https://via.placeholder.com/300x500.png";

/// Trait for producing an avatar for a try-on request
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AvatarGenerator: Send + Sync {
    async fn generate(&self, request: &TryOnRequest) -> Result<AvatarResult>;
}

/// Answers every request with a placeholder image labelled with the product
#[derive(Debug, Clone, Default)]
pub struct PlaceholderAvatarGenerator;

impl PlaceholderAvatarGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Placeholder image URL for a product name. Only the first space is
    /// encoded, matching the URLs existing clients already cache.
    pub fn avatar_url(product_name: &str) -> String {
        format!(
            "{}?text={}",
            PLACEHOLDER_BASE_URL,
            product_name.replacen(' ', "+", 1)
        )
    }
}

#[async_trait]
impl AvatarGenerator for PlaceholderAvatarGenerator {
    async fn generate(&self, request: &TryOnRequest) -> Result<AvatarResult> {
        debug!("Generating placeholder avatar for product {}", request.product_id);
        Ok(AvatarResult {
            avatar_url: Self::avatar_url(&request.product_name),
            product_info: ProductInfo {
                id: request.product_id.clone(),
                name: request.product_name.clone(),
            },
        })
    }
}

/// Request body sent to the avatar service
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AvatarServiceRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    jwt: Option<&'a str>,
    product_id: &'a str,
}

/// Client for a remote avatar service
pub struct HttpAvatarGenerator {
    service_url: String,
    client: reqwest::Client,
}

impl HttpAvatarGenerator {
    pub fn new(service_url: String, settings: &AvatarSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.request_timeout_ms))
            .build()
            .context("Failed to create avatar HTTP client")?;

        Ok(Self {
            service_url,
            client,
        })
    }
}

#[async_trait]
impl AvatarGenerator for HttpAvatarGenerator {
    async fn generate(&self, request: &TryOnRequest) -> Result<AvatarResult> {
        let body = AvatarServiceRequest {
            jwt: request.jwt.as_deref(),
            product_id: &request.product_id,
        };

        let response = self
            .client
            .post(&self.service_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RelayError::Downstream {
                message: format!("avatar service unreachable: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(RelayError::Downstream {
                message: format!("avatar service returned {}: {}", status, text),
            }
            .into());
        }

        let result: AvatarResult = response.json().await.map_err(|e| RelayError::Downstream {
            message: format!("invalid avatar service response: {}", e),
        })?;
        Ok(result)
    }
}

/// Pick the generator for the given settings
pub fn generator_from_settings(settings: &AvatarSettings) -> Result<Arc<dyn AvatarGenerator>> {
    match &settings.service_url {
        Some(url) => {
            info!("Using avatar service at {}", url);
            Ok(Arc::new(HttpAvatarGenerator::new(url.clone(), settings)?))
        }
        None => {
            info!("No avatar service configured, using placeholder avatars");
            Ok(Arc::new(PlaceholderAvatarGenerator::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_request(name: &str) -> TryOnRequest {
        TryOnRequest {
            product_id: "p-1".to_string(),
            product_name: name.to_string(),
            jwt: None,
        }
    }

    #[test]
    fn test_placeholder_url_encodes_first_space_only() {
        assert_eq!(
            PlaceholderAvatarGenerator::avatar_url("Red Summer Dress"),
            "https://via.placeholder.com/300x500.png?text=Red+Summer Dress"
        );
        assert_eq!(
            PlaceholderAvatarGenerator::avatar_url("Hat"),
            "https://via.placeholder.com/300x500.png?text=Hat"
        );
    }

    #[tokio::test]
    async fn test_placeholder_generator() {
        let generator = PlaceholderAvatarGenerator::new();
        let result = generator
            .generate(&create_test_request("Blue Jacket"))
            .await
            .unwrap();

        assert_eq!(result.product_info.id, "p-1");
        assert_eq!(result.product_info.name, "Blue Jacket");
        assert!(result.avatar_url.ends_with("text=Blue+Jacket"));
    }

    #[test]
    fn test_service_request_body() {
        let request = TryOnRequest {
            jwt: Some("token".to_string()),
            ..create_test_request("Hat")
        };
        let body = AvatarServiceRequest {
            jwt: request.jwt.as_deref(),
            product_id: &request.product_id,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["jwt"], "token");
        assert_eq!(value["productId"], "p-1");
    }

    #[test]
    fn test_generator_selection() {
        let settings = AvatarSettings::default();
        assert!(generator_from_settings(&settings).is_ok());

        let settings = AvatarSettings {
            service_url: Some("http://localhost:9090/api/try-on".to_string()),
            ..AvatarSettings::default()
        };
        assert!(generator_from_settings(&settings).is_ok());
    }
}

//! HTTP payment-link provider.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{PaymentLinkProvider, ProviderError};

/// Client for a hosted payment-link API
pub struct HttpPaymentProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct CreateLinkRequest<'a> {
    amount: Decimal,
    currency: &'a str,
    reference: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateLinkResponse {
    url: Option<String>,
    error: Option<String>,
}

impl HttpPaymentProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    fn links_url(&self) -> String {
        format!("{}/links", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl PaymentLinkProvider for HttpPaymentProvider {
    fn name(&self) -> &str {
        "payment"
    }

    async fn create_link(
        &self,
        amount: Decimal,
        currency: &str,
        reference: &str,
    ) -> Result<String, ProviderError> {
        let request = CreateLinkRequest {
            amount,
            currency,
            reference,
        };

        let response = self
            .client
            .post(self.links_url())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(ProviderError::from_http)?;

        if response.status().is_server_error() {
            return Err(ProviderError::Unavailable(format!(
                "payment endpoint returned {}",
                response.status()
            )));
        }
        if !response.status().is_success() {
            return Err(ProviderError::Rejected(format!(
                "payment endpoint returned {}",
                response.status()
            )));
        }

        let body: CreateLinkResponse = response.json().await.map_err(ProviderError::from_http)?;

        match (body.url, body.error) {
            (Some(url), _) => Ok(url),
            (None, Some(error)) => Err(ProviderError::Rejected(error)),
            (None, None) => Err(ProviderError::Protocol("link response had no url".into())),
        }
    }
}

//! Thin client for the gift-card partner's invoice API.
//!
//! Every call authenticates with the household's partner API key as HTTP
//! basic auth. Bodies are passed through as JSON; this module does not
//! model the partner's full schema beyond what the purchase probe needs.

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum CommerceError {
    #[error("partner request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Partner answered with a non-2xx status; the body is kept verbatim
    /// so callers can relay it.
    #[error("partner returned {status}")]
    Status { status: u16, body: String },
}

#[derive(Serialize)]
struct ProbeProduct<'a> {
    product_id: &'a str,
    value: i64,
    quantity: u32,
}

#[derive(Serialize)]
struct ProbeInvoice<'a> {
    products: [ProbeProduct<'a>; 1],
    auto_pay: bool,
    payment_method: &'a str,
}

#[derive(Clone)]
pub struct CommerceClient {
    http: reqwest::Client,
    base_url: String,
}

impl CommerceClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn account_balance(&self, api_key: &str) -> Result<Value, CommerceError> {
        self.get("/accounts/balance", api_key).await
    }

    pub async fn orders(&self, api_key: &str) -> Result<Value, CommerceError> {
        self.get("/orders", api_key).await
    }

    pub async fn products(&self, api_key: &str, include_test: bool) -> Result<Value, CommerceError> {
        let path = if include_test {
            "/products?include_test_products=true"
        } else {
            "/products"
        };
        self.get(path, api_key).await
    }

    /// Create a prepaid test invoice. Used as a liveness probe before a
    /// redemption debits any XP: a failure here must leave balances alone.
    pub async fn purchase_test(&self, api_key: &str) -> Result<Value, CommerceError> {
        let body = ProbeInvoice {
            products: [ProbeProduct {
                product_id: "test-gift-card-code",
                value: 10,
                quantity: 1,
            }],
            auto_pay: true,
            payment_method: "balance",
        };
        let resp = self
            .http
            .post(format!("{}/invoices", self.base_url))
            .basic_auth(api_key, None::<&str>)
            .json(&body)
            .send()
            .await?;
        Self::into_json(resp).await
    }

    async fn get(&self, path: &str, api_key: &str) -> Result<Value, CommerceError> {
        let resp = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .basic_auth(api_key, None::<&str>)
            .send()
            .await?;
        Self::into_json(resp).await
    }

    async fn into_json(resp: reqwest::Response) -> Result<Value, CommerceError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CommerceError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.json::<Value>().await?)
    }
}

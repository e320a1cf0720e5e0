//! Razorpay order API client

use super::{ORDER_CURRENCY, OrderGateway};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};

const DEFAULT_API_BASE: &str = "https://api.razorpay.com/v1";

/// Creates orders through the Razorpay REST API
#[derive(Clone)]
pub struct RazorpayGateway {
    client: Client,
    api_base: String,
    key_id: String,
    key_secret: String,
}

impl std::fmt::Debug for RazorpayGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RazorpayGateway")
            .field("api_base", &self.api_base)
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl RazorpayGateway {
    /// Create a client authenticating with the given key pair
    pub fn new(key_id: &str, key_secret: &str, api_base: Option<&str>) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| Error::Config(format!("Failed to build gateway client: {e}")))?;
        Ok(Self {
            client,
            api_base: api_base
                .unwrap_or(DEFAULT_API_BASE)
                .trim_end_matches('/')
                .to_string(),
            key_id: key_id.to_string(),
            key_secret: key_secret.to_string(),
        })
    }
}

#[async_trait]
impl OrderGateway for RazorpayGateway {
    async fn create_order(&self, amount: u64) -> Result<Value> {
        let response = self
            .client
            .post(format!("{}/orders", self.api_base))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&json!({
                "amount": amount,
                "currency": ORDER_CURRENCY,
                "payment_capture": 1,
            }))
            .send()
            .await
            .map_err(|e| Error::Gateway(format!("Order request failed: {e}")))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::Gateway(format!("Malformed order response: {e}")))?;

        let order = order_from_response(status, body)?;
        let order_id = order.get("id").and_then(Value::as_str).unwrap_or_default();
        tracing::info!(order_id, amount, "Created payment order");
        Ok(order)
    }
}

/// Turn a gateway reply into the order object, or the gateway's own error
/// description.
fn order_from_response(status: StatusCode, body: Value) -> Result<Value> {
    if !status.is_success() {
        let description = body
            .pointer("/error/description")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(Error::Gateway(format!(
            "Order rejected with {status}: {description}"
        )));
    }
    Ok(body)
}

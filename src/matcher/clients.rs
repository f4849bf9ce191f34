use crate::matcher::history::LocationSample;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

/// Verdict from the external boarding classifier.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierVerdict {
    pub is_on_bus: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Submits rider location batches for classification.
#[allow(async_fn_in_trait)]
pub trait RideClassifier {
    async fn classify(&self, samples: &[LocationSample]) -> Result<ClassifierVerdict, ClientError>;
}

/// Triggers a fare charge. Returns whether the charge went through.
#[allow(async_fn_in_trait)]
pub trait FareCharger {
    async fn charge(&self, bus_route: &str) -> Result<bool, ClientError>;
}

pub struct ClassifierClient {
    client: reqwest::Client,
    url: String,
}

impl ClassifierClient {
    pub fn new(client: reqwest::Client, url: String) -> Self {
        Self { client, url }
    }
}

impl RideClassifier for ClassifierClient {
    async fn classify(&self, samples: &[LocationSample]) -> Result<ClassifierVerdict, ClientError> {
        let response = self
            .client
            .post(&self.url)
            .json(samples)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

#[derive(Debug, Serialize)]
struct ChargeRequest<'a> {
    user_id: &'a str,
    bus_route: &'a str,
    charge_amt: f64,
}

#[derive(Debug, Deserialize)]
struct ChargeResponse {
    success: bool,
}

pub struct PaymentClient {
    client: reqwest::Client,
    url: String,
    user_id: String,
    charge_amt: f64,
}

impl PaymentClient {
    pub fn new(client: reqwest::Client, url: String, user_id: String, charge_amt: f64) -> Self {
        Self {
            client,
            url,
            user_id,
            charge_amt,
        }
    }
}

impl FareCharger for PaymentClient {
    async fn charge(&self, bus_route: &str) -> Result<bool, ClientError> {
        let request = ChargeRequest {
            user_id: &self.user_id,
            bus_route,
            charge_amt: self.charge_amt,
        };
        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;
        let body: ChargeResponse = response.json().await?;
        Ok(body.success)
    }
}

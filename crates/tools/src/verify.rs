//! Post-deploy source verification.
//!
//! Verification is best-effort: a failure is logged and the deployment
//! stands.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::chain::ConstructorArg;
use crate::config::VerifierConfig;

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("verification rejected ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// What the verification service needs to match a deployment to its source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationRequest {
    pub network: String,
    pub chain_id: u32,
    pub contract: String,
    pub address: String,
    pub constructor_args: Vec<ConstructorArg>,
}

#[async_trait(?Send)]
pub trait Verifier {
    async fn verify(&self, request: &VerificationRequest) -> Result<(), VerifyError>;
}

/// Verification service reached over HTTP with a bearer credential.
pub struct HttpVerifier {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl HttpVerifier {
    pub fn new(config: &VerifierConfig, timeout: Duration) -> Result<Self, VerifyError> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            url: config.url.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait(?Send)]
impl Verifier for HttpVerifier {
    async fn verify(&self, request: &VerificationRequest) -> Result<(), VerifyError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            return Ok(());
        }
        if body.to_lowercase().contains("already verified") {
            info!(address = %request.address, "Contract already verified");
            return Ok(());
        }
        Err(VerifyError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

/// Run verification and swallow any failure. Returns whether it succeeded.
pub async fn verify_best_effort(verifier: &dyn Verifier, request: &VerificationRequest) -> bool {
    info!(
        contract = %request.contract,
        address = %request.address,
        "Verifying contract source"
    );
    match verifier.verify(request).await {
        Ok(()) => {
            info!(address = %request.address, "Verification complete");
            true
        }
        Err(e) => {
            warn!(address = %request.address, error = %e, "Verification failed, continuing");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_http::{serve_once, serve_recording};

    fn request() -> VerificationRequest {
        VerificationRequest {
            network: "testnet".to_string(),
            chain_id: 2,
            contract: "FundMe".to_string(),
            address: "CFUNDME".to_string(),
            constructor_args: vec![ConstructorArg::address("price_feed", "CFEED")],
        }
    }

    fn verifier(url: String) -> HttpVerifier {
        HttpVerifier::new(
            &VerifierConfig {
                url,
                api_key: "secret-key".to_string(),
            },
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_posts_request_with_credential() {
        let (url, received) = serve_recording(200, r#"{"status":"ok"}"#).await;

        verifier(url).verify(&request()).await.unwrap();

        let sent = received.await.unwrap();
        assert_eq!(sent.method, axum::http::Method::POST);
        assert_eq!(sent.authorization.as_deref(), Some("Bearer secret-key"));
        assert_eq!(sent.body["address"], "CFUNDME");
        assert_eq!(sent.body["constructor_args"][0]["name"], "price_feed");
    }

    #[tokio::test]
    async fn test_already_verified_is_success() {
        let url = serve_once(400, "Contract source code Already Verified").await;
        assert!(verifier(url).verify(&request()).await.is_ok());
    }

    #[tokio::test]
    async fn test_rejection_is_error() {
        let url = serve_once(422, "bytecode mismatch").await;
        let error = verifier(url).verify(&request()).await.unwrap_err();

        assert!(matches!(error, VerifyError::Rejected { status: 422, .. }));
    }

    #[tokio::test]
    async fn test_best_effort_never_fails() {
        let url = serve_once(500, "boom").await;
        assert!(!verify_best_effort(&verifier(url), &request()).await);
    }
}

//! OAuth 2.0 client for the installed-application flow

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::pkce::PkceChallenge;
use super::types::{ClientSecrets, CredentialRecord, OAuthErrorBody, TokenResponse};
use crate::error::{Result, UploaderError};

/// Redirect URI for copy-and-paste code entry
pub const OOB_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";

/// Authorization URL building, code exchange and token refresh
#[async_trait]
pub trait OAuthFlow: Send + Sync {
    /// Consent page URL for `redirect_uri`, carrying the PKCE challenge and CSRF state
    fn authorization_url(
        &self,
        secrets: &ClientSecrets,
        redirect_uri: &str,
        pkce: &PkceChallenge,
    ) -> Result<String>;

    async fn exchange_code(
        &self,
        secrets: &ClientSecrets,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> Result<CredentialRecord>;

    /// New access token for `record`; keeps the old refresh token if none is returned
    async fn refresh(&self, record: &CredentialRecord) -> Result<CredentialRecord>;
}

/// Token endpoint client backed by reqwest
#[derive(Debug, Clone)]
pub struct OAuthClient {
    http: Client,
    scopes: Vec<String>,
}

impl OAuthClient {
    pub fn new(scopes: Vec<String>) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { http, scopes }
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    async fn request_token(&self, token_uri: &str, params: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self
            .http
            .post(token_uri)
            .form(params)
            .send()
            .await
            .map_err(|e| UploaderError::Authentication(format!("Token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let reason = serde_json::from_str::<OAuthErrorBody>(&body)
                .map(|error| error.to_string())
                .unwrap_or(body);
            return Err(UploaderError::Authentication(format!(
                "Token endpoint returned {}: {}",
                status.as_u16(),
                reason
            )));
        }

        response.json().await.map_err(|e| {
            UploaderError::Authentication(format!("Invalid token response: {}", e))
        })
    }
}

#[async_trait]
impl OAuthFlow for OAuthClient {
    fn authorization_url(
        &self,
        secrets: &ClientSecrets,
        redirect_uri: &str,
        pkce: &PkceChallenge,
    ) -> Result<String> {
        let scope = self.scopes.join(" ");
        let url = Url::parse_with_params(
            &secrets.auth_uri,
            &[
                ("response_type", "code"),
                ("client_id", secrets.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("scope", scope.as_str()),
                ("state", pkce.state.as_str()),
                ("code_challenge", pkce.code_challenge.as_str()),
                ("code_challenge_method", pkce.challenge_method()),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .map_err(|e| {
            UploaderError::Authentication(format!("Invalid auth_uri '{}': {}", secrets.auth_uri, e))
        })?;

        Ok(url.into())
    }

    async fn exchange_code(
        &self,
        secrets: &ClientSecrets,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> Result<CredentialRecord> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", secrets.client_id.as_str()),
            ("client_secret", secrets.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
            ("code_verifier", code_verifier),
        ];

        let response = self.request_token(&secrets.token_uri, &params).await?;
        debug!("Exchanged authorization code for tokens");

        Ok(response.into_record(
            &secrets.client_id,
            &secrets.client_secret,
            &secrets.token_uri,
            &self.scopes,
            None,
        ))
    }

    async fn refresh(&self, record: &CredentialRecord) -> Result<CredentialRecord> {
        let refresh_token = record
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| UploaderError::Authentication("No refresh token available".to_string()))?;

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", record.client_id.as_str()),
            ("client_secret", record.client_secret.as_str()),
        ];

        let response = self.request_token(&record.token_uri, &params).await?;
        debug!("Refreshed access token");

        Ok(response.into_record(
            &record.client_id,
            &record.client_secret,
            &record.token_uri,
            &record.scopes,
            record.refresh_token.clone(),
        ))
    }
}

//! OAuth 2.0 data types
//!
//! `ClientSecrets` mirrors the JSON downloaded from the Google Cloud
//! console, `CredentialRecord` mirrors the "authorized user" JSON that
//! Google client libraries persist, so existing token files keep working.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::SETUP_INSTRUCTIONS;
use crate::error::{Result, UploaderError};

/// Tokens expiring within this window are treated as already expired
pub const EXPIRY_SKEW_SECONDS: i64 = 60;

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// OAuth client registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// The console wraps the registration in an "installed" or "web" object
#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    pub fn from_json(json: &str) -> Result<Self> {
        let file: ClientSecretsFile = serde_json::from_str(json)?;
        file.installed.or(file.web).ok_or_else(|| {
            UploaderError::Authentication(
                "client secrets must contain an 'installed' or 'web' section".to_string(),
            )
        })
    }

    /// Read errors and malformed content both carry the setup instructions
    pub async fn load(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            UploaderError::Authentication(format!(
                "Cannot read client secrets file {}: {}\n\n{}",
                path.display(),
                e,
                SETUP_INSTRUCTIONS
            ))
        })?;

        Self::from_json(&json).map_err(|e| {
            UploaderError::Authentication(format!(
                "Invalid client secrets file {}: {}\n\n{}",
                path.display(),
                e,
                SETUP_INSTRUCTIONS
            ))
        })
    }
}

/// Persisted OAuth token bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Access token
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Access token expiry; `None` means the server gave no lifetime
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl CredentialRecord {
    /// Usable right now without a refresh
    pub fn valid(&self) -> bool {
        !self.token.is_empty() && !self.expired()
    }

    pub fn expired(&self) -> bool {
        match self.expiry {
            Some(expiry) => Utc::now() + chrono::Duration::seconds(EXPIRY_SKEW_SECONDS) >= expiry,
            None => false,
        }
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Seconds left before the access token expires
    pub fn seconds_until_expiry(&self) -> Option<i64> {
        self.expiry.map(|expiry| (expiry - Utc::now()).num_seconds())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Token endpoint response (RFC 6749 section 5.1)
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Build a record, keeping `previous_refresh` when the server sends no new one
    pub fn into_record(
        self,
        client_id: &str,
        client_secret: &str,
        token_uri: &str,
        requested_scopes: &[String],
        previous_refresh: Option<String>,
    ) -> CredentialRecord {
        let scopes = match self.scope {
            Some(scope) if !scope.trim().is_empty() => {
                scope.split_whitespace().map(str::to_string).collect()
            }
            _ => requested_scopes.to_vec(),
        };

        CredentialRecord {
            token: self.access_token,
            refresh_token: self.refresh_token.or(previous_refresh),
            token_uri: token_uri.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            scopes,
            expiry: self
                .expires_in
                .filter(|secs| *secs > 0)
                .map(|secs| Utc::now() + chrono::Duration::seconds(secs)),
        }
    }
}

/// OAuth error body (RFC 6749 section 5.2)
#[derive(Debug, Deserialize)]
pub struct OAuthErrorBody {
    pub error: String,
    pub error_description: Option<String>,
}

impl std::fmt::Display for OAuthErrorBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.error_description {
            Some(description) => write!(f, "{}: {}", self.error, description),
            None => write!(f, "{}", self.error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(expiry: Option<DateTime<Utc>>, refresh: Option<&str>) -> CredentialRecord {
        CredentialRecord {
            token: "ya29.token".to_string(),
            refresh_token: refresh.map(str::to_string),
            token_uri: DEFAULT_TOKEN_URI.to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            scopes: vec![],
            expiry,
        }
    }

    #[test]
    fn test_client_secrets_sections() {
        let installed = ClientSecrets::from_json(
            r#"{"installed":{"client_id":"id","client_secret":"s","redirect_uris":["http://localhost"]}}"#,
        )
        .unwrap();
        assert_eq!(installed.client_id, "id");
        assert_eq!(installed.token_uri, DEFAULT_TOKEN_URI);

        let web = ClientSecrets::from_json(
            r#"{"web":{"client_id":"w","client_secret":"s","token_uri":"https://t"}}"#,
        )
        .unwrap();
        assert_eq!(web.token_uri, "https://t");

        assert!(ClientSecrets::from_json(r#"{"other":{}}"#).is_err());
    }

    #[tokio::test]
    async fn test_load_unreadable_secrets() {
        let dir = tempfile::TempDir::new().unwrap();

        let err = ClientSecrets::load(dir.path()).await.unwrap_err();
        assert!(matches!(err, UploaderError::Authentication(_)));
        assert!(err.to_string().contains(&dir.path().display().to_string()));

        let missing = ClientSecrets::load(&dir.path().join("absent.json")).await;
        assert!(matches!(missing, Err(UploaderError::Authentication(_))));
    }

    #[test]
    fn test_validity_predicates() {
        let fresh = record(Some(Utc::now() + chrono::Duration::hours(1)), Some("r"));
        assert!(fresh.valid());
        assert!(!fresh.expired());
        assert!(fresh.can_refresh());

        let nearly = record(Some(Utc::now() + chrono::Duration::seconds(30)), None);
        assert!(nearly.expired());
        assert!(!nearly.valid());
        assert!(!nearly.can_refresh());

        let no_expiry = record(None, Some(""));
        assert!(no_expiry.valid());
        assert!(!no_expiry.can_refresh());
    }

    #[test]
    fn test_authorized_user_json_shape() {
        let json = r#"{
            "token": "ya29.a",
            "refresh_token": "1//r",
            "token_uri": "https://oauth2.googleapis.com/token",
            "client_id": "id",
            "client_secret": "s",
            "scopes": ["https://www.googleapis.com/auth/youtube.upload"],
            "expiry": "2030-01-01T00:00:00Z"
        }"#;

        let record = CredentialRecord::from_json(json).unwrap();
        assert_eq!(record.refresh_token.as_deref(), Some("1//r"));
        assert!(record.valid());

        let reparsed = CredentialRecord::from_json(&record.to_json().unwrap()).unwrap();
        assert_eq!(reparsed, record);
    }

    #[test]
    fn test_token_response_keeps_previous_refresh_token() {
        let response = TokenResponse {
            access_token: "new".to_string(),
            refresh_token: None,
            expires_in: Some(3599),
            scope: None,
        };

        let scopes = vec!["scope-a".to_string()];
        let record = response.into_record("id", "s", "https://t", &scopes, Some("old".to_string()));

        assert_eq!(record.token, "new");
        assert_eq!(record.refresh_token.as_deref(), Some("old"));
        assert_eq!(record.scopes, scopes);
        assert!(record.valid());
    }
}

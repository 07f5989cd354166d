//! YouTube OAuth 2.0 credential lifecycle
//!
//! ```text
//! ┌────────────────────┐
//! │ CredentialManager  │  load → valid? → refresh → interactive → persist
//! └─────────┬──────────┘
//!           ├──► OAuthFlow              (token endpoint)
//!           └──► InteractiveAuthorizer  (local callback, manual code)
//! ```
//!
//! The manager only ever hands out records that are currently valid. All
//! console and browser handling lives in the authorizers.

pub mod authorizer;
pub mod client;
pub mod pkce;
pub mod types;

pub use authorizer::{
    is_headless, BrowserLauncher, InteractiveAuthorizer, LocalCallbackAuthorizer,
    ManualCodeAuthorizer, SystemBrowser,
};
pub use client::{OAuthClient, OAuthFlow, OOB_REDIRECT_URI};
pub use pkce::PkceChallenge;
pub use types::{ClientSecrets, CredentialRecord};

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::context::AppContext;
use crate::error::{Result, UploaderError};

/// Operator guidance shown whenever the client secrets file is missing
pub const SETUP_INSTRUCTIONS: &str = "\
YOUTUBE API CREDENTIALS SETUP REQUIRED

1. Open the Google Cloud Console: https://console.cloud.google.com/
2. Create a project or select an existing one.
3. Enable the YouTube Data API v3:
   APIs & Services > Library > search 'YouTube Data API v3' > Enable
4. Create OAuth 2.0 credentials:
   APIs & Services > Credentials > Create Credentials > OAuth client ID
   Application type: Desktop application
5. Download the JSON file of the new client and save it at the
   configured client secrets path (auth.client_secrets).
6. Run the uploader again and approve access in the browser, or pass
   FORCE_MANUAL_OAUTH=true to paste the authorization code instead.

More info: https://developers.google.com/youtube/v3/getting-started";

/// Source of bearer tokens for API calls
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String>;
}

/// Owns the persisted credential record and keeps it valid
pub struct CredentialManager {
    credentials_path: PathBuf,
    client_secrets_path: PathBuf,
    flow: Arc<dyn OAuthFlow>,
    browser_authorizer: Arc<dyn InteractiveAuthorizer>,
    manual_authorizer: Arc<dyn InteractiveAuthorizer>,
    /// Go straight to the manual flow
    manual_only: bool,
    /// Held for the whole of `ensure_valid`, so only one refresh runs at a time
    current: Mutex<Option<CredentialRecord>>,
}

impl CredentialManager {
    pub fn new(
        credentials_path: PathBuf,
        client_secrets_path: PathBuf,
        flow: Arc<dyn OAuthFlow>,
        browser_authorizer: Arc<dyn InteractiveAuthorizer>,
        manual_authorizer: Arc<dyn InteractiveAuthorizer>,
    ) -> Self {
        Self {
            credentials_path,
            client_secrets_path,
            flow,
            browser_authorizer,
            manual_authorizer,
            manual_only: false,
            current: Mutex::new(None),
        }
    }

    /// Production wiring: Google token endpoint, system browser, stdin prompt
    pub fn from_context(ctx: &AppContext) -> Self {
        let auth = &ctx.config.auth;
        let headless = is_headless();
        if headless {
            debug!("Headless environment detected");
        }

        Self::new(
            auth.credentials.clone(),
            auth.client_secrets.clone(),
            Arc::new(OAuthClient::new(auth.scopes.clone())),
            Arc::new(LocalCallbackAuthorizer::new(
                auth.callback_port,
                Duration::from_secs(auth.callback_timeout_seconds),
                Arc::new(SystemBrowser),
            )),
            Arc::new(ManualCodeAuthorizer::stdin()),
        )
        .with_manual_only(auth.force_manual || headless)
    }

    pub fn with_manual_only(mut self, manual_only: bool) -> Self {
        self.manual_only = manual_only;
        self
    }

    pub fn credentials_path(&self) -> &Path {
        &self.credentials_path
    }

    /// Read the persisted record; unreadable or unparsable files count as absent
    pub async fn load(&self) -> Option<CredentialRecord> {
        let record = read_record(&self.credentials_path).await;
        *self.current.lock().await = record.clone();
        record
    }

    /// Return a currently valid record, refreshing or re-authorizing as needed
    pub async fn ensure_valid(&self) -> Result<CredentialRecord> {
        let mut current = self.current.lock().await;

        if current.is_none() {
            *current = read_record(&self.credentials_path).await;
        }

        if let Some(record) = current.as_ref() {
            if record.valid() {
                return Ok(record.clone());
            }
        }

        let mut renewed = None;
        if let Some(record) = current.as_ref().filter(|r| r.expired() && r.can_refresh()) {
            match self.flow.refresh(record).await {
                Ok(refreshed) if refreshed.valid() => {
                    info!("🔄 Refreshed expired credentials");
                    renewed = Some(refreshed);
                }
                Ok(_) => warn!("Refresh returned an unusable token"),
                Err(e) => warn!("Failed to refresh credentials: {}", e),
            }
        }

        let record = match renewed {
            Some(record) => record,
            None => self.obtain_new().await?,
        };

        self.persist(&record).await;
        *current = Some(record.clone());
        Ok(record)
    }

    async fn obtain_new(&self) -> Result<CredentialRecord> {
        if !self.client_secrets_path.exists() {
            return Err(UploaderError::Authentication(format!(
                "Client secrets file not found: {}\n\n{}",
                self.client_secrets_path.display(),
                SETUP_INSTRUCTIONS
            )));
        }

        let secrets = ClientSecrets::load(&self.client_secrets_path).await?;

        let record = if self.manual_only {
            info!("Using manual OAuth flow");
            self.run(&self.manual_authorizer, &secrets).await?
        } else {
            match self.run(&self.browser_authorizer, &secrets).await {
                Ok(record) => record,
                Err(e) => {
                    warn!("{} authorization failed: {}", self.browser_authorizer.name(), e);
                    info!("Falling back to manual authorization flow");
                    self.run(&self.manual_authorizer, &secrets).await?
                }
            }
        };

        if !record.valid() {
            return Err(UploaderError::Authentication(
                "Authorization returned an unusable token".to_string(),
            ));
        }

        Ok(record)
    }

    async fn run(
        &self,
        authorizer: &Arc<dyn InteractiveAuthorizer>,
        secrets: &ClientSecrets,
    ) -> Result<CredentialRecord> {
        let record = authorizer
            .authorize(secrets, self.flow.as_ref())
            .await
            .map_err(|e| {
                let reason = match e {
                    UploaderError::Authentication(msg) => msg,
                    other => other.to_string(),
                };
                UploaderError::Authentication(format!(
                    "Failed to obtain new credentials via {}: {}",
                    authorizer.name(),
                    reason
                ))
            })?;

        info!("🔑 Obtained new credentials via {}", authorizer.name());
        Ok(record)
    }

    /// Write the record; failures are logged and otherwise ignored
    async fn persist(&self, record: &CredentialRecord) {
        let json = match record.to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize credentials: {}", e);
                return;
            }
        };

        match tokio::fs::write(&self.credentials_path, json).await {
            Ok(()) => debug!("Saved credentials to {}", self.credentials_path.display()),
            Err(e) => warn!(
                "Failed to save credentials to {}: {}",
                self.credentials_path.display(),
                e
            ),
        }
    }
}

async fn read_record(path: &Path) -> Option<CredentialRecord> {
    let json = match tokio::fs::read_to_string(path).await {
        Ok(json) => json,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!("Failed to read credentials {}: {}", path.display(), e);
            return None;
        }
    };

    match CredentialRecord::from_json(&json) {
        Ok(record) => {
            debug!("Loaded existing credentials");
            Some(record)
        }
        Err(e) => {
            warn!("Failed to load existing credentials: {}", e);
            None
        }
    }
}

#[async_trait]
impl AccessTokenProvider for CredentialManager {
    async fn access_token(&self) -> Result<String> {
        Ok(self.ensure_valid().await?.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn record(token: &str, expires_in_secs: i64, refresh: Option<&str>) -> CredentialRecord {
        CredentialRecord {
            token: token.to_string(),
            refresh_token: refresh.map(str::to_string),
            token_uri: "https://oauth2.example.com/token".to_string(),
            client_id: "id".to_string(),
            client_secret: "s".to_string(),
            scopes: vec![],
            expiry: Some(Utc::now() + chrono::Duration::seconds(expires_in_secs)),
        }
    }

    #[derive(Default)]
    struct CountingFlow {
        refreshes: AtomicUsize,
        fail_refresh: bool,
    }

    #[async_trait]
    impl OAuthFlow for CountingFlow {
        fn authorization_url(&self, _: &ClientSecrets, _: &str, _: &PkceChallenge) -> Result<String> {
            Ok("https://accounts.example.com/auth".to_string())
        }

        async fn exchange_code(
            &self,
            _: &ClientSecrets,
            _: &str,
            _: &str,
            _: &str,
        ) -> Result<CredentialRecord> {
            panic!("authorizer doubles never exchange codes");
        }

        async fn refresh(&self, _record: &CredentialRecord) -> Result<CredentialRecord> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            if self.fail_refresh {
                Err(UploaderError::Authentication("invalid_grant".to_string()))
            } else {
                Ok(record("refreshed", 3600, Some("r")))
            }
        }
    }

    struct StubAuthorizer {
        calls: AtomicUsize,
        token: Option<&'static str>,
    }

    impl StubAuthorizer {
        fn ok(token: &'static str) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                token: Some(token),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                token: None,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl InteractiveAuthorizer for StubAuthorizer {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn authorize(&self, _: &ClientSecrets, _: &dyn OAuthFlow) -> Result<CredentialRecord> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.token {
                Some(token) => Ok(record(token, 3600, Some("r"))),
                None => Err(UploaderError::Authentication("browser unavailable".to_string())),
            }
        }
    }

    struct Fixture {
        dir: TempDir,
        flow: Arc<CountingFlow>,
        browser: Arc<StubAuthorizer>,
        manual: Arc<StubAuthorizer>,
    }

    impl Fixture {
        fn new(flow: CountingFlow, browser: Arc<StubAuthorizer>, manual: Arc<StubAuthorizer>) -> Self {
            Self {
                dir: TempDir::new().unwrap(),
                flow: Arc::new(flow),
                browser,
                manual,
            }
        }

        fn credentials(&self) -> PathBuf {
            self.dir.path().join("youtube_credentials.json")
        }

        fn secrets(&self) -> PathBuf {
            self.dir.path().join("client_secrets.json")
        }

        fn write_secrets(&self) {
            std::fs::write(
                self.secrets(),
                r#"{"installed":{"client_id":"id","client_secret":"s"}}"#,
            )
            .unwrap();
        }

        fn write_record(&self, record: &CredentialRecord) {
            std::fs::write(self.credentials(), record.to_json().unwrap()).unwrap();
        }

        fn manager(&self) -> CredentialManager {
            CredentialManager::new(
                self.credentials(),
                self.secrets(),
                self.flow.clone(),
                self.browser.clone(),
                self.manual.clone(),
            )
        }
    }

    #[tokio::test]
    async fn test_missing_secrets_fails_without_network() {
        let fx = Fixture::new(
            CountingFlow::default(),
            StubAuthorizer::ok("browser"),
            StubAuthorizer::ok("manual"),
        );

        let err = fx.manager().ensure_valid().await.unwrap_err();

        assert!(matches!(err, UploaderError::Authentication(_)));
        assert!(err.to_string().contains("SETUP REQUIRED"));
        assert_eq!(fx.flow.refreshes.load(Ordering::SeqCst), 0);
        assert_eq!(fx.browser.calls() + fx.manual.calls(), 0);
    }

    #[tokio::test]
    async fn test_unreadable_secrets_is_authentication_error() {
        let fx = Fixture::new(
            CountingFlow::default(),
            StubAuthorizer::ok("browser"),
            StubAuthorizer::ok("manual"),
        );
        // present but not a readable file
        std::fs::create_dir(fx.secrets()).unwrap();

        let err = fx.manager().ensure_valid().await.unwrap_err();

        assert!(matches!(err, UploaderError::Authentication(_)));
        assert!(err.to_string().contains("SETUP REQUIRED"));
        assert_eq!(fx.browser.calls() + fx.manual.calls(), 0);
    }

    #[tokio::test]
    async fn test_malformed_secrets_is_authentication_error() {
        let fx = Fixture::new(
            CountingFlow::default(),
            StubAuthorizer::ok("browser"),
            StubAuthorizer::ok("manual"),
        );
        std::fs::write(fx.secrets(), "{ not json").unwrap();

        let err = fx.manager().ensure_valid().await.unwrap_err();

        assert!(matches!(err, UploaderError::Authentication(_)));
        assert_eq!(fx.browser.calls() + fx.manual.calls(), 0);
    }

    #[tokio::test]
    async fn test_valid_record_is_reused() {
        let fx = Fixture::new(
            CountingFlow::default(),
            StubAuthorizer::ok("browser"),
            StubAuthorizer::ok("manual"),
        );
        fx.write_record(&record("cached", 3600, Some("r")));

        let manager = fx.manager();
        assert_eq!(manager.load().await.unwrap().token, "cached");
        assert_eq!(manager.ensure_valid().await.unwrap().token, "cached");
        assert_eq!(manager.access_token().await.unwrap(), "cached");
        assert_eq!(fx.flow.refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expired_record_is_refreshed_and_persisted() {
        let fx = Fixture::new(
            CountingFlow::default(),
            StubAuthorizer::ok("browser"),
            StubAuthorizer::ok("manual"),
        );
        fx.write_record(&record("stale", -60, Some("r")));

        let record = fx.manager().ensure_valid().await.unwrap();

        assert_eq!(record.token, "refreshed");
        assert_eq!(fx.flow.refreshes.load(Ordering::SeqCst), 1);
        let saved = std::fs::read_to_string(fx.credentials()).unwrap();
        assert!(saved.contains("refreshed"));
    }

    #[tokio::test]
    async fn test_refresh_failure_falls_through_to_browser() {
        let fx = Fixture::new(
            CountingFlow {
                fail_refresh: true,
                ..Default::default()
            },
            StubAuthorizer::ok("browser"),
            StubAuthorizer::ok("manual"),
        );
        fx.write_record(&record("stale", -60, Some("r")));
        fx.write_secrets();

        let record = fx.manager().ensure_valid().await.unwrap();

        assert_eq!(record.token, "browser");
        assert_eq!(fx.manual.calls(), 0);
    }

    #[tokio::test]
    async fn test_browser_failure_falls_back_to_manual() {
        let fx = Fixture::new(
            CountingFlow::default(),
            StubAuthorizer::failing(),
            StubAuthorizer::ok("manual"),
        );
        fx.write_secrets();

        let record = fx.manager().ensure_valid().await.unwrap();

        assert_eq!(record.token, "manual");
        assert_eq!(fx.browser.calls(), 1);
        assert_eq!(fx.manual.calls(), 1);
    }

    #[tokio::test]
    async fn test_manual_override_skips_browser() {
        let fx = Fixture::new(
            CountingFlow::default(),
            StubAuthorizer::ok("browser"),
            StubAuthorizer::ok("manual"),
        );
        fx.write_secrets();

        let record = fx.manager().with_manual_only(true).ensure_valid().await.unwrap();

        assert_eq!(record.token, "manual");
        assert_eq!(fx.browser.calls(), 0);
    }

    #[tokio::test]
    async fn test_both_authorizers_failing_is_authentication_error() {
        let fx = Fixture::new(
            CountingFlow::default(),
            StubAuthorizer::failing(),
            StubAuthorizer::failing(),
        );
        fx.write_secrets();

        let result = fx.manager().ensure_valid().await;

        assert!(matches!(result, Err(UploaderError::Authentication(_))));
        assert!(!fx.credentials().exists());
    }

    #[tokio::test]
    async fn test_corrupt_credentials_are_treated_as_absent() {
        let fx = Fixture::new(
            CountingFlow::default(),
            StubAuthorizer::ok("browser"),
            StubAuthorizer::ok("manual"),
        );
        std::fs::write(fx.credentials(), "{ not json").unwrap();
        fx.write_secrets();

        let manager = fx.manager();
        assert!(manager.load().await.is_none());
        assert_eq!(manager.ensure_valid().await.unwrap().token, "browser");
    }

    #[tokio::test]
    async fn test_persist_failure_does_not_fail_authentication() {
        let fx = Fixture::new(
            CountingFlow::default(),
            StubAuthorizer::ok("browser"),
            StubAuthorizer::ok("manual"),
        );
        fx.write_secrets();

        let manager = CredentialManager::new(
            fx.dir.path().join("missing-dir").join("creds.json"),
            fx.secrets(),
            fx.flow.clone(),
            fx.browser.clone(),
            fx.manual.clone(),
        );

        assert_eq!(manager.ensure_valid().await.unwrap().token, "browser");
    }
}

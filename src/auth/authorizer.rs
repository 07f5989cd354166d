//! Interactive ways of obtaining the user's consent

use async_trait::async_trait;
use axum::extract::Query;
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::client::{OAuthFlow, OOB_REDIRECT_URI};
use super::pkce::PkceChallenge;
use super::types::{ClientSecrets, CredentialRecord};
use crate::error::{Result, UploaderError};

/// How long a stopping callback server may take to drain open connections
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

const SUCCESS_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Authorization Complete</title></head>
<body><h1>Authorization Successful</h1><p>You can close this window.</p></body>
</html>"#;

const FAILURE_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Authorization Failed</title></head>
<body><h1>Authorization Failed</h1><p>Return to the terminal for details.</p></body>
</html>"#;

const MISSING_CODE_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Waiting for Authorization</title></head>
<body><p>No authorization code in this request.</p></body>
</html>"#;

/// Runs one interactive authorization and returns the resulting tokens
#[async_trait]
pub trait InteractiveAuthorizer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn authorize(
        &self,
        secrets: &ClientSecrets,
        flow: &dyn OAuthFlow,
    ) -> Result<CredentialRecord>;
}

/// Opens a URL for the user
pub trait BrowserLauncher: Send + Sync {
    fn open(&self, url: &str) -> Result<()>;
}

/// Launches the platform's default browser
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> Result<()> {
        let mut command = if cfg!(target_os = "macos") {
            std::process::Command::new("open")
        } else if cfg!(target_os = "windows") {
            let mut command = std::process::Command::new("cmd");
            command.args(["/C", "start", ""]);
            command
        } else {
            std::process::Command::new("xdg-open")
        };

        command
            .arg(url)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map(|_| ())
            .map_err(|e| UploaderError::Authentication(format!("Could not open a browser: {}", e)))
    }
}

/// True when no browser can be expected: no display on Unix, or an SSH session
pub fn is_headless() -> bool {
    is_headless_with(|key| std::env::var_os(key).is_some())
}

fn is_headless_with<F>(is_set: F) -> bool
where
    F: Fn(&str) -> bool,
{
    let no_display = cfg!(unix) && !cfg!(target_os = "macos") && !is_set("DISPLAY");
    no_display || is_set("SSH_CLIENT") || is_set("SSH_TTY")
}

/// Shared between the callback route and the waiting authorizer
struct CallbackState {
    expected_state: String,
    sender: StdMutex<Option<oneshot::Sender<Result<String>>>>,
}

impl CallbackState {
    /// Only the first decisive callback reaches the authorizer
    fn deliver(&self, outcome: Result<String>) {
        let sender = self.sender.lock().ok().and_then(|mut guard| guard.take());
        match sender {
            Some(tx) => {
                let _ = tx.send(outcome);
            }
            None => debug!("Ignoring repeated OAuth callback"),
        }
    }
}

/// Loopback HTTP server that receives the consent redirect
struct CallbackServer {
    port: u16,
    code_rx: oneshot::Receiver<Result<String>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl CallbackServer {
    /// Bind 127.0.0.1 (`port` 0 picks a free one) and start serving
    async fn start(port: u16, expected_state: String) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await.map_err(|e| {
            UploaderError::Authentication(format!("Failed to bind OAuth callback server: {}", e))
        })?;
        let port = listener.local_addr()?.port();

        let (code_tx, code_rx) = oneshot::channel();
        let state = Arc::new(CallbackState {
            expected_state,
            sender: StdMutex::new(Some(code_tx)),
        });

        let app = Router::new().route(
            "/",
            get(move |query: Query<HashMap<String, String>>| {
                handle_callback(query, state.clone())
            }),
        );

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
            {
                error!("OAuth callback server error: {}", e);
            }
        });

        debug!("OAuth callback server listening on port {}", port);
        Ok(Self {
            port,
            code_rx,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}/", self.port)
    }

    /// Wait for the redirect, then stop the server
    async fn wait_for_code(mut self, timeout: Duration) -> Result<String> {
        let received = tokio::time::timeout(timeout, &mut self.code_rx).await;
        self.shutdown().await;

        match received {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(UploaderError::Authentication(
                "OAuth callback server stopped before a code arrived".to_string(),
            )),
            Err(_) => Err(UploaderError::Authentication(format!(
                "No authorization callback within {}s",
                timeout.as_secs()
            ))),
        }
    }

    async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut handle) = self.handle.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await.is_err() {
                debug!("OAuth callback server still draining, aborting it");
                handle.abort();
            }
        }
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if !handle.is_finished() {
                handle.abort();
            }
        }
    }
}

async fn handle_callback(
    Query(params): Query<HashMap<String, String>>,
    callback: Arc<CallbackState>,
) -> (StatusCode, Html<&'static str>) {
    if let Some(error) = params.get("error") {
        callback.deliver(Err(UploaderError::Authentication(format!(
            "Authorization denied: {}",
            error
        ))));
        return (StatusCode::FORBIDDEN, Html(FAILURE_PAGE));
    }

    let Some(code) = params.get("code") else {
        return (StatusCode::BAD_REQUEST, Html(MISSING_CODE_PAGE));
    };

    if params.get("state") != Some(&callback.expected_state) {
        callback.deliver(Err(UploaderError::Authentication(
            "State mismatch in OAuth callback".to_string(),
        )));
        return (StatusCode::BAD_REQUEST, Html(FAILURE_PAGE));
    }

    callback.deliver(Ok(code.clone()));
    (StatusCode::OK, Html(SUCCESS_PAGE))
}

/// Browser flow: consent page redirects to a server on 127.0.0.1
pub struct LocalCallbackAuthorizer {
    port: u16,
    timeout: Duration,
    browser: Arc<dyn BrowserLauncher>,
}

impl LocalCallbackAuthorizer {
    pub fn new(port: u16, timeout: Duration, browser: Arc<dyn BrowserLauncher>) -> Self {
        Self {
            port,
            timeout,
            browser,
        }
    }
}

#[async_trait]
impl InteractiveAuthorizer for LocalCallbackAuthorizer {
    fn name(&self) -> &'static str {
        "local callback"
    }

    async fn authorize(
        &self,
        secrets: &ClientSecrets,
        flow: &dyn OAuthFlow,
    ) -> Result<CredentialRecord> {
        let pkce = PkceChallenge::generate();
        let server = CallbackServer::start(self.port, pkce.state.clone()).await?;
        let redirect_uri = server.redirect_uri();

        let auth_url = flow.authorization_url(secrets, &redirect_uri, &pkce)?;

        info!("🌐 Opening browser for YouTube authorization");
        println!("Please visit this URL to authorize this application:\n{}", auth_url);
        self.browser.open(&auth_url)?;

        let code = server.wait_for_code(self.timeout).await?;
        flow.exchange_code(secrets, &code, &redirect_uri, &pkce.code_verifier)
            .await
    }
}

/// Copy-and-paste flow for machines without a browser
pub struct ManualCodeAuthorizer<R> {
    input: Mutex<R>,
}

impl<R> ManualCodeAuthorizer<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(input: R) -> Self {
        Self {
            input: Mutex::new(input),
        }
    }
}

impl ManualCodeAuthorizer<BufReader<tokio::io::Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

#[async_trait]
impl<R> InteractiveAuthorizer for ManualCodeAuthorizer<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    fn name(&self) -> &'static str {
        "manual code"
    }

    async fn authorize(
        &self,
        secrets: &ClientSecrets,
        flow: &dyn OAuthFlow,
    ) -> Result<CredentialRecord> {
        let pkce = PkceChallenge::generate();
        let auth_url = flow.authorization_url(secrets, OOB_REDIRECT_URI, &pkce)?;

        println!("\n{}", "=".repeat(60));
        println!("MANUAL YOUTUBE AUTHENTICATION REQUIRED");
        println!("{}", "=".repeat(60));
        println!("1. Open this URL in your browser:");
        println!("   {}", auth_url);
        println!("\n2. Complete the authorization process");
        println!("3. Copy the authorization code shown on the page");
        println!("{}", "=".repeat(60));
        print!("\nEnter the authorization code: ");
        let _ = std::io::Write::flush(&mut std::io::stdout());

        let mut line = String::new();
        self.input.lock().await.read_line(&mut line).await?;

        let code = line.trim();
        if code.is_empty() {
            warn!("No authorization code entered");
            return Err(UploaderError::Authentication(
                "No authorization code provided".to_string(),
            ));
        }

        flow.exchange_code(secrets, code, OOB_REDIRECT_URI, &pkce.code_verifier)
            .await
    }
}

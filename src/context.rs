//! Application context passed explicitly to every pipeline component

use std::sync::Arc;
use tracing::Span;

use crate::config::Config;

/// Holds the configuration and the run span shared by all components
#[derive(Debug, Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    span: Span,
    run_id: String,
}

impl AppContext {
    /// Create a context with a fresh run identifier
    pub fn new(config: Config) -> Self {
        let run_id = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
        Self::with_run_id(config, run_id)
    }

    pub fn with_run_id(config: Config, run_id: impl Into<String>) -> Self {
        let run_id = run_id.into();
        let span = tracing::info_span!("run", run_id = %run_id);
        Self {
            config: Arc::new(config),
            span,
            run_id,
        }
    }

    /// Span every log line of this run is recorded under
    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }
}

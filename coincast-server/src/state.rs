use std::sync::Arc;

use chrono::{DateTime, Utc};
use coincast_runner::{ForecastService, PipelineError};

use crate::error::ApiError;

/// Shared application state, passed to all route handlers via `axum::extract::State`.
pub struct AppState {
    pub service: Arc<ForecastService>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(service: Arc<ForecastService>) -> Arc<Self> {
        Arc::new(Self {
            service,
            started_at: Utc::now(),
        })
    }

    /// Run a service call on the blocking pool.
    ///
    /// Pipeline runs do network and disk I/O and can take minutes; they never
    /// run on the async workers.
    pub async fn blocking<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&ForecastService) -> Result<T, PipelineError> + Send + 'static,
    {
        let service = Arc::clone(&self.service);
        let result = tokio::task::spawn_blocking(move || f(&service)).await?;
        result.map_err(ApiError::from)
    }
}

use std::sync::Arc;

pub mod chart;
pub mod config;
pub mod engine;
pub mod errors;
pub mod holders;
pub mod models;
pub mod routers;
pub mod services;

pub use config::{load_config, AppConfig, RunnerKind};
pub use engine::{AnalysisReport, Engine, EngineConfig};
pub use errors::{AnalysisError, Result};
pub use holders::ChartArtifactHolder;
pub use models::{AnalysisOutput, ChartMode, EngineResponse, PricePoint, PriceSeries, UploadResponse};
pub use services::{AnalysisRunner, CommandRunner, InProcessRunner, UploadService};

#[derive(Clone)]
pub struct AppState {
    pub upload: UploadService,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Result<Self> {
        Ok(AppState {
            upload: UploadService::new(config.clone())?,
            config: Arc::new(config),
        })
    }
}

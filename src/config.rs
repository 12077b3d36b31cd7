use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use config::{Config, Environment};
use serde::Deserialize;

use crate::engine::EngineConfig;
use crate::models::ChartMode;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_MAX_RETAINED_CHARTS: usize = 20;
pub const DEFAULT_ANALYSIS_TIMEOUT_SECS: u64 = 60;

/// Where the analysis step runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerKind {
    /// The engine inside this process, on the blocking thread pool.
    InProcess,
    /// An external command that speaks the JSON output contract.
    Command,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Prefix turning a relative `chartPath` into a reachable `chartUrl`.
    pub base_url: String,
    pub frontend_url: Option<String>,
    pub upload_dir: PathBuf,
    pub chart_dir: PathBuf,
    pub chart_route: String,
    pub chart_mode: ChartMode,
    pub runner: RunnerKind,
    /// Program and leading arguments; the uploaded file path is appended.
    #[serde(default)]
    pub analysis_command: Vec<String>,
    pub analysis_timeout_secs: Option<u64>,
    pub max_upload_bytes: Option<usize>,
    pub max_rows: Option<usize>,
    pub max_retained_charts: Option<usize>,
    pub log_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            host: "0.0.0.0".to_string(),
            port: 5000,
            base_url: "http://localhost:5000".to_string(),
            frontend_url: None,
            upload_dir: PathBuf::from("uploads/incoming"),
            chart_dir: PathBuf::from("uploads"),
            chart_route: "uploads".to_string(),
            chart_mode: ChartMode::Image,
            runner: RunnerKind::InProcess,
            analysis_command: Vec::new(),
            analysis_timeout_secs: None,
            max_upload_bytes: None,
            max_rows: None,
            max_retained_charts: None,
            log_dir: None,
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(anyhow::anyhow!("base_url cannot be empty"));
        }

        let route = self.chart_route.trim_matches('/');
        if route.is_empty() || route.split('/').any(|part| part == "..") {
            return Err(anyhow::anyhow!("chart_route must be a non-empty relative path"));
        }

        if self.runner == RunnerKind::Command && self.analysis_command.is_empty() {
            return Err(anyhow::anyhow!(
                "analysis_command is required when runner is 'command'"
            ));
        }

        if let Some(max_upload) = self.max_upload_bytes {
            if max_upload == 0 || max_upload > 100 * 1024 * 1024 {
                return Err(anyhow::anyhow!("max_upload_bytes must be between 1 and 100 MiB"));
            }
        }

        if let Some(max_rows) = self.max_rows {
            if max_rows == 0 {
                return Err(anyhow::anyhow!("max_rows must be at least 1"));
            }
        }

        if let Some(retained) = self.max_retained_charts {
            if retained == 0 || retained > 10_000 {
                return Err(anyhow::anyhow!("max_retained_charts must be between 1 and 10000"));
            }
        }

        if let Some(timeout) = self.analysis_timeout_secs {
            if timeout == 0 || timeout > 3600 {
                return Err(anyhow::anyhow!("analysis_timeout_secs must be between 1 and 3600"));
            }
        }

        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            chart_mode: self.chart_mode,
            chart_dir: self.chart_dir.clone(),
            chart_route: self.chart_route.trim_matches('/').to_string(),
            max_rows: self.max_rows,
        }
    }

    pub fn upload_limit(&self) -> usize {
        self.max_upload_bytes.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES)
    }

    pub fn retained_charts(&self) -> usize {
        self.max_retained_charts.unwrap_or(DEFAULT_MAX_RETAINED_CHARTS)
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_secs(
            self.analysis_timeout_secs
                .unwrap_or(DEFAULT_ANALYSIS_TIMEOUT_SECS),
        )
    }

    /// `base_url` joined with a relative chart path.
    pub fn chart_url(&self, chart_path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            chart_path.trim_start_matches('/')
        )
    }
}

pub fn load_config() -> Result<AppConfig> {
    dotenvy::dotenv().ok();

    let settings = Config::builder()
        .set_default("host", "0.0.0.0")?
        .set_default("port", 5000)?
        .set_default("base_url", "http://localhost:5000")?
        .set_default("upload_dir", "uploads/incoming")?
        .set_default("chart_dir", "uploads")?
        .set_default("chart_route", "uploads")?
        .set_default("chart_mode", "image")?
        .set_default("runner", "in_process")?
        .add_source(config::File::with_name("config").required(false))
        .add_source(
            Environment::with_prefix("STOCK_ANALYZER")
                .try_parsing(true)
                .list_separator(" ")
                .with_list_parse_key("analysis_command"),
        )
        .build()?;

    let mut config: AppConfig = settings.try_deserialize()?;

    if let Ok(port) = env::var("PORT") {
        config.port = port
            .parse()
            .map_err(|_| anyhow::anyhow!("PORT must be a port number, got '{}'", port))?;
    }

    if let Ok(frontend_url) = env::var("FRONTEND_URL") {
        config.frontend_url = Some(frontend_url);
    }

    config.validate()?;

    Ok(config)
}

use std::path::Path;
use std::sync::Arc;

use uuid::Uuid;

use crate::config::AppConfig;
use crate::errors::{AnalysisError, Result};
use crate::holders::ChartArtifactHolder;
use crate::models::UploadResponse;
use crate::services::runner::{runner_from_config, AnalysisRunner};

const ACCEPTED_EXTENSIONS: [&str; 5] = ["csv", "xlsx", "xlsm", "xls", "ods"];

/// Stores an upload, runs the analysis on it and always deletes it afterwards.
#[derive(Clone)]
pub struct UploadService {
    runner: Arc<dyn AnalysisRunner>,
    artifacts: ChartArtifactHolder,
    config: AppConfig,
}

impl UploadService {
    pub fn new(config: AppConfig) -> Result<Self> {
        let runner = runner_from_config(&config)?;
        Ok(Self::with_runner(config, runner))
    }

    pub fn with_runner(config: AppConfig, runner: Arc<dyn AnalysisRunner>) -> Self {
        UploadService {
            runner,
            artifacts: ChartArtifactHolder::new(config.retained_charts()),
            config,
        }
    }

    pub fn artifacts(&self) -> &ChartArtifactHolder {
        &self.artifacts
    }

    pub async fn analyze_upload(&self, file_name: Option<&str>, bytes: &[u8]) -> Result<UploadResponse> {
        let extension = upload_extension(file_name)?;

        tokio::fs::create_dir_all(&self.config.upload_dir).await?;
        let upload_path = self
            .config
            .upload_dir
            .join(format!("{}.{}", Uuid::new_v4(), extension));

        let result = match tokio::fs::write(&upload_path, bytes).await {
            Ok(()) => {
                tracing::info!(
                    "Saved upload {} ({} bytes) to {}",
                    file_name.unwrap_or("(unnamed)"),
                    bytes.len(),
                    upload_path.display()
                );
                self.runner.run(&upload_path).await
            }
            Err(e) => Err(e.into()),
        };

        if let Err(e) = tokio::fs::remove_file(&upload_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to delete uploaded file {}: {}", upload_path.display(), e);
            }
        }

        let analysis = result?;

        let chart_url = match analysis.chart_path.as_deref() {
            Some(chart_path) => {
                self.track_chart(chart_path).await?;
                Some(self.config.chart_url(chart_path))
            }
            None => None,
        };

        Ok(UploadResponse {
            analysis,
            chart_url,
        })
    }

    async fn track_chart(&self, chart_path: &str) -> Result<()> {
        if let Some(name) = Path::new(chart_path).file_name() {
            let evicted = self.artifacts.add(self.config.chart_dir.join(name)).await?;
            if !evicted.is_empty() {
                tracing::debug!("Evicted {} old charts", evicted.len());
            }
        }
        Ok(())
    }
}

fn upload_extension(file_name: Option<&str>) -> Result<String> {
    let extension = file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    if ACCEPTED_EXTENSIONS.contains(&extension.as_str()) {
        Ok(extension)
    } else if extension.is_empty() {
        Err(AnalysisError::UnsupportedFormat("(no extension)".to_string()))
    } else {
        Err(AnalysisError::UnsupportedFormat(extension))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnalysisOutput;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use tokio::sync::Mutex;

    /// Records the path it was given and whether the file existed at the time.
    struct RecordingRunner {
        seen: Mutex<Option<(PathBuf, bool)>>,
        fail: bool,
    }

    #[async_trait]
    impl AnalysisRunner for RecordingRunner {
        async fn run(&self, input: &Path) -> Result<AnalysisOutput> {
            *self.seen.lock().await = Some((input.to_path_buf(), input.exists()));
            if self.fail {
                return Err(AnalysisError::EmptyData("nothing".to_string()));
            }
            Ok(AnalysisOutput {
                message: "Analysis completed".to_string(),
                price_column: "Avg".to_string(),
                dates: vec!["2024-01-01".to_string()],
                prices: vec![1.0],
                avg: 1.0,
                dma50: vec![None],
                dma100: vec![None],
                dma200: vec![None],
                chart_path: Some("uploads/chart-1.svg".to_string()),
                chart_data: None,
                has_predictions: false,
                predictions: Vec::new(),
                prediction_dates: Vec::new(),
                forecast_model: None,
                dropped_rows: 0,
                non_positive_prices: 0,
            })
        }
    }

    fn service(dir: &Path, fail: bool) -> (UploadService, Arc<RecordingRunner>) {
        let config = AppConfig {
            base_url: "http://example.test/".to_string(),
            upload_dir: dir.join("incoming"),
            chart_dir: dir.join("charts"),
            ..AppConfig::default()
        };
        let runner = Arc::new(RecordingRunner {
            seen: Mutex::new(None),
            fail,
        });
        (UploadService::with_runner(config, runner.clone()), runner)
    }

    #[tokio::test]
    async fn upload_is_deleted_after_success() {
        let dir = tempfile::tempdir().unwrap();
        let (service, runner) = service(dir.path(), false);

        let response = service.analyze_upload(Some("prices.CSV"), b"Date,Avg\n").await.unwrap();

        let (path, existed) = runner.seen.lock().await.clone().unwrap();
        assert!(existed);
        assert_eq!(path.extension().unwrap(), "csv");
        assert!(!path.exists());
        assert_eq!(
            response.chart_url.as_deref(),
            Some("http://example.test/uploads/chart-1.svg")
        );
        assert_eq!(service.artifacts().len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn upload_is_deleted_after_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (service, runner) = service(dir.path(), true);

        let err = service.analyze_upload(Some("prices.xlsx"), b"..").await.unwrap_err();
        assert!(matches!(err, AnalysisError::EmptyData(_)));

        let (path, _) = runner.seen.lock().await.clone().unwrap();
        assert!(!path.exists());
        assert!(service.artifacts().is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn unsupported_extension_never_reaches_the_runner() {
        let dir = tempfile::tempdir().unwrap();
        let (service, runner) = service(dir.path(), false);

        let err = service.analyze_upload(Some("notes.txt"), b"hi").await.unwrap_err();
        assert!(err.is_client_error());
        assert!(runner.seen.lock().await.is_none());

        let err = service.analyze_upload(None, b"hi").await.unwrap_err();
        assert!(matches!(err, AnalysisError::UnsupportedFormat(_)));
    }
}

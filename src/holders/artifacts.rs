use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Mutex;

use crate::errors::Result;

/// Tracks chart files produced for recent requests and deletes the oldest
/// once more than `max_retained` are on disk.
#[derive(Clone)]
pub struct ChartArtifactHolder {
    charts: Arc<Mutex<VecDeque<PathBuf>>>,
    max_retained: usize,
}

impl ChartArtifactHolder {
    pub fn new(max_retained: usize) -> Self {
        ChartArtifactHolder {
            charts: Arc::new(Mutex::new(VecDeque::new())),
            max_retained: max_retained.max(1),
        }
    }

    /// Records a new chart and removes whatever falls out of the retention window.
    /// Returns the paths that were evicted.
    pub async fn add(&self, path: PathBuf) -> Result<Vec<PathBuf>> {
        let evicted: Vec<PathBuf> = {
            let mut charts = self.charts.lock().await;
            charts.push_back(path);
            let excess = charts.len().saturating_sub(self.max_retained);
            charts.drain(..excess).collect()
        };

        let removals = evicted.iter().map(|p| remove_chart(p));
        join_all(removals).await;

        Ok(evicted)
    }

    pub async fn len(&self) -> Result<usize> {
        let charts = self.charts.lock().await;
        Ok(charts.len())
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

async fn remove_chart(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!("Removed old chart {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to delete chart {}: {}", path.display(), e),
    }
}

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::{AppConfig, RunnerKind};
use crate::engine::Engine;
use crate::errors::{AnalysisError, Result};
use crate::models::{AnalysisOutput, EngineResponse};

/// Runs one analysis over an uploaded file.
#[async_trait]
pub trait AnalysisRunner: Send + Sync {
    async fn run(&self, input: &Path) -> Result<AnalysisOutput>;
}

pub fn runner_from_config(config: &AppConfig) -> Result<Arc<dyn AnalysisRunner>> {
    match config.runner {
        RunnerKind::InProcess => Ok(Arc::new(InProcessRunner::new(Engine::new(
            &config.engine_config(),
        )))),
        RunnerKind::Command => Ok(Arc::new(CommandRunner::new(
            &config.analysis_command,
            config.analysis_timeout(),
        )?)),
    }
}

pub struct InProcessRunner {
    engine: Arc<Engine>,
}

impl InProcessRunner {
    pub fn new(engine: Engine) -> Self {
        InProcessRunner {
            engine: Arc::new(engine),
        }
    }
}

#[async_trait]
impl AnalysisRunner for InProcessRunner {
    async fn run(&self, input: &Path) -> Result<AnalysisOutput> {
        let engine = Arc::clone(&self.engine);
        let input = input.to_path_buf();
        let report = tokio::task::spawn_blocking(move || engine.analyze_file(&input)).await??;
        Ok(report.to_output())
    }
}

/// Runs an external program with the input path as its last argument and
/// reads the result document from its stdout.
///
/// The exit status decides success. stderr is only logged.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandRunner {
    pub fn new(command: &[String], timeout: Duration) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| AnalysisError::AnalysisStep("analysis command is empty".to_string()))?;

        Ok(CommandRunner {
            program: program.clone(),
            args: args.to_vec(),
            timeout,
        })
    }
}

#[async_trait]
impl AnalysisRunner for CommandRunner {
    async fn run(&self, input: &Path) -> Result<AnalysisOutput> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(input)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        tracing::debug!("Running {} {:?} {}", self.program, self.args, input.display());

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| {
                AnalysisError::AnalysisStep(format!(
                    "'{}' did not finish within {}s",
                    self.program,
                    self.timeout.as_secs()
                ))
            })??;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            tracing::warn!("{} stderr: {}", self.program, stderr.trim());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        interpret_output(output.status.success(), output.status.code(), &stdout)
    }
}

/// Applies the output contract: a failed exit is an error whatever stdout
/// says, and so is an `error` field in an otherwise valid document.
pub fn interpret_output(success: bool, code: Option<i32>, stdout: &str) -> Result<AnalysisOutput> {
    let parsed = parse_document(stdout);

    if !success {
        let detail = match parsed {
            Some(Ok(EngineResponse::Failure { error })) => error,
            _ => "no error document on stdout".to_string(),
        };
        let status = code.map_or_else(|| "a signal".to_string(), |c| format!("status {}", c));
        return Err(AnalysisError::AnalysisStep(format!(
            "analysis exited with {}: {}",
            status, detail
        )));
    }

    match parsed {
        Some(Ok(EngineResponse::Success(output))) => Ok(*output),
        Some(Ok(EngineResponse::Failure { error })) => Err(AnalysisError::AnalysisStep(error)),
        Some(Err(e)) => Err(AnalysisError::AnalysisStep(format!(
            "Failed to parse analysis output: {}",
            e
        ))),
        None => Err(AnalysisError::AnalysisStep(
            "analysis produced no output".to_string(),
        )),
    }
}

/// The whole of stdout, or failing that its last non-empty line.
fn parse_document(stdout: &str) -> Option<serde_json::Result<EngineResponse>> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return None;
    }

    match serde_json::from_str(trimmed) {
        Ok(doc) => Some(Ok(doc)),
        Err(e) => {
            let last = trimmed.lines().rev().map(str::trim).find(|l| !l.is_empty())?;
            Some(serde_json::from_str(last).map_err(|_| e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{"dates":["2024-01-01"],"avg":10.0,"dma50":[null],"dma100":[null],"dma200":[null],"chartPath":"uploads/chart.svg","hasPredictions":false}"#;

    #[test]
    fn success_document_is_accepted() {
        let output = interpret_output(true, Some(0), DOC).unwrap();
        assert_eq!(output.avg, 10.0);
        assert_eq!(output.chart_path.as_deref(), Some("uploads/chart.svg"));
        assert!(output.predictions.is_empty());
    }

    #[test]
    fn progress_lines_before_the_document_are_skipped() {
        let stdout = format!("loading...\n{}\n", DOC);
        assert!(interpret_output(true, Some(0), &stdout).is_ok());
    }

    #[test]
    fn error_field_is_a_failure_even_with_zero_exit() {
        let err = interpret_output(true, Some(0), r#"{"error":"Missing 'Date' column"}"#).unwrap_err();
        assert!(err.to_string().contains("Missing 'Date' column"));
    }

    #[test]
    fn non_zero_exit_is_a_failure_even_with_a_document() {
        let err = interpret_output(false, Some(2), DOC).unwrap_err();
        assert!(err.to_string().contains("status 2"));
    }

    #[test]
    fn non_zero_exit_reports_the_error_document() {
        let err = interpret_output(false, Some(1), r#"{"error":"bad file"}"#).unwrap_err();
        assert!(err.to_string().contains("bad file"));
    }

    #[test]
    fn garbage_and_empty_output_are_failures() {
        assert!(interpret_output(true, Some(0), "Traceback (most recent call last)").is_err());
        assert!(interpret_output(true, Some(0), "   ").is_err());
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(CommandRunner::new(&[], Duration::from_secs(1)).is_err());
    }
}

//! Declarative scaling through docker-compose

use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::{Output, Stdio};

use tokio::process::Command;
use tracing::{debug, info};

use super::{async_trait, ExecutionPath, OrchestrationBackend, ScaleReport};
use crate::config::{ScalingConfig, DEFAULT_COMPOSE_PROGRAM};
use crate::error::{Result, ScalerError};

/// Longest stderr excerpt carried in an error
const STDERR_TAIL: usize = 512;

/// Compose v2 plugin, tried when the standalone binary is missing
const COMPOSE_PLUGIN: [&str; 2] = ["docker", "compose"];

#[derive(Debug, Clone, PartialEq)]
struct ComposeCommand {
    program: String,
    leading_args: Vec<String>,
}

impl ComposeCommand {
    fn parse(words: &[String]) -> Result<Self> {
        let (program, leading_args) = words
            .split_first()
            .ok_or_else(|| ScalerError::Config("compose command is empty".into()))?;
        Ok(Self {
            program: program.clone(),
            leading_args: leading_args.to_vec(),
        })
    }

    fn words(&self) -> Vec<String> {
        let mut words = vec![self.program.clone()];
        words.extend(self.leading_args.iter().cloned());
        words
    }
}

impl std::fmt::Display for ComposeCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.words().join(" "))
    }
}

/// Runs `<compose> up -d --scale <service>=<n>`
#[derive(Debug, Clone)]
pub struct ComposeBackend {
    command: ComposeCommand,
    fallback: Option<ComposeCommand>,
    service: String,
    project_dir: Option<PathBuf>,
}

impl ComposeBackend {
    pub fn new(
        command: &[String],
        service: impl Into<String>,
        project_dir: Option<PathBuf>,
    ) -> Result<Self> {
        Ok(Self {
            command: ComposeCommand::parse(command)?,
            fallback: None,
            service: service.into(),
            project_dir,
        })
    }

    /// Command to run when the primary program is not installed
    pub fn with_fallback(mut self, command: &[String]) -> Result<Self> {
        self.fallback = Some(ComposeCommand::parse(command)?);
        Ok(self)
    }

    /// Backend from configuration, `None` when compose is disabled
    pub fn from_config(config: &ScalingConfig) -> Result<Option<Self>> {
        if !config.compose_enabled {
            return Ok(None);
        }
        let backend = Self::new(
            &config.compose_command,
            config.service_label.clone(),
            config.compose_project_dir.clone(),
        )?;
        if config.compose_command == [DEFAULT_COMPOSE_PROGRAM] {
            let plugin: Vec<String> = COMPOSE_PLUGIN.iter().map(|w| w.to_string()).collect();
            return backend.with_fallback(&plugin).map(Some);
        }
        Ok(Some(backend))
    }

    pub fn fallback_command(&self) -> Option<Vec<String>> {
        self.fallback.as_ref().map(ComposeCommand::words)
    }

    pub fn args(&self, target: u32) -> Vec<String> {
        self.args_for(&self.command, target)
    }

    fn args_for(&self, command: &ComposeCommand, target: u32) -> Vec<String> {
        let mut args = command.leading_args.clone();
        args.extend([
            "up".to_string(),
            "-d".to_string(),
            "--scale".to_string(),
            format!("{}={}", self.service, target),
        ]);
        args
    }

    async fn run(&self, command: &ComposeCommand, target: u32) -> std::io::Result<Output> {
        let args = self.args_for(command, target);
        let mut cmd = Command::new(&command.program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.project_dir {
            cmd.current_dir(dir);
        }

        debug!(program = %command.program, args = ?args, "Running compose scale");
        cmd.output().await
    }
}

fn tail(text: &str) -> String {
    let trimmed = text.trim();
    let start = trimmed
        .char_indices()
        .rev()
        .nth(STDERR_TAIL)
        .map(|(i, _)| i)
        .unwrap_or(0);
    trimmed[start..].to_string()
}

fn not_found(result: &std::io::Result<Output>) -> bool {
    matches!(result, Err(e) if e.kind() == ErrorKind::NotFound)
}

#[async_trait]
impl OrchestrationBackend for ComposeBackend {
    fn path(&self) -> ExecutionPath {
        ExecutionPath::Declarative
    }

    async fn scale(&self, _current: u32, target: u32) -> Result<ScaleReport> {
        let mut command = &self.command;
        let mut result = self.run(command, target).await;
        if not_found(&result) {
            if let Some(fallback) = &self.fallback {
                debug!(missing = %command, fallback = %fallback, "Compose program not found");
                command = fallback;
                result = self.run(command, target).await;
            }
        }

        let output = match result {
            Ok(output) => output,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ScalerError::OrchestratorUnavailable(format!(
                    "{} not found",
                    command
                )));
            }
            Err(e) => {
                return Err(ScalerError::OrchestratorUnavailable(format!(
                    "failed to run {}: {}",
                    command, e
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ScalerError::OrchestratorFailed(format!(
                "{} exited with {}: {}",
                command,
                output.status,
                tail(&stderr)
            )));
        }

        info!(service = %self.service, target = target, "Compose scale applied");
        Ok(ScaleReport::default())
    }
}

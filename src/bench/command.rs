//! JSON-over-stdio subprocess calls
//!
//! Protocol:
//! - Harness writes one JSON document on stdin, then closes it
//! - The program writes its result as the last non-empty stdout line

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::BenchError;
use crate::util::{redact_api_keys, truncate};

/// Program and arguments of a command collaborator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn is_configured(&self) -> bool {
        !self.program.trim().is_empty()
    }
}

/// Run `spec` in `cwd` with `input` on stdin and parse its JSON answer.
pub async fn run_json(
    stage: &'static str,
    spec: &CommandSpec,
    cwd: &Path,
    input: &Value,
) -> Result<Value, BenchError> {
    let collaborator = |message: String| BenchError::Collaborator { stage, message };

    if !spec.is_configured() {
        return Err(collaborator("no command configured".to_string()));
    }

    debug!("Running {} command: {} {:?}", stage, spec.program, spec.args);

    let mut child = Command::new(&spec.program)
        .args(&spec.args)
        .envs(spec.env.iter().map(|(k, v)| (k, v)))
        .current_dir(cwd)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| collaborator(format!("failed to start `{}`: {}", spec.program, e)))?;

    let request = serde_json::to_vec(input)?;
    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| collaborator("failed to get stdin".to_string()))?;
    stdin.write_all(&request).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await?;
    drop(stdin);

    let output = child.wait_with_output().await?;
    let stderr = redact_api_keys(&String::from_utf8_lossy(&output.stderr));
    if !stderr.trim().is_empty() {
        debug!("{} stderr: {}", stage, truncate(stderr.trim(), 2000));
    }

    if !output.status.success() {
        warn!("{} command exited with {}", stage, output.status);
        return Err(collaborator(format!(
            "exited with {}: {}",
            output.status,
            truncate(stderr.trim(), 500)
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let line = stdout
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| collaborator("no output on stdout".to_string()))?;

    serde_json::from_str(line.trim())
        .map_err(|e| collaborator(format!("invalid JSON output: {}", e)))
}

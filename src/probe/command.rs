use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::Probe;
use crate::ProbeConfig;
use crate::ProbeError;
use crate::ResourceKey;
use crate::Snapshot;

/// Stderr is truncated to this many bytes in error messages
const STDERR_LIMIT: usize = 512;

/// Runs an external command and decodes its stdout as a JSON snapshot.
///
/// The child is killed when the invocation is cancelled or times out.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    program: String,
    args: Vec<String>,
}

impl CommandProbe {
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
    ) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_config(config: &ProbeConfig) -> Self {
        Self::new(config.command.clone(), config.args.clone())
    }
}

#[async_trait]
impl Probe for CommandProbe {
    async fn fetch(
        &self,
        key: &ResourceKey,
        cancel: CancellationToken,
    ) -> std::result::Result<Snapshot, ProbeError> {
        trace!(%key, program = %self.program, "spawning probe command");
        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProbeError::failed(key, format!("spawn {}: {e}", self.program)))?;

        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(ProbeError::Cancelled { key: key.clone() }),
            output = child.wait_with_output() => output
                .map_err(|e| ProbeError::failed(key, format!("wait {}: {e}", self.program)))?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = truncate(stderr.trim(), STDERR_LIMIT);
            return Err(ProbeError::failed(
                key,
                format!("{} exited with {}: {stderr}", self.program, output.status),
            ));
        }

        let value: serde_json::Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| ProbeError::failed(key, format!("invalid JSON from {}: {e}", self.program)))?;
        Snapshot::decode(value)
            .map_err(|e| ProbeError::failed(key, format!("unexpected payload from {}: {e}", self.program)))
    }
}

fn truncate(
    s: &str,
    limit: usize,
) -> &str {
    if s.len() <= limit {
        return s;
    }
    let mut end = limit;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

//! External accessibility runner.
//!
//! The runner is spawned once per scan and speaks line-delimited JSON. Each
//! request is `{"file": "<path>", "runOnly": ["wcag2a", ...]}` and each reply
//! is `{"violations": [...]}` or `{"error": "<message>"}`.

use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use serde::{Deserialize, Serialize};

use super::{AccessibilityEngine, EvaluationSandbox, Violation};
use crate::error::{CourseQaError, Result};

/// Program and arguments of an external runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Executable name or path.
    pub program: String,
    /// Arguments passed before any request is sent.
    pub args: Vec<String>,
}

impl CommandSpec {
    /// Split a whitespace-separated command line. Returns `None` when blank.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }
}

/// Engine backed by an external runner process.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    spec: CommandSpec,
}

impl CommandEngine {
    /// Create an engine that spawns `spec` on every launch.
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }
}

impl AccessibilityEngine for CommandEngine {
    fn launch(&self) -> Result<Box<dyn EvaluationSandbox>> {
        let mut child = Command::new(&self.spec.program)
            .args(&self.spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|err| match err.kind() {
                ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                    CourseQaError::EngineUnavailable(format!("{}: {err}", self.spec.program))
                }
                _ => CourseQaError::Io(err),
            })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take().map(BufReader::new);
        let Some(stdout) = stdout else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(CourseQaError::EngineUnavailable(
                "runner stdout was not captured".to_string(),
            ));
        };
        log::debug!("started accessibility runner {}", self.spec.program);
        Ok(Box::new(CommandSandbox {
            child,
            stdin,
            stdout,
            closed: false,
        }))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RunnerRequest<'a> {
    file: &'a Path,
    run_only: &'a [String],
}

#[derive(Deserialize)]
struct RunnerReply {
    #[serde(default)]
    violations: Vec<Violation>,
    #[serde(default)]
    error: Option<String>,
}

struct CommandSandbox {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    closed: bool,
}

impl EvaluationSandbox for CommandSandbox {
    fn evaluate(&mut self, document: &Path, tags: &[String]) -> Result<Vec<Violation>> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| CourseQaError::External("accessibility runner is closed".to_string()))?;
        let mut request = serde_json::to_string(&RunnerRequest {
            file: document,
            run_only: tags,
        })?;
        request.push('\n');
        stdin.write_all(request.as_bytes())?;
        stdin.flush()?;

        let mut line = String::new();
        if self.stdout.read_line(&mut line)? == 0 {
            return Err(CourseQaError::External(
                "accessibility runner exited before answering".to_string(),
            ));
        }
        let reply: RunnerReply = serde_json::from_str(line.trim())?;
        match reply.error {
            Some(message) => Err(CourseQaError::External(message)),
            None => Ok(reply.violations),
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        drop(self.stdin.take());
        // The child may already have exited after stdin closed.
        let _ = self.child.kill();
        self.child.wait()?;
        Ok(())
    }
}

impl Drop for CommandSandbox {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::warn!("failed to reap accessibility runner: {err}");
        }
    }
}

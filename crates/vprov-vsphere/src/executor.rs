//! `govc` process runner.
//!
//! Spawns the `govc` binary with the connection passed through its
//! `GOVC_*` environment variables and returns trimmed stdout. Non-zero
//! exits surface stderr verbatim, classified into an error kind.

use crate::error::{VsphereError, VsphereResult};
use crate::types::GovcConfig;

use async_trait::async_trait;
use log::{debug, warn};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Environment handed to one `govc` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GovcEnv {
    pub url: String,
    pub username: String,
    pub password: String,
    pub insecure: bool,
    pub datacenter: Option<String>,
}

impl GovcEnv {
    /// Variable name / value pairs in the order they are applied.
    pub fn vars(&self) -> Vec<(&'static str, String)> {
        let mut vars = vec![
            ("GOVC_URL", self.url.clone()),
            ("GOVC_USERNAME", self.username.clone()),
            ("GOVC_PASSWORD", self.password.clone()),
            ("GOVC_INSECURE", if self.insecure { "1" } else { "0" }.to_string()),
        ];
        if let Some(ref dc) = self.datacenter {
            vars.push(("GOVC_DATACENTER", dc.clone()));
        }
        vars
    }
}

/// Runs one `govc` subcommand. Implemented by [`GovcExecutor`] and by
/// test doubles.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, args: &[String], env: &GovcEnv) -> VsphereResult<String>;
}

/// Spawns the real `govc` binary.
#[derive(Debug, Clone)]
pub struct GovcExecutor {
    binary_path: String,
    shell_wrapper: Option<Vec<String>>,
    timeout: Option<Duration>,
}

impl GovcExecutor {
    pub fn new(config: &GovcConfig) -> Self {
        Self {
            binary_path: config.binary_path.clone(),
            shell_wrapper: config.shell_wrapper.clone().filter(|w| !w.is_empty()),
            timeout: config.timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn binary_path(&self) -> &str {
        &self.binary_path
    }

    /// Fail fast when the binary is not where we expect it.
    ///
    /// Skipped for wrapped execution; the binary lives in another
    /// environment there.
    fn check_binary(&self) -> VsphereResult<()> {
        if self.shell_wrapper.is_some() {
            return Ok(());
        }
        let found = if self.binary_path.contains('/') || self.binary_path.contains('\\') {
            Path::new(&self.binary_path).is_file()
        } else {
            which::which(&self.binary_path).is_ok()
        };
        if found {
            Ok(())
        } else {
            Err(VsphereError::binary_unavailable(format!(
                "govc binary not found at '{}'. Install govc from https://github.com/vmware/govmomi/releases",
                self.binary_path
            )))
        }
    }

    fn build_command(&self, args: &[String]) -> Command {
        match self.shell_wrapper {
            Some(ref wrapper) => {
                let mut cmd = Command::new(&wrapper[0]);
                cmd.args(&wrapper[1..]).arg(&self.binary_path).args(args);
                cmd
            }
            None => {
                let mut cmd = Command::new(&self.binary_path);
                cmd.args(args);
                cmd
            }
        }
    }
}

#[async_trait]
impl CommandRunner for GovcExecutor {
    async fn run(&self, args: &[String], env: &GovcEnv) -> VsphereResult<String> {
        self.check_binary()?;

        debug!("Running govc {} (url={}, user={})", args.join(" "), env.url, env.username);

        let mut cmd = self.build_command(args);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (k, v) in env.vars() {
            cmd.env(k, v);
        }

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, cmd.output())
                .await
                .map_err(|_| {
                    VsphereError::timeout(format!(
                        "govc {} timed out after {}s",
                        args.first().map(String::as_str).unwrap_or(""),
                        limit.as_secs()
                    ))
                })??,
            None => cmd.output().await?,
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            debug!("govc exited with code {}: stderr={}", code, stderr.trim());
            let text = if stderr.trim().is_empty() { &stdout } else { &stderr };
            return Err(VsphereError::from_stderr(text));
        }

        if !stderr.trim().is_empty() {
            warn!("govc {} wrote to stderr: {}", args.join(" "), stderr.trim());
        }

        Ok(stdout)
    }
}

/// Convert borrowed argument slices into the owned form `run` takes.
pub fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

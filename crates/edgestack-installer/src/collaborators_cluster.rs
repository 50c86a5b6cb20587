//! Cluster access through the kubectl command-line tool.

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use edgestack_core::program_path;

use crate::process::run_command;

#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Path of the cluster CLI, or an error when it is not installed.
    fn locate(&self) -> Result<PathBuf>;

    /// Run a command and return its stdout.
    async fn capture(&self, label: &str, input: Option<&str>, args: &[&str]) -> Result<String>;

    /// Run a command for its side effects.
    async fn run(&self, label: &str, input: Option<&str>, args: &[&str]) -> Result<()> {
        self.capture(label, input, args).await.map(|_| ())
    }
}

/// Shells out to `kubectl`, pinned to one kubeconfig context when given.
pub struct Kubectl {
    context: Option<String>,
}

impl Kubectl {
    pub fn new(context: Option<String>) -> Self {
        Self {
            context: context.filter(|ctx| !ctx.is_empty()),
        }
    }

    fn full_args(&self, args: &[&str]) -> Vec<String> {
        let mut full = Vec::with_capacity(args.len() + 2);
        if let Some(context) = &self.context {
            full.push("--context".to_string());
            full.push(context.clone());
        }
        full.extend(args.iter().map(|arg| arg.to_string()));
        full
    }
}

#[async_trait]
impl ClusterClient for Kubectl {
    fn locate(&self) -> Result<PathBuf> {
        program_path("kubectl").ok_or_else(|| anyhow!("kubectl not found in PATH"))
    }

    async fn capture(&self, label: &str, input: Option<&str>, args: &[&str]) -> Result<String> {
        let kubectl = self.locate()?;
        run_command(label, kubectl, &self.full_args(args), input).await
    }
}

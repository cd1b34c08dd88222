use crate::error::{Result, StoreError};
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Read-only git operations, backed by the `git` binary.
pub struct GitStore {
    root: PathBuf,
}

impl GitStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .current_dir(&self.root)
            .args(args)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(StoreError::Git {
                command: args.join(" "),
                message: if stderr.is_empty() {
                    format!("exit status {:?}", output.status.code())
                } else {
                    stderr
                },
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    pub async fn log(&self, path: Option<&str>, max_count: usize) -> Result<String> {
        let count = format!("--max-count={}", max_count.clamp(1, 100));
        let mut args = vec!["log", "--oneline", "--no-decorate", count.as_str()];
        if let Some(path) = path {
            args.push("--");
            args.push(path);
        }
        self.run(&args).await
    }

    pub async fn blame(
        &self,
        path: &str,
        start_line: Option<usize>,
        end_line: Option<usize>,
    ) -> Result<String> {
        let mut args = vec!["blame".to_string(), "--date=short".to_string()];
        if let (Some(start), Some(end)) = (start_line, end_line) {
            args.push(format!("-L{start},{end}"));
        }
        args.push("--".to_string());
        args.push(path.to_string());
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&arg_refs).await
    }

    pub async fn diff(&self, spec: Option<&str>) -> Result<String> {
        let mut args = vec!["diff", "--stat"];
        if let Some(spec) = spec {
            args.push(spec);
        }
        self.run(&args).await
    }

    pub async fn status(&self) -> Result<String> {
        self.run(&["status", "--porcelain"]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn status_fails_outside_a_repository() {
        let temp = TempDir::new().expect("tempdir");
        let git = GitStore::new(temp.path());
        assert!(git.status().await.is_err());
    }
}

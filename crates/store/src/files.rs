use crate::error::{Result, StoreError};
use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// A bounded, root-locked view of the project filesystem.
pub struct FileStore {
    root: PathBuf,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileSlice {
    pub path: String,
    pub content: String,
    pub start_line: usize,
    pub end_line: usize,
    pub total_lines: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TreeListing {
    pub root: String,
    pub entries: Vec<String>,
    pub dir_count: usize,
    pub file_count: usize,
    pub depth: usize,
    pub truncated: bool,
}

const MAX_TREE_ENTRIES: usize = 500;

impl FileStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a project-relative path, rejecting traversal and absolute paths.
    pub fn resolve(&self, raw: &str) -> Result<PathBuf> {
        let path = Path::new(raw);
        let mut has_component = false;
        for component in path.components() {
            match component {
                Component::Prefix(_) | Component::RootDir => {
                    return Err(StoreError::OutsideRoot(raw.to_string()));
                }
                Component::ParentDir => {
                    return Err(StoreError::OutsideRoot(raw.to_string()));
                }
                Component::CurDir => {}
                Component::Normal(_) => has_component = true,
            }
        }
        if !has_component {
            return Err(StoreError::InvalidPath(raw.to_string()));
        }
        Ok(self.root.join(path))
    }

    pub fn exists(&self, raw: &str) -> bool {
        self.resolve(raw).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Read a 1-indexed, inclusive line range, clamped to the file.
    pub async fn read_slice(
        &self,
        raw: &str,
        start_line: Option<usize>,
        end_line: Option<usize>,
    ) -> Result<FileSlice> {
        let path = self.resolve(raw)?;
        if !path.is_file() {
            return Err(StoreError::FileNotFound(path));
        }
        let content = tokio::fs::read_to_string(&path).await?;
        let lines: Vec<&str> = content.lines().collect();
        let total_lines = lines.len();

        let start = start_line.unwrap_or(1).max(1).min(total_lines.max(1));
        let end = end_line.unwrap_or(total_lines).max(start).min(total_lines.max(1));

        let slice = if total_lines == 0 {
            String::new()
        } else {
            lines[start - 1..end].join("\n")
        };

        Ok(FileSlice {
            path: raw.to_string(),
            content: slice,
            start_line: start,
            end_line: end,
            total_lines,
        })
    }

    /// Depth-bounded directory listing, gitignore-aware.
    pub fn tree(&self, raw: Option<&str>, max_depth: usize) -> Result<TreeListing> {
        let (base, display) = match raw {
            Some(raw) => (self.resolve(raw)?, raw.to_string()),
            None => (self.root.clone(), ".".to_string()),
        };
        if !base.is_dir() {
            return Err(StoreError::InvalidPath(format!("{display} is not a directory")));
        }

        let mut entries = Vec::new();
        let mut dir_count = 0;
        let mut file_count = 0;
        let mut truncated = false;

        for result in WalkBuilder::new(&base)
            .hidden(false)
            .max_depth(Some(max_depth))
            .build()
        {
            let entry = match result {
                Ok(entry) => entry,
                Err(err) => {
                    log::warn!("tree walk error under {display}: {err}");
                    continue;
                }
            };
            if entry.depth() == 0 {
                continue;
            }
            if entries.len() >= MAX_TREE_ENTRIES {
                truncated = true;
                break;
            }
            let rel = entry
                .path()
                .strip_prefix(&base)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");
            let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
            if is_dir {
                dir_count += 1;
                entries.push(format!("{rel}/"));
            } else {
                file_count += 1;
                entries.push(rel);
            }
        }

        entries.sort();
        Ok(TreeListing {
            root: display,
            entries,
            dir_count,
            file_count,
            depth: max_depth,
            truncated,
        })
    }
}

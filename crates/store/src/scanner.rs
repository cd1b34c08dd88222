use crate::error::Result;
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

/// Scanner for finding source files in a project
pub struct FileScanner {
    root: PathBuf,
}

impl FileScanner {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Scan directory for source files (.gitignore aware)
    pub fn scan(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        for result in WalkBuilder::new(&self.root).hidden(false).build() {
            match result {
                Ok(entry) => {
                    if entry.file_type().is_some_and(|ft| ft.is_file())
                        && Self::is_source_file(entry.path())
                    {
                        files.push(entry.path().to_path_buf());
                    }
                }
                Err(e) => log::warn!("Failed to read entry: {}", e),
            }
        }

        files.sort();
        log::info!("Found {} source files", files.len());
        Ok(files)
    }

    /// Check if file is a source code file
    fn is_source_file(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                matches!(
                    ext,
                    "rs" | "py" | "pyi" | "js" | "jsx" | "ts" | "tsx" | "go" | "java"
                )
            })
            .unwrap_or(false)
    }

    /// Project-root-relative path with forward slashes.
    pub fn relative_key(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        rel.to_string_lossy().replace('\\', "/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn scan_finds_only_source_files() {
        let temp = TempDir::new().expect("tempdir");
        std::fs::create_dir_all(temp.path().join("src")).expect("mkdir");
        std::fs::write(temp.path().join("src/lib.rs"), "pub fn a() {}").expect("write");
        std::fs::write(temp.path().join("notes.txt"), "not code").expect("write");
        std::fs::write(temp.path().join("tool.py"), "def b(): pass").expect("write");

        let scanner = FileScanner::new(temp.path());
        let files = scanner.scan().expect("scan");
        let keys: Vec<String> = files.iter().map(|f| scanner.relative_key(f)).collect();
        assert_eq!(keys, vec!["src/lib.rs", "tool.py"]);
    }
}

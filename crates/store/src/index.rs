use crate::embeddings::Embedder;
use crate::error::Result;
use crate::scanner::FileScanner;
use crate::symbols::{Language, SymbolExtractor, SymbolRecord};
use crate::vector::{SemanticHit, VectorIndex};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

static RUST_IMPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*use\s+([A-Za-z_][A-Za-z0-9_:]*)").expect("rust import pattern"));
static PYTHON_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:from\s+([A-Za-z_][\w.]*)\s+import|import\s+([A-Za-z_][\w.]*))")
        .expect("python import pattern")
});
static JS_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*import\s+.*?from\s+['"]([^'"]+)['"]"#).expect("js import pattern")
});

/// In-memory index over one project: symbol table, per-file imports, and the
/// semantic vector index, built in a single scan pass.
pub struct CodeIndex {
    root: PathBuf,
    files: Vec<String>,
    symbols: Vec<SymbolRecord>,
    imports: HashMap<String, Vec<String>>,
    embedder: Embedder,
    vectors: VectorIndex,
}

impl CodeIndex {
    pub async fn build(root: &Path) -> Result<Self> {
        let scanner = FileScanner::new(root);
        let paths = scanner.scan()?;
        let embedder = Embedder::new()?;

        let mut files = Vec::with_capacity(paths.len());
        let mut symbols = Vec::new();
        let mut imports = HashMap::new();
        let mut vectors = VectorIndex::new();

        for path in paths {
            let key = scanner.relative_key(&path);
            let content = match tokio::fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(err) => {
                    log::warn!("Skipping unreadable file {key}: {err}");
                    continue;
                }
            };

            let file_symbols = SymbolExtractor::extract(&key, &content);
            for symbol in &file_symbols {
                let body = slice_lines(&content, symbol.line_start, symbol.line_end, 60);
                vectors.insert(&embedder, &key, symbol.line_start, &body);
            }
            if file_symbols.is_empty() && !content.trim().is_empty() {
                // Files without extractable definitions still get a chunk so
                // semantic search can reach them.
                let head = slice_lines(&content, 1, content.lines().count(), 40);
                vectors.insert(&embedder, &key, 1, &head);
            }

            imports.insert(key.clone(), extract_imports(&key, &content));
            symbols.extend(file_symbols);
            files.push(key);
        }

        log::info!(
            "Indexed {} files, {} symbols, {} vector chunks",
            files.len(),
            symbols.len(),
            vectors.len()
        );

        Ok(Self {
            root: root.to_path_buf(),
            files,
            symbols,
            imports,
            embedder,
            vectors,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn contains_file(&self, path: &str) -> bool {
        self.files.iter().any(|f| f == path)
    }

    /// Symbol lookup. Exact matches compare the full name; partial matches are
    /// case-insensitive substring hits. `scope` filters by path prefix.
    pub fn find_symbol(
        &self,
        name: &str,
        exact: bool,
        scope: Option<&str>,
        cap: usize,
    ) -> Vec<&SymbolRecord> {
        let needle = name.to_lowercase();
        self.symbols
            .iter()
            .filter(|s| scope.is_none_or(|prefix| s.path.starts_with(prefix)))
            .filter(|s| {
                if exact {
                    s.name == name
                } else {
                    s.name.to_lowercase().contains(&needle)
                }
            })
            .take(cap)
            .collect()
    }

    pub fn file_symbols(&self, path: &str) -> Vec<&SymbolRecord> {
        self.symbols.iter().filter(|s| s.path == path).collect()
    }

    pub fn imports_of(&self, path: &str) -> Vec<String> {
        self.imports.get(path).cloned().unwrap_or_default()
    }

    /// Files whose import list mentions the given module name.
    pub fn importers_of(&self, module: &str) -> Vec<String> {
        let needle = module.trim_end_matches(".py").replace('/', ".");
        let mut out: Vec<String> = self
            .imports
            .iter()
            .filter(|(_, imports)| {
                imports.iter().any(|i| {
                    i == module || i == &needle || i.contains(&needle) || needle.contains(i.as_str())
                })
            })
            .map(|(path, _)| path.clone())
            .collect();
        out.sort();
        out
    }

    pub fn semantic_search(
        &self,
        query: &str,
        limit: usize,
        scope: Option<&str>,
    ) -> Vec<SemanticHit> {
        self.vectors.search(&self.embedder, query, limit, scope)
    }

    /// Files semantically close to an already-indexed file.
    pub fn find_similar_files(&self, path: &str, limit: usize) -> Vec<SemanticHit> {
        let reference: String = self
            .symbols
            .iter()
            .filter(|s| s.path == path)
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let reference = if reference.is_empty() {
            path.to_string()
        } else {
            reference
        };
        self.vectors
            .similar_to(&self.embedder, &reference, path, limit)
    }
}

fn extract_imports(path: &str, content: &str) -> Vec<String> {
    let pattern: &Regex = match Language::from_path(path) {
        Language::Rust => &RUST_IMPORT,
        Language::Python => &PYTHON_IMPORT,
        Language::JavaScript | Language::TypeScript => &JS_IMPORT,
        Language::Other => return Vec::new(),
    };

    let mut imports = Vec::new();
    for line in content.lines() {
        if let Some(caps) = pattern.captures(line) {
            let import = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str().to_string());
            if let Some(import) = import {
                if !imports.contains(&import) {
                    imports.push(import);
                }
            }
        }
    }
    imports
}

fn slice_lines(content: &str, start: usize, end: usize, max_lines: usize) -> String {
    content
        .lines()
        .skip(start.saturating_sub(1))
        .take(end.saturating_sub(start.saturating_sub(1)).min(max_lines))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn fixture() -> (TempDir, CodeIndex) {
        let temp = TempDir::new().expect("tempdir");
        let src = temp.path().join("src");
        tokio::fs::create_dir_all(&src).await.expect("mkdir");
        tokio::fs::write(
            src.join("auth.py"),
            "from app.db import connect\n\ndef login(user):\n    return connect(user)\n",
        )
        .await
        .expect("write");
        tokio::fs::write(
            src.join("db.py"),
            "def connect(user):\n    return None\n",
        )
        .await
        .expect("write");

        let index = CodeIndex::build(temp.path()).await.expect("index");
        (temp, index)
    }

    #[tokio::test]
    async fn exact_and_partial_symbol_lookup() {
        let (_temp, index) = fixture().await;

        let exact = index.find_symbol("login", true, None, 10);
        assert_eq!(exact.len(), 1);
        assert_eq!(exact[0].path, "src/auth.py");
        assert_eq!(exact[0].line_start, 3);

        let partial = index.find_symbol("Log", false, None, 10);
        assert_eq!(partial.len(), 1);

        assert!(index.find_symbol("login", true, Some("tests/"), 10).is_empty());
    }

    #[tokio::test]
    async fn importers_resolve_by_module_name() {
        let (_temp, index) = fixture().await;
        let importers = index.importers_of("app.db");
        assert_eq!(importers, vec!["src/auth.py"]);
    }

    #[tokio::test]
    async fn semantic_search_reaches_indexed_chunks() {
        let (_temp, index) = fixture().await;
        let hits = index.semantic_search("login user", 5, None);
        assert!(!hits.is_empty());
        assert_eq!(hits[0].path, "src/auth.py");
    }
}

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Struct,
    Enum,
    Trait,
    Class,
    Constant,
}

impl SymbolKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Struct => "struct",
            SymbolKind::Enum => "enum",
            SymbolKind::Trait => "trait",
            SymbolKind::Class => "class",
            SymbolKind::Constant => "constant",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Other,
}

impl Language {
    pub fn from_path(path: &str) -> Self {
        match path.rsplit('.').next() {
            Some("rs") => Language::Rust,
            Some("py") | Some("pyi") => Language::Python,
            Some("js") | Some("jsx") => Language::JavaScript,
            Some("ts") | Some("tsx") => Language::TypeScript,
            _ => Language::Other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Other => "other",
        }
    }
}

/// One extracted definition site.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SymbolRecord {
    pub path: String,
    pub name: String,
    pub kind: SymbolKind,
    pub line_start: usize,
    pub line_end: usize,
    pub language: Language,
}

static RUST_DEF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?(?:unsafe\s+)?(fn|struct|enum|trait|const)\s+([A-Za-z_][A-Za-z0-9_]*)",
    )
    .expect("rust symbol pattern")
});

static PYTHON_DEF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:async\s+)?(def|class)\s+([A-Za-z_][A-Za-z0-9_]*)")
        .expect("python symbol pattern")
});

static JS_DEF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?(function|class|const|interface)\s+([A-Za-z_$][A-Za-z0-9_$]*)",
    )
    .expect("js symbol pattern")
});

/// Regex-based definition extractor. Line-anchored patterns keep it cheap and
/// language coverage matches the scanner's extension set.
pub struct SymbolExtractor;

impl SymbolExtractor {
    pub fn extract(path: &str, content: &str) -> Vec<SymbolRecord> {
        let language = Language::from_path(path);
        let pattern: &Regex = match language {
            Language::Rust => &RUST_DEF,
            Language::Python => &PYTHON_DEF,
            Language::JavaScript | Language::TypeScript => &JS_DEF,
            Language::Other => return Vec::new(),
        };

        let total_lines = content.lines().count();
        let mut symbols = Vec::new();

        for (idx, line) in content.lines().enumerate() {
            let Some(caps) = pattern.captures(line) else {
                continue;
            };
            let keyword = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let name = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            let kind = match keyword {
                "fn" | "def" | "function" => SymbolKind::Function,
                "struct" | "interface" => SymbolKind::Struct,
                "enum" => SymbolKind::Enum,
                "trait" => SymbolKind::Trait,
                "class" => SymbolKind::Class,
                "const" => SymbolKind::Constant,
                _ => continue,
            };
            symbols.push(SymbolRecord {
                path: path.to_string(),
                name: name.to_string(),
                kind,
                line_start: idx + 1,
                line_end: idx + 1,
                language,
            });
        }

        // Each definition extends to the line before the next one in the file.
        let starts: Vec<usize> = symbols.iter().map(|s| s.line_start).collect();
        for (i, symbol) in symbols.iter_mut().enumerate() {
            symbol.line_end = starts
                .get(i + 1)
                .map(|next| next.saturating_sub(1))
                .unwrap_or(total_lines)
                .max(symbol.line_start);
        }

        symbols
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_rust_definitions() {
        let content = "pub struct Engine {\n    field: u32,\n}\n\npub async fn run() {}\n";
        let symbols = SymbolExtractor::extract("src/lib.rs", content);
        assert_eq!(symbols.len(), 2);
        assert_eq!(symbols[0].name, "Engine");
        assert_eq!(symbols[0].kind, SymbolKind::Struct);
        assert_eq!(symbols[0].line_start, 1);
        assert_eq!(symbols[0].line_end, 4);
        assert_eq!(symbols[1].name, "run");
        assert_eq!(symbols[1].kind, SymbolKind::Function);
    }

    #[test]
    fn extracts_python_definitions() {
        let content = "class Login:\n    def check(self):\n        pass\n\ndef login(user):\n    pass\n";
        let symbols = SymbolExtractor::extract("src/auth/login.py", content);
        let names: Vec<&str> = symbols.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Login", "check", "login"]);
        assert_eq!(symbols[2].line_start, 5);
        assert_eq!(symbols[2].language, Language::Python);
    }

    #[test]
    fn unknown_language_yields_nothing() {
        assert!(SymbolExtractor::extract("README.md", "# fn hello").is_empty());
    }
}

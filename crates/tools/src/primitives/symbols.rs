use crate::error::Result;
use crate::registry::Toolbox;
use analyst_protocol::{Citation, ToolResult};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct FindSymbolArgs {
    pub name: String,
    #[serde(default = "default_exact")]
    pub exact: bool,
    #[serde(default)]
    pub scope: Option<String>,
}

fn default_exact() -> bool {
    true
}

pub async fn find_symbol(toolbox: Arc<Toolbox>, args: FindSymbolArgs) -> Result<ToolResult> {
    let cap = toolbox.bounds.max_symbol_results;
    let symbols = toolbox
        .index
        .find_symbol(&args.name, args.exact, args.scope.as_deref(), cap);

    if symbols.is_empty() {
        return Ok(ToolResult::not_found(
            "find_symbol",
            json!({ "name": args.name, "exact": args.exact, "matches": [] }),
        ));
    }

    let matches: Vec<serde_json::Value> = symbols
        .iter()
        .map(|s| {
            json!({
                "path": s.path,
                "line": s.line_start,
                "symbol": s.name,
                "kind": s.kind.as_str(),
                "language": s.language.as_str(),
            })
        })
        .collect();
    let citations: Vec<Citation> = symbols
        .iter()
        .map(|s| Citation::new(s.path.clone(), s.line_start))
        .collect();

    let match_count = matches.len();
    Ok(ToolResult::success(
        "find_symbol",
        json!({
            "name": args.name,
            "exact": args.exact,
            "matches": matches,
            "match_count": match_count,
        }),
    )
    .with_citations(citations))
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct FileSymbolsArgs {
    pub path: String,
}

pub async fn get_file_symbols(toolbox: Arc<Toolbox>, args: FileSymbolsArgs) -> Result<ToolResult> {
    let symbols = toolbox.index.file_symbols(&args.path);
    if symbols.is_empty() {
        return Ok(ToolResult::not_found(
            "get_file_symbols",
            json!({ "path": args.path, "symbols": [] }),
        ));
    }

    let listed: Vec<serde_json::Value> = symbols
        .iter()
        .map(|s| json!({ "symbol": s.name, "kind": s.kind.as_str(), "line": s.line_start }))
        .collect();
    let citations: Vec<Citation> = symbols
        .iter()
        .map(|s| Citation::new(s.path.clone(), s.line_start))
        .collect();

    let symbol_count = listed.len();
    Ok(ToolResult::success(
        "get_file_symbols",
        json!({ "path": args.path, "symbols": listed, "symbol_count": symbol_count }),
    )
    .with_citations(citations))
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct GetImportsArgs {
    pub path: String,
}

pub async fn get_imports(toolbox: Arc<Toolbox>, args: GetImportsArgs) -> Result<ToolResult> {
    if !toolbox.index.contains_file(&args.path) {
        return Ok(ToolResult::not_found(
            "get_imports",
            json!({ "path": args.path, "imports": [] }),
        ));
    }
    let imports = toolbox.index.imports_of(&args.path);
    let import_count = imports.len();
    let citation = Citation::new(args.path.clone(), 1);
    Ok(ToolResult::success(
        "get_imports",
        json!({ "path": args.path, "imports": imports, "import_count": import_count }),
    )
    .with_citations(vec![citation]))
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct GetImportersArgs {
    pub module: String,
}

pub async fn get_importers(toolbox: Arc<Toolbox>, args: GetImportersArgs) -> Result<ToolResult> {
    let importers = toolbox.index.importers_of(&args.module);
    if importers.is_empty() {
        return Ok(ToolResult::not_found(
            "get_importers",
            json!({ "module": args.module, "importers": [] }),
        ));
    }
    let citations: Vec<Citation> = importers
        .iter()
        .map(|path| Citation::new(path.clone(), 1))
        .collect();
    let importer_count = importers.len();
    Ok(ToolResult::success(
        "get_importers",
        json!({
            "module": args.module,
            "importers": importers,
            "importer_count": importer_count,
        }),
    )
    .with_citations(citations))
}

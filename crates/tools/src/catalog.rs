use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    Primitive,
    Composed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    ReadOnly,
    Write,
}

#[derive(Clone, Copy, Debug)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub category: ToolCategory,
    pub risk: RiskLevel,
    pub summary: &'static str,
}

/// Tools the planner is allowed to reference. Everything else in the catalog
/// is internal plumbing for the composed chains.
pub const PLANNABLE_TOOLS: &[&str] = &["search_code", "read_code"];

pub const TOOL_CATALOG: &[ToolDescriptor] = &[
    ToolDescriptor {
        name: "search_code",
        category: ToolCategory::Composed,
        risk: RiskLevel::ReadOnly,
        summary: "Locate code by symbol, text, or meaning (deterministic fallback chain).",
    },
    ToolDescriptor {
        name: "read_code",
        category: ToolCategory::Composed,
        risk: RiskLevel::ReadOnly,
        summary: "Read a bounded file slice, recovering from near-miss paths.",
    },
    ToolDescriptor {
        name: "read_file",
        category: ToolCategory::Primitive,
        risk: RiskLevel::ReadOnly,
        summary: "Bounded line-range read of one file.",
    },
    ToolDescriptor {
        name: "glob_files",
        category: ToolCategory::Primitive,
        risk: RiskLevel::ReadOnly,
        summary: "Enumerate indexed files matching a glob or substring.",
    },
    ToolDescriptor {
        name: "grep_search",
        category: ToolCategory::Primitive,
        risk: RiskLevel::ReadOnly,
        summary: "Regex search across indexed files with a result cap.",
    },
    ToolDescriptor {
        name: "tree",
        category: ToolCategory::Primitive,
        risk: RiskLevel::ReadOnly,
        summary: "Depth-bounded directory listing.",
    },
    ToolDescriptor {
        name: "find_symbol",
        category: ToolCategory::Primitive,
        risk: RiskLevel::ReadOnly,
        summary: "Exact or partial symbol lookup in the code index.",
    },
    ToolDescriptor {
        name: "get_file_symbols",
        category: ToolCategory::Primitive,
        risk: RiskLevel::ReadOnly,
        summary: "All symbols defined in one file.",
    },
    ToolDescriptor {
        name: "get_imports",
        category: ToolCategory::Primitive,
        risk: RiskLevel::ReadOnly,
        summary: "Modules imported by a file.",
    },
    ToolDescriptor {
        name: "get_importers",
        category: ToolCategory::Primitive,
        risk: RiskLevel::ReadOnly,
        summary: "Files importing a module.",
    },
    ToolDescriptor {
        name: "semantic_search",
        category: ToolCategory::Primitive,
        risk: RiskLevel::ReadOnly,
        summary: "Vector-similarity search over code chunks.",
    },
    ToolDescriptor {
        name: "find_similar_files",
        category: ToolCategory::Primitive,
        risk: RiskLevel::ReadOnly,
        summary: "Files semantically close to a given file.",
    },
    ToolDescriptor {
        name: "git_log",
        category: ToolCategory::Primitive,
        risk: RiskLevel::ReadOnly,
        summary: "Recent commit history, optionally for one path.",
    },
    ToolDescriptor {
        name: "git_blame",
        category: ToolCategory::Primitive,
        risk: RiskLevel::ReadOnly,
        summary: "Line attribution for a file range.",
    },
    ToolDescriptor {
        name: "git_diff",
        category: ToolCategory::Primitive,
        risk: RiskLevel::ReadOnly,
        summary: "Working-tree diff summary.",
    },
    ToolDescriptor {
        name: "git_status",
        category: ToolCategory::Primitive,
        risk: RiskLevel::ReadOnly,
        summary: "Porcelain status of the working tree.",
    },
    ToolDescriptor {
        name: "list_tools",
        category: ToolCategory::Primitive,
        risk: RiskLevel::ReadOnly,
        summary: "Catalog of registered tools and their metadata.",
    },
];

pub fn descriptor(name: &str) -> Option<&'static ToolDescriptor> {
    TOOL_CATALOG.iter().find(|d| d.name == name)
}

pub fn catalog_json() -> serde_json::Value {
    let tools: Vec<serde_json::Value> = TOOL_CATALOG
        .iter()
        .map(|tool| {
            serde_json::json!({
                "name": tool.name,
                "category": tool.category,
                "risk": tool.risk,
                "summary": tool.summary,
                "plannable": PLANNABLE_TOOLS.contains(&tool.name),
            })
        })
        .collect();
    serde_json::json!({ "count": tools.len(), "tools": tools })
}

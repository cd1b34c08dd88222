use analyst_protocol::{Citation, ToolResult};

/// Pull every `path:line` reference out of a tool result.
///
/// Tools attach citations as they run; this also recovers references from
/// raw match payloads, so a result forwarded from an external tool source
/// still yields evidence.
pub fn extract_citations(result: &ToolResult) -> Vec<Citation> {
    let mut citations = result.citations.clone();

    if let Some(matches) = result.data.get("matches").and_then(|m| m.as_array()) {
        for entry in matches {
            let Some(path) = entry.get("path").and_then(|p| p.as_str()) else {
                continue;
            };
            let Some(line) = entry.get("line").and_then(|l| l.as_u64()) else {
                continue;
            };
            let citation = Citation::new(path, line as usize);
            if !citations.contains(&citation) {
                citations.push(citation);
            }
        }
    }

    if citations.is_empty() {
        if let (Some(path), Some(line)) = (
            result.data.get("resolved_path").and_then(|p| p.as_str()),
            result.data.get("start_line").and_then(|l| l.as_u64()),
        ) {
            citations.push(Citation::new(path, line as usize));
        }
    }

    citations
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn recovers_citations_from_match_payloads() {
        let result = ToolResult::success(
            "search_code",
            json!({ "matches": [
                { "path": "src/a.rs", "line": 3 },
                { "path": "src/b.rs", "line": 9 },
            ]}),
        );
        let citations = extract_citations(&result);
        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].to_string(), "src/a.rs:3");
    }

    #[test]
    fn slice_results_cite_their_first_line() {
        let result = ToolResult::success(
            "read_code",
            json!({ "resolved_path": "src/a.rs", "start_line": 40, "content": "..." }),
        );
        let citations = extract_citations(&result);
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].to_string(), "src/a.rs:40");
    }

    #[test]
    fn attached_citations_are_not_duplicated() {
        let mut result = ToolResult::success(
            "search_code",
            json!({ "matches": [{ "path": "src/a.rs", "line": 3 }] }),
        );
        result.citations.push(Citation::new("src/a.rs", 3));
        assert_eq!(extract_citations(&result).len(), 1);
    }
}

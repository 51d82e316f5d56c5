//! Structured output: fixed-shape model responses.
//!
//! A schema is sent to the model as a single tool definition; the answer is
//! deserialized into a typed value. Serde is the validation step.

use crate::provider::ToolDefinition;
use serde::{Deserialize, Serialize};

/// Target JSON schema for a structured completion
#[derive(Debug, Clone)]
pub struct OutputSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl OutputSchema {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// The schema as the single tool the model is forced to call
    pub fn as_tool(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

/// Search queries proposed by the model
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Queries {
    pub queries: Vec<String>,
}

impl Queries {
    pub fn schema() -> OutputSchema {
        OutputSchema::new(
            "queries",
            "Web search queries that gather the information needed",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "queries": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Search queries, at most 3"
                    }
                },
                "required": ["queries"]
            }),
        )
    }

    /// Trimmed, non-blank queries, cut to `limit`.
    ///
    /// Returns the kept queries and how many were dropped past the limit.
    pub fn normalized(self, limit: usize) -> (Vec<String>, usize) {
        let mut kept: Vec<String> = self
            .queries
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .collect();
        let dropped = kept.len().saturating_sub(limit);
        kept.truncate(limit);
        (kept, dropped)
    }
}

/// Locate the JSON payload in model text (handles markdown fences)
pub fn extract_json(content: &str) -> &str {
    if content.contains("```json") {
        content
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .map(|s| s.trim())
            .unwrap_or(content)
    } else if content.contains("```") {
        content
            .split("```")
            .nth(1)
            .map(|s| s.trim())
            .unwrap_or(content)
    } else {
        match (content.find('{'), content.rfind('}')) {
            (Some(start), Some(end)) if start < end => &content[start..=end],
            _ => content.trim(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_variants() {
        assert_eq!(extract_json("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(extract_json("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(extract_json("Here you go: {\"a\":1} done"), "{\"a\":1}");
        assert_eq!(extract_json("  nothing  "), "nothing");
    }

    #[test]
    fn test_normalized_caps_and_trims() {
        let queries = Queries {
            queries: vec![
                " one ".into(),
                "".into(),
                "two".into(),
                "three".into(),
                "four".into(),
            ],
        };
        let (kept, dropped) = queries.normalized(3);
        assert_eq!(kept, vec!["one", "two", "three"]);
        assert_eq!(dropped, 1);
    }

    #[test]
    fn test_empty_queries_are_valid() {
        let queries: Queries = serde_json::from_str(r#"{"queries": []}"#).unwrap();
        let (kept, dropped) = queries.normalized(3);
        assert!(kept.is_empty());
        assert_eq!(dropped, 0);
    }

    #[test]
    fn test_shape_is_enforced() {
        assert!(serde_json::from_str::<Queries>(r#"{"query": ["a"]}"#).is_err());
        assert!(serde_json::from_str::<Queries>(r#"{"queries": [1, 2]}"#).is_err());
    }

    #[test]
    fn test_schema_as_tool() {
        let tool = Queries::schema().as_tool();
        assert_eq!(tool.name, "queries");
        assert_eq!(tool.parameters["required"][0], "queries");
    }
}

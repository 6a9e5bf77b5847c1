// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parsing the worker completion protocol's `KEY: value` output format
//! (§6, §4.4 "Completion" step 2-3).

use std::collections::HashMap;

use antfarm_core::story::MAX_STORIES;
use serde::Deserialize;

use crate::error::PipelineError;

const STORIES_KEY: &str = "STORIES_JSON";

/// A fully parsed worker output: lowercased `KEY: value` pairs destined for
/// the run context, plus an optional raw `STORIES_JSON` payload kept
/// separate since it is never merged into context.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParsedOutput {
    pub fields: HashMap<String, String>,
    pub stories_json: Option<String>,
}

impl ParsedOutput {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

/// A key matches `^[A-Z_]+:` at column 0: one or more uppercase letters or
/// underscores, immediately followed by a colon.
fn key_at_line_start(line: &str) -> Option<(&str, &str)> {
    let colon = line.find(':')?;
    let (candidate, rest) = line.split_at(colon);
    if candidate.is_empty() || !candidate.chars().all(|c| c.is_ascii_uppercase() || c == '_') {
        return None;
    }
    Some((candidate, &rest[1..]))
}

/// Parse worker output into `fields` (lowercased keys, newline-joined
/// multi-line values) and an optional raw `STORIES_JSON` array string.
pub fn parse(output: &str) -> ParsedOutput {
    let mut fields: HashMap<String, String> = HashMap::new();
    let mut stories_json: Option<String> = None;
    let mut current_key: Option<String> = None;
    let mut current_lines: Vec<&str> = Vec::new();

    macro_rules! flush {
        () => {
            if let Some(key) = current_key.take() {
                let value = current_lines.join("\n").trim().to_string();
                current_lines.clear();
                if key == STORIES_KEY {
                    stories_json = Some(value);
                } else {
                    fields.insert(key.to_ascii_lowercase(), value);
                }
            }
        };
    }

    for line in output.lines() {
        if let Some((key, first_value_part)) = key_at_line_start(line) {
            flush!();
            current_key = Some(key.to_string());
            current_lines.push(first_value_part.trim_start());
        } else if current_key.is_some() {
            current_lines.push(line);
        }
    }
    flush!();

    ParsedOutput { fields, stories_json }
}

/// One entry of a `STORIES_JSON` payload, before it becomes a `Story` row.
#[derive(Debug, Clone, Deserialize)]
pub struct StoryIngest {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(rename = "acceptanceCriteria", alias = "acceptance_criteria", default)]
    pub acceptance_criteria: Vec<String>,
}

/// Validate and parse a `STORIES_JSON` payload per §3/§4.4: non-empty
/// `id`/`title`/`description`, a non-empty acceptance-criteria list, unique
/// ids, and a hard cap of [`MAX_STORIES`].
pub fn parse_stories_json(raw: &str) -> Result<Vec<StoryIngest>, PipelineError> {
    let stories: Vec<StoryIngest> = serde_json::from_str(raw)
        .map_err(|e| PipelineError::InvalidStoriesJson(format!("invalid JSON: {}", e)))?;

    if stories.len() > MAX_STORIES {
        return Err(PipelineError::InvalidStoriesJson(format!(
            "{} stories exceeds cap of {}",
            stories.len(),
            MAX_STORIES
        )));
    }

    let mut seen_ids = std::collections::HashSet::new();
    for story in &stories {
        if story.id.trim().is_empty() {
            return Err(PipelineError::InvalidStoriesJson("story id must not be empty".into()));
        }
        if story.title.trim().is_empty() {
            return Err(PipelineError::InvalidStoriesJson(format!(
                "story {} has an empty title",
                story.id
            )));
        }
        if story.description.trim().is_empty() {
            return Err(PipelineError::InvalidStoriesJson(format!(
                "story {} has an empty description",
                story.id
            )));
        }
        if story.acceptance_criteria.is_empty() {
            return Err(PipelineError::InvalidStoriesJson(format!(
                "story {} has no acceptance criteria",
                story.id
            )));
        }
        if !seen_ids.insert(story.id.clone()) {
            return Err(PipelineError::InvalidStoriesJson(format!(
                "duplicate story id {}",
                story.id
            )));
        }
    }

    Ok(stories)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_line_fields() {
        let parsed = parse("STATUS: done\nSUMMARY: fixed the thing\n");
        assert_eq!(parsed.get("status"), Some("done"));
        assert_eq!(parsed.get("summary"), Some("fixed the thing"));
    }

    #[test]
    fn multi_line_value_continues_until_next_key() {
        let output = "NOTES: line one\nline two\nline three\nSTATUS: done\n";
        let parsed = parse(output);
        assert_eq!(parsed.get("notes"), Some("line one\nline two\nline three"));
        assert_eq!(parsed.get("status"), Some("done"));
    }

    #[test]
    fn keeps_stories_json_out_of_merged_fields() {
        let output = "STATUS: done\nSTORIES_JSON: [{\"id\":\"s1\"}]\n";
        let parsed = parse(output);
        assert!(!parsed.fields.contains_key("stories_json"));
        assert_eq!(parsed.stories_json.as_deref(), Some(r#"[{"id":"s1"}]"#));
    }

    #[test]
    fn ignores_text_before_first_key() {
        let output = "preamble noise\nSTATUS: done\n";
        let parsed = parse(output);
        assert_eq!(parsed.get("status"), Some("done"));
    }

    #[test]
    fn validates_and_parses_stories() {
        let raw = r#"[{"id":"s1","title":"T","description":"D","acceptanceCriteria":["works"]}]"#;
        let stories = parse_stories_json(raw).unwrap();
        assert_eq!(stories.len(), 1);
        assert_eq!(stories[0].id, "s1");
    }

    #[test]
    fn rejects_duplicate_story_ids() {
        let raw = r#"[
            {"id":"s1","title":"A","description":"D","acceptanceCriteria":["x"]},
            {"id":"s1","title":"B","description":"D","acceptanceCriteria":["x"]}
        ]"#;
        assert!(parse_stories_json(raw).is_err());
    }

    #[test]
    fn rejects_empty_acceptance_criteria() {
        let raw = r#"[{"id":"s1","title":"A","description":"D","acceptanceCriteria":[]}]"#;
        assert!(parse_stories_json(raw).is_err());
    }

    #[test]
    fn rejects_more_than_cap_stories() {
        let entries: Vec<String> = (0..21)
            .map(|i| {
                format!(
                    r#"{{"id":"s{i}","title":"T","description":"D","acceptanceCriteria":["x"]}}"#
                )
            })
            .collect();
        let raw = format!("[{}]", entries.join(","));
        assert!(parse_stories_json(&raw).is_err());
    }

    #[test]
    fn accepts_snake_case_acceptance_criteria_alias() {
        let raw = r#"[{"id":"s1","title":"T","description":"D","acceptance_criteria":["x"]}]"#;
        assert_eq!(parse_stories_json(raw).unwrap()[0].acceptance_criteria, vec!["x".to_string()]);
    }
}

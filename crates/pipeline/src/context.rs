// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Context interpolation: resolving `{{name}}` / `{{name.subname}}`
//! placeholders in a step's `input_template` against the run's context map
//! (§4.4 "Input resolution").

use std::collections::HashMap;

/// Render `template`, replacing every `{{name}}` or `{{name.subname}}`
/// placeholder by looking it up in `context`. A dotted placeholder first
/// tries the literal dotted key (`"name.subname"`), then falls back to
/// treating `subname` as a JSON-pointer-style field of a `name` value that
/// happens to hold serialized JSON. A key that resolves to nothing renders
/// as the literal `[missing: name]` so a bad template fails loudly in the
/// rendered prompt rather than silently.
pub fn interpolate(template: &str, context: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            out.push_str(&rest[start..]);
            rest = "";
            break;
        };
        let name = after_open[..end].trim();
        out.push_str(&resolve(name, context));
        rest = &after_open[end + 2..];
    }
    out.push_str(rest);
    out
}

fn resolve(name: &str, context: &HashMap<String, String>) -> String {
    if let Some(value) = context.get(name) {
        return value.clone();
    }

    if let Some((head, tail)) = name.split_once('.') {
        if let Some(raw) = context.get(head) {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(raw) {
                if let Some(field) = json.get(tail) {
                    return json_scalar_to_string(field);
                }
            }
        }
    }

    format!("[missing: {}]", name)
}

fn json_scalar_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Keys the engine adds to a run's context before resolving a step's
/// template, on top of whatever the run itself carries (§4.4).
pub struct ContextAugmentation {
    pub run_id: String,
    pub has_frontend_changes: Option<bool>,
    pub progress: Option<String>,
}

impl ContextAugmentation {
    pub fn apply(&self, context: &mut HashMap<String, String>) {
        context.insert("run_id".to_string(), self.run_id.clone());
        if let Some(has_frontend_changes) = self.has_frontend_changes {
            context.insert("has_frontend_changes".to_string(), has_frontend_changes.to_string());
        }
        if let Some(progress) = &self.progress {
            context.insert("progress".to_string(), progress.clone());
        }
    }
}

/// Story-scoped context materialized by `claimStory` (§4.4): which story is
/// active, what came before it, and any feedback from a prior verify-each
/// failure.
pub struct StoryContext {
    pub current_story: String,
    pub current_story_id: String,
    pub current_story_title: String,
    pub completed_stories: Vec<String>,
    pub stories_remaining: u32,
    pub progress: Option<String>,
    pub verify_feedback: Option<String>,
}

impl StoryContext {
    pub fn apply(&self, context: &mut HashMap<String, String>) {
        context.insert("current_story".to_string(), self.current_story.clone());
        context.insert("current_story_id".to_string(), self.current_story_id.clone());
        context.insert("current_story_title".to_string(), self.current_story_title.clone());
        context.insert(
            "completed_stories".to_string(),
            serde_json::to_string(&self.completed_stories).unwrap_or_default(),
        );
        context.insert("stories_remaining".to_string(), self.stories_remaining.to_string());
        if let Some(progress) = &self.progress {
            context.insert("progress".to_string(), progress.clone());
        }
        match &self.verify_feedback {
            Some(feedback) => {
                context.insert("verify_feedback".to_string(), feedback.clone());
            }
            None => {
                context.remove("verify_feedback");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn resolves_simple_placeholder() {
        let context = ctx(&[("task", "fix the bug")]);
        assert_eq!(interpolate("do: {{task}}", &context), "do: fix the bug");
    }

    #[test]
    fn missing_key_renders_bracketed_literal() {
        let context = ctx(&[]);
        assert_eq!(interpolate("{{nope}}", &context), "[missing: nope]");
    }

    #[test]
    fn resolves_dotted_subfield_from_json_value() {
        let context = ctx(&[("repo", r#"{"branch":"main","url":"git@x"}"#)]);
        assert_eq!(interpolate("{{repo.branch}}", &context), "main");
    }

    #[test]
    fn dotted_key_prefers_literal_match_over_json_drill_down() {
        let context = ctx(&[("repo.branch", "literal"), ("repo", r#"{"branch":"main"}"#)]);
        assert_eq!(interpolate("{{repo.branch}}", &context), "literal");
    }

    #[test]
    fn unterminated_placeholder_passes_through_unchanged() {
        let context = ctx(&[]);
        assert_eq!(interpolate("prefix {{oops", &context), "prefix {{oops");
    }

    #[test]
    fn multiple_placeholders_in_one_template() {
        let context = ctx(&[("a", "1"), ("b", "2")]);
        assert_eq!(interpolate("{{a}}-{{b}}-{{a}}", &context), "1-2-1");
    }

    #[test]
    fn story_context_clears_verify_feedback_when_none() {
        let mut context = ctx(&[("verify_feedback", "stale")]);
        let story_context = StoryContext {
            current_story: "do the thing".to_string(),
            current_story_id: "s1".to_string(),
            current_story_title: "Thing".to_string(),
            completed_stories: vec![],
            stories_remaining: 2,
            progress: None,
            verify_feedback: None,
        };
        story_context.apply(&mut context);
        assert!(!context.contains_key("verify_feedback"));
    }
}

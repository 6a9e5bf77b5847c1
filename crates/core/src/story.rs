// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `Story` row: a self-contained work item executed inside a loop step.

use crate::ids::{RunId, StoryId};
use crate::status::StoryStatus;
use serde::{Deserialize, Serialize};

/// Hard cap on stories ingested per run (§3, §8 boundary behavior).
pub const MAX_STORIES: usize = 20;

/// Default retry budget for a story, per §3.
pub const DEFAULT_STORY_MAX_RETRIES: u32 = 2;

/// A self-contained work item, ingested at runtime from a step's structured
/// output, executed inside a single loop step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub id: StoryId,
    pub run_id: RunId,
    /// 0-based position within the run's story list; stories are claimed in
    /// this order.
    pub story_index: u32,
    /// Human id from the `STORIES_JSON` payload.
    pub story_id: String,
    pub title: String,
    pub description: String,
    pub acceptance_criteria: Vec<String>,
    pub status: StoryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: String,
    pub updated_at: String,
}

crate::builder! {
    pub struct StoryBuilder => Story {
        computed { id: StoryId = StoryId::new() }
        computed { run_id: RunId = RunId::new() }
        set { story_index: u32 = 0 }
        into { story_id: String = "s1" }
        into { title: String = "title" }
        into { description: String = "description" }
        computed { acceptance_criteria: Vec<String> = vec!["works".to_string()] }
        set { status: StoryStatus = StoryStatus::Pending }
        option { output: String = None }
        set { retry_count: u32 = 0 }
        set { max_retries: u32 = DEFAULT_STORY_MAX_RETRIES }
        into { created_at: String = "2024-01-01T00:00:00Z" }
        into { updated_at: String = "2024-01-01T00:00:00Z" }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_are_pending_with_two_retries() {
        let story = Story::builder().build();
        assert_eq!(story.status, StoryStatus::Pending);
        assert_eq!(story.max_retries, 2);
    }
}

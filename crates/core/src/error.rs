// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared error kinds surfaced by the data model itself (validation of
//! values, not storage I/O — each downstream crate layers its own error
//! enum on top via `#[from]`).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("empty story id")]
    EmptyStoryId,

    #[error("empty acceptance criteria for story {0}")]
    EmptyAcceptanceCriteria(String),

    #[error("duplicate story id: {0}")]
    DuplicateStoryId(String),

    #[error("too many stories: {0} exceeds the cap of {1}")]
    TooManyStories(usize, usize),

    #[error("invalid scheduler value: {0}")]
    InvalidScheduler(String),

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

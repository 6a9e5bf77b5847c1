// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! antfarm-gateway: the worker spawn protocol client (§6).
//!
//! The Gateway is an opaque external service that launches workers on
//! request and later surfaces their session identity. This crate owns the
//! wire shapes, the `Gateway` trait the rest of Antfarm programs against,
//! an HTTP implementation, and (behind `test-support`) an in-memory fake.

mod error;
mod gateway;
mod http;
mod protocol;

#[cfg(any(test, feature = "test-support"))]
mod fake;

pub use error::GatewayError;
pub use gateway::{Gateway, STATUS_POLL_ATTEMPTS, STATUS_POLL_INTERVAL};
pub use http::HttpGateway;
pub use protocol::{SpawnRequest, SpawnResponse, StatusResponse, ThinkingLevel};

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeGateway, GatewayCall};

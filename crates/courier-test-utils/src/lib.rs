// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Courier integration tests.
//!
//! Deterministic stand-ins for the messaging platform plus a harness that
//! wires a real engine and a temporary SQLite store around them.
//!
//! # Components
//!
//! - [`ScriptedPlatform`] - scripted vending bots, channels and storage with a call log
//! - [`TestHarness`] - engine + temp database + scripted platform, zero delays

pub mod fixtures;
pub mod harness;
pub mod scripted_platform;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use scripted_platform::{BotScript, PlatformCall, ScriptedError, ScriptedPlatform, UploadRecord};

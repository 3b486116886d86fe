// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Content acquisition engine.
//!
//! Given a link to a vending bot, [`Engine::resolve`] drives the bot's
//! conversation, satisfies channel gates, walks button menus, relocates the
//! media it finds into operator storage and mints access links for it.
//! Nested vending-bot links are resolved afterwards under the same dedup
//! guarantees.

pub mod dedup;
pub mod engine;
pub mod extract;
pub mod gate;
pub mod machine;
pub mod queue;
pub mod relocation;
pub mod session;

pub use dedup::{ClaimGuard, DedupController, LinkClaim};
pub use engine::{Engine, EngineSettings, Resolution};
pub use extract::{LinkPatterns, UrlTarget};
pub use gate::{ChannelReference, GateJoiner, JoinOutcome};
pub use machine::{LinkRun, LinkState, RunContext, RunOutcome, RunReport};
pub use queue::LinkQueue;
pub use relocation::{MediaRelocator, Relocation};
pub use session::{ConversationSession, Turn};

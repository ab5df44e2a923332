//! Dialogue engine for the banking assistant.
//!
//! Every message runs the same loop:
//! 1. **Cancel / restart / off-topic checks** against the lexicon
//! 2. **Classification** (`bankbot_core::nlu`) unless the text answers a control
//! 3. **Confidence gate** (`guardrails`) before any flow is touched
//! 4. **Flow step** (`flows`) which may call the account store
//!
//! `AgentRuntime` keeps one [`state::DialogueState`] per session and serializes
//! turns within a session.

pub mod conversation;
mod flows;
pub mod guardrails;
pub mod response;
pub mod runtime;
pub mod state;

pub use conversation::{DialogueEngine, UserTurn};
pub use response::{ControlKind, Controls, Indicator, TurnResponse};
pub use runtime::AgentRuntime;
pub use state::{DialogueState, SessionSnapshot};

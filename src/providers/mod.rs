//! In-process adapters for tests and replayed scenarios. Model-backed adapters live with the
//! applications that own the model clients.

pub mod scripted;

pub use scripted::{ScriptedAgent, ScriptedJudge, ScriptedUser};

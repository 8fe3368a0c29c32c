//! Agent layer: model invocation, per-turn orchestration, and the
//! interactive chat front-end.

pub mod chat;
pub mod llm;
pub mod session;
pub mod types;

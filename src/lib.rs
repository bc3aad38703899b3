//! Session & progress graph core for an AI coding tutor.
//!
//! The graph tracks users, their chat and quiz sessions, the questions a
//! session contains, submitted answers, and per-session conversation chains.
//! [`graph::GraphStore`] is the entry point; [`config`] and [`logger`] cover
//! service bring-up.

pub mod config;
pub mod error;
pub mod graph;
pub mod logger;

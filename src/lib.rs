//! Watches a health registry and reports checks moving between failing and
//! passing. Redundant instances coordinate through a session-guarded lock so
//! only one of them reports at a time.

pub mod config;
pub mod core;

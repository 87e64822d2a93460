//! Integration tests for guardian-bot.
//!
//! These tests drive the orchestrator against an in-memory process table,
//! a scripted prober and a real server document on disk:
//! - Terminal restart with server selection and rewrite
//! - Failure paths that must leave the document untouched
//! - Client restart with data cleanup

pub mod common;

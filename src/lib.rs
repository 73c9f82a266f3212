//! # pgpilot
//!
//! Core of an autonomous PostgreSQL agent: a language model inspects and
//! changes a user's database across many turns, with every turn's state
//! persisted for audit.
//!
//! ## Modules
//!
//! | Module | Role |
//! |--------|------|
//! | [`sql`] | statement splitter, DDL classifier, destructive-statement policy, JSON-safe values |
//! | [`executor`] | batch execution with transactional rollback, SQL actions and catalog inspection |
//! | [`connection`] | target resolution: secrets, managed databases, TLS policy |
//! | [`agent`] | session state machine, prompt and schema builders, model backends, reply normalizer |
//! | [`db`] | application store (sessions, messages, journal, migration history) |
//! | [`api`] | HTTP surface |
//! | [`access`] | caller roles |
//! | [`config`], [`error`], [`prom_metrics`] | ambient |

pub mod access;
pub mod agent;
pub mod api;
pub mod config;
pub mod connection;
pub mod db;
pub mod error;
pub mod executor;
pub mod prom_metrics;
pub mod sql;

pub use error::{AgentError, AgentResult};

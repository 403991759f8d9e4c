#![forbid(unsafe_code)]

//! `lark-agent-gateway` — chat-driven gateway between a Lark/Feishu workspace
//! and ACP coding agents running as local subprocesses.
//!
//! The crate is organized around the session orchestrator:
//!
//! - [`process`] — agent child-process lifecycle and stdio ownership.
//! - [`acp`] — JSON-RPC 2.0 client, protocol types, stdio/SSE transports,
//!   the local tool registry, and the built-in mock agent.
//! - [`persistence`] — `SQLite` repositories for sessions, projects, and
//!   processed-event deduplication.
//! - [`lark`] — Open API client, inbound event payloads, webhook ingress,
//!   and interactive card builders.
//! - [`orchestrator`] — active-session table, per-session locks, streaming
//!   cards, permission prompts, shell/slash commands, and card actions.

pub use errors::{AppError, Result};

pub mod acp;
pub mod config;
pub mod errors;
pub mod lark;
pub mod models;
pub mod orchestrator;
pub mod persistence;
pub mod process;

//! Lark/Feishu Open API integration.
//!
//! [`client`] wraps the REST surface the gateway needs (messages, card
//! entities, element patches, docs) behind the [`client::LarkApi`] trait so
//! tests can substitute a recording fake. [`events`] models the inbound
//! webhook payloads, [`webhook`] is the axum ingress, and [`cards`] builds
//! the interactive card JSON.

pub mod cards;
pub mod client;
pub mod events;
pub mod webhook;

//! Domain services used by the HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Each module owns one console context (builder, commerce, integrations,
//! team, audit, help, domains) and its error type. Route handlers stay
//! focused on protocol translation, permission checks, and audit records.

pub mod api_key;
pub mod audit;
pub mod builder;
pub mod commerce;
pub mod dispatch;
pub mod domain;
pub mod events;
pub mod help;
pub mod simulate;
pub mod team;
pub mod webhook;
pub mod workflow;

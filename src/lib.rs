// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Broke Be Gone - bank linking and balance aggregation service
//!
//! A session-gated backend that links a user's financial institutions
//! through Plaid and reports balances across all of them.
//!
//! ## Modules
//!
//! - `api` - HTTP handlers and router (Axum)
//! - `auth` - Session gate backed by the better-auth identity service
//! - `linking` - Link sessions, token exchange and balance aggregation
//! - `providers` - Plaid client behind the `LinkProvider` trait
//! - `storage` - Linked-account store (redb)

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod linking;
pub mod providers;
pub mod state;
pub mod storage;
pub mod telemetry;

#[cfg(test)]
mod test_support;

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Institution linking and balance aggregation.
//!
//! Every operation here takes the caller as a [`crate::auth::CallerId`],
//! which only the session gate can produce.

pub mod balances;
pub mod exchange;
pub mod session;

pub use balances::{BalanceAggregator, BalanceError, BalanceRecord, BalanceReport, InstitutionFailure};
pub use exchange::{LinkError, TokenExchangeCoordinator};
pub use session::{LinkSession, LinkSessionError, LinkSessionManager};

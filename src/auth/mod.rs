// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Session Gate
//!
//! Every protected route runs behind this module.
//!
//! ## Auth Flow
//!
//! 1. The browser signs up or logs in through this service, which relays the
//!    identity provider's session cookie
//! 2. Each protected request carries that cookie
//! 3. The gate:
//!    - Looks the session up at the identity provider
//!    - Redirects to the sign-in page when there is no live session
//!    - Fails closed (500) when the lookup itself fails
//!    - Mirrors the user locally and attaches a [`SessionUser`] to the request
//!
//! Handlers obtain the caller only through the [`Auth`] extractor.

pub mod error;
pub mod extractor;
pub mod identity;
pub mod middleware;
pub mod session;

pub use error::AuthError;
pub use extractor::Auth;
pub use identity::{
    HttpIdentityProvider, IdentityError, IdentityProvider, IdentityResponse, IdentityUser,
    SignInRequest, SignUpRequest,
};
pub use middleware::require_session;
pub use session::{CallerId, SessionUser};

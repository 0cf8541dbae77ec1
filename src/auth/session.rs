// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Resolved session and caller identity.

use std::fmt;

use chrono::{DateTime, Utc};

/// Identifier of the authenticated caller.
///
/// Only the auth module can construct one, from a session resolved by the
/// identity provider. Protected operations take a `&CallerId`, so request
/// input can never stand in for the caller's identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallerId(String);

impl CallerId {
    pub(crate) fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// User attached to a request by the session gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub caller_id: CallerId,
    pub name: Option<String>,
    pub email: Option<String>,
    /// Identity provider session ID
    pub session_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl SessionUser {
    /// A session without an expiry is treated as live.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user(expires_at: Option<DateTime<Utc>>) -> SessionUser {
        SessionUser {
            caller_id: CallerId::new("user-1"),
            name: None,
            email: None,
            session_id: None,
            expires_at,
        }
    }

    #[test]
    fn expiry_is_checked_against_now() {
        let now = Utc::now();
        assert!(user(Some(now - Duration::seconds(1))).is_expired(now));
        assert!(user(Some(now)).is_expired(now));
        assert!(!user(Some(now + Duration::minutes(5))).is_expired(now));
        assert!(!user(None).is_expired(now));
    }

    #[test]
    fn caller_id_displays_raw_id() {
        let id = CallerId::new("user-1");
        assert_eq!(id.as_str(), "user-1");
        assert_eq!(id.to_string(), "user-1");
    }
}

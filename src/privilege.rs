use std::fmt;

use crate::auth::{identity::Identity, AdminUser};

/// Which kind of backend access an operation runs with. Decides whether a
/// permission-shaped failure is the operator's to fix (403) or ours (500).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantKind {
    Elevated,
    Caller,
}

#[derive(Clone)]
pub enum Grant {
    /// Service-role access; row-level policies do not apply.
    Elevated,
    /// The caller's own token; row-level policies apply.
    Caller(CallerGrant),
}

#[derive(Clone)]
pub struct CallerGrant {
    access_token: String,
    identity: Identity,
}

impl CallerGrant {
    pub fn new(access_token: impl Into<String>, identity: Identity) -> Self {
        Self {
            access_token: access_token.into(),
            identity,
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }
}

impl Grant {
    /// Elevated whenever a service credential is configured, otherwise
    /// scoped to whoever made the request.
    pub fn select(service_role_configured: bool, user: &AdminUser) -> Self {
        if service_role_configured {
            Grant::Elevated
        } else {
            Grant::Caller(CallerGrant::new(user.access_token(), user.identity.clone()))
        }
    }

    pub fn kind(&self) -> GrantKind {
        match self {
            Grant::Elevated => GrantKind::Elevated,
            Grant::Caller(_) => GrantKind::Caller,
        }
    }
}

impl fmt::Debug for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grant::Elevated => f.write_str("Elevated"),
            Grant::Caller(caller) => f
                .debug_struct("Caller")
                .field("user_id", &caller.identity.id)
                .field("access_token", &"<redacted>")
                .finish(),
        }
    }
}

impl fmt::Display for GrantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GrantKind::Elevated => "elevated",
            GrantKind::Caller => "caller",
        })
    }
}

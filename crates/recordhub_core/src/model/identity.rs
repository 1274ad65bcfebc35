//! Caller identity.
//!
//! An identity is opaque to the service: it is only handed to the permission
//! policy, the schema adapter and the components.

use std::collections::BTreeSet;

/// Actor performing one service call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Identity {
    user_id: Option<String>,
    roles: BTreeSet<String>,
    system: bool,
}

impl Identity {
    /// Unauthenticated caller.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Authenticated user.
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    /// Internal system process (migrations, reindex jobs).
    pub fn system() -> Self {
        Self {
            system: true,
            ..Self::default()
        }
    }

    /// Adds one role to this identity.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    pub fn is_system(&self) -> bool {
        self.system
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.roles.iter().map(String::as_str)
    }

    /// Stable key used for log lines and preference tokens.
    ///
    /// Never contains role names.
    pub fn actor_key(&self) -> String {
        match (&self.user_id, self.system) {
            (_, true) => "system".to_string(),
            (Some(user_id), false) => format!("user:{user_id}"),
            (None, false) => "anonymous".to_string(),
        }
    }
}

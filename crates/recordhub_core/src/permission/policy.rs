//! Permission policy contracts and the generator-based record policy.
//!
//! # Invariants
//! - Undeclared actions are denied (deny by default).
//! - For every generator, `allows(identity, Some(record))` is true exactly
//!   when `query_filter(identity)` matches the record's index document, so
//!   search scoping and record-level checks never disagree.

use crate::model::identity::Identity;
use crate::model::record::{Record, OWNERS_FIELD};
use crate::search::filter::QueryFilter;
use std::collections::BTreeMap;
use std::fmt::{Debug, Display, Formatter};

/// Service action subject to a permission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Action {
    Search,
    Create,
    Read,
    Update,
    Delete,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Self::Search,
        Self::Create,
        Self::Read,
        Self::Update,
        Self::Delete,
    ];

    /// Stable action name used in logs and error codes.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == value.trim())
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source of permission grants for one action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generator {
    /// Everyone, including anonymous callers.
    AnyUser,
    /// Any caller with a user id.
    AuthenticatedUser,
    /// Internal system processes.
    SystemProcess,
    /// Users listed in the record's `owners` field.
    RecordOwners,
    /// Callers holding the named role.
    Role(String),
}

impl Generator {
    /// Record-level (or action-level when `record` is `None`) grant check.
    pub fn allows(&self, identity: &Identity, record: Option<&Record>) -> bool {
        match self {
            Self::AnyUser => true,
            Self::AuthenticatedUser => identity.is_authenticated(),
            Self::SystemProcess => identity.is_system(),
            Self::RecordOwners => match (identity.user_id(), record) {
                (Some(user_id), Some(record)) => record.owners().contains(&user_id),
                _ => false,
            },
            Self::Role(role) => identity.has_role(role),
        }
    }

    /// Search-time rendering of this grant.
    pub fn query_filter(&self, identity: &Identity) -> QueryFilter {
        let granted = |allowed: bool| {
            if allowed {
                QueryFilter::MatchAll
            } else {
                QueryFilter::MatchNone
            }
        };
        match self {
            Self::AnyUser => QueryFilter::MatchAll,
            Self::AuthenticatedUser => granted(identity.is_authenticated()),
            Self::SystemProcess => granted(identity.is_system()),
            Self::RecordOwners => match identity.user_id() {
                Some(user_id) => QueryFilter::term(OWNERS_FIELD, user_id),
                None => QueryFilter::MatchNone,
            },
            Self::Role(role) => granted(identity.has_role(role)),
        }
    }
}

/// Outcome of one permission decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    action: Action,
    allowed: bool,
    filter: QueryFilter,
}

impl Decision {
    pub fn new(action: Action, allowed: bool, filter: QueryFilter) -> Self {
        Self {
            action,
            allowed,
            filter,
        }
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn allows(&self) -> bool {
        self.allowed
    }

    /// Query predicate restricting search results to what this decision grants.
    pub fn query_filter(&self) -> &QueryFilter {
        &self.filter
    }
}

/// Permission engine consulted by the record service.
pub trait PermissionPolicy: Send + Sync + Debug {
    fn decide(&self, action: Action, identity: &Identity, record: Option<&Record>) -> Decision;
}

/// Generator-list policy: an action is granted when any generator allows it.
#[derive(Debug, Clone, Default)]
pub struct RecordPermissionPolicy {
    rules: BTreeMap<Action, Vec<Generator>>,
}

impl RecordPermissionPolicy {
    /// Empty policy denying every action.
    pub fn deny_all() -> Self {
        Self::default()
    }

    /// Owner-scoped policy.
    ///
    /// Anyone may search (results are owner-filtered), authenticated users may
    /// create, owners and system processes may read/update/delete.
    pub fn owner_scoped() -> Self {
        let owners = vec![Generator::RecordOwners, Generator::SystemProcess];
        Self::deny_all()
            .allow(Action::Search, vec![Generator::AnyUser])
            .allow(
                Action::Create,
                vec![Generator::AuthenticatedUser, Generator::SystemProcess],
            )
            .allow(Action::Read, owners.clone())
            .allow(Action::Update, owners.clone())
            .allow(Action::Delete, owners)
    }

    /// Public-read policy: everyone reads, authenticated users write.
    pub fn public_read() -> Self {
        let writers = vec![Generator::AuthenticatedUser, Generator::SystemProcess];
        Self::deny_all()
            .allow(Action::Search, vec![Generator::AnyUser])
            .allow(Action::Read, vec![Generator::AnyUser])
            .allow(Action::Create, writers.clone())
            .allow(Action::Update, writers.clone())
            .allow(Action::Delete, writers)
    }

    /// Replaces the generator list for `action`.
    pub fn allow(mut self, action: Action, generators: Vec<Generator>) -> Self {
        self.rules.insert(action, generators);
        self
    }

    pub fn generators(&self, action: Action) -> &[Generator] {
        self.rules.get(&action).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl PermissionPolicy for RecordPermissionPolicy {
    fn decide(&self, action: Action, identity: &Identity, record: Option<&Record>) -> Decision {
        let generators = self.generators(action);
        let allowed = generators
            .iter()
            .any(|generator| generator.allows(identity, record));
        let filter = QueryFilter::any(
            generators
                .iter()
                .map(|generator| generator.query_filter(identity)),
        );
        Decision::new(action, allowed, filter)
    }
}

//! Permission-scoped search request construction.
//!
//! # Responsibility
//! - Start every search from the `read` (or requested) permission filter.
//! - Run raw params through the configured interpreter chain.
//!
//! # Invariants
//! - The permission filter of a built request comes from the policy, never
//!   from params.
//! - The same identity always yields the same preference token.

use crate::model::identity::Identity;
use crate::permission::policy::{Action, PermissionPolicy};
use crate::schema::adapter::ValidationError;
use crate::search::interpreter::ParamInterpreter;
use crate::search::params::{SearchOptions, SearchParams};
use crate::search::request::SearchRequest;
use log::debug;
use std::sync::Arc;
use uuid::Uuid;

/// Namespace for preference tokens (UUID v5 over the actor key).
const PREFERENCE_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a4e_93b7_4d0a_a5e1_3c8d_27f4_b910);

/// Derives the stable preference token of one identity.
pub fn preference_token(identity: &Identity) -> String {
    Uuid::new_v5(&PREFERENCE_NAMESPACE, identity.actor_key().as_bytes()).to_string()
}

/// Builds search requests for one record type.
pub struct SearchRequestBuilder<'a> {
    search_alias: &'a str,
    policy: &'a dyn PermissionPolicy,
    interpreters: &'a [Arc<dyn ParamInterpreter>],
    options: &'a SearchOptions,
}

impl<'a> SearchRequestBuilder<'a> {
    pub fn new(
        search_alias: &'a str,
        policy: &'a dyn PermissionPolicy,
        interpreters: &'a [Arc<dyn ParamInterpreter>],
        options: &'a SearchOptions,
    ) -> Self {
        Self {
            search_alias,
            policy,
            interpreters,
            options,
        }
    }

    /// Base request scoped by the permission filter of `action`.
    pub fn create_search(
        &self,
        identity: &Identity,
        action: Action,
        preference: bool,
    ) -> SearchRequest {
        let decision = self.policy.decide(action, identity, None);
        let mut request = SearchRequest::new(self.search_alias, decision.query_filter().clone())
            .with_version(true);
        if preference {
            request = request.with_preference(preference_token(identity));
        }
        if self.options.requires_explicit_total_hits() {
            request = request.with_track_total_hits(true);
        }
        request
    }

    /// Base `read`-scoped request refined by every configured interpreter.
    pub fn search_request(
        &self,
        identity: &Identity,
        params: &SearchParams,
        preference: bool,
    ) -> Result<SearchRequest, ValidationError> {
        let mut request = self.create_search(identity, Action::Read, preference);
        for interpreter in self.interpreters {
            request = interpreter.apply(self.options, identity, request, params)?;
        }
        debug!(
            "event=search_request_built module=search status=ok index={} interpreters={} offset={} limit={}",
            request.index(),
            self.interpreters.len(),
            request.offset(),
            request.limit()
        );
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::{preference_token, SearchRequestBuilder};
    use crate::model::identity::Identity;
    use crate::permission::policy::{Action, RecordPermissionPolicy};
    use crate::search::filter::QueryFilter;
    use crate::search::interpreter::{PaginationInterpreter, ParamInterpreter, SortInterpreter};
    use crate::search::params::{SearchOptions, SearchParams};
    use crate::search::request::SortField;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn preference_token_is_stable_per_identity() {
        let alice = preference_token(&Identity::user("alice"));
        assert_eq!(alice, preference_token(&Identity::user("alice")));
        assert_ne!(alice, preference_token(&Identity::user("bob")));
        assert_ne!(alice, preference_token(&Identity::anonymous()));
    }

    #[test]
    fn create_search_applies_permission_filter_and_flags() {
        let policy = RecordPermissionPolicy::owner_scoped();
        let options = SearchOptions::default();
        let builder = SearchRequestBuilder::new("records", &policy, &[], &options);

        let request = builder.create_search(&Identity::user("alice"), Action::Read, true);
        assert_eq!(request.index(), "records");
        assert_eq!(
            request.permission_filter(),
            &QueryFilter::term("owners", "alice")
        );
        assert!(request.tracks_total_hits());
        assert!(request.includes_version());
        assert!(request.preference().is_some());

        let anonymous = builder.create_search(&Identity::anonymous(), Action::Read, false);
        assert_eq!(anonymous.permission_filter(), &QueryFilter::MatchNone);
        assert!(anonymous.preference().is_none());
    }

    #[test]
    fn legacy_backend_skips_total_hit_tracking() {
        let policy = RecordPermissionPolicy::public_read();
        let options = SearchOptions {
            backend_major_version: 6,
            ..SearchOptions::default()
        };
        let builder = SearchRequestBuilder::new("records", &policy, &[], &options);
        let request = builder.create_search(&Identity::anonymous(), Action::Read, false);
        assert!(!request.tracks_total_hits());
        assert_eq!(request.permission_filter(), &QueryFilter::MatchAll);
    }

    #[test]
    fn interpreter_chain_runs_in_order() {
        let policy = RecordPermissionPolicy::public_read();
        let options = SearchOptions::default();
        let interpreters: Vec<Arc<dyn ParamInterpreter>> =
            vec![Arc::new(PaginationInterpreter), Arc::new(SortInterpreter)];
        let builder = SearchRequestBuilder::new("records", &policy, &interpreters, &options);

        let request = builder
            .search_request(
                &Identity::anonymous(),
                &SearchParams::from_value(json!({"page": 2, "size": 10, "sort": "-created"})),
                false,
            )
            .unwrap();
        assert_eq!(request.offset(), 10);
        assert_eq!(request.limit(), 10);
        assert_eq!(request.sort_fields(), &[SortField::desc("created")]);
    }
}

//! Search request value built per call.
//!
//! # Invariants
//! - The permission filter is set once at construction and has no setter;
//!   every other clause is combined with it, never substituted for it.
//! - Requests are plain values: every modifier consumes and returns `self`.

use crate::search::filter::QueryFilter;
use std::fmt::{Display, Formatter};

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// One sort clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortField {
    pub field: String,
    pub order: SortOrder,
}

impl SortField {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Desc,
        }
    }

    /// Parses `field` (ascending) or `-field` (descending).
    ///
    /// Returns `None` for blank input.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        match value.strip_prefix('-') {
            Some(field) if !field.trim().is_empty() => Some(Self::desc(field.trim())),
            Some(_) => None,
            None if value.is_empty() => None,
            None => Some(Self::asc(value)),
        }
    }
}

impl Display for SortField {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.order {
            SortOrder::Asc => write!(f, "{}", self.field),
            SortOrder::Desc => write!(f, "-{}", self.field),
        }
    }
}

/// Terms aggregation (bucket counts per distinct field value).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermsAggregation {
    pub name: String,
    pub field: String,
    pub size: u32,
}

/// Permission-scoped query against one index alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    index: String,
    permission_filter: QueryFilter,
    filters: Vec<QueryFilter>,
    post_filters: Vec<QueryFilter>,
    query: Option<String>,
    sort: Vec<SortField>,
    offset: u32,
    limit: u32,
    preference: Option<String>,
    track_total_hits: bool,
    version: bool,
    aggregations: Vec<TermsAggregation>,
}

/// Page size used until a pagination clause is applied.
pub const DEFAULT_LIMIT: u32 = 10;

impl SearchRequest {
    pub fn new(index: impl Into<String>, permission_filter: QueryFilter) -> Self {
        Self {
            index: index.into(),
            permission_filter,
            filters: Vec::new(),
            post_filters: Vec::new(),
            query: None,
            sort: Vec::new(),
            offset: 0,
            limit: DEFAULT_LIMIT,
            preference: None,
            track_total_hits: false,
            version: false,
            aggregations: Vec::new(),
        }
    }

    /// Adds a filter applied to hits and aggregations.
    pub fn filter(mut self, filter: QueryFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Adds a filter applied to hits only (facet selection).
    pub fn post_filter(mut self, filter: QueryFilter) -> Self {
        self.post_filters.push(filter);
        self
    }

    /// Sets the full-text query; blank text clears it.
    pub fn query(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.query = if text.trim().is_empty() {
            None
        } else {
            Some(text.trim().to_string())
        };
        self
    }

    pub fn sort(mut self, sort: Vec<SortField>) -> Self {
        self.sort = sort;
        self
    }

    pub fn paginate(mut self, offset: u32, limit: u32) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    pub fn with_preference(mut self, token: impl Into<String>) -> Self {
        self.preference = Some(token.into());
        self
    }

    pub fn with_track_total_hits(mut self, track: bool) -> Self {
        self.track_total_hits = track;
        self
    }

    pub fn with_version(mut self, version: bool) -> Self {
        self.version = version;
        self
    }

    pub fn aggregate(mut self, aggregation: TermsAggregation) -> Self {
        self.aggregations
            .retain(|existing| existing.name != aggregation.name);
        self.aggregations.push(aggregation);
        self
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn permission_filter(&self) -> &QueryFilter {
        &self.permission_filter
    }

    pub fn filters(&self) -> &[QueryFilter] {
        &self.filters
    }

    pub fn post_filters(&self) -> &[QueryFilter] {
        &self.post_filters
    }

    pub fn query_text(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn sort_fields(&self) -> &[SortField] {
        &self.sort
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn preference(&self) -> Option<&str> {
        self.preference.as_deref()
    }

    pub fn tracks_total_hits(&self) -> bool {
        self.track_total_hits
    }

    pub fn includes_version(&self) -> bool {
        self.version
    }

    pub fn aggregations(&self) -> &[TermsAggregation] {
        &self.aggregations
    }

    /// Permission filter AND every regular filter.
    pub fn scope_filter(&self) -> QueryFilter {
        QueryFilter::all(
            std::iter::once(self.permission_filter.clone()).chain(self.filters.iter().cloned()),
        )
    }

    /// Scope filter AND every post filter; selects returned hits.
    pub fn hits_filter(&self) -> QueryFilter {
        QueryFilter::all(
            std::iter::once(self.scope_filter()).chain(self.post_filters.iter().cloned()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{SearchRequest, SortField, SortOrder};
    use crate::search::filter::QueryFilter;

    #[test]
    fn sort_field_parses_direction_prefix() {
        assert_eq!(SortField::parse("-created"), Some(SortField::desc("created")));
        assert_eq!(SortField::parse(" title "), Some(SortField::asc("title")));
        assert_eq!(SortField::parse("-"), None);
        assert_eq!(SortField::parse("  "), None);
        assert_eq!(SortField::desc("created").to_string(), "-created");
        assert_eq!(SortField::parse("-created").unwrap().order, SortOrder::Desc);
    }

    #[test]
    fn filters_never_replace_permission_filter() {
        let request = SearchRequest::new("records", QueryFilter::term("owners", "u1"))
            .filter(QueryFilter::MatchAll)
            .filter(QueryFilter::term("kind", "book"))
            .post_filter(QueryFilter::term("lang", "en"));

        assert_eq!(
            request.scope_filter(),
            QueryFilter::All(vec![
                QueryFilter::term("owners", "u1"),
                QueryFilter::term("kind", "book"),
            ])
        );
        assert_eq!(
            request.hits_filter(),
            QueryFilter::All(vec![
                QueryFilter::All(vec![
                    QueryFilter::term("owners", "u1"),
                    QueryFilter::term("kind", "book"),
                ]),
                QueryFilter::term("lang", "en"),
            ])
        );

        let denied = SearchRequest::new("records", QueryFilter::MatchNone)
            .filter(QueryFilter::MatchAll);
        assert_eq!(denied.hits_filter(), QueryFilter::MatchNone);
    }

    #[test]
    fn blank_query_clears_text() {
        let request = SearchRequest::new("records", QueryFilter::MatchAll).query("  ");
        assert_eq!(request.query_text(), None);
        let request = request.query(" dune ");
        assert_eq!(request.query_text(), Some("dune"));
    }
}

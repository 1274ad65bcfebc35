//! Search parameter interpreter chain.
//!
//! # Responsibility
//! - Turn raw search params into query, pagination, sort and facet clauses.
//!
//! # Invariants
//! - Interpreters run in configured order; each sees the previous output.
//! - Interpreters only add clauses; the permission filter is out of reach.

use crate::model::identity::Identity;
use crate::schema::adapter::{FieldError, ValidationError};
use crate::search::filter::{is_valid_field_path, QueryFilter};
use crate::search::params::{SearchOptions, SearchParams};
use crate::search::request::{SearchRequest, SortField, TermsAggregation};
use std::fmt::Debug;

/// One transformation step of the interpreter chain.
pub trait ParamInterpreter: Send + Sync + Debug {
    fn apply(
        &self,
        options: &SearchOptions,
        identity: &Identity,
        request: SearchRequest,
        params: &SearchParams,
    ) -> Result<SearchRequest, ValidationError>;
}

/// Maps `q` to the full-text query.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryStrInterpreter;

impl ParamInterpreter for QueryStrInterpreter {
    fn apply(
        &self,
        _options: &SearchOptions,
        _identity: &Identity,
        request: SearchRequest,
        params: &SearchParams,
    ) -> Result<SearchRequest, ValidationError> {
        Ok(match params.get_str("q") {
            Some(text) => request.query(text),
            None => request,
        })
    }
}

/// Maps 1-based `page` and `size` to offset/limit.
#[derive(Debug, Clone, Copy, Default)]
pub struct PaginationInterpreter;

impl ParamInterpreter for PaginationInterpreter {
    fn apply(
        &self,
        options: &SearchOptions,
        _identity: &Identity,
        request: SearchRequest,
        params: &SearchParams,
    ) -> Result<SearchRequest, ValidationError> {
        let mut errors = Vec::new();
        let page = parse_positive(params, "page", 1, &mut errors);
        let size = parse_positive(params, "size", options.default_page_size, &mut errors);

        if size > options.max_page_size {
            errors.push(FieldError::new(
                "size",
                format!("must not exceed {}", options.max_page_size),
            ));
        }
        if !errors.is_empty() {
            return Err(ValidationError::new(errors));
        }

        let offset = u64::from(page - 1) * u64::from(size);
        if offset + u64::from(size) > u64::from(options.max_result_window) {
            return Err(ValidationError::single(
                "page",
                format!(
                    "result window is limited to {} hits",
                    options.max_result_window
                ),
            ));
        }

        // Bounded by max_result_window above.
        let offset = u32::try_from(offset).unwrap_or(u32::MAX);
        Ok(request.paginate(offset, size))
    }
}

/// Maps `sort` (`field`, `-field`, comma separated) to sort clauses.
#[derive(Debug, Clone, Copy, Default)]
pub struct SortInterpreter;

impl ParamInterpreter for SortInterpreter {
    fn apply(
        &self,
        options: &SearchOptions,
        _identity: &Identity,
        request: SearchRequest,
        params: &SearchParams,
    ) -> Result<SearchRequest, ValidationError> {
        let raw = match params.get_str("sort") {
            Some(raw) => raw,
            // Text queries default to relevance order.
            None if request.query_text().is_some() => return Ok(request),
            None => match options.default_sort.as_deref() {
                Some(default_sort) => default_sort.to_string(),
                None => return Ok(request),
            },
        };

        let mut sort = Vec::new();
        for part in raw.split(',') {
            let Some(field) = SortField::parse(part) else {
                continue;
            };
            if !options.sort_fields.iter().any(|name| name == &field.field) {
                return Err(ValidationError::single(
                    "sort",
                    format!("unsupported sort field `{}`", field.field),
                ));
            }
            sort.push(field);
        }

        if sort.is_empty() {
            return Ok(request);
        }
        Ok(request.sort(sort))
    }
}

/// Adds a terms aggregation per configured facet and turns facet params
/// into post filters.
#[derive(Debug, Clone, Copy, Default)]
pub struct FacetsInterpreter;

impl ParamInterpreter for FacetsInterpreter {
    fn apply(
        &self,
        options: &SearchOptions,
        _identity: &Identity,
        mut request: SearchRequest,
        params: &SearchParams,
    ) -> Result<SearchRequest, ValidationError> {
        for facet in &options.facets {
            if !is_valid_field_path(facet) {
                return Err(ValidationError::single(
                    facet.as_str(),
                    "facet is not a valid field path",
                ));
            }

            request = request.aggregate(TermsAggregation {
                name: facet.clone(),
                field: facet.clone(),
                size: options.facet_size,
            });

            let selected = params.get_all_str(facet);
            if !selected.is_empty() {
                request = request.post_filter(QueryFilter::any(
                    selected
                        .into_iter()
                        .map(|value| QueryFilter::keyword(facet.as_str(), value)),
                ));
            }
        }
        Ok(request)
    }
}

fn parse_positive(
    params: &SearchParams,
    key: &str,
    default: u32,
    errors: &mut Vec<FieldError>,
) -> u32 {
    let Some(raw) = params.get_str(key) else {
        return default;
    };
    match raw.trim().parse::<u32>() {
        Ok(value) if value >= 1 => value,
        _ => {
            errors.push(FieldError::new(key, "must be a positive integer"));
            default
        }
    }
}

//! SQLite FTS5-backed search index.
//!
//! # Responsibility
//! - Store one JSON document per record and keep the FTS5 table in sync.
//! - Compile [`SearchRequest`] values into parameterized SQL.
//!
//! # Invariants
//! - Every filter value and JSON path is bound or validated, never spliced raw.
//! - Hit ordering is deterministic (`pid` breaks ties).
//! - Aggregations ignore post filters; hits and totals honor them.

use crate::model::record::{now_epoch_ms, Record, RecordId, RecordState};
use crate::search::filter::{is_valid_field_path, FilterValue, QueryFilter};
use crate::search::index::{
    record_to_content, record_to_document, Bucket, IndexError, IndexResult, SearchHit,
    SearchHits, SearchIndex,
};
use crate::search::request::SearchRequest;
use log::debug;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// SQLite-backed index writing documents under one concrete index name.
pub struct SqliteSearchIndex<'conn> {
    conn: &'conn Connection,
    index_name: String,
    hidden_fields: BTreeSet<String>,
}

impl<'conn> SqliteSearchIndex<'conn> {
    /// `index_name` should start with the search alias followed by `-`.
    pub fn new(conn: &'conn Connection, index_name: impl Into<String>) -> Self {
        Self {
            conn,
            index_name: index_name.into(),
            hidden_fields: BTreeSet::new(),
        }
    }

    /// Keeps the named payload fields out of the full-text body.
    ///
    /// Fields stay in the stored document for filters and masked rendering.
    pub fn with_hidden_fields<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<String>,
    {
        self.hidden_fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Returns the stored document of one record, if indexed.
    pub fn get(&self, pid: RecordId) -> IndexResult<Option<SearchHit>> {
        self.conn
            .query_row(
                "SELECT pid, document, revision, NULL AS score
                 FROM record_index
                 WHERE pid = ?1;",
                [pid.to_string()],
                |row| Ok(parse_hit_row(row, true)),
            )
            .optional()?
            .transpose()
    }
}

impl SearchIndex for SqliteSearchIndex<'_> {
    fn index(&self, record: &Record) -> IndexResult<()> {
        match record.state {
            RecordState::Deleted => return self.delete(record),
            RecordState::Draft => {
                return Err(IndexError::InvalidData(format!(
                    "record {} is an uncommitted draft",
                    record.pid
                )));
            }
            RecordState::Active => {}
        }

        let document = serde_json::to_string(&record_to_document(record))
            .map_err(|err| IndexError::InvalidData(err.to_string()))?;
        let changed = self.conn.execute(
            "INSERT INTO record_index (
                pid,
                index_name,
                document,
                body,
                revision,
                indexed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT (pid) DO UPDATE SET
                index_name = excluded.index_name,
                document = excluded.document,
                body = excluded.body,
                revision = excluded.revision,
                indexed_at = excluded.indexed_at
            WHERE excluded.revision >= record_index.revision;",
            params![
                record.pid.to_string(),
                self.index_name.as_str(),
                document,
                record_to_content(record, &self.hidden_fields),
                record.revision,
                now_epoch_ms(),
            ],
        )?;
        if changed == 0 {
            debug!(
                "event=index_write module=search status=skipped reason=stale_revision pid={} revision={}",
                record.pid, record.revision
            );
        }
        Ok(())
    }

    fn delete(&self, record: &Record) -> IndexResult<()> {
        self.conn.execute(
            "DELETE FROM record_index WHERE pid = ?1 AND revision <= ?2;",
            params![record.pid.to_string(), record.revision],
        )?;
        Ok(())
    }

    fn execute(&self, request: &SearchRequest) -> IndexResult<SearchHits> {
        let match_expr = request.query_text().and_then(build_match_expression);
        let from = if match_expr.is_some() {
            "FROM record_index ri
             JOIN record_index_fts ON record_index_fts.rowid = ri.rowid"
        } else {
            "FROM record_index ri"
        };

        let alias = request.index();
        let alias_prefix = format!("{alias}-");
        let mut scope_binds = vec![
            SqlValue::Text(alias.to_string()),
            SqlValue::Integer(i64::try_from(alias_prefix.chars().count()).unwrap_or(i64::MAX)),
            SqlValue::Text(alias_prefix),
        ];
        let mut scope_parts =
            vec!["(ri.index_name = ? OR substr(ri.index_name, 1, ?) = ?)".to_string()];
        if let Some(expr) = &match_expr {
            scope_parts.push("record_index_fts MATCH ?".to_string());
            scope_binds.push(SqlValue::Text(expr.clone()));
        }
        scope_parts.push(compile_filter(&request.scope_filter(), &mut scope_binds)?);
        let scope_sql = scope_parts.join(" AND ");

        let mut hit_binds = scope_binds.clone();
        let post_filter = QueryFilter::all(request.post_filters().iter().cloned());
        let hits_sql = format!(
            "{scope_sql} AND {}",
            compile_filter(&post_filter, &mut hit_binds)?
        );

        let total = self
            .conn
            .query_row(
                &format!("SELECT COUNT(*) {from} WHERE {hits_sql};"),
                params_from_iter(hit_binds.iter()),
                |row| row.get::<_, i64>(0),
            )
            .map_err(|err| map_query_error(err, match_expr.as_deref()))?;

        let hits = if request.limit() == 0 {
            Vec::new()
        } else {
            let score = if match_expr.is_some() {
                "-bm25(record_index_fts)"
            } else {
                "NULL"
            };
            let sql = format!(
                "SELECT ri.pid AS pid, ri.document AS document, ri.revision AS revision, {score} AS score
                 {from}
                 WHERE {hits_sql}
                 ORDER BY {}
                 LIMIT ? OFFSET ?;",
                order_clause(request, match_expr.is_some())?
            );
            let mut binds = hit_binds;
            binds.push(SqlValue::Integer(i64::from(request.limit())));
            binds.push(SqlValue::Integer(i64::from(request.offset())));

            let mut stmt = self.conn.prepare(&sql)?;
            let mut rows = stmt
                .query(params_from_iter(binds.iter()))
                .map_err(|err| map_query_error(err, match_expr.as_deref()))?;
            let mut hits = Vec::new();
            while let Some(row) = rows
                .next()
                .map_err(|err| map_query_error(err, match_expr.as_deref()))?
            {
                hits.push(parse_hit_row(row, request.includes_version())?);
            }
            hits
        };

        let bucket_key = bucket_key_sql("je");
        let mut aggregations = BTreeMap::new();
        for aggregation in request.aggregations() {
            if !is_valid_field_path(&aggregation.field) {
                return Err(IndexError::InvalidField(aggregation.field.clone()));
            }
            let sql = format!(
                "SELECT
                    {bucket_key} AS bucket_key,
                    COUNT(DISTINCT ri.pid) AS doc_count
                 {from}
                 JOIN json_each(ri.document, ?) AS je
                 WHERE {scope_sql}
                   AND je.type IN ('text', 'integer', 'true', 'false')
                 GROUP BY bucket_key
                 ORDER BY doc_count DESC, bucket_key ASC
                 LIMIT ?;"
            );
            let mut binds = vec![SqlValue::Text(json_path(&aggregation.field))];
            binds.extend(scope_binds.iter().cloned());
            binds.push(SqlValue::Integer(i64::from(aggregation.size)));

            let mut stmt = self.conn.prepare(&sql)?;
            let buckets = stmt
                .query_map(params_from_iter(binds.iter()), |row| {
                    Ok(Bucket {
                        key: row.get("bucket_key")?,
                        doc_count: u64::try_from(row.get::<_, i64>("doc_count")?).unwrap_or(0),
                    })
                })
                .map_err(|err| map_query_error(err, match_expr.as_deref()))?
                .collect::<Result<Vec<_>, _>>()?;
            aggregations.insert(aggregation.name.clone(), buckets);
        }

        Ok(SearchHits {
            total: u64::try_from(total).unwrap_or(0),
            hits,
            aggregations,
        })
    }
}

/// Text rendering of a `json_each` scalar shared by buckets and keyword terms.
fn bucket_key_sql(alias: &str) -> String {
    format!(
        "CASE {alias}.type WHEN 'true' THEN 'true' WHEN 'false' THEN 'false' ELSE CAST({alias}.value AS TEXT) END"
    )
}

fn compile_filter(filter: &QueryFilter, binds: &mut Vec<SqlValue>) -> IndexResult<String> {
    match filter {
        QueryFilter::MatchAll => Ok("1 = 1".to_string()),
        QueryFilter::MatchNone => Ok("1 = 0".to_string()),
        QueryFilter::Term { field, value } => {
            if !is_valid_field_path(field) {
                return Err(IndexError::InvalidField(field.clone()));
            }
            binds.push(SqlValue::Text(json_path(field)));
            Ok(match value {
                FilterValue::Text(text) => {
                    binds.push(SqlValue::Text("text".to_string()));
                    binds.push(SqlValue::Text(text.clone()));
                    "EXISTS (SELECT 1 FROM json_each(ri.document, ?) AS jt WHERE jt.type = ? AND jt.value = ?)"
                        .to_string()
                }
                FilterValue::Integer(number) => {
                    binds.push(SqlValue::Text("integer".to_string()));
                    binds.push(SqlValue::Integer(*number));
                    "EXISTS (SELECT 1 FROM json_each(ri.document, ?) AS jt WHERE jt.type = ? AND jt.value = ?)"
                        .to_string()
                }
                FilterValue::Bool(flag) => {
                    binds.push(SqlValue::Text(flag.to_string()));
                    "EXISTS (SELECT 1 FROM json_each(ri.document, ?) AS jt WHERE jt.type = ?)"
                        .to_string()
                }
                FilterValue::Keyword(key) => {
                    binds.push(SqlValue::Text(key.clone()));
                    format!(
                        "EXISTS (SELECT 1 FROM json_each(ri.document, ?) AS jt WHERE jt.type IN ('text', 'integer', 'true', 'false') AND {} = ?)",
                        bucket_key_sql("jt")
                    )
                }
            })
        }
        QueryFilter::Any(filters) if filters.is_empty() => Ok("1 = 0".to_string()),
        QueryFilter::All(filters) if filters.is_empty() => Ok("1 = 1".to_string()),
        QueryFilter::Any(filters) | QueryFilter::All(filters) => {
            let joiner = if matches!(filter, QueryFilter::Any(_)) {
                " OR "
            } else {
                " AND "
            };
            let parts = filters
                .iter()
                .map(|inner| compile_filter(inner, binds))
                .collect::<IndexResult<Vec<_>>>()?;
            Ok(format!("({})", parts.join(joiner)))
        }
    }
}

fn order_clause(request: &SearchRequest, has_match: bool) -> IndexResult<String> {
    let sort = request.sort_fields();
    if sort.is_empty() {
        return Ok(if has_match {
            "bm25(record_index_fts) ASC, ri.pid ASC".to_string()
        } else {
            "ri.pid ASC".to_string()
        });
    }

    let mut parts = Vec::with_capacity(sort.len() + 1);
    for field in sort {
        if !is_valid_field_path(&field.field) {
            return Err(IndexError::InvalidField(field.field.clone()));
        }
        // Field path validated above; safe to inline.
        parts.push(format!(
            "json_extract(ri.document, '{}') {}",
            json_path(&field.field),
            field.order.as_sql()
        ));
    }
    parts.push("ri.pid ASC".to_string());
    Ok(parts.join(", "))
}

fn json_path(field: &str) -> String {
    format!("$.{field}")
}

fn parse_hit_row(row: &Row<'_>, with_revision: bool) -> IndexResult<SearchHit> {
    let pid_text: String = row.get("pid")?;
    let pid = Uuid::parse_str(&pid_text)
        .map_err(|_| IndexError::InvalidData(format!("invalid pid `{pid_text}`")))?;

    let document_text: String = row.get("document")?;
    let document = match serde_json::from_str::<serde_json::Value>(&document_text) {
        Ok(serde_json::Value::Object(map)) => map,
        _ => {
            return Err(IndexError::InvalidData(format!(
                "document for `{pid}` is not a JSON object"
            )));
        }
    };

    let revision = if with_revision {
        Some(row.get::<_, i64>("revision")?)
    } else {
        None
    };

    Ok(SearchHit {
        pid,
        document,
        revision,
        score: row.get::<_, Option<f64>>("score")?,
    })
}

fn build_match_expression(text: &str) -> Option<String> {
    let terms = text
        .split_whitespace()
        .filter(|term| !term.is_empty())
        .map(escape_fts_term)
        .collect::<Vec<_>>();

    if terms.is_empty() {
        return None;
    }

    Some(terms.join(" AND "))
}

fn escape_fts_term(raw: &str) -> String {
    let escaped = raw.replace('"', "\"\"");
    format!("\"{escaped}\"")
}

fn map_query_error(err: rusqlite::Error, query: Option<&str>) -> IndexError {
    match query {
        Some(query) if is_match_syntax_error(&err) => IndexError::InvalidQuery {
            query: query.to_string(),
            message: err.to_string(),
        },
        _ => IndexError::from(err),
    }
}

fn is_match_syntax_error(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(_, Some(message)) => {
            let msg = message.to_lowercase();
            (msg.contains("fts5") && msg.contains("syntax"))
                || msg.contains("malformed match expression")
                || msg.contains("unterminated")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::{build_match_expression, compile_filter, SqliteSearchIndex};
    use crate::db::open_db_in_memory;
    use crate::model::record::{Record, RecordState};
    use crate::search::filter::QueryFilter;
    use crate::search::index::{IndexError, SearchIndex};
    use crate::search::request::{SearchRequest, SortField, TermsAggregation};
    use serde_json::json;

    fn active(title: &str, owner: &str, kind: &str) -> Record {
        let mut record = Record::allocate("record");
        record.state = RecordState::Active;
        record.revision = 1;
        record.data.insert("title".to_string(), json!(title));
        record.data.insert("owners".to_string(), json!([owner]));
        record.data.insert("kind".to_string(), json!(kind));
        record
    }

    fn all_records() -> SearchRequest {
        SearchRequest::new("records", QueryFilter::MatchAll).paginate(0, 50)
    }

    #[test]
    fn match_expression_quotes_terms() {
        assert_eq!(
            build_match_expression("rust \"fts\""),
            Some("\"rust\" AND \"\"\"fts\"\"\"".to_string())
        );
        assert_eq!(build_match_expression("   "), None);
    }

    #[test]
    fn compile_filter_binds_values_and_rejects_bad_paths() {
        let mut binds = Vec::new();
        let sql = compile_filter(
            &QueryFilter::Any(vec![
                QueryFilter::term("owners", "u1"),
                QueryFilter::term("public", true),
            ]),
            &mut binds,
        )
        .unwrap();
        assert!(sql.starts_with("(EXISTS"));
        assert!(sql.contains(" OR "));
        assert_eq!(binds.len(), 5);

        let err = compile_filter(&QueryFilter::term("a'--", "x"), &mut Vec::new()).unwrap_err();
        assert!(matches!(err, IndexError::InvalidField(_)));
    }

    #[test]
    fn indexes_and_filters_documents() {
        let conn = open_db_in_memory().unwrap();
        let index = SqliteSearchIndex::new(&conn, "records-v1");
        let alice = active("Dune", "alice", "book");
        let bob = active("Dune Messiah", "bob", "book");
        let film = active("Dune", "bob", "film");
        for record in [&alice, &bob, &film] {
            index.index(record).unwrap();
        }

        let everything = index.execute(&all_records()).unwrap();
        assert_eq!(everything.total, 3);

        let owned = index
            .execute(&SearchRequest::new("records", QueryFilter::term("owners", "bob")))
            .unwrap();
        assert_eq!(owned.total, 2);
        assert!(owned.hits.iter().all(|hit| hit.pid != alice.pid));

        let messiah = index.execute(&all_records().query("messiah")).unwrap();
        assert_eq!(messiah.total, 1);
        assert_eq!(messiah.hits[0].pid, bob.pid);
        assert!(messiah.hits[0].score.is_some());

        let nobody = index
            .execute(&SearchRequest::new("records", QueryFilter::MatchNone))
            .unwrap();
        assert_eq!(nobody.total, 0);
        assert!(nobody.hits.is_empty());
    }

    #[test]
    fn alias_matching_requires_prefix_boundary() {
        let conn = open_db_in_memory().unwrap();
        SqliteSearchIndex::new(&conn, "records-v1")
            .index(&active("a", "u", "book"))
            .unwrap();
        SqliteSearchIndex::new(&conn, "recordsextra-v1")
            .index(&active("b", "u", "book"))
            .unwrap();

        let index = SqliteSearchIndex::new(&conn, "records-v1");
        assert_eq!(index.execute(&all_records()).unwrap().total, 1);
        let exact = SearchRequest::new("records-v1", QueryFilter::MatchAll);
        assert_eq!(index.execute(&exact).unwrap().total, 1);
    }

    #[test]
    fn sorts_paginates_and_reports_versions() {
        let conn = open_db_in_memory().unwrap();
        let index = SqliteSearchIndex::new(&conn, "records-v1");
        let mut records = Vec::new();
        for (position, title) in ["a", "b", "c"].into_iter().enumerate() {
            let mut record = active(title, "u", "book");
            record.created_at = 1_000 + i64::try_from(position).unwrap();
            index.index(&record).unwrap();
            records.push(record);
        }

        let page = index
            .execute(
                &all_records()
                    .sort(vec![SortField::desc("created")])
                    .paginate(1, 1)
                    .with_version(true),
            )
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.hits.len(), 1);
        assert_eq!(page.hits[0].pid, records[1].pid);
        assert_eq!(page.hits[0].revision, Some(1));

        let unversioned = index.execute(&all_records()).unwrap();
        assert!(unversioned.hits.iter().all(|hit| hit.revision.is_none()));
    }

    #[test]
    fn aggregations_ignore_post_filters() {
        let conn = open_db_in_memory().unwrap();
        let index = SqliteSearchIndex::new(&conn, "records-v1");
        index.index(&active("a", "u", "book")).unwrap();
        index.index(&active("b", "u", "book")).unwrap();
        index.index(&active("c", "u", "film")).unwrap();

        let result = index
            .execute(
                &all_records()
                    .aggregate(TermsAggregation {
                        name: "kind".to_string(),
                        field: "kind".to_string(),
                        size: 10,
                    })
                    .post_filter(QueryFilter::term("kind", "film")),
            )
            .unwrap();
        assert_eq!(result.total, 1);
        let buckets = &result.aggregations["kind"];
        assert_eq!(buckets.len(), 2);
        assert_eq!((buckets[0].key.as_str(), buckets[0].doc_count), ("book", 2));
        assert_eq!((buckets[1].key.as_str(), buckets[1].doc_count), ("film", 1));
    }

    #[test]
    fn stale_revisions_do_not_overwrite_and_delete_is_idempotent() {
        let conn = open_db_in_memory().unwrap();
        let index = SqliteSearchIndex::new(&conn, "records-v1");
        let mut record = active("new title", "u", "book");
        record.revision = 2;
        index.index(&record).unwrap();

        let mut stale = record.clone();
        stale.revision = 1;
        stale
            .data
            .insert("title".to_string(), json!("old title"));
        index.index(&stale).unwrap();

        let stored = index.get(record.pid).unwrap().unwrap();
        assert_eq!(stored.document.get("title"), Some(&json!("new title")));
        assert_eq!(stored.revision, Some(2));

        let mut tombstone = record.clone();
        tombstone.state = RecordState::Deleted;
        tombstone.revision = 3;
        index.index(&tombstone).unwrap();
        assert!(index.get(record.pid).unwrap().is_none());
        index.delete(&tombstone).unwrap();
    }

    #[test]
    fn drafts_are_rejected() {
        let conn = open_db_in_memory().unwrap();
        let index = SqliteSearchIndex::new(&conn, "records-v1");
        let err = index.index(&Record::allocate("record")).unwrap_err();
        assert!(matches!(err, IndexError::InvalidData(_)));
    }
}

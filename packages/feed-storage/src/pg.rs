//! Postgres document store.
//!
//! Every collection lives in `feed_documents` as JSONB bodies. Predicates and sort keys are
//! rendered into SQL over the body; `_id` maps onto the `doc_id` column so id bounds and the
//! tie-break use the primary key.

use feed_domain::{
	Collection, Document,
	pipeline::{Path, Predicate, Query, Scalar, SortKey, ValueKind},
};
use sqlx::{PgPool, Postgres, QueryBuilder, types::Json};

use crate::{
	Result,
	store::{BoxFuture, DocumentStore, document_id},
};

#[derive(Debug, Clone, Copy)]
enum Comparison {
	Gt,
	Gte,
	Lt,
	Lte,
}
impl Comparison {
	fn operator(self) -> &'static str {
		match self {
			Self::Gt => " > ",
			Self::Gte => " >= ",
			Self::Lt => " < ",
			Self::Lte => " <= ",
		}
	}
}

#[derive(Debug, Clone)]
pub struct PgStore {
	pool: PgPool,
}
impl PgStore {
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}

	async fn select(&self, collection: Collection, query: &Query) -> Result<Vec<Document>> {
		let mut builder = QueryBuilder::<Postgres>::new("SELECT body FROM feed_documents WHERE ");

		push_scope(&mut builder, collection, &query.predicate);

		if !query.sort.is_empty() {
			builder.push(" ORDER BY ");

			for (idx, key) in query.sort.iter().enumerate() {
				if idx > 0 {
					builder.push(", ");
				}

				push_sort_key(&mut builder, key);
			}
		}
		if let Some(skip) = query.skip {
			builder.push(" OFFSET ");
			builder.push_bind(clamp_i64(skip));
		}
		if let Some(limit) = query.limit {
			builder.push(" LIMIT ");
			builder.push_bind(clamp_i64(limit));
		}

		let rows: Vec<Json<Document>> =
			builder.build_query_scalar().fetch_all(&self.pool).await?;

		Ok(rows.into_iter().map(|row| row.0).collect())
	}

	async fn select_count(&self, collection: Collection, predicate: &Predicate) -> Result<u64> {
		let mut builder =
			QueryBuilder::<Postgres>::new("SELECT count(*) FROM feed_documents WHERE ");

		push_scope(&mut builder, collection, predicate);

		let count: i64 = builder.build_query_scalar().fetch_one(&self.pool).await?;

		Ok(count.max(0) as u64)
	}

	async fn upsert(&self, collection: Collection, doc: Document) -> Result<()> {
		let doc_id = document_id(&doc)?;

		sqlx::query(
			"\
INSERT INTO feed_documents (collection, doc_id, body)
VALUES ($1, $2, $3)
ON CONFLICT (collection, doc_id) DO UPDATE
SET body = EXCLUDED.body,
	updated_at = now()",
		)
		.bind(collection.as_str())
		.bind(doc_id)
		.bind(Json(doc))
		.execute(&self.pool)
		.await?;

		Ok(())
	}
}
impl DocumentStore for PgStore {
	fn find<'a>(
		&'a self,
		collection: Collection,
		query: &'a Query,
	) -> BoxFuture<'a, Result<Vec<Document>>> {
		Box::pin(self.select(collection, query))
	}

	fn count<'a>(
		&'a self,
		collection: Collection,
		predicate: &'a Predicate,
	) -> BoxFuture<'a, Result<u64>> {
		Box::pin(self.select_count(collection, predicate))
	}

	fn insert<'a>(&'a self, collection: Collection, doc: Document) -> BoxFuture<'a, Result<()>> {
		Box::pin(self.upsert(collection, doc))
	}
}

fn push_scope(
	builder: &mut QueryBuilder<'_, Postgres>,
	collection: Collection,
	predicate: &Predicate,
) {
	builder.push("collection = ");
	builder.push_bind(collection.as_str());
	builder.push(" AND ");
	push_predicate(builder, predicate);
}

/// Renders a predicate so that it evaluates to `TRUE` or `FALSE`, never `NULL`, matching the
/// in-memory semantics under negation.
pub fn push_predicate(builder: &mut QueryBuilder<'_, Postgres>, predicate: &Predicate) {
	match predicate {
		Predicate::True => {
			builder.push("TRUE");
		},
		Predicate::False => {
			builder.push("FALSE");
		},
		Predicate::And(terms) => push_joined(builder, terms, " AND ", "TRUE"),
		Predicate::Or(terms) => push_joined(builder, terms, " OR ", "FALSE"),
		Predicate::Not(term) => {
			builder.push("NOT (");
			push_predicate(builder, term);
			builder.push(")");
		},
		Predicate::Eq { path, value } => push_eq(builder, path, value),
		Predicate::Ne { path, value } => {
			builder.push("NOT (");
			push_eq(builder, path, value);
			builder.push(")");
		},
		Predicate::In { path, values } => push_in(builder, path, values),
		Predicate::Gt { path, value } => push_compare(builder, path, value, Comparison::Gt),
		Predicate::Gte { path, value } => push_compare(builder, path, value, Comparison::Gte),
		Predicate::Lt { path, value } => push_compare(builder, path, value, Comparison::Lt),
		Predicate::Lte { path, value } => push_compare(builder, path, value, Comparison::Lte),
		Predicate::NotEmpty { path } => {
			builder.push("COALESCE(jsonb_typeof(body #> ");
			builder.push_bind(path.segments());
			builder.push(") = 'array' AND jsonb_array_length(body #> ");
			builder.push_bind(path.segments());
			builder.push(") > 0, FALSE)");
		},
	}
}

fn push_joined(
	builder: &mut QueryBuilder<'_, Postgres>,
	terms: &[Predicate],
	separator: &str,
	empty: &str,
) {
	if terms.is_empty() {
		builder.push(empty);

		return;
	}

	builder.push("(");

	for (idx, term) in terms.iter().enumerate() {
		if idx > 0 {
			builder.push(separator);
		}

		push_predicate(builder, term);
	}

	builder.push(")");
}

fn push_eq(builder: &mut QueryBuilder<'_, Postgres>, path: &Path, value: &Scalar) {
	match value {
		Scalar::Id(id) if path.is_id() => {
			builder.push("doc_id = ");
			builder.push_bind(*id);
		},
		Scalar::Null => {
			builder.push("COALESCE(jsonb_typeof(body #> ");
			builder.push_bind(path.segments());
			builder.push(") = 'null', TRUE)");
		},
		Scalar::DateTime(_) => push_compare_with(builder, path, value, " = "),
		_ => {
			// Containment also matches scalars held inside an array.
			builder.push("COALESCE((body #> ");
			builder.push_bind(path.segments());
			builder.push(") @> ");
			builder.push_bind(Json(value.to_json()));
			builder.push(", FALSE)");
		},
	}
}

fn push_in(builder: &mut QueryBuilder<'_, Postgres>, path: &Path, values: &[Scalar]) {
	if values.is_empty() {
		builder.push("FALSE");

		return;
	}

	let ids: Option<Vec<uuid::Uuid>> = values
		.iter()
		.map(|value| match value {
			Scalar::Id(id) => Some(*id),
			_ => None,
		})
		.collect();

	if path.is_id()
		&& let Some(ids) = ids
	{
		builder.push("doc_id = ANY(");
		builder.push_bind(ids);
		builder.push(")");

		return;
	}

	builder.push("(");

	for (idx, value) in values.iter().enumerate() {
		if idx > 0 {
			builder.push(" OR ");
		}

		push_eq(builder, path, value);
	}

	builder.push(")");
}

fn push_compare(
	builder: &mut QueryBuilder<'_, Postgres>,
	path: &Path,
	value: &Scalar,
	comparison: Comparison,
) {
	push_compare_with(builder, path, value, comparison.operator());
}

fn push_compare_with(
	builder: &mut QueryBuilder<'_, Postgres>,
	path: &Path,
	value: &Scalar,
	operator: &str,
) {
	let Some(kind) = value.kind() else {
		builder.push("FALSE");

		return;
	};

	builder.push("COALESCE(");
	push_typed_field(builder, path, kind);
	builder.push(operator);

	match value {
		Scalar::Id(id) if path.is_id() => {
			builder.push_bind(*id);
		},
		Scalar::Id(id) => {
			builder.push_bind(id.to_string());
			builder.push(" COLLATE \"C\"");
		},
		Scalar::Text(text) => {
			builder.push_bind(text.clone());
			builder.push(" COLLATE \"C\"");
		},
		Scalar::Number(number) => {
			builder.push_bind(*number);
		},
		Scalar::Bool(flag) => {
			builder.push_bind(*flag);
		},
		Scalar::DateTime(ts) => {
			builder.push_bind(*ts);
		},
		Scalar::Null => {
			builder.push("NULL");
		},
	}

	builder.push(", FALSE)");
}

/// The field as a typed SQL expression, `NULL` when missing or of another JSON type.
fn push_typed_field(builder: &mut QueryBuilder<'_, Postgres>, path: &Path, kind: ValueKind) {
	if path.is_id() && kind == ValueKind::Id {
		builder.push("doc_id");

		return;
	}

	let (json_type, cast) = match kind {
		ValueKind::Id | ValueKind::Text => ("string", " COLLATE \"C\""),
		ValueKind::Number => ("number", ")::double precision"),
		ValueKind::Bool => ("boolean", ")::boolean"),
		ValueKind::DateTime => ("string", ")::timestamptz"),
	};
	let opens_cast = matches!(kind, ValueKind::Number | ValueKind::Bool | ValueKind::DateTime);

	builder.push("(CASE WHEN jsonb_typeof(body #> ");
	builder.push_bind(path.segments());
	builder.push(") = '");
	builder.push(json_type);
	builder.push("'");

	// Strings that do not parse as timestamps decode to NULL instead of failing the query.
	if kind == ValueKind::DateTime {
		builder.push(" AND pg_input_is_valid(body #>> ");
		builder.push_bind(path.segments());
		builder.push(", 'timestamptz')");
	}

	builder.push(" THEN ");

	if opens_cast {
		builder.push("(");
	}

	builder.push("body #>> ");
	builder.push_bind(path.segments());

	if opens_cast {
		builder.push(cast);
		builder.push(" END)");
	} else {
		builder.push(" END)");
		builder.push(cast);
	}
}

fn push_sort_key(builder: &mut QueryBuilder<'_, Postgres>, key: &SortKey) {
	push_typed_field(builder, &key.path, key.kind);
	builder.push(" ");
	builder.push(key.direction.as_sql());
}

fn clamp_i64(value: u64) -> i64 {
	i64::try_from(value).unwrap_or(i64::MAX)
}

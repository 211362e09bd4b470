//! Pipeline interpreter.
//!
//! The leading match/sort/skip/limit stages of a pipeline and the filter, sort and cap of every
//! lookup are pushed down into [`DocumentStore::find`]. Everything else runs in process over the
//! documents the store returned.

use std::collections::{HashMap, HashSet};

use feed_domain::{
	Document,
	pipeline::{self, Lookup, Pipeline, Predicate, Query, Scalar, Stage},
};
use serde_json::Value;
use uuid::Uuid;

use crate::{DocumentStore, Result};

pub async fn execute(store: &dyn DocumentStore, pipeline: &Pipeline) -> Result<Vec<Document>> {
	let (query, rest) = leading_query(&pipeline.stages);

	if matches!(query.predicate, Predicate::False) {
		return Ok(Vec::new());
	}

	let mut docs = store.find(pipeline.collection, &query).await?;

	for stage in rest {
		docs = apply(store, stage, docs).await?;
	}

	Ok(docs)
}

/// Number of documents the pipeline yields. A pipeline that is a single scan is counted by the
/// store.
pub async fn count(store: &dyn DocumentStore, pipeline: &Pipeline) -> Result<u64> {
	match pipeline.stages.as_slice() {
		[Stage::Match(predicate)] | [Stage::Match(predicate), Stage::Sort(_)] =>
			store.count(pipeline.collection, predicate).await,
		_ => Ok(execute(store, pipeline).await?.len() as u64),
	}
}

fn leading_query(stages: &[Stage]) -> (Query, &[Stage]) {
	let mut predicates = Vec::new();
	let mut idx = 0;

	while let Some(Stage::Match(predicate)) = stages.get(idx) {
		predicates.push(predicate.clone());

		idx += 1;
	}

	let mut query = Query::filter(Predicate::all(predicates));

	if let Some(Stage::Sort(keys)) = stages.get(idx) {
		query.sort = keys.clone();

		idx += 1;
	}
	if let Some(Stage::Skip(skip)) = stages.get(idx) {
		query.skip = Some(*skip);

		idx += 1;
	}
	if let Some(Stage::Limit(limit)) = stages.get(idx) {
		query.limit = Some(*limit);

		idx += 1;
	}

	(query, &stages[idx..])
}

async fn apply(
	store: &dyn DocumentStore,
	stage: &Stage,
	mut docs: Vec<Document>,
) -> Result<Vec<Document>> {
	match stage {
		Stage::Match(predicate) => docs.retain(|doc| predicate.matches(doc)),
		Stage::Sort(keys) =>
			docs.sort_by(|lhs, rhs| pipeline::compare_documents(keys, lhs, rhs)),
		Stage::Skip(skip) => docs = docs.split_off((*skip as usize).min(docs.len())),
		Stage::Limit(limit) => docs.truncate(*limit as usize),
		Stage::Unwind(path) => docs = pipeline::unwind(docs, path),
		Stage::Lookup(lookup) => docs = join(store, lookup, docs).await?,
		Stage::ReplaceRoot { path, carry } => docs = pipeline::replace_root(docs, path, carry),
		Stage::Score { path, scores } => docs = pipeline::score(docs, path, scores),
		Stage::Flag { path, from } => docs = pipeline::flag(docs, path, from),
		Stage::Unset(paths) =>
			for doc in &mut docs {
				for path in paths {
					path.remove(doc);
				}
			},
	}

	Ok(docs)
}

async fn join(
	store: &dyn DocumentStore,
	lookup: &Lookup,
	mut docs: Vec<Document>,
) -> Result<Vec<Document>> {
	let mut seen = HashSet::new();
	let mut keys = Vec::new();

	for doc in &docs {
		for value in values_at(doc, &lookup.local) {
			if let Some((key, scalar)) = join_key(value)
				&& seen.insert(key.clone())
			{
				keys.push((key, scalar));
			}
		}
	}

	let joined = if keys.is_empty() {
		HashMap::new()
	} else {
		match lookup.cap {
			Some(cap) => fetch_capped(store, lookup, &keys, cap).await?,
			None => fetch_batched(store, lookup, keys).await?,
		}
	};

	for doc in &mut docs {
		let matches: Vec<Value> = values_at(doc, &lookup.local)
			.into_iter()
			.filter_map(|value| join_key(value).map(|(key, _)| key))
			.filter_map(|key| joined.get(&key))
			.flatten()
			.map(|matched| Value::Object(pipeline::project(matched, &lookup.project)))
			.collect();

		if lookup.single {
			if let Some(first) = matches.into_iter().next() {
				lookup.as_path.set(doc, first);
			}
		} else {
			lookup.as_path.set(doc, Value::Array(matches));
		}
	}

	Ok(docs)
}

async fn fetch_batched(
	store: &dyn DocumentStore,
	lookup: &Lookup,
	keys: Vec<(String, Scalar)>,
) -> Result<HashMap<String, Vec<Document>>> {
	let scalars = keys.into_iter().map(|(_, scalar)| scalar).collect();
	let query = Query {
		predicate: Predicate::all([
			lookup.filter.clone(),
			Predicate::in_list(lookup.foreign.clone(), scalars),
		]),
		sort: lookup.sort.clone(),
		skip: None,
		limit: None,
	};
	let mut grouped: HashMap<String, Vec<Document>> = HashMap::new();

	for found in store.find(lookup.from, &query).await? {
		let found_keys: Vec<String> = values_at(&found, &lookup.foreign)
			.into_iter()
			.filter_map(|value| join_key(value).map(|(key, _)| key))
			.collect();

		for key in found_keys {
			grouped.entry(key).or_default().push(found.clone());
		}
	}

	Ok(grouped)
}

async fn fetch_capped(
	store: &dyn DocumentStore,
	lookup: &Lookup,
	keys: &[(String, Scalar)],
	cap: u64,
) -> Result<HashMap<String, Vec<Document>>> {
	let mut grouped = HashMap::with_capacity(keys.len());

	for (key, scalar) in keys {
		let query = Query {
			predicate: Predicate::all([
				lookup.filter.clone(),
				Predicate::eq(lookup.foreign.clone(), scalar.clone()),
			]),
			sort: lookup.sort.clone(),
			skip: None,
			limit: Some(cap),
		};

		grouped.insert(key.clone(), store.find(lookup.from, &query).await?);
	}

	Ok(grouped)
}

/// The scalar values at `path`, with arrays flattened one level.
fn values_at<'a>(doc: &'a Document, path: &pipeline::Path) -> Vec<&'a Value> {
	match path.get(doc) {
		Some(Value::Array(items)) => items.iter().collect(),
		Some(Value::Null) | None => Vec::new(),
		Some(value) => vec![value],
	}
}

/// A canonical key for joining plus the scalar used to query the other side.
fn join_key(value: &Value) -> Option<(String, Scalar)> {
	match value {
		Value::String(raw) => Some(match Uuid::parse_str(raw) {
			Ok(id) => (id.to_string(), Scalar::Id(id)),
			Err(_) => (raw.clone(), Scalar::Text(raw.clone())),
		}),
		Value::Number(number) => number.as_f64().map(|n| (n.to_string(), Scalar::Number(n))),
		Value::Bool(flag) => Some((flag.to_string(), Scalar::Bool(*flag))),
		_ => None,
	}
}

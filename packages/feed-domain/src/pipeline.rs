//! Store-agnostic query stages.
//!
//! A [`Pipeline`] is an ordered list of [`Stage`]s evaluated against one root collection. Stores
//! only have to implement a filtered, sorted, bounded scan ([`Query`]); everything else is
//! evaluated in process by the executor with the helpers in this module.

use std::{
	cmp::Ordering,
	collections::BTreeMap,
	fmt::{Display, Formatter},
};

use serde_json::Value;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

use crate::{Collection, Document};

pub const ID_FIELD: &str = "_id";

/// Dotted field path. Reads follow nested objects, writes address top-level fields only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path(String);
impl Path {
	pub fn new(raw: impl Into<String>) -> Self {
		Self(raw.into())
	}

	pub fn id() -> Self {
		Self(ID_FIELD.to_string())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	pub fn is_id(&self) -> bool {
		self.0 == ID_FIELD
	}

	pub fn segments(&self) -> Vec<String> {
		self.0.split('.').map(str::to_string).collect()
	}

	pub fn get<'a>(&self, doc: &'a Document) -> Option<&'a Value> {
		let mut segments = self.0.split('.');
		let mut current = doc.get(segments.next()?)?;

		for segment in segments {
			current = current.as_object()?.get(segment)?;
		}

		Some(current)
	}

	pub fn set(&self, doc: &mut Document, value: Value) {
		doc.insert(self.0.clone(), value);
	}

	pub fn remove(&self, doc: &mut Document) -> Option<Value> {
		doc.remove(&self.0)
	}
}
impl From<&str> for Path {
	fn from(value: &str) -> Self {
		Self::new(value)
	}
}

impl Display for Path {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.0)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
	Id,
	Text,
	Number,
	Bool,
	DateTime,
}
impl ValueKind {
	pub fn decode(self, value: &Value) -> Option<Scalar> {
		match self {
			Self::Id => value.as_str().and_then(|raw| Uuid::parse_str(raw).ok()).map(Scalar::Id),
			Self::Text => value.as_str().map(|raw| Scalar::Text(raw.to_string())),
			Self::Number => value.as_f64().map(Scalar::Number),
			Self::Bool => value.as_bool().map(Scalar::Bool),
			Self::DateTime => value
				.as_str()
				.and_then(|raw| OffsetDateTime::parse(raw, &Rfc3339).ok())
				.map(Scalar::DateTime),
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
	Id(Uuid),
	Text(String),
	Number(f64),
	Bool(bool),
	DateTime(OffsetDateTime),
	Null,
}
impl Scalar {
	pub fn kind(&self) -> Option<ValueKind> {
		match self {
			Self::Id(_) => Some(ValueKind::Id),
			Self::Text(_) => Some(ValueKind::Text),
			Self::Number(_) => Some(ValueKind::Number),
			Self::Bool(_) => Some(ValueKind::Bool),
			Self::DateTime(_) => Some(ValueKind::DateTime),
			Self::Null => None,
		}
	}

	pub fn to_json(&self) -> Value {
		match self {
			Self::Id(id) => Value::String(id.to_string()),
			Self::Text(text) => Value::String(text.clone()),
			Self::Number(number) =>
				serde_json::Number::from_f64(*number).map(Value::Number).unwrap_or(Value::Null),
			Self::Bool(flag) => Value::Bool(*flag),
			Self::DateTime(ts) => Value::String(ts.format(&Rfc3339).unwrap_or_default()),
			Self::Null => Value::Null,
		}
	}

	/// Orders a stored value relative to this scalar. `Some(Ordering::Less)` means the stored
	/// value sorts before the scalar. Values of another type are incomparable.
	pub fn order_of(&self, value: &Value) -> Option<Ordering> {
		let kind = self.kind()?;
		let decoded = kind.decode(value)?;

		compare_scalars(&decoded, self)
	}

	/// Equality as a store sees it: `Null` matches missing fields, arrays match when any element
	/// matches.
	pub fn matches(&self, value: Option<&Value>) -> bool {
		match (self, value) {
			(Self::Null, None | Some(Value::Null)) => true,
			(Self::Null, Some(_)) | (_, None) => false,
			(_, Some(Value::Array(items))) =>
				items.iter().any(|item| self.order_of(item) == Some(Ordering::Equal)),
			(_, Some(value)) => self.order_of(value) == Some(Ordering::Equal),
		}
	}
}

fn compare_scalars(lhs: &Scalar, rhs: &Scalar) -> Option<Ordering> {
	match (lhs, rhs) {
		(Scalar::Id(lhs), Scalar::Id(rhs)) => Some(lhs.cmp(rhs)),
		(Scalar::Text(lhs), Scalar::Text(rhs)) => Some(lhs.as_bytes().cmp(rhs.as_bytes())),
		(Scalar::Number(lhs), Scalar::Number(rhs)) => lhs.partial_cmp(rhs),
		(Scalar::Bool(lhs), Scalar::Bool(rhs)) => Some(lhs.cmp(rhs)),
		(Scalar::DateTime(lhs), Scalar::DateTime(rhs)) => Some(lhs.cmp(rhs)),
		(Scalar::Null, Scalar::Null) => Some(Ordering::Equal),
		_ => None,
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
	True,
	False,
	And(Vec<Predicate>),
	Or(Vec<Predicate>),
	Not(Box<Predicate>),
	Eq { path: Path, value: Scalar },
	Ne { path: Path, value: Scalar },
	In { path: Path, values: Vec<Scalar> },
	Gt { path: Path, value: Scalar },
	Gte { path: Path, value: Scalar },
	Lt { path: Path, value: Scalar },
	Lte { path: Path, value: Scalar },
	/// Holds when the field is a non-empty array.
	NotEmpty { path: Path },
}
impl Predicate {
	pub fn eq(path: impl Into<Path>, value: Scalar) -> Self {
		Self::Eq { path: path.into(), value }
	}

	pub fn ne(path: impl Into<Path>, value: Scalar) -> Self {
		Self::Ne { path: path.into(), value }
	}

	pub fn in_list(path: impl Into<Path>, values: Vec<Scalar>) -> Self {
		Self::In { path: path.into(), values }
	}

	pub fn gt(path: impl Into<Path>, value: Scalar) -> Self {
		Self::Gt { path: path.into(), value }
	}

	pub fn gte(path: impl Into<Path>, value: Scalar) -> Self {
		Self::Gte { path: path.into(), value }
	}

	pub fn lt(path: impl Into<Path>, value: Scalar) -> Self {
		Self::Lt { path: path.into(), value }
	}

	pub fn lte(path: impl Into<Path>, value: Scalar) -> Self {
		Self::Lte { path: path.into(), value }
	}

	/// Conjunction that flattens nested conjunctions and drops `True` terms.
	pub fn all(predicates: impl IntoIterator<Item = Self>) -> Self {
		let mut terms = Vec::new();

		for predicate in predicates {
			match predicate {
				Self::True => {},
				Self::False => return Self::False,
				Self::And(inner) => terms.extend(inner),
				other => terms.push(other),
			}
		}

		match terms.len() {
			0 => Self::True,
			1 => terms.remove(0),
			_ => Self::And(terms),
		}
	}

	/// Disjunction that flattens nested disjunctions and drops `False` terms.
	pub fn any(predicates: impl IntoIterator<Item = Self>) -> Self {
		let mut terms = Vec::new();

		for predicate in predicates {
			match predicate {
				Self::False => {},
				Self::True => return Self::True,
				Self::Or(inner) => terms.extend(inner),
				other => terms.push(other),
			}
		}

		match terms.len() {
			0 => Self::False,
			1 => terms.remove(0),
			_ => Self::Or(terms),
		}
	}

	pub fn negate(self) -> Self {
		match self {
			Self::True => Self::False,
			Self::False => Self::True,
			Self::Not(inner) => *inner,
			other => Self::Not(Box::new(other)),
		}
	}

	pub fn is_true(&self) -> bool {
		matches!(self, Self::True)
	}

	pub fn matches(&self, doc: &Document) -> bool {
		match self {
			Self::True => true,
			Self::False => false,
			Self::And(terms) => terms.iter().all(|term| term.matches(doc)),
			Self::Or(terms) => terms.iter().any(|term| term.matches(doc)),
			Self::Not(term) => !term.matches(doc),
			Self::Eq { path, value } => value.matches(path.get(doc)),
			Self::Ne { path, value } => !value.matches(path.get(doc)),
			Self::In { path, values } => {
				let field = path.get(doc);

				values.iter().any(|value| value.matches(field))
			},
			Self::Gt { path, value } => compare_field(doc, path, value, |ord| ord.is_gt()),
			Self::Gte { path, value } => compare_field(doc, path, value, |ord| ord.is_ge()),
			Self::Lt { path, value } => compare_field(doc, path, value, |ord| ord.is_lt()),
			Self::Lte { path, value } => compare_field(doc, path, value, |ord| ord.is_le()),
			Self::NotEmpty { path } =>
				path.get(doc).and_then(Value::as_array).is_some_and(|items| !items.is_empty()),
		}
	}
}

fn compare_field(doc: &Document, path: &Path, value: &Scalar, test: fn(Ordering) -> bool) -> bool {
	path.get(doc).and_then(|field| value.order_of(field)).is_some_and(test)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
	Asc,
	Desc,
}
impl Direction {
	pub fn parse(raw: &str) -> Option<Self> {
		match raw.trim().to_ascii_lowercase().as_str() {
			"1" | "asc" | "ascending" => Some(Self::Asc),
			"-1" | "desc" | "descending" => Some(Self::Desc),
			_ => None,
		}
	}

	pub fn apply(self, ordering: Ordering) -> Ordering {
		match self {
			Self::Asc => ordering,
			Self::Desc => ordering.reverse(),
		}
	}

	pub fn as_sql(self) -> &'static str {
		match self {
			Self::Asc => "ASC NULLS FIRST",
			Self::Desc => "DESC NULLS LAST",
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
	pub path: Path,
	pub direction: Direction,
	pub kind: ValueKind,
}
impl SortKey {
	pub fn new(path: impl Into<Path>, direction: Direction, kind: ValueKind) -> Self {
		Self { path: path.into(), direction, kind }
	}

	/// The implicit tie-break appended to every ordering.
	pub fn id_desc() -> Self {
		Self::new(ID_FIELD, Direction::Desc, ValueKind::Id)
	}

	/// Missing values sort first ascending and last descending, matching `NULLS FIRST` and
	/// `NULLS LAST`.
	pub fn compare(&self, lhs: &Document, rhs: &Document) -> Ordering {
		let lhs = self.path.get(lhs).and_then(|value| self.kind.decode(value));
		let rhs = self.path.get(rhs).and_then(|value| self.kind.decode(value));
		let ordering = match (lhs, rhs) {
			(None, None) => Ordering::Equal,
			(None, Some(_)) => Ordering::Less,
			(Some(_), None) => Ordering::Greater,
			(Some(lhs), Some(rhs)) => compare_scalars(&lhs, &rhs).unwrap_or(Ordering::Equal),
		};

		self.direction.apply(ordering)
	}
}

pub fn compare_documents(keys: &[SortKey], lhs: &Document, rhs: &Document) -> Ordering {
	keys.iter()
		.map(|key| key.compare(lhs, rhs))
		.find(|ordering| ordering.is_ne())
		.unwrap_or(Ordering::Equal)
}

/// A bounded scan of one collection: the only primitive a store must provide.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
	pub predicate: Predicate,
	pub sort: Vec<SortKey>,
	pub skip: Option<u64>,
	pub limit: Option<u64>,
}
impl Query {
	pub fn filter(predicate: Predicate) -> Self {
		Self { predicate, sort: Vec::new(), skip: None, limit: None }
	}

	/// Reference semantics of [`Query`] over an in-memory document set.
	pub fn apply<'a>(&self, docs: impl IntoIterator<Item = &'a Document>) -> Vec<Document> {
		let mut matched: Vec<Document> =
			docs.into_iter().filter(|doc| self.predicate.matches(doc)).cloned().collect();

		if !self.sort.is_empty() {
			matched.sort_by(|lhs, rhs| compare_documents(&self.sort, lhs, rhs));
		}

		let skip = self.skip.unwrap_or(0) as usize;
		let limit = self.limit.map(|limit| limit as usize).unwrap_or(usize::MAX);

		matched.into_iter().skip(skip).take(limit).collect()
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
	pub from: Collection,
	pub local: Path,
	pub foreign: Path,
	pub filter: Predicate,
	pub sort: Vec<SortKey>,
	/// Per-parent cap. A capped lookup runs one bounded query per parent value.
	pub cap: Option<u64>,
	/// Top-level fields kept from each joined document. Empty keeps the whole document.
	pub project: Vec<Path>,
	pub as_path: Path,
	/// Store the first match instead of an array of matches. Documents without a match are left
	/// untouched.
	pub single: bool,
}
impl Lookup {
	pub fn by_id(from: Collection, local: impl Into<Path>, as_path: impl Into<Path>) -> Self {
		Self {
			from,
			local: local.into(),
			foreign: Path::id(),
			filter: Predicate::True,
			sort: Vec::new(),
			cap: None,
			project: Vec::new(),
			as_path: as_path.into(),
			single: true,
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
	Match(Predicate),
	Sort(Vec<SortKey>),
	Skip(u64),
	Limit(u64),
	/// One output document per array element; documents without elements are dropped.
	Unwind(Path),
	Lookup(Box<Lookup>),
	/// Promote an embedded object to the root, copying `(from, to)` fields over from the old
	/// root. Documents without an embedded object are dropped.
	ReplaceRoot { path: Path, carry: Vec<(Path, Path)> },
	/// Attach an externally computed score keyed by document id.
	Score { path: Path, scores: BTreeMap<Uuid, f64> },
	/// Replace the array at `from` with a boolean stored at `path`.
	Flag { path: Path, from: Path },
	Unset(Vec<Path>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
	pub collection: Collection,
	pub stages: Vec<Stage>,
}

pub fn unwind(docs: Vec<Document>, path: &Path) -> Vec<Document> {
	let mut out = Vec::with_capacity(docs.len());

	for doc in docs {
		match path.get(&doc) {
			Some(Value::Array(items)) => {
				let items = items.clone();

				for item in items {
					let mut expanded = doc.clone();

					path.set(&mut expanded, item);
					out.push(expanded);
				}
			},
			Some(Value::Null) | None => {},
			Some(_) => out.push(doc),
		}
	}

	out
}

pub fn replace_root(docs: Vec<Document>, path: &Path, carry: &[(Path, Path)]) -> Vec<Document> {
	docs.into_iter()
		.filter_map(|doc| {
			let mut root = path.get(&doc)?.as_object()?.clone();

			for (from, to) in carry {
				if let Some(value) = from.get(&doc) {
					to.set(&mut root, value.clone());
				}
			}

			Some(root)
		})
		.collect()
}

pub fn score(docs: Vec<Document>, path: &Path, scores: &BTreeMap<Uuid, f64>) -> Vec<Document> {
	docs.into_iter()
		.map(|mut doc| {
			let score = Path::id()
				.get(&doc)
				.and_then(|value| ValueKind::Id.decode(value))
				.and_then(|id| match id {
					Scalar::Id(id) => scores.get(&id).copied(),
					_ => None,
				});

			if let Some(score) = score {
				path.set(&mut doc, Scalar::Number(score).to_json());
			}

			doc
		})
		.collect()
}

pub fn flag(docs: Vec<Document>, path: &Path, from: &Path) -> Vec<Document> {
	docs.into_iter()
		.map(|mut doc| {
			let present = match from.remove(&mut doc) {
				Some(Value::Array(items)) => !items.is_empty(),
				Some(Value::Null) | None => false,
				Some(_) => true,
			};

			path.set(&mut doc, Value::Bool(present));

			doc
		})
		.collect()
}

pub fn project(doc: &Document, paths: &[Path]) -> Document {
	if paths.is_empty() {
		return doc.clone();
	}

	let mut out = Document::new();

	for path in paths {
		if let Some(value) = path.get(doc) {
			path.set(&mut out, value.clone());
		}
	}

	out
}

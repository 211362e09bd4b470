//! Filter/sort DSL.
//!
//! Filters arrive as `field;value` tokens and sorts as `field;direction` tokens. Every recognized
//! field maps to a [`FilterKind`] or [`SortField`] through a lookup table; each kind owns its value
//! parser and the predicate or strategy hint it contributes. Unknown fields are dropped.

use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

use crate::{
	Collection, Error, Result,
	pipeline::{Direction, Predicate, Scalar, SortKey, ValueKind},
};

const FILTER_FIELDS: &[(&str, FilterKind)] = &[
	("user", FilterKind::Owner),
	("owner", FilterKind::Owner),
	("agent", FilterKind::Agent),
	("task", FilterKind::Task),
	("collection", FilterKind::Collection),
	("concept", FilterKind::Concept),
	("creation", FilterKind::Similar),
	("likedBy", FilterKind::LikedBy),
	("minDate", FilterKind::MinDate),
	("maxDate", FilterKind::MaxDate),
	("public", FilterKind::Visibility),
	("visibility", FilterKind::Visibility),
	("search", FilterKind::Search),
	("minLikes", FilterKind::MinLikes),
	("name", FilterKind::Name),
	("baseModel", FilterKind::BaseModel),
];
const SORT_FIELDS: &[(&str, SortField)] = &[
	("createdAt", SortField::CreatedAt),
	("likeCount", SortField::Counter(Counter::LikeCount)),
	("popularity", SortField::Counter(Counter::Popularity)),
	("followerCount", SortField::Counter(Counter::FollowerCount)),
	("creationCount", SortField::Counter(Counter::CreationCount)),
	("liked", SortField::Liked),
	("following", SortField::Following),
	("similarity", SortField::Similarity),
	("score", SortField::Similarity),
];

pub const CREATED_AT_FIELD: &str = "createdAt";
pub const LIKE_COUNT_FIELD: &str = "likeCount";
pub const PUBLIC_FIELD: &str = "public";
pub const DELETED_FIELD: &str = "deleted";
pub const SIMILARITY_FIELD: &str = "similarity";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
	Owner,
	Agent,
	Task,
	Collection,
	Concept,
	Similar,
	LikedBy,
	MinDate,
	MaxDate,
	Visibility,
	Search,
	MinLikes,
	Name,
	BaseModel,
}
impl FilterKind {
	pub fn lookup(field: &str) -> Option<Self> {
		FILTER_FIELDS.iter().find(|(name, _)| *name == field).map(|(_, kind)| *kind)
	}

	/// Multi-valued kinds accumulate repeated tokens into one `IN` list. Every other kind keeps
	/// the last token.
	pub fn is_multi_valued(self) -> bool {
		matches!(self, Self::Owner | Self::Agent | Self::Task | Self::Name | Self::BaseModel)
	}

	pub fn parse(self, field: &str, raw: &str) -> Result<FilterValue> {
		let invalid = |message: String| Error::InvalidFilter { field: field.to_string(), message };

		match self {
			Self::Owner
			| Self::Agent
			| Self::Task
			| Self::Collection
			| Self::Concept
			| Self::Similar
			| Self::LikedBy => Uuid::parse_str(raw)
				.map(FilterValue::Id)
				.map_err(|_| invalid(format!("{raw:?} is not a valid id."))),
			Self::MinDate | Self::MaxDate =>
				parse_date(raw).map(FilterValue::DateTime).ok_or_else(|| {
					invalid(format!("{raw:?} is neither an RFC 3339 date nor a unix timestamp."))
				}),
			Self::Visibility => parse_visibility(raw)
				.map(FilterValue::Bool)
				.ok_or_else(|| invalid(format!("{raw:?} is not a visibility value."))),
			Self::MinLikes => raw
				.parse::<f64>()
				.ok()
				.filter(|value| value.is_finite())
				.map(FilterValue::Number)
				.ok_or_else(|| invalid(format!("{raw:?} is not a number."))),
			Self::Search | Self::Name | Self::BaseModel =>
				if raw.is_empty() {
					Err(invalid("Value must not be empty.".to_string()))
				} else {
					Ok(FilterValue::Text(raw.to_string()))
				},
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
	Id(Uuid),
	Text(String),
	Bool(bool),
	Number(f64),
	DateTime(OffsetDateTime),
}
impl FilterValue {
	pub fn as_id(&self) -> Option<Uuid> {
		match self {
			Self::Id(id) => Some(*id),
			_ => None,
		}
	}

	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Self::Bool(flag) => Some(*flag),
			_ => None,
		}
	}

	pub fn as_text(&self) -> Option<&str> {
		match self {
			Self::Text(text) => Some(text),
			_ => None,
		}
	}

	pub fn to_scalar(&self) -> Scalar {
		match self {
			Self::Id(id) => Scalar::Id(*id),
			Self::Text(text) => Scalar::Text(text.clone()),
			Self::Bool(flag) => Scalar::Bool(*flag),
			Self::Number(number) => Scalar::Number(*number),
			Self::DateTime(ts) => Scalar::DateTime(*ts),
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterTerm {
	pub kind: FilterKind,
	pub values: Vec<FilterValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
	LikeCount,
	Popularity,
	FollowerCount,
	CreationCount,
}
impl Counter {
	pub fn field(self) -> &'static str {
		match self {
			Self::LikeCount => LIKE_COUNT_FIELD,
			Self::Popularity => "popularity",
			Self::FollowerCount => "followerCount",
			Self::CreationCount => "creationCount",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortField {
	CreatedAt,
	/// Counters are mostly zero; sorting by one excludes non-positive values.
	Counter(Counter),
	/// Selects reaction order instead of naming a document field.
	Liked,
	/// Selects follow-graph fan-out instead of naming a document field.
	Following,
	Similarity,
}
impl SortField {
	pub fn lookup(field: &str) -> Option<Self> {
		SORT_FIELDS.iter().find(|(name, _)| *name == field).map(|(_, sort)| *sort)
	}

	pub fn is_literal(self) -> bool {
		!matches!(self, Self::Liked | Self::Following)
	}
}

/// The literal ordering requested by the client. Ties always fall back to `_id` descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
	pub field: SortField,
	pub direction: Direction,
}
impl SortSpec {
	/// Key compared before the tie-break. `None` orders by id alone, which for time-ordered ids is
	/// creation order.
	pub fn primary_key(&self) -> Option<SortKey> {
		match self.field {
			SortField::Counter(counter) =>
				Some(SortKey::new(counter.field(), self.direction, ValueKind::Number)),
			SortField::Similarity =>
				Some(SortKey::new(SIMILARITY_FIELD, self.direction, ValueKind::Number)),
			SortField::CreatedAt | SortField::Liked | SortField::Following => None,
		}
	}

	pub fn side_filter(&self) -> Option<Predicate> {
		match self.field {
			SortField::Counter(counter) => Some(Predicate::gt(counter.field(), Scalar::Number(0.0))),
			_ => None,
		}
	}
}

/// Strategy hints raised by individual tokens.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Hints {
	pub membership: Option<Uuid>,
	pub task_output: Option<Uuid>,
	pub graph_fan_out: bool,
	pub reaction_fan_out: bool,
	pub similar_to: Option<Uuid>,
	pub search: Option<String>,
}

/// Result of compiling the DSL tokens of one request. Each `with_*` call returns a new value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledQuery {
	pub filters: Vec<FilterTerm>,
	pub sort: Option<SortSpec>,
	pub follow_graph: bool,
	pub reaction_order: bool,
}
impl CompiledQuery {
	pub fn compile<F, S>(filters: F, sorts: S) -> Result<Self>
	where
		F: IntoIterator,
		F::Item: AsRef<str>,
		S: IntoIterator,
		S::Item: AsRef<str>,
	{
		let mut query = Self::default();

		for token in filters {
			query = query.with_filter(token.as_ref())?;
		}
		for token in sorts {
			query = query.with_sort(token.as_ref())?;
		}

		Ok(query)
	}

	pub fn with_filter(self, token: &str) -> Result<Self> {
		let Some((field, raw)) = token.split_once(';') else {
			tracing::debug!(token, "Dropping filter token without a separator.");

			return Ok(self);
		};
		let field = field.trim();
		let Some(kind) = FilterKind::lookup(field) else {
			tracing::debug!(field, "Dropping unknown filter field.");

			return Ok(self);
		};
		let value = kind.parse(field, raw.trim())?;
		let mut filters = self.filters;

		match filters.iter_mut().find(|term| term.kind == kind) {
			Some(term) if kind.is_multi_valued() =>
				if !term.values.contains(&value) {
					term.values.push(value);
				},
			Some(term) => term.values = vec![value],
			None => filters.push(FilterTerm { kind, values: vec![value] }),
		}

		Ok(Self { filters, ..self })
	}

	pub fn with_sort(self, token: &str) -> Result<Self> {
		let (field, raw_direction) = token.split_once(';').unwrap_or((token, "-1"));
		let field = field.trim();
		let Some(sort_field) = SortField::lookup(field) else {
			tracing::debug!(field, "Dropping unknown sort field.");

			return Ok(self);
		};
		let direction = Direction::parse(raw_direction).ok_or_else(|| Error::InvalidSort {
			field: field.to_string(),
			message: format!("{raw_direction:?} is not a sort direction, expected 1 or -1."),
		})?;

		match sort_field {
			SortField::Following => Ok(Self { follow_graph: true, ..self }),
			SortField::Liked => Ok(Self { reaction_order: true, ..self }),
			_ if self.sort.is_some() => {
				tracing::debug!(field, "Dropping secondary sort key.");

				Ok(self)
			},
			_ => Ok(Self { sort: Some(SortSpec { field: sort_field, direction }), ..self }),
		}
	}

	pub fn term(&self, kind: FilterKind) -> Option<&FilterTerm> {
		self.filters.iter().find(|term| term.kind == kind)
	}

	pub fn ids(&self, kind: FilterKind) -> Vec<Uuid> {
		self.term(kind)
			.map(|term| term.values.iter().filter_map(FilterValue::as_id).collect())
			.unwrap_or_default()
	}

	pub fn single_id(&self, kind: FilterKind) -> Option<Uuid> {
		self.term(kind).and_then(|term| term.values.first()).and_then(FilterValue::as_id)
	}

	pub fn liked_by(&self) -> Option<Uuid> {
		self.single_id(FilterKind::LikedBy)
	}

	/// Explicit `public`/`visibility` toggle, honored only on relaxed views.
	pub fn visibility(&self) -> Option<bool> {
		self.term(FilterKind::Visibility)
			.and_then(|term| term.values.first())
			.and_then(FilterValue::as_bool)
	}

	pub fn hints(&self) -> Hints {
		Hints {
			membership: self.single_id(FilterKind::Collection),
			task_output: self.single_id(FilterKind::Concept),
			graph_fan_out: self.follow_graph,
			reaction_fan_out: self.reaction_order || self.liked_by().is_some(),
			similar_to: self.single_id(FilterKind::Similar),
			search: self
				.term(FilterKind::Search)
				.and_then(|term| term.values.first())
				.and_then(FilterValue::as_text)
				.map(str::to_string),
		}
	}

	/// Plain document predicates: identity, range, threshold and equality filters plus the side
	/// filter of the sort key. Visibility and join-driving filters are handled elsewhere.
	pub fn document_predicate(&self, kind: Collection) -> Predicate {
		let mut predicates = Vec::new();

		for term in &self.filters {
			let path = match term.kind {
				FilterKind::Owner => kind.owner_path(),
				FilterKind::Agent => "agent",
				FilterKind::Task => "task",
				FilterKind::Name => "name",
				FilterKind::BaseModel => "baseModel",
				FilterKind::MinDate | FilterKind::MaxDate => CREATED_AT_FIELD,
				FilterKind::MinLikes => LIKE_COUNT_FIELD,
				FilterKind::Collection
				| FilterKind::Concept
				| FilterKind::Similar
				| FilterKind::LikedBy
				| FilterKind::Visibility
				| FilterKind::Search => continue,
			};
			let predicate = match term.kind {
				FilterKind::MinDate | FilterKind::MinLikes => term
					.values
					.first()
					.map(|value| Predicate::gte(path, value.to_scalar()))
					.unwrap_or(Predicate::True),
				FilterKind::MaxDate => term
					.values
					.first()
					.map(|value| Predicate::lte(path, value.to_scalar()))
					.unwrap_or(Predicate::True),
				_ => match term.values.as_slice() {
					[value] => Predicate::eq(path, value.to_scalar()),
					values =>
						Predicate::in_list(path, values.iter().map(FilterValue::to_scalar).collect()),
				},
			};

			predicates.push(predicate);
		}

		if let Some(side) = self.sort.and_then(|sort| sort.side_filter()) {
			predicates.push(side);
		}

		Predicate::all(predicates)
	}
}

fn parse_date(raw: &str) -> Option<OffsetDateTime> {
	if let Ok(ts) = OffsetDateTime::parse(raw, &Rfc3339) {
		return Some(ts);
	}

	raw.parse::<i64>().ok().and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
}

fn parse_visibility(raw: &str) -> Option<bool> {
	match raw.to_ascii_lowercase().as_str() {
		"true" | "1" | "public" => Some(true),
		"false" | "0" | "private" => Some(false),
		_ => None,
	}
}

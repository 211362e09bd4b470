//! Pipeline builders, one per [`Strategy`].
//!
//! Every plan ends in the same tail: cursor bound, sort (primary key plus the position
//! tie-break), window, then the enrichment lookups. Fan-out strategies bound their joined
//! candidates before the final sort; the direct strategy pushes the bound into its first match.

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::{
	Collection,
	cursor::{Cursor, CursorPlan},
	dsl::{CREATED_AT_FIELD, CompiledQuery, SIMILARITY_FIELD, SortField, SortSpec},
	pipeline::{Direction, ID_FIELD, Lookup, Path, Pipeline, Predicate, Scalar, SortKey, Stage},
	strategy::Strategy,
	visibility::{SoftDelete, VisibilityContext, not_deleted},
};

pub const LIKED_ID_FIELD: &str = "likedId";
pub const LIKED_AT_FIELD: &str = "likedAt";
pub const LIKED_FLAG: &str = "liked";
pub const BOOKMARKED_FLAG: &str = "bookmarked";

const JOINED_FIELD: &str = "doc";
const FAN_OUT_FIELD: &str = "docs";
const LIKED_BY_SCRATCH: &str = "_likedBy";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
	Like,
	Bookmark,
}
impl Reaction {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Like => "like",
			Self::Bookmark => "bookmark",
		}
	}

	fn flag(self) -> &'static str {
		match self {
			Self::Like => LIKED_FLAG,
			Self::Bookmark => BOOKMARKED_FLAG,
		}
	}

	fn scratch(self) -> &'static str {
		match self {
			Self::Like => "_liked",
			Self::Bookmark => "_bookmarked",
		}
	}
}

/// Reactions of `user` with `reaction` on documents of `kind`.
pub fn reactions_of(
	user: Uuid,
	reaction: Reaction,
	kind: Collection,
	soft_delete: SoftDelete,
) -> Predicate {
	Predicate::all([
		Predicate::eq("user", Scalar::Id(user)),
		Predicate::eq("reaction", Scalar::Text(reaction.as_str().to_string())),
		Predicate::eq("entityType", Scalar::Text(kind.entity_type().to_string())),
		not_deleted(soft_delete),
	])
}

/// Ids resolved by an external collaborator, with their scores.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllowList {
	pub scores: BTreeMap<Uuid, f64>,
}
impl AllowList {
	pub fn new(scores: impl IntoIterator<Item = (Uuid, f64)>) -> Self {
		Self { scores: scores.into_iter().collect() }
	}

	pub fn is_empty(&self) -> bool {
		self.scores.is_empty()
	}

	/// Keeps ids present in both lists, with the scores of `self`.
	pub fn intersect(self, other: &Self) -> Self {
		Self {
			scores: self.scores.into_iter().filter(|(id, _)| other.scores.contains_key(id)).collect(),
		}
	}

	pub fn predicate(&self) -> Predicate {
		if self.scores.is_empty() {
			return Predicate::False;
		}

		Predicate::in_list(ID_FIELD, self.scores.keys().map(|id| Scalar::Id(*id)).collect())
	}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Window {
	Cursor { cursor: Option<Cursor>, limit: u64 },
	Offset { skip: u64, limit: u64 },
	/// Every matching document, used for counting.
	All,
}
impl Window {
	pub fn cursor(&self) -> Option<&Cursor> {
		match self {
			Self::Cursor { cursor, .. } => cursor.as_ref(),
			_ => None,
		}
	}

	pub fn limit(&self) -> Option<u64> {
		match self {
			Self::Cursor { limit, .. } | Self::Offset { limit, .. } => Some(*limit),
			Self::All => None,
		}
	}

	fn stages(&self) -> Vec<Stage> {
		match *self {
			Self::Cursor { limit, .. } => vec![Stage::Limit(limit)],
			Self::Offset { skip, limit } => vec![Stage::Skip(skip), Stage::Limit(limit)],
			Self::All => Vec::new(),
		}
	}
}

#[derive(Debug, Clone)]
pub struct PlanRequest<'a> {
	pub kind: Collection,
	pub query: &'a CompiledQuery,
	pub visibility: &'a VisibilityContext,
	pub strategy: Strategy,
	pub allow_list: Option<&'a AllowList>,
	pub window: Window,
	pub following_cap: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyPlan {
	pub strategy: Strategy,
	pub root: Collection,
	/// Predicate of the first match on the root collection.
	pub pre_join_filter: Predicate,
	pub core: Vec<Stage>,
	pub enrichment: Vec<Stage>,
	pub cursor: CursorPlan,
}
impl StrategyPlan {
	pub fn build(request: PlanRequest<'_>) -> Self {
		let builder = Builder::new(&request);
		let (root, core) = match request.strategy {
			Strategy::Membership { collection } => builder.membership(collection),
			Strategy::TaskOutput { concept } => builder.task_output(concept),
			Strategy::GraphFanOut { follower } => builder.graph(follower),
			Strategy::ReactionFanOut { liker } => builder.reactions(liker),
			Strategy::Direct => builder.direct(),
		};
		let pre_join_filter = match core.first() {
			Some(Stage::Match(predicate)) => predicate.clone(),
			_ => Predicate::True,
		};

		Self {
			strategy: request.strategy,
			root,
			pre_join_filter,
			core,
			enrichment: enrichment(request.kind, request.visibility),
			cursor: builder.cursor,
		}
	}

	pub fn pipeline(&self) -> Pipeline {
		let mut stages = self.core.clone();

		stages.extend(self.enrichment.iter().cloned());

		Pipeline { collection: self.root, stages }
	}

	/// The plan without late lookups, enough to count matches.
	pub fn core_pipeline(&self) -> Pipeline {
		Pipeline { collection: self.root, stages: self.core.clone() }
	}
}

struct Builder<'a> {
	kind: Collection,
	query: &'a CompiledQuery,
	visibility: &'a VisibilityContext,
	strategy: Strategy,
	allow_list: Option<&'a AllowList>,
	window: Window,
	following_cap: u64,
	cursor: CursorPlan,
	scored: bool,
}
impl<'a> Builder<'a> {
	fn new(request: &PlanRequest<'a>) -> Self {
		let sort = effective_sort(request.query, request.allow_list);
		let reaction_order =
			matches!(request.strategy, Strategy::ReactionFanOut { .. }) && sort.is_none();
		let cursor = match sort {
			_ if reaction_order => CursorPlan {
				position: Path::new(LIKED_ID_FIELD),
				position_direction: Direction::Desc,
				key: None,
			},
			Some(spec) => match spec.primary_key() {
				Some(key) => CursorPlan::keyed(key),
				None => CursorPlan::by_id(spec.direction),
			},
			None => CursorPlan::by_id(Direction::Desc),
		};

		Self {
			kind: request.kind,
			query: request.query,
			visibility: request.visibility,
			strategy: request.strategy,
			allow_list: request.allow_list,
			window: request.window,
			following_cap: request.following_cap,
			cursor,
			scored: sort.is_some_and(|spec| spec.field == SortField::Similarity),
		}
	}

	fn document_filter(&self) -> Predicate {
		Predicate::all([
			self.visibility.predicate(self.query, self.kind),
			self.query.document_predicate(self.kind),
			self.allow_list.map(AllowList::predicate).unwrap_or(Predicate::True),
		])
	}

	fn bound(&self) -> Predicate {
		self.cursor.bound(self.window.cursor())
	}

	/// Filter for a join that fetches candidate documents. The bound rides along unless it reads
	/// a score that only exists after the join.
	fn join_filter(&self) -> Predicate {
		if self.scored {
			self.document_filter()
		} else {
			Predicate::all([self.document_filter(), self.bound()])
		}
	}

	/// Stages run once candidates are at the root: scoring, the liked-by semi-join, a late bound,
	/// then sort and window.
	fn tail(&self) -> Vec<Stage> {
		let mut stages = Vec::new();

		if self.scored
			&& let Some(allow_list) = self.allow_list
		{
			stages.push(Stage::Score {
				path: Path::new(SIMILARITY_FIELD),
				scores: allow_list.scores.clone(),
			});
		}
		if !matches!(self.strategy, Strategy::ReactionFanOut { .. })
			&& let Some(liker) = self.query.liked_by()
		{
			stages.extend(liked_by_semi_join(self.kind, liker, self.visibility.soft_delete));
		}
		if self.scored {
			let bound = self.bound();

			if !bound.is_true() {
				stages.push(Stage::Match(bound));
			}
		}

		stages.push(Stage::Sort(self.cursor.sort_keys()));
		stages.extend(self.window.stages());

		stages
	}

	fn member_lookup(&self, local: &str) -> Stage {
		Stage::Lookup(Box::new(Lookup {
			filter: self.join_filter(),
			..Lookup::by_id(self.kind, local, JOINED_FIELD)
		}))
	}

	fn membership(&self, collection: Uuid) -> (Collection, Vec<Stage>) {
		let mut stages = vec![
			Stage::Match(Predicate::all([
				Predicate::eq(ID_FIELD, Scalar::Id(collection)),
				not_deleted(self.visibility.soft_delete),
			])),
			Stage::Unwind(Path::new("creations")),
			self.member_lookup("creations"),
			Stage::ReplaceRoot { path: Path::new(JOINED_FIELD), carry: Vec::new() },
		];

		stages.extend(self.tail());

		(Collection::Collections, stages)
	}

	fn task_output(&self, concept: Uuid) -> (Collection, Vec<Stage>) {
		let mut stages = vec![
			Stage::Match(Predicate::all([
				Predicate::eq("args.concept", Scalar::Id(concept)),
				not_deleted(self.visibility.soft_delete),
			])),
			Stage::Unwind(Path::new("result")),
			self.member_lookup("result"),
			Stage::ReplaceRoot { path: Path::new(JOINED_FIELD), carry: Vec::new() },
		];

		stages.extend(self.tail());

		(Collection::Tasks, stages)
	}

	fn graph(&self, follower: Option<Uuid>) -> (Collection, Vec<Stage>) {
		let Some(follower) = follower else {
			return (Collection::Follows, vec![Stage::Match(Predicate::False)]);
		};
		let cap = self.window.limit().unwrap_or(0).max(self.following_cap);
		let per_followee_sort =
			if self.scored { vec![SortKey::id_desc()] } else { self.cursor.sort_keys() };
		let mut stages = vec![
			Stage::Match(Predicate::all([
				Predicate::eq("follower", Scalar::Id(follower)),
				not_deleted(self.visibility.soft_delete),
			])),
			Stage::Lookup(Box::new(Lookup {
				from: self.kind,
				local: Path::new("following"),
				foreign: Path::new(self.kind.owner_path()),
				filter: self.join_filter(),
				sort: per_followee_sort,
				cap: Some(cap),
				project: Vec::new(),
				as_path: Path::new(FAN_OUT_FIELD),
				single: false,
			})),
			Stage::Unwind(Path::new(FAN_OUT_FIELD)),
			Stage::ReplaceRoot { path: Path::new(FAN_OUT_FIELD), carry: Vec::new() },
		];

		stages.extend(self.tail());

		(Collection::Follows, stages)
	}

	fn reactions(&self, liker: Option<Uuid>) -> (Collection, Vec<Stage>) {
		let Some(liker) = liker else {
			return (Collection::Reactions, vec![Stage::Match(Predicate::False)]);
		};
		let reaction_order = self.cursor.position.as_str() == LIKED_ID_FIELD;
		let reactions = reactions_of(liker, Reaction::Like, self.kind, self.visibility.soft_delete);
		let mut stages = Vec::new();

		if reaction_order {
			let bound = self
				.window
				.cursor()
				.map(|cursor| self.cursor.bound_at(&Path::id(), cursor))
				.unwrap_or(Predicate::True);

			stages.push(Stage::Match(Predicate::all([reactions, bound])));
			stages.push(Stage::Sort(vec![SortKey::id_desc()]));
		} else {
			stages.push(Stage::Match(reactions));
		}

		stages.push(Stage::Lookup(Box::new(Lookup {
			filter: if reaction_order { self.document_filter() } else { self.join_filter() },
			..Lookup::by_id(self.kind, "entityId", JOINED_FIELD)
		})));
		stages.push(Stage::ReplaceRoot {
			path: Path::new(JOINED_FIELD),
			carry: vec![
				(Path::id(), Path::new(LIKED_ID_FIELD)),
				(Path::new(CREATED_AT_FIELD), Path::new(LIKED_AT_FIELD)),
			],
		});
		stages.extend(self.tail());

		(Collection::Reactions, stages)
	}

	fn direct(&self) -> (Collection, Vec<Stage>) {
		let mut stages = vec![Stage::Match(self.join_filter())];

		stages.extend(self.tail());

		(self.kind, stages)
	}
}

/// A similarity ordering needs scores; without an allow-list it falls back to id order.
fn effective_sort(query: &CompiledQuery, allow_list: Option<&AllowList>) -> Option<SortSpec> {
	match query.sort {
		Some(spec) if spec.field == SortField::Similarity && allow_list.is_none() => {
			tracing::debug!("Dropping similarity sort without resolved scores.");

			None
		},
		sort => sort,
	}
}

fn liked_by_semi_join(kind: Collection, liker: Uuid, soft_delete: SoftDelete) -> Vec<Stage> {
	let scratch = Path::new(LIKED_BY_SCRATCH);

	vec![
		Stage::Lookup(Box::new(Lookup {
			from: Collection::Reactions,
			local: Path::id(),
			foreign: Path::new("entityId"),
			filter: reactions_of(liker, Reaction::Like, kind, soft_delete),
			sort: Vec::new(),
			cap: None,
			project: vec![Path::id()],
			as_path: scratch.clone(),
			single: false,
		})),
		Stage::Match(Predicate::NotEmpty { path: scratch.clone() }),
		Stage::Unset(vec![scratch]),
	]
}

/// Late lookups: owner, agent and task summaries, then the viewer's reaction flags.
pub fn enrichment(kind: Collection, visibility: &VisibilityContext) -> Vec<Stage> {
	let mut stages = Vec::new();

	if kind != Collection::Creators {
		stages.push(summary(
			Collection::Creators,
			kind.owner_path(),
			&["_id", "username", "userImage"],
		));
	}
	if kind.has_agent() {
		stages.push(summary(Collection::Agents, "agent", &["_id", "name", "username", "userImage"]));
	}
	if kind.has_task() {
		stages.push(summary(Collection::Tasks, "task", &["_id", "status", "tool"]));
	}

	if let Some(viewer) = visibility.viewer_id {
		for reaction in [Reaction::Like, Reaction::Bookmark] {
			let scratch = Path::new(reaction.scratch());

			stages.push(Stage::Lookup(Box::new(Lookup {
				from: Collection::Reactions,
				local: Path::id(),
				foreign: Path::new("entityId"),
				filter: reactions_of(viewer, reaction, kind, SoftDelete::Exclude),
				sort: Vec::new(),
				cap: None,
				project: vec![Path::id()],
				as_path: scratch.clone(),
				single: false,
			})));
			stages.push(Stage::Flag { path: Path::new(reaction.flag()), from: scratch });
		}
	}

	stages
}

fn summary(from: Collection, field: &str, fields: &[&str]) -> Stage {
	Stage::Lookup(Box::new(Lookup {
		project: fields.iter().map(|name| Path::new(*name)).collect(),
		..Lookup::by_id(from, field, field)
	}))
}

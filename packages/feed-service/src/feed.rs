//! Cursor-paginated feeds.

use std::time::{Duration, Instant};

use feed_domain::{
	Collection,
	cursor::Cursor,
	dsl::{CompiledQuery, FilterKind, Hints},
	pipeline::{ID_FIELD, Predicate, Scalar},
	plan::{AllowList, PlanRequest, StrategyPlan, Window},
	strategy::{self, Strategy},
	visibility::{SoftDelete, VisibilityContext},
};
use feed_storage::executor;
use uuid::Uuid;

use crate::{Error, FeedResponse, FeedService, Neighbor, Result};

#[derive(Debug, Clone)]
pub struct FeedRequest {
	pub kind: Collection,
	/// Already authenticated by the caller.
	pub viewer_id: Option<Uuid>,
	/// Raw `field;value` tokens.
	pub filters: Vec<String>,
	/// Raw `field;direction` tokens.
	pub sorts: Vec<String>,
	pub cursor: Option<String>,
	pub next_value: Option<String>,
	pub limit: Option<u32>,
	pub soft_delete: SoftDelete,
}
impl FeedRequest {
	pub fn new(kind: Collection) -> Self {
		Self {
			kind,
			viewer_id: None,
			filters: Vec::new(),
			sorts: Vec::new(),
			cursor: None,
			next_value: None,
			limit: None,
			soft_delete: SoftDelete::Exclude,
		}
	}
}

/// A compiled request with its collaborators resolved, ready to be planned for any window.
pub(crate) struct Prepared {
	pub(crate) kind: Collection,
	pub(crate) query: CompiledQuery,
	pub(crate) visibility: VisibilityContext,
	pub(crate) strategy: Strategy,
	pub(crate) allow_list: Option<AllowList>,
}
impl Prepared {
	pub(crate) fn plan(&self, window: Window, following_cap: u32) -> StrategyPlan {
		StrategyPlan::build(PlanRequest {
			kind: self.kind,
			query: &self.query,
			visibility: &self.visibility,
			strategy: self.strategy,
			allow_list: self.allow_list.as_ref(),
			window,
			following_cap: u64::from(following_cap),
		})
	}
}

enum Collaborated {
	Skipped,
	Allowed(AllowList),
	/// A collaborator had no answer in time; the request yields an empty page.
	Unresolved,
}

impl FeedService {
	pub async fn feed(&self, req: FeedRequest) -> Result<FeedResponse> {
		let started = Instant::now();
		let kind = feed_kind(req.kind)?;
		let limit = self.page_size(req.limit)?;
		let cursor = Cursor::parse(req.cursor.as_deref(), req.next_value.as_deref())?;
		let Some(prepared) =
			self.prepare(kind, req.viewer_id, &req.filters, &req.sorts, req.soft_delete).await?
		else {
			return Ok(FeedResponse::empty());
		};
		let plan = prepared
			.plan(Window::Cursor { cursor, limit: u64::from(limit) }, self.cfg.following_cap);

		tracing::debug!(kind = %kind, strategy = %plan.strategy, limit, "Feed plan built.");

		let docs = executor::execute(self.store.as_ref(), &plan.pipeline()).await?;

		tracing::info!(
			kind = %kind,
			strategy = %plan.strategy,
			docs = docs.len(),
			elapsed_ms = started.elapsed().as_millis() as u64,
			"Feed served."
		);

		Ok(FeedResponse::assemble(docs, &plan.cursor, req.viewer_id))
	}

	/// Compiles the tokens and resolves everything that needs the store or a collaborator.
	/// `None` when a collaborator could not resolve its ids.
	pub(crate) async fn prepare(
		&self,
		kind: Collection,
		viewer_id: Option<Uuid>,
		filters: &[String],
		sorts: &[String],
		soft_delete: SoftDelete,
	) -> Result<Option<Prepared>> {
		let query = CompiledQuery::compile(filters, sorts)?;
		let owns_collection = self.owns_collection(&query, viewer_id).await?;
		let visibility =
			VisibilityContext::resolve(&query, viewer_id, owns_collection, soft_delete);
		let strategy = strategy::select(&query, viewer_id);
		let allow_list = match self.collaborate(kind, &query.hints()).await {
			Collaborated::Skipped => None,
			Collaborated::Allowed(allow_list) => Some(allow_list),
			Collaborated::Unresolved => return Ok(None),
		};

		Ok(Some(Prepared { kind, query, visibility, strategy, allow_list }))
	}

	pub(crate) fn page_size(&self, requested: Option<u32>) -> Result<u32> {
		match requested {
			None => Ok(self.cfg.default_limit),
			Some(0) => Err(Error::InvalidRequest {
				message: "limit must be greater than zero.".to_string(),
			}),
			Some(limit) => Ok(limit.min(self.cfg.max_limit)),
		}
	}

	async fn owns_collection(
		&self,
		query: &CompiledQuery,
		viewer_id: Option<Uuid>,
	) -> Result<bool> {
		let (Some(viewer), Some(collection)) =
			(viewer_id, query.single_id(FilterKind::Collection))
		else {
			return Ok(false);
		};
		let predicate = Predicate::all([
			Predicate::eq(ID_FIELD, Scalar::Id(collection)),
			Predicate::any([
				Predicate::eq("user", Scalar::Id(viewer)),
				Predicate::eq("contributors", Scalar::Id(viewer)),
			]),
		]);

		Ok(self.store.count(Collection::Collections, &predicate).await? > 0)
	}

	async fn collaborate(&self, kind: Collection, hints: &Hints) -> Collaborated {
		let timeout = Duration::from_millis(self.cfg.collaborator_timeout_ms);
		let similar = match hints.similar_to {
			Some(reference) => {
				let call =
					self.providers.similarity.similar(kind, reference, self.cfg.similarity_top_k);

				match tokio::time::timeout(timeout, call).await {
					Ok(Ok(Some(neighbors))) => Some(allow_list(neighbors)),
					Ok(Ok(None)) => {
						tracing::warn!(
							kind = %kind,
							%reference,
							"Reference document has no vector."
						);

						return Collaborated::Unresolved;
					},
					Ok(Err(err)) => {
						tracing::warn!(
							kind = %kind,
							%reference,
							error = %err,
							"Similarity lookup failed."
						);

						return Collaborated::Unresolved;
					},
					Err(_) => {
						tracing::warn!(
							kind = %kind,
							%reference,
							"Similarity lookup timed out."
						);

						return Collaborated::Unresolved;
					},
				}
			},
			None => None,
		};
		let searched = match hints.search.as_deref() {
			Some(text) => {
				let call = self.providers.search.search(kind, text, self.cfg.search_top_k);

				match tokio::time::timeout(timeout, call).await {
					Ok(Ok(neighbors)) => Some(allow_list(neighbors)),
					Ok(Err(err)) => {
						tracing::warn!(kind = %kind, error = %err, "Search lookup failed.");

						return Collaborated::Unresolved;
					},
					Err(_) => {
						tracing::warn!(kind = %kind, "Search lookup timed out.");

						return Collaborated::Unresolved;
					},
				}
			},
			None => None,
		};

		match (similar, searched) {
			(Some(similar), Some(searched)) => Collaborated::Allowed(similar.intersect(&searched)),
			(Some(allow_list), None) | (None, Some(allow_list)) =>
				Collaborated::Allowed(allow_list),
			(None, None) => Collaborated::Skipped,
		}
	}
}

pub(crate) fn feed_kind(kind: Collection) -> Result<Collection> {
	if kind.is_feed() {
		Ok(kind)
	} else {
		Err(Error::InvalidRequest { message: format!("{kind} is not a feed.") })
	}
}

fn allow_list(neighbors: Vec<Neighbor>) -> AllowList {
	AllowList::new(neighbors.into_iter().map(|neighbor| (neighbor.id, neighbor.score)))
}

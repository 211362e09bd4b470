//! Page-numbered listing with a total count, for callers that cannot carry a cursor.

use feed_domain::{Collection, plan::Window, visibility::SoftDelete};
use feed_storage::executor;
use uuid::Uuid;

use crate::{Error, FeedService, ListResponse, Result, feed::feed_kind};

#[derive(Debug, Clone)]
pub struct ListRequest {
	pub kind: Collection,
	pub viewer_id: Option<Uuid>,
	pub filters: Vec<String>,
	pub sorts: Vec<String>,
	/// 1-based.
	pub page: Option<u32>,
	pub page_size: Option<u32>,
	pub soft_delete: SoftDelete,
}
impl ListRequest {
	pub fn new(kind: Collection) -> Self {
		Self {
			kind,
			viewer_id: None,
			filters: Vec::new(),
			sorts: Vec::new(),
			page: None,
			page_size: None,
			soft_delete: SoftDelete::Exclude,
		}
	}
}

impl FeedService {
	pub async fn list(&self, req: ListRequest) -> Result<ListResponse> {
		let kind = feed_kind(req.kind)?;
		let page = req.page.unwrap_or(1);

		if page == 0 {
			return Err(Error::InvalidRequest { message: "page starts at 1.".to_string() });
		}

		let page_size = self.page_size(req.page_size)?;
		let Some(prepared) =
			self.prepare(kind, req.viewer_id, &req.filters, &req.sorts, req.soft_delete).await?
		else {
			return Ok(ListResponse::new(Vec::new(), 0, page, page_size));
		};
		let skip = u64::from(page - 1) * u64::from(page_size);
		let window = Window::Offset { skip, limit: u64::from(page_size) };
		let plan = prepared.plan(window, self.cfg.following_cap);
		let docs = executor::execute(self.store.as_ref(), &plan.pipeline()).await?;
		let counting = prepared.plan(Window::All, self.cfg.following_cap);
		let total = executor::count(self.store.as_ref(), &counting.core_pipeline()).await?;

		tracing::info!(
			kind = %kind,
			strategy = %plan.strategy,
			page,
			docs = docs.len(),
			total,
			"List served."
		);

		Ok(ListResponse::new(docs, total, page, page_size))
	}
}

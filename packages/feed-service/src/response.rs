use std::collections::BTreeMap;

use feed_domain::{
	Document,
	cursor::CursorPlan,
	pipeline::ID_FIELD,
	plan::{BOOKMARKED_FLAG, LIKED_FLAG},
};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedResponse {
	pub docs: Vec<Document>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub next_cursor: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub next_value: Option<f64>,
	/// Whether the viewer liked each document, keyed by document id.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reactions: Option<BTreeMap<String, bool>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub bookmarks: Option<BTreeMap<String, bool>>,
}
impl FeedResponse {
	pub fn empty() -> Self {
		Self::default()
	}

	pub fn assemble(docs: Vec<Document>, cursor: &CursorPlan, viewer_id: Option<Uuid>) -> Self {
		let next = cursor.next(docs.last());
		let (reactions, bookmarks) = match viewer_id {
			Some(_) => (Some(flags(&docs, LIKED_FLAG)), Some(flags(&docs, BOOKMARKED_FLAG))),
			None => (None, None),
		};
		let (next_cursor, next_value) = match next {
			Some(next) => (Some(next.cursor), next.value),
			None => (None, None),
		};

		Self { docs, next_cursor, next_value, reactions, bookmarks }
	}
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
	pub docs: Vec<Document>,
	pub total: u64,
	pub page: u32,
	pub page_size: u32,
	pub pages: u64,
}
impl ListResponse {
	pub fn new(docs: Vec<Document>, total: u64, page: u32, page_size: u32) -> Self {
		let pages = total.div_ceil(u64::from(page_size.max(1)));

		Self { docs, total, page, page_size, pages }
	}
}

fn flags(docs: &[Document], flag: &str) -> BTreeMap<String, bool> {
	docs.iter()
		.filter_map(|doc| {
			let id = doc.get(ID_FIELD)?.as_str()?;

			Some((id.to_string(), doc.get(flag).and_then(Value::as_bool).unwrap_or(false)))
		})
		.collect()
}

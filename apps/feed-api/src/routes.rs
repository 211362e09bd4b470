use axum::{
	Json, Router,
	extract::{Path, Query, State},
	http::{HeaderMap, StatusCode},
	response::{IntoResponse, Response},
	routing::get,
};
use feed_domain::Collection;
use feed_service::{Error, FeedRequest, FeedResponse, ListRequest, ListResponse};
use serde::Serialize;
use uuid::Uuid;

use crate::state::AppState;

/// Set by the upstream auth layer once the viewer's token has been verified.
pub const VIEWER_HEADER: &str = "X-Feed-Viewer-Id";

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/feed/{kind}", get(feed))
		.route("/v1/list/{kind}", get(list))
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn feed(
	State(state): State<AppState>,
	Path(kind): Path<String>,
	headers: HeaderMap,
	Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<FeedResponse>, ApiError> {
	let kind = parse_kind(&kind)?;
	let viewer_id = viewer_id(&headers)?;
	let params = Params::parse(pairs)?;
	let response = state
		.service
		.feed(FeedRequest {
			viewer_id,
			filters: params.filters,
			sorts: params.sorts,
			cursor: params.cursor,
			next_value: params.next_value,
			limit: params.limit,
			..FeedRequest::new(kind)
		})
		.await?;

	Ok(Json(response))
}

async fn list(
	State(state): State<AppState>,
	Path(kind): Path<String>,
	headers: HeaderMap,
	Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<ListResponse>, ApiError> {
	let kind = parse_kind(&kind)?;
	let viewer_id = viewer_id(&headers)?;
	let params = Params::parse(pairs)?;
	let response = state
		.service
		.list(ListRequest {
			viewer_id,
			filters: params.filters,
			sorts: params.sorts,
			page: params.page,
			page_size: params.page_size.or(params.limit),
			..ListRequest::new(kind)
		})
		.await?;

	Ok(Json(response))
}

/// Query parameters shared by both endpoints. `filter` and `sort` repeat.
#[derive(Debug, Default)]
struct Params {
	filters: Vec<String>,
	sorts: Vec<String>,
	cursor: Option<String>,
	next_value: Option<String>,
	limit: Option<u32>,
	page: Option<u32>,
	page_size: Option<u32>,
}
impl Params {
	fn parse(pairs: Vec<(String, String)>) -> Result<Self, ApiError> {
		let mut params = Self::default();

		for (key, value) in pairs {
			match key.as_str() {
				"filter" => params.filters.push(value),
				"sort" => params.sorts.push(value),
				"cursor" => params.cursor = Some(value),
				"nextValue" => params.next_value = Some(value),
				"limit" => params.limit = Some(parse_count("limit", &value)?),
				"page" => params.page = Some(parse_count("page", &value)?),
				"pageSize" => params.page_size = Some(parse_count("pageSize", &value)?),
				_ => {},
			}
		}

		Ok(params)
	}
}

fn parse_count(name: &str, raw: &str) -> Result<u32, ApiError> {
	raw.trim().parse().map_err(|_| {
		json_error(
			StatusCode::BAD_REQUEST,
			"INVALID_REQUEST",
			format!("{name} must be a non-negative integer."),
			Some(vec![format!("$.{name}")]),
		)
	})
}

fn parse_kind(raw: &str) -> Result<Collection, ApiError> {
	Collection::parse_feed(raw).ok_or_else(|| {
		json_error(
			StatusCode::BAD_REQUEST,
			"INVALID_REQUEST",
			format!("Unknown feed kind {raw:?}."),
			Some(vec!["$.kind".to_string()]),
		)
	})
}

fn viewer_id(headers: &HeaderMap) -> Result<Option<Uuid>, ApiError> {
	let Some(raw) = headers.get(VIEWER_HEADER) else {
		return Ok(None);
	};

	raw.to_str().ok().and_then(|raw| Uuid::parse_str(raw.trim()).ok()).map(Some).ok_or_else(|| {
		json_error(
			StatusCode::BAD_REQUEST,
			"INVALID_REQUEST",
			format!("{VIEWER_HEADER} must be a UUID."),
			Some(vec![VIEWER_HEADER.to_string()]),
		)
	})
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	fields: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}
impl ApiError {
	fn new(
		status: StatusCode,
		error_code: impl Into<String>,
		message: impl Into<String>,
		fields: Option<Vec<String>>,
	) -> Self {
		Self { status, error_code: error_code.into(), message: message.into(), fields }
	}
}
impl From<Error> for ApiError {
	fn from(err: Error) -> Self {
		match err {
			Error::InvalidRequest { message } =>
				json_error(StatusCode::BAD_REQUEST, "INVALID_REQUEST", message, None),
			err => {
				tracing::error!(error = %err, "Feed request failed.");

				json_error(
					StatusCode::INTERNAL_SERVER_ERROR,
					"INTERNAL_ERROR",
					"Internal error.",
					None,
				)
			},
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body =
			ErrorBody { error_code: self.error_code, message: self.message, fields: self.fields };

		(self.status, Json(body)).into_response()
	}
}

pub fn json_error(
	status: StatusCode,
	code: &str,
	message: impl Into<String>,
	fields: Option<Vec<String>>,
) -> ApiError {
	ApiError::new(status, code, message, fields)
}

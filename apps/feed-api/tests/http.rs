use std::sync::Arc;

use axum::{
	Router,
	body::{self, Body},
	http::{Request, StatusCode},
};
use feed_api::{routes, state::AppState};
use feed_domain::Collection;
use feed_service::FeedService;
use feed_storage::{DocumentStore, memory::MemoryStore};
use feed_testkit::fixtures;
use serde_json::Value;
use tower::util::ServiceExt;

async fn app() -> Router {
	let store = Arc::new(MemoryStore::new());
	let owner = fixtures::id(900);

	for n in 1..=5 {
		store
			.insert(Collection::Creations, fixtures::creation(n, owner).public(n != 3).build())
			.await
			.expect("insert failed");
	}

	let service = FeedService::new(feed_config::Feed::default(), store);

	routes::router(AppState::from_service(service))
}

async fn get(app: Router, uri: &str, viewer: Option<&str>) -> (StatusCode, Value) {
	let mut request = Request::builder().uri(uri);

	if let Some(viewer) = viewer {
		request = request.header(routes::VIEWER_HEADER, viewer);
	}

	let response = app
		.oneshot(request.body(Body::empty()).expect("Failed to build request."))
		.await
		.expect("Failed to call the router.");
	let status = response.status();
	let body = body::to_bytes(response.into_body(), usize::MAX)
		.await
		.expect("Failed to read response body.");
	let json = if body.is_empty() {
		Value::Null
	} else {
		serde_json::from_slice(&body).expect("Failed to parse response.")
	};

	(status, json)
}

fn ids(json: &Value) -> Vec<String> {
	json["docs"]
		.as_array()
		.map(|docs| docs.iter().filter_map(|doc| doc["_id"].as_str().map(str::to_string)).collect())
		.unwrap_or_default()
}

#[tokio::test]
async fn health_ok() {
	let (status, _) = get(app().await, "/health", None).await;

	assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn feed_pages_with_a_cursor() {
	let app = app().await;
	let (status, first) = get(app.clone(), "/v1/feed/creations?limit=2", None).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(ids(&first), vec![fixtures::id(5).to_string(), fixtures::id(4).to_string()]);
	assert_eq!(first["nextCursor"], Value::String(fixtures::id(4).to_string()));
	assert!(first.get("reactions").is_none());

	let uri = format!("/v1/feed/creations?limit=2&cursor={}", fixtures::id(4));
	let (_, second) = get(app, &uri, None).await;

	assert_eq!(ids(&second), vec![fixtures::id(2).to_string(), fixtures::id(1).to_string()]);
}

#[tokio::test]
async fn owner_sees_private_documents_through_the_header() {
	let owner = fixtures::id(900).to_string();
	let uri = format!("/v1/feed/creations?filter=user%3B{owner}&sort=createdAt%3B-1");
	let (_, anonymous) = get(app().await, &uri, None).await;
	let (_, own) = get(app().await, &uri, Some(&owner)).await;

	assert_eq!(ids(&anonymous).len(), 4);
	assert_eq!(ids(&own).len(), 5);
	assert!(own["reactions"].is_object());
}

#[tokio::test]
async fn list_reports_totals() {
	let (status, json) = get(app().await, "/v1/list/creations?page=2&pageSize=3", None).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(json["total"], 4);
	assert_eq!(json["pages"], 2);
	assert_eq!(json["pageSize"], 3);
	assert_eq!(ids(&json), vec![fixtures::id(1).to_string()]);
}

#[tokio::test]
async fn bad_requests_are_rejected() {
	for (uri, viewer) in [
		("/v1/feed/tasks", None),
		("/v1/feed/creations?filter=user%3Bnot-an-id", None),
		("/v1/feed/creations?limit=ten", None),
		("/v1/feed/creations?cursor=nope", None),
		("/v1/feed/creations", Some("nobody")),
	] {
		let (status, json) = get(app().await, uri, viewer).await;

		assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
		assert_eq!(json["error_code"], "INVALID_REQUEST", "{uri}");
	}
}

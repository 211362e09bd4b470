use std::{sync::Arc, time::Duration};

use feed_domain::Collection;
use feed_service::{
	BoxFuture, Error, FeedRequest, FeedResponse, FeedService, ListRequest, Neighbor, Providers,
	Result, SearchProvider, SimilarityProvider,
};
use feed_storage::{DocumentStore, memory::MemoryStore};
use feed_testkit::fixtures::{self, DocBuilder};
use uuid::Uuid;

struct FixedSimilarity(Option<Vec<Neighbor>>);

impl SimilarityProvider for FixedSimilarity {
	fn similar<'a>(
		&'a self,
		_: Collection,
		_: Uuid,
		_: u32,
	) -> BoxFuture<'a, Result<Option<Vec<Neighbor>>>> {
		let neighbors = self.0.clone();

		Box::pin(async move { Ok(neighbors) })
	}
}

struct FailingSimilarity;

impl SimilarityProvider for FailingSimilarity {
	fn similar<'a>(
		&'a self,
		_: Collection,
		_: Uuid,
		_: u32,
	) -> BoxFuture<'a, Result<Option<Vec<Neighbor>>>> {
		Box::pin(async { Err(Error::Provider { message: "index offline".to_string() }) })
	}
}

struct SlowSimilarity;

impl SimilarityProvider for SlowSimilarity {
	fn similar<'a>(
		&'a self,
		_: Collection,
		_: Uuid,
		_: u32,
	) -> BoxFuture<'a, Result<Option<Vec<Neighbor>>>> {
		Box::pin(async {
			tokio::time::sleep(Duration::from_millis(500)).await;

			Ok(Some(vec![neighbor(1, 1.0)]))
		})
	}
}

struct FixedSearch(Vec<Neighbor>);

impl SearchProvider for FixedSearch {
	fn search<'a>(
		&'a self,
		_: Collection,
		_: &'a str,
		_: u32,
	) -> BoxFuture<'a, Result<Vec<Neighbor>>> {
		let neighbors = self.0.clone();

		Box::pin(async move { Ok(neighbors) })
	}
}

fn neighbor(n: u128, score: f64) -> Neighbor {
	Neighbor { id: fixtures::id(n), score }
}

fn service(store: &Arc<MemoryStore>) -> FeedService {
	FeedService::new(feed_config::Feed::default(), store.clone())
}

fn service_with(store: &Arc<MemoryStore>, providers: Providers) -> FeedService {
	FeedService::with_providers(feed_config::Feed::default(), store.clone(), providers)
}

async fn seed(
	store: &MemoryStore,
	collection: Collection,
	docs: impl IntoIterator<Item = DocBuilder>,
) {
	for doc in docs {
		store.insert(collection, doc.build()).await.expect("insert failed");
	}
}

fn request(filters: &[String], sorts: &[&str], viewer: Option<Uuid>, limit: u32) -> FeedRequest {
	FeedRequest {
		viewer_id: viewer,
		filters: filters.to_vec(),
		sorts: sorts.iter().map(|sort| sort.to_string()).collect(),
		limit: Some(limit),
		..FeedRequest::new(Collection::Creations)
	}
}

/// Follows cursors until an empty page, returning every page.
async fn pages(service: &FeedService, first: FeedRequest) -> Vec<FeedResponse> {
	let mut pages = Vec::new();
	let mut req = first;

	for _ in 0..50 {
		let page = service.feed(req.clone()).await.expect("feed failed");
		let done = page.docs.is_empty();

		req.cursor = page.next_cursor.clone();
		req.next_value = page.next_value.map(|value| value.to_string());

		pages.push(page);

		if done {
			break;
		}
	}

	pages
}

fn page_ids(pages: &[FeedResponse]) -> Vec<Vec<Uuid>> {
	pages.iter().map(|page| fixtures::ids(&page.docs)).collect()
}

fn ids(ns: &[u128]) -> Vec<Uuid> {
	ns.iter().map(|n| fixtures::id(*n)).collect()
}

#[tokio::test]
async fn cursor_pages_visit_every_visible_document_once() {
	let store = Arc::new(MemoryStore::new());
	let alice = fixtures::id(900);
	let bob = fixtures::id(901);

	seed(
		&store,
		Collection::Creations,
		(1..=25).map(|n| {
			fixtures::creation(n, if n % 2 == 0 { alice } else { bob })
				.public(n % 5 != 0)
				.deleted(n == 7)
		}),
	)
	.await;

	let pages = pages(&service(&store), request(&[], &[], None, 4)).await;
	let seen: Vec<Uuid> = page_ids(&pages).into_iter().flatten().collect();
	let expected: Vec<Uuid> =
		(1..=25).rev().filter(|n| n % 5 != 0 && *n != 7).map(fixtures::id).collect();

	assert_eq!(seen, expected);
	assert!(pages.iter().rev().skip(1).all(|page| page.next_cursor.is_some()));

	let last = pages.last().expect("at least one page");

	assert!(last.docs.is_empty());
	assert!(last.next_cursor.is_none());
}

#[tokio::test]
async fn documents_inserted_mid_pagination_wait_for_a_refresh() {
	let store = Arc::new(MemoryStore::new());
	let owner = fixtures::id(900);

	seed(&store, Collection::Creations, (1..=6).map(|n| fixtures::creation(n, owner))).await;

	let service = service(&store);
	let first = service.feed(request(&[], &[], None, 3)).await.expect("feed failed");

	assert_eq!(fixtures::ids(&first.docs), ids(&[6, 5, 4]));

	seed(&store, Collection::Creations, vec![fixtures::creation(7, owner)]).await;

	let second = service
		.feed(FeedRequest { cursor: first.next_cursor.clone(), ..request(&[], &[], None, 3) })
		.await
		.expect("feed failed");

	assert_eq!(fixtures::ids(&second.docs), ids(&[3, 2, 1]));

	let refreshed = service.feed(request(&[], &[], None, 3)).await.expect("feed failed");

	assert_eq!(fixtures::ids(&refreshed.docs), ids(&[7, 6, 5]));
}

#[tokio::test]
async fn counter_sort_breaks_ties_by_id_and_skips_zero() {
	let store = Arc::new(MemoryStore::new());
	let owner = fixtures::id(900);

	seed(
		&store,
		Collection::Creations,
		(1..=10).map(|n| fixtures::creation(n, owner).set("likeCount", (n % 3) as u64)),
	)
	.await;

	let pages = pages(&service(&store), request(&[], &["likeCount;-1"], None, 3)).await;

	assert_eq!(
		page_ids(&pages),
		vec![ids(&[8, 5, 2]), ids(&[10, 7, 4]), ids(&[1]), Vec::new()]
	);
	assert_eq!(pages[0].next_value, Some(2.0));
	assert_eq!(pages[0].next_cursor, Some(fixtures::id(2).to_string()));
	assert_eq!(pages[1].next_value, Some(1.0));
}

#[tokio::test]
async fn anonymous_viewers_cannot_ask_for_private_documents() {
	let store = Arc::new(MemoryStore::new());
	let owner = fixtures::id(900);

	seed(
		&store,
		Collection::Creations,
		vec![fixtures::creation(1, owner), fixtures::creation(2, owner).public(false)],
	)
	.await;

	let service = service(&store);
	let filters = [format!("user;{owner}"), "public;false".to_string()];
	let anonymous = service.feed(request(&filters, &[], None, 10)).await.expect("feed failed");
	let stranger = service
		.feed(request(&filters, &[], Some(fixtures::id(901)), 10))
		.await
		.expect("feed failed");

	assert_eq!(fixtures::ids(&anonymous.docs), ids(&[1]));
	assert_eq!(fixtures::ids(&stranger.docs), ids(&[1]));
}

#[tokio::test]
async fn own_profile_includes_private_documents() {
	let store = Arc::new(MemoryStore::new());
	let owner = fixtures::id(900);

	seed(
		&store,
		Collection::Creations,
		vec![
			fixtures::creation(1, owner),
			fixtures::creation(2, owner).public(false),
			fixtures::creation(3, owner).public(false).deleted(true),
		],
	)
	.await;

	let service = service(&store);
	let filters = [format!("user;{owner}")];
	let own = service.feed(request(&filters, &[], Some(owner), 10)).await.expect("feed failed");
	let only_private = service
		.feed(request(
			&[filters[0].clone(), "visibility;private".to_string()],
			&[],
			Some(owner),
			10,
		))
		.await
		.expect("feed failed");
	let other = service
		.feed(request(&filters, &[], Some(fixtures::id(901)), 10))
		.await
		.expect("feed failed");

	assert_eq!(fixtures::ids(&own.docs), ids(&[2, 1]));
	assert_eq!(fixtures::ids(&only_private.docs), ids(&[2]));
	assert_eq!(fixtures::ids(&other.docs), ids(&[1]));
}

#[tokio::test]
async fn collection_members_page_in_fixed_size_steps() {
	let store = Arc::new(MemoryStore::new());
	let owner = fixtures::id(900);
	let members: Vec<Uuid> = (1..=150).map(fixtures::id).collect();

	seed(&store, Collection::Creations, (1..=150).map(|n| fixtures::creation(n, owner))).await;
	seed(&store, Collection::Collections, vec![fixtures::collection(1_000, owner, &members)]).await;

	let filters = [format!("collection;{}", fixtures::id(1_000))];
	let pages = pages(&service(&store), request(&filters, &[], None, 50)).await;
	let sizes: Vec<usize> = pages.iter().map(|page| page.docs.len()).collect();
	let seen: Vec<Uuid> = page_ids(&pages).into_iter().flatten().collect();
	let expected: Vec<Uuid> = (1..=150).rev().map(fixtures::id).collect();

	assert_eq!(sizes, vec![50, 50, 50, 0]);
	assert_eq!(seen, expected);
}

#[tokio::test]
async fn collection_owners_and_contributors_see_private_members() {
	let store = Arc::new(MemoryStore::new());
	let owner = fixtures::id(900);
	let contributor = fixtures::id(901);
	let stranger = fixtures::id(902);

	seed(
		&store,
		Collection::Creations,
		vec![fixtures::creation(1, owner), fixtures::creation(2, owner).public(false)],
	)
	.await;
	seed(
		&store,
		Collection::Collections,
		vec![
			fixtures::collection(1_000, owner, &ids(&[1, 2]))
				.set("contributors", fixtures::id_array(&[contributor])),
		],
	)
	.await;

	let service = service(&store);
	let filters = [format!("collection;{}", fixtures::id(1_000))];

	for (viewer, expected) in [
		(Some(owner), ids(&[2, 1])),
		(Some(contributor), ids(&[2, 1])),
		(Some(stranger), ids(&[1])),
		(None, ids(&[1])),
	] {
		let page = service.feed(request(&filters, &[], viewer, 10)).await.expect("feed failed");

		assert_eq!(fixtures::ids(&page.docs), expected, "viewer {viewer:?}");
	}
}

#[tokio::test]
async fn liked_by_me_includes_private_documents_i_own() {
	let store = Arc::new(MemoryStore::new());
	let viewer = fixtures::id(900);
	let other = fixtures::id(901);

	seed(
		&store,
		Collection::Creations,
		vec![
			fixtures::creation(1, other),
			fixtures::creation(2, other).public(false),
			fixtures::creation(3, viewer).public(false),
			fixtures::creation(4, viewer),
		],
	)
	.await;
	seed(
		&store,
		Collection::Reactions,
		(1..=4).map(|n| fixtures::like(10 + n, viewer, fixtures::id(n))),
	)
	.await;

	let service = service(&store);
	let filters = [format!("likedBy;{viewer}")];
	let page = service.feed(request(&filters, &[], Some(viewer), 10)).await.expect("feed failed");

	assert_eq!(fixtures::ids(&page.docs), ids(&[3, 1]));
	assert_eq!(page.next_cursor, Some(fixtures::id(11).to_string()));

	let reactions = page.reactions.expect("viewer pages carry reactions");

	assert_eq!(reactions.get(&fixtures::id(3).to_string()), Some(&true));
	assert_eq!(reactions.get(&fixtures::id(1).to_string()), Some(&true));

	let pages = pages(&service, request(&filters, &[], Some(viewer), 1)).await;

	assert_eq!(page_ids(&pages), vec![ids(&[3]), ids(&[1]), Vec::new()]);
}

#[tokio::test]
async fn liked_by_narrows_a_collection_feed() {
	let store = Arc::new(MemoryStore::new());
	let viewer = fixtures::id(900);
	let curator = fixtures::id(901);

	seed(
		&store,
		Collection::Creations,
		vec![
			fixtures::creation(1, curator),
			fixtures::creation(2, viewer).public(false),
			fixtures::creation(3, curator),
			fixtures::creation(4, curator).public(false),
		],
	)
	.await;
	seed(
		&store,
		Collection::Collections,
		vec![fixtures::collection(1_000, curator, &ids(&[1, 2, 3, 4]))],
	)
	.await;
	seed(
		&store,
		Collection::Reactions,
		[1, 2, 4].map(|n| fixtures::like(10 + n, viewer, fixtures::id(n))),
	)
	.await;

	let filters = [format!("collection;{}", fixtures::id(1_000)), format!("likedBy;{viewer}")];
	let page =
		service(&store).feed(request(&filters, &[], Some(viewer), 10)).await.expect("feed failed");

	assert_eq!(fixtures::ids(&page.docs), ids(&[2, 1]));
}

#[tokio::test]
async fn liked_by_ignores_an_explicit_public_toggle() {
	let store = Arc::new(MemoryStore::new());
	let viewer = fixtures::id(900);
	let other = fixtures::id(901);

	seed(
		&store,
		Collection::Creations,
		vec![
			fixtures::creation(1, other),
			fixtures::creation(2, viewer).public(false),
			fixtures::creation(3, other),
		],
	)
	.await;
	seed(
		&store,
		Collection::Reactions,
		[1, 2].map(|n| fixtures::like(10 + n, viewer, fixtures::id(n))),
	)
	.await;

	let filters = [format!("likedBy;{viewer}"), "public;true".to_string()];
	let page =
		service(&store).feed(request(&filters, &[], Some(viewer), 10)).await.expect("feed failed");

	assert_eq!(fixtures::ids(&page.docs), ids(&[2, 1]));
}

#[tokio::test]
async fn liked_sort_without_a_viewer_is_empty() {
	let store = Arc::new(MemoryStore::new());

	seed(&store, Collection::Creations, vec![fixtures::creation(1, fixtures::id(900))]).await;

	let page =
		service(&store).feed(request(&[], &["liked;-1"], None, 10)).await.expect("feed failed");

	assert!(page.docs.is_empty());
	assert!(page.next_cursor.is_none());
}

#[tokio::test]
async fn following_feed_merges_followed_accounts() {
	let store = Arc::new(MemoryStore::new());
	let viewer = fixtures::id(900);
	let alice = fixtures::id(901);
	let bob = fixtures::id(902);
	let carol = fixtures::id(903);

	seed(
		&store,
		Collection::Creations,
		vec![
			fixtures::creation(1, alice),
			fixtures::creation(2, bob),
			fixtures::creation(3, alice),
			fixtures::creation(4, bob),
			fixtures::creation(5, alice),
			fixtures::creation(6, carol),
		],
	)
	.await;
	seed(
		&store,
		Collection::Follows,
		vec![fixtures::follow(20, viewer, alice), fixtures::follow(21, viewer, bob)],
	)
	.await;

	let service = service(&store);
	let pages = pages(&service, request(&[], &["following;-1"], Some(viewer), 2)).await;

	assert_eq!(page_ids(&pages), vec![ids(&[5, 4]), ids(&[3, 2]), ids(&[1]), Vec::new()]);

	let anonymous =
		service.feed(request(&[], &["following;-1"], None, 2)).await.expect("feed failed");

	assert!(anonymous.docs.is_empty());
}

#[tokio::test]
async fn concept_feed_reads_task_outputs() {
	let store = Arc::new(MemoryStore::new());
	let owner = fixtures::id(900);
	let concept = fixtures::id(500);

	seed(&store, Collection::Creations, (1..=4).map(|n| fixtures::creation(n, owner))).await;
	seed(
		&store,
		Collection::Tasks,
		vec![
			fixtures::task(100, concept, &ids(&[1, 2])),
			fixtures::task(101, concept, &ids(&[3])),
			fixtures::task(102, fixtures::id(501), &ids(&[4])),
		],
	)
	.await;

	let filters = [format!("concept;{concept}")];
	let page = service(&store).feed(request(&filters, &[], None, 10)).await.expect("feed failed");

	assert_eq!(fixtures::ids(&page.docs), ids(&[3, 2, 1]));
}

#[tokio::test]
async fn missing_reference_vector_yields_an_empty_page() {
	let store = Arc::new(MemoryStore::new());

	seed(&store, Collection::Creations, (1..=3).map(|n| fixtures::creation(n, fixtures::id(900))))
		.await;

	let filters = [format!("creation;{}", fixtures::id(1))];
	let mut cfg = feed_config::Feed::default();

	cfg.collaborator_timeout_ms = 50;

	for similarity in [
		Arc::new(FixedSimilarity(None)) as Arc<dyn SimilarityProvider>,
		Arc::new(FailingSimilarity) as Arc<dyn SimilarityProvider>,
		Arc::new(SlowSimilarity) as Arc<dyn SimilarityProvider>,
	] {
		let service = FeedService::with_providers(
			cfg.clone(),
			store.clone(),
			Providers { similarity, ..Providers::default() },
		);
		let page = service.feed(request(&filters, &[], None, 10)).await.expect("feed failed");

		assert!(page.docs.is_empty());
		assert!(page.next_cursor.is_none());
	}
}

#[tokio::test]
async fn similarity_allow_list_filters_and_orders_by_score() {
	let store = Arc::new(MemoryStore::new());
	let owner = fixtures::id(900);

	seed(
		&store,
		Collection::Creations,
		vec![
			fixtures::creation(1, owner),
			fixtures::creation(2, owner),
			fixtures::creation(3, owner),
			fixtures::creation(4, owner).public(false),
		],
	)
	.await;

	let similarity =
		FixedSimilarity(Some(vec![neighbor(1, 0.5), neighbor(3, 0.9), neighbor(4, 0.7)]));
	let service = service_with(
		&store,
		Providers { similarity: Arc::new(similarity), ..Providers::default() },
	);
	let filters = [format!("creation;{}", fixtures::id(2))];
	let by_id = service.feed(request(&filters, &[], None, 10)).await.expect("feed failed");

	assert_eq!(fixtures::ids(&by_id.docs), ids(&[3, 1]));

	let pages = pages(&service, request(&filters, &["similarity;-1"], None, 1)).await;

	assert_eq!(page_ids(&pages), vec![ids(&[3]), ids(&[1]), Vec::new()]);
	assert_eq!(pages[0].next_value, Some(0.9));
}

#[tokio::test]
async fn search_and_similarity_intersect() {
	let store = Arc::new(MemoryStore::new());

	seed(&store, Collection::Creations, (1..=4).map(|n| fixtures::creation(n, fixtures::id(900))))
		.await;

	let service = service_with(
		&store,
		Providers {
			similarity: Arc::new(FixedSimilarity(Some(vec![
				neighbor(1, 0.1),
				neighbor(2, 0.2),
				neighbor(3, 0.3),
			]))),
			search: Arc::new(FixedSearch(vec![
				neighbor(2, 0.9),
				neighbor(3, 0.8),
				neighbor(4, 0.7),
			])),
		},
	);
	let searched = service
		.feed(request(&["search;sunset".to_string()], &[], None, 10))
		.await
		.expect("feed failed");
	let both = service
		.feed(request(
			&["search;sunset".to_string(), format!("creation;{}", fixtures::id(1))],
			&[],
			None,
			10,
		))
		.await
		.expect("feed failed");

	assert_eq!(fixtures::ids(&searched.docs), ids(&[4, 3, 2]));
	assert_eq!(fixtures::ids(&both.docs), ids(&[3, 2]));
}

#[tokio::test]
async fn pages_carry_owner_summaries_and_viewer_flags() {
	let store = Arc::new(MemoryStore::new());
	let owner = fixtures::id(900);
	let viewer = fixtures::id(901);

	seed(&store, Collection::Creators, vec![fixtures::creator(900, "ada")]).await;
	seed(&store, Collection::Creations, vec![fixtures::creation(1, owner)]).await;
	seed(
		&store,
		Collection::Reactions,
		vec![fixtures::reaction(30, viewer, fixtures::id(1), "creation", "bookmark")],
	)
	.await;

	let page =
		service(&store).feed(request(&[], &[], Some(viewer), 10)).await.expect("feed failed");
	let doc = &page.docs[0];

	assert_eq!(
		doc.get("user"),
		Some(&serde_json::json!({
			"_id": owner.to_string(),
			"username": "ada",
			"userImage": "https://img.example/ada.png",
		}))
	);
	assert_eq!(doc.get("liked"), Some(&serde_json::Value::Bool(false)));
	assert_eq!(doc.get("bookmarked"), Some(&serde_json::Value::Bool(true)));

	let bookmarks = page.bookmarks.expect("viewer pages carry bookmarks");

	assert_eq!(bookmarks.get(&fixtures::id(1).to_string()), Some(&true));

	let anonymous = service(&store).feed(request(&[], &[], None, 10)).await.expect("feed failed");

	assert!(anonymous.reactions.is_none());
	assert!(!anonymous.docs[0].contains_key("liked"));
}

#[tokio::test]
async fn malformed_requests_are_rejected() {
	let store = Arc::new(MemoryStore::new());
	let service = service(&store);
	let bad_filter = service.feed(request(&["user;nope".to_string()], &[], None, 10)).await;
	let bad_cursor = service
		.feed(FeedRequest { cursor: Some("nope".to_string()), ..request(&[], &[], None, 10) })
		.await;
	let zero_limit = service.feed(request(&[], &[], None, 0)).await;
	let not_a_feed = service.feed(FeedRequest::new(Collection::Tasks)).await;

	for result in [bad_filter, bad_cursor, zero_limit, not_a_feed] {
		assert!(matches!(result, Err(Error::InvalidRequest { .. })), "{result:?}");
	}
}

#[tokio::test]
async fn limits_are_clamped_and_unknown_fields_dropped() {
	let store = Arc::new(MemoryStore::new());

	seed(&store, Collection::Creations, (1..=10).map(|n| fixtures::creation(n, fixtures::id(900))))
		.await;

	let mut cfg = feed_config::Feed::default();

	cfg.max_limit = 5;

	let service = FeedService::new(cfg, store.clone());
	let page = service
		.feed(request(&["colour;red".to_string()], &["shininess;-1"], None, 50))
		.await
		.expect("feed failed");

	assert_eq!(fixtures::ids(&page.docs), ids(&[10, 9, 8, 7, 6]));
}

#[tokio::test]
async fn list_reports_totals_and_pages() {
	let store = Arc::new(MemoryStore::new());
	let owner = fixtures::id(900);

	seed(
		&store,
		Collection::Creations,
		(1..=14).map(|n| fixtures::creation(n, owner).public(n <= 12)),
	)
	.await;

	let service = service(&store);
	let list = service
		.list(ListRequest {
			page: Some(3),
			page_size: Some(5),
			..ListRequest::new(Collection::Creations)
		})
		.await
		.expect("list failed");

	assert_eq!(fixtures::ids(&list.docs), ids(&[2, 1]));
	assert_eq!((list.total, list.page, list.page_size, list.pages), (12, 3, 5, 3));

	let zeroth = service
		.list(ListRequest { page: Some(0), ..ListRequest::new(Collection::Creations) })
		.await;

	assert!(matches!(zeroth, Err(Error::InvalidRequest { .. })));
}

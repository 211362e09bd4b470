//! Document builders for tests. Ids come from small integers so their order is obvious, and
//! `createdAt` follows the same order.

use feed_domain::{Document, pipeline::ID_FIELD};
use serde_json::{Value, json};
use time::{Duration, OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

pub fn id(n: u128) -> Uuid {
	Uuid::from_u128(n)
}

pub fn timestamp(n: u128) -> String {
	let minutes = i64::try_from(n).unwrap_or(0);

	(OffsetDateTime::UNIX_EPOCH + Duration::minutes(minutes)).format(&Rfc3339).unwrap_or_default()
}

#[derive(Debug, Clone)]
pub struct DocBuilder(Document);
impl DocBuilder {
	/// A live public document with id `n`.
	pub fn new(n: u128) -> Self {
		let mut doc = Document::new();

		doc.insert(ID_FIELD.to_string(), json!(id(n).to_string()));
		doc.insert("createdAt".to_string(), json!(timestamp(n)));
		doc.insert("public".to_string(), json!(true));
		doc.insert("deleted".to_string(), json!(false));

		Self(doc)
	}

	pub fn owner(self, owner: Uuid) -> Self {
		self.set("user", owner.to_string())
	}

	pub fn public(self, public: bool) -> Self {
		self.set("public", public)
	}

	pub fn deleted(self, deleted: bool) -> Self {
		self.set("deleted", deleted)
	}

	pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
		self.0.insert(field.to_string(), value.into());

		self
	}

	pub fn build(self) -> Document {
		self.0
	}
}

pub fn creation(n: u128, owner: Uuid) -> DocBuilder {
	DocBuilder::new(n).owner(owner).set("likeCount", 0)
}

pub fn creator(n: u128, username: &str) -> DocBuilder {
	DocBuilder::new(n)
		.set("username", username)
		.set("userImage", format!("https://img.example/{username}.png"))
		.set("followerCount", 0)
}

pub fn collection(n: u128, owner: Uuid, members: &[Uuid]) -> DocBuilder {
	DocBuilder::new(n)
		.owner(owner)
		.set("creations", id_array(members))
		.set("contributors", json!([]))
}

pub fn task(n: u128, concept: Uuid, result: &[Uuid]) -> DocBuilder {
	DocBuilder::new(n)
		.set("args", json!({ "concept": concept.to_string() }))
		.set("result", id_array(result))
		.set("status", "completed")
		.set("tool", "image")
}

pub fn reaction(
	n: u128,
	user: Uuid,
	entity: Uuid,
	entity_type: &str,
	reaction: &str,
) -> DocBuilder {
	DocBuilder::new(n)
		.set("user", user.to_string())
		.set("entityId", entity.to_string())
		.set("entityType", entity_type)
		.set("reaction", reaction)
}

pub fn like(n: u128, user: Uuid, entity: Uuid) -> DocBuilder {
	reaction(n, user, entity, "creation", "like")
}

pub fn follow(n: u128, follower: Uuid, following: Uuid) -> DocBuilder {
	DocBuilder::new(n)
		.set("follower", follower.to_string())
		.set("following", following.to_string())
}

pub fn id_array(ids: &[Uuid]) -> Value {
	Value::Array(ids.iter().map(|id| Value::String(id.to_string())).collect())
}

/// The `_id` of every document, skipping documents without a parseable id.
pub fn ids(docs: &[Document]) -> Vec<Uuid> {
	docs.iter()
		.filter_map(|doc| doc.get(ID_FIELD))
		.filter_map(Value::as_str)
		.filter_map(|raw| Uuid::parse_str(raw).ok())
		.collect()
}

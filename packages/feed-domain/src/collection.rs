use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
	Creations,
	Models,
	Agents,
	Collections,
	Creators,
	Tasks,
	Reactions,
	Follows,
}
impl Collection {
	pub const FEEDS: [Self; 5] =
		[Self::Creations, Self::Models, Self::Agents, Self::Collections, Self::Creators];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Creations => "creations",
			Self::Models => "models",
			Self::Agents => "agents",
			Self::Collections => "collections",
			Self::Creators => "creators",
			Self::Tasks => "tasks",
			Self::Reactions => "reactions",
			Self::Follows => "follows",
		}
	}

	/// Resolves a feed kind from a request path segment. Support collections are never
	/// addressable as feeds.
	pub fn parse_feed(raw: &str) -> Option<Self> {
		Self::FEEDS.into_iter().find(|kind| kind.as_str() == raw)
	}

	pub fn is_feed(self) -> bool {
		Self::FEEDS.contains(&self)
	}

	/// Field naming the owning account. A creator owns itself.
	pub fn owner_path(self) -> &'static str {
		match self {
			Self::Creators => "_id",
			_ => "user",
		}
	}

	/// Value stored in `reactions.entityType` for documents of this collection.
	pub fn entity_type(self) -> &'static str {
		match self {
			Self::Creations => "creation",
			Self::Models => "model",
			Self::Agents => "agent",
			Self::Collections => "collection",
			Self::Creators => "creator",
			Self::Tasks => "task",
			Self::Reactions => "reaction",
			Self::Follows => "follow",
		}
	}

	pub fn has_agent(self) -> bool {
		matches!(self, Self::Creations)
	}

	pub fn has_task(self) -> bool {
		matches!(self, Self::Creations)
	}
}

impl Display for Collection {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

use std::fmt::{Display, Formatter};

use uuid::Uuid;

use crate::dsl::CompiledQuery;

/// One execution strategy per request, chosen by [`select`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
	/// Members of one collection.
	Membership { collection: Uuid },
	/// Outputs of the tasks run for one concept.
	TaskOutput { concept: Uuid },
	/// Recent documents of every account the viewer follows. No viewer, no follows.
	GraphFanOut { follower: Option<Uuid> },
	/// Documents reached through like reactions, in reaction order.
	ReactionFanOut { liker: Option<Uuid> },
	Direct,
}
impl Strategy {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Membership { .. } => "membership",
			Self::TaskOutput { .. } => "task_output",
			Self::GraphFanOut { .. } => "graph_fan_out",
			Self::ReactionFanOut { .. } => "reaction_fan_out",
			Self::Direct => "direct",
		}
	}
}

impl Display for Strategy {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// First match wins: membership, task output, follow graph, reactions, direct.
pub fn select(query: &CompiledQuery, viewer_id: Option<Uuid>) -> Strategy {
	let hints = query.hints();

	if let Some(collection) = hints.membership {
		return Strategy::Membership { collection };
	}
	if let Some(concept) = hints.task_output {
		return Strategy::TaskOutput { concept };
	}
	if hints.graph_fan_out {
		return Strategy::GraphFanOut { follower: viewer_id };
	}
	if hints.reaction_fan_out {
		return Strategy::ReactionFanOut { liker: query.liked_by().or(viewer_id) };
	}

	Strategy::Direct
}

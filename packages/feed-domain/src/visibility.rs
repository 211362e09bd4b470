use uuid::Uuid;

use crate::{
	Collection,
	dsl::{CompiledQuery, DELETED_FIELD, FilterKind, PUBLIC_FIELD},
	pipeline::{Predicate, Scalar},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SoftDelete {
	#[default]
	Exclude,
	/// Keep soft-deleted rows. Reserved for in-process callers that subtract them later.
	Include,
}

/// Everything the visibility policy needs to know about who is asking.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisibilityContext {
	pub viewer_id: Option<Uuid>,
	pub is_own_profile_view: bool,
	pub owns_collection_or_is_contributor: bool,
	pub via_liked_by_filter: bool,
	pub soft_delete: SoftDelete,
}
impl VisibilityContext {
	/// Derives the context from the compiled query. Collection access has to be checked against
	/// the store, so the caller passes it in.
	pub fn resolve(
		query: &CompiledQuery,
		viewer_id: Option<Uuid>,
		owns_collection_or_is_contributor: bool,
		soft_delete: SoftDelete,
	) -> Self {
		let owners = query.ids(FilterKind::Owner);
		let is_own_profile_view = match (viewer_id, owners.as_slice()) {
			(Some(viewer), [owner]) => viewer == *owner,
			_ => false,
		};

		Self {
			viewer_id,
			is_own_profile_view,
			owns_collection_or_is_contributor: viewer_id.is_some()
				&& owns_collection_or_is_contributor,
			via_liked_by_filter: query.liked_by().is_some(),
			soft_delete,
		}
	}

	pub fn is_relaxed(&self) -> bool {
		self.is_own_profile_view || self.owns_collection_or_is_contributor
	}

	/// The visibility and soft-delete predicate for documents of `kind`.
	pub fn predicate(&self, query: &CompiledQuery, kind: Collection) -> Predicate {
		let visibility = match query.liked_by() {
			Some(liker) if self.via_liked_by_filter => liked_by_visibility(kind, liker),
			_ if self.is_relaxed() => query
				.visibility()
				.map(|public| Predicate::eq(PUBLIC_FIELD, Scalar::Bool(public)))
				.unwrap_or(Predicate::True),
			_ => Predicate::eq(PUBLIC_FIELD, Scalar::Bool(true)),
		};

		Predicate::all([visibility, self.soft_delete_predicate()])
	}

	pub fn soft_delete_predicate(&self) -> Predicate {
		not_deleted(self.soft_delete)
	}
}

pub fn not_deleted(soft_delete: SoftDelete) -> Predicate {
	match soft_delete {
		SoftDelete::Exclude => Predicate::ne(DELETED_FIELD, Scalar::Bool(true)),
		SoftDelete::Include => Predicate::True,
	}
}

/// A document liked by someone other than its owner must be public; a document liked by its owner
/// shows up only while private.
fn liked_by_visibility(kind: Collection, liker: Uuid) -> Predicate {
	let owner = kind.owner_path();
	let liker = Scalar::Id(liker);

	Predicate::any([
		Predicate::all([
			Predicate::ne(owner, liker.clone()),
			Predicate::eq(PUBLIC_FIELD, Scalar::Bool(true)),
		]),
		Predicate::all([
			Predicate::eq(owner, liker),
			Predicate::ne(PUBLIC_FIELD, Scalar::Bool(true)),
		]),
	])
}

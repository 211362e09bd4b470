//! Stateless cursor pagination.
//!
//! A cursor is the id found at the position field of the last returned document, plus the value of
//! the primary sort key when that key is not unique. Nothing is stored server side.

use uuid::Uuid;

use crate::{
	Document, Error, Result,
	pipeline::{Direction, Path, Predicate, Scalar, SortKey, ValueKind},
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cursor {
	pub last_id: Uuid,
	pub last_value: Option<f64>,
}
impl Cursor {
	/// Parses the raw `cursor` and `nextValue` parameters. A value without an id is ignored.
	pub fn parse(cursor: Option<&str>, next_value: Option<&str>) -> Result<Option<Self>> {
		let Some(raw) = cursor.map(str::trim).filter(|raw| !raw.is_empty()) else {
			return Ok(None);
		};
		let last_id = Uuid::parse_str(raw)
			.map_err(|_| Error::InvalidCursor { message: format!("{raw:?} is not an id.") })?;
		let last_value = match next_value.map(str::trim).filter(|raw| !raw.is_empty()) {
			Some(raw) => {
				let value = raw.parse::<f64>().map_err(|_| Error::InvalidCursor {
					message: format!("nextValue {raw:?} is not a number."),
				})?;

				if !value.is_finite() {
					return Err(Error::InvalidCursor {
						message: "nextValue must be finite.".to_string(),
					});
				}

				Some(value)
			},
			None => None,
		};

		Ok(Some(Self { last_id, last_value }))
	}
}

/// What the next call needs to resume after the last returned document.
#[derive(Debug, Clone, PartialEq)]
pub struct NextCursor {
	pub cursor: String,
	pub value: Option<f64>,
}

/// How a cursor maps onto one ordered result set.
#[derive(Debug, Clone, PartialEq)]
pub struct CursorPlan {
	/// Field holding the tie-break id in the output documents.
	pub position: Path,
	pub position_direction: Direction,
	/// Primary key when it is a non-unique number (counters, similarity scores).
	pub key: Option<SortKey>,
}
impl CursorPlan {
	pub fn by_id(direction: Direction) -> Self {
		Self { position: Path::id(), position_direction: direction, key: None }
	}

	pub fn keyed(key: SortKey) -> Self {
		Self { position: Path::id(), position_direction: Direction::Desc, key: Some(key) }
	}

	/// The sort that makes this plan's bound exact: primary key first, position last.
	pub fn sort_keys(&self) -> Vec<SortKey> {
		let mut keys = Vec::with_capacity(2);

		if let Some(key) = &self.key {
			keys.push(key.clone());
		}

		keys.push(SortKey::new(self.position.clone(), self.position_direction, ValueKind::Id));

		keys
	}

	/// Predicate keeping only documents strictly after the cursor in this plan's order.
	pub fn bound(&self, cursor: Option<&Cursor>) -> Predicate {
		let Some(cursor) = cursor else {
			return Predicate::True;
		};

		self.bound_at(&self.position, cursor)
	}

	/// Same as [`CursorPlan::bound`], but reading the tie-break id from `position`. Used when the
	/// bound is applied before the id has been copied to its output field.
	pub fn bound_at(&self, position: &Path, cursor: &Cursor) -> Predicate {
		let after_id = position_bound(position, self.position_direction, cursor.last_id);

		match (&self.key, cursor.last_value) {
			(Some(key), Some(value)) => {
				let beyond = match key.direction {
					Direction::Desc => Predicate::lt(key.path.clone(), Scalar::Number(value)),
					Direction::Asc => Predicate::gt(key.path.clone(), Scalar::Number(value)),
				};
				let tied = Predicate::eq(key.path.clone(), Scalar::Number(value));

				Predicate::any([beyond, Predicate::all([tied, after_id])])
			},
			_ => after_id,
		}
	}

	/// Cursor for the page ending at `last`. An empty page yields no cursor.
	pub fn next(&self, last: Option<&Document>) -> Option<NextCursor> {
		let last = last?;
		let cursor = self.position.get(last)?.as_str()?.to_string();
		let value = self
			.key
			.as_ref()
			.and_then(|key| key.path.get(last))
			.and_then(serde_json::Value::as_f64);

		Some(NextCursor { cursor, value })
	}
}

fn position_bound(position: &Path, direction: Direction, last_id: Uuid) -> Predicate {
	match direction {
		Direction::Desc => Predicate::lt(position.clone(), Scalar::Id(last_id)),
		Direction::Asc => Predicate::gt(position.clone(), Scalar::Id(last_id)),
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;
	use uuid::Uuid;

	use crate::{
		Error,
		cursor::{Cursor, CursorPlan},
		pipeline::{Direction, Predicate, Scalar, SortKey, ValueKind},
	};

	#[test]
	fn missing_cursor_is_first_page() {
		assert_eq!(Cursor::parse(None, Some("3")).expect("parse failed"), None);
		assert_eq!(Cursor::parse(Some("  "), None).expect("parse failed"), None);
	}

	#[test]
	fn malformed_cursor_is_rejected() {
		assert!(matches!(Cursor::parse(Some("nope"), None), Err(Error::InvalidCursor { .. })));
		assert!(matches!(
			Cursor::parse(Some(&Uuid::from_u128(1).to_string()), Some("NaN")),
			Err(Error::InvalidCursor { .. })
		));
	}

	#[test]
	fn counter_bound_is_lexicographic() {
		let plan = CursorPlan::keyed(SortKey::new("likeCount", Direction::Desc, ValueKind::Number));
		let cursor = Cursor { last_id: Uuid::from_u128(5), last_value: Some(2.0) };

		assert_eq!(
			plan.bound(Some(&cursor)),
			Predicate::Or(vec![
				Predicate::lt("likeCount", Scalar::Number(2.0)),
				Predicate::And(vec![
					Predicate::eq("likeCount", Scalar::Number(2.0)),
					Predicate::lt("_id", Scalar::Id(Uuid::from_u128(5))),
				]),
			])
		);
	}

	#[test]
	fn counter_bound_without_value_falls_back_to_id() {
		let plan = CursorPlan::keyed(SortKey::new("likeCount", Direction::Desc, ValueKind::Number));
		let cursor = Cursor { last_id: Uuid::from_u128(5), last_value: None };

		assert_eq!(plan.bound(Some(&cursor)), Predicate::lt("_id", Scalar::Id(Uuid::from_u128(5))));
	}

	#[test]
	fn ascending_position_flips_bound() {
		let plan = CursorPlan::by_id(Direction::Asc);
		let cursor = Cursor { last_id: Uuid::from_u128(5), last_value: None };

		assert_eq!(plan.bound(Some(&cursor)), Predicate::gt("_id", Scalar::Id(Uuid::from_u128(5))));
	}

	#[test]
	fn next_reads_position_and_key() {
		let plan = CursorPlan::keyed(SortKey::new("likeCount", Direction::Desc, ValueKind::Number));
		let last = json!({ "_id": Uuid::from_u128(9).to_string(), "likeCount": 4 });
		let next = plan.next(last.as_object()).expect("expected a cursor");

		assert_eq!(next.cursor, Uuid::from_u128(9).to_string());
		assert_eq!(next.value, Some(4.0));
		assert_eq!(plan.next(None), None);
	}
}

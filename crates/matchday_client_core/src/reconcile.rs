#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use matchday_domain::{Entrant, MatchDelta, MatchDetail, UserId};
use tracing::debug;

/// Outcome of folding one delta into the cached entity.
///
/// `Updated` carries a fresh value; the input is never mutated, so readers
/// holding the old snapshot stay consistent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
	Updated(MatchDetail),
	/// The delta was a duplicate, referenced an unknown user, or targets
	/// another match.
	Unchanged,
	/// The match is gone; the viewer must navigate away.
	Deleted,
}

fn remove_entrant(list: &mut Vec<Entrant>, user: &UserId) -> bool {
	let before = list.len();
	list.retain(|e| &e.user != user);
	list.len() != before
}

fn push_participant(entity: &mut MatchDetail, user: &UserId, joined_at: DateTime<Utc>) {
	entity.participants.push(Entrant::new(user.clone(), joined_at));
}

/// Fold one server delta into the entity.
///
/// Every arm is idempotent under duplicate delivery and a no-op for
/// unknown user references, so replayed or cross-channel-reordered events
/// cannot corrupt the cache.
pub fn reconcile(entity: &MatchDetail, delta: &MatchDelta) -> Reconciled {
	if delta.match_id() != &entity.id {
		debug!(event = delta.event_name(), match_id = %delta.match_id(), "delta for another match ignored");
		return Reconciled::Unchanged;
	}

	match delta {
		MatchDelta::NewRequest { user, joined_at, .. } => {
			if entity.in_waiting_list(user) || entity.is_participant(user) {
				debug!(event = "new-request", user = %user, "already present; skipped");
				return Reconciled::Unchanged;
			}
			let mut next = entity.clone();
			next.waiting_list.push(Entrant::new(user.clone(), *joined_at));
			Reconciled::Updated(next)
		}

		MatchDelta::Accepted { user, joined_at, .. } => {
			let was_waiting = entity.in_waiting_list(user);
			if !was_waiting && entity.is_participant(user) {
				debug!(event = "accepted", user = %user, "already a participant; skipped");
				return Reconciled::Unchanged;
			}
			let mut next = entity.clone();
			remove_entrant(&mut next.waiting_list, user);
			if !next.is_participant(user) {
				push_participant(&mut next, user, *joined_at);
			}
			Reconciled::Updated(next)
		}

		MatchDelta::Rejected { user, .. } => {
			if !entity.in_waiting_list(user) {
				debug!(event = "rejected", user = %user, "not on waiting list; skipped");
				return Reconciled::Unchanged;
			}
			let mut next = entity.clone();
			remove_entrant(&mut next.waiting_list, user);
			Reconciled::Updated(next)
		}

		MatchDelta::AdminAdded { user, .. } => {
			if entity.admins.contains(user) {
				return Reconciled::Unchanged;
			}
			let mut next = entity.clone();
			next.admins.insert(user.clone());
			Reconciled::Updated(next)
		}

		MatchDelta::AdminRemoved { user, .. } => {
			if !entity.admins.contains(user) {
				debug!(event = "admin-removed", user = %user, "not an admin; skipped");
				return Reconciled::Unchanged;
			}
			let mut next = entity.clone();
			next.admins.remove(user);
			Reconciled::Updated(next)
		}

		MatchDelta::Expelled { user, .. } => {
			if !entity.is_participant(user) && !entity.admins.contains(user) {
				debug!(event = "expelled", user = %user, "unknown user reference; skipped");
				return Reconciled::Unchanged;
			}
			let mut next = entity.clone();
			remove_entrant(&mut next.participants, user);
			next.admins.remove(user);
			Reconciled::Updated(next)
		}

		MatchDelta::Left { user, new_creator, .. } => {
			let mut next = entity.clone();
			let mut changed = remove_entrant(&mut next.participants, user);
			changed |= next.admins.remove(user);

			if let Some(creator) = new_creator {
				if &next.creator != creator {
					next.creator = creator.clone();
					changed = true;
				}
				changed |= next.admins.insert(creator.clone());
			}

			if !changed {
				debug!(event = "left", user = %user, "unknown user reference; skipped");
				return Reconciled::Unchanged;
			}
			Reconciled::Updated(next)
		}

		MatchDelta::LinkJoined { user, joined_at, .. } => {
			if entity.is_participant(user) {
				debug!(event = "link-joined", user = %user, "already a participant; skipped");
				return Reconciled::Unchanged;
			}
			let mut next = entity.clone();
			// A link join supersedes any pending request from the same
			// user; one list at most.
			remove_entrant(&mut next.waiting_list, user);
			push_participant(&mut next, user, *joined_at);
			Reconciled::Updated(next)
		}

		MatchDelta::StatusChanged { status, .. } => {
			if entity.status == *status {
				return Reconciled::Unchanged;
			}
			let mut next = entity.clone();
			next.status = *status;
			Reconciled::Updated(next)
		}

		MatchDelta::AgreementToggled { rivalry, .. } => {
			if entity.rivalry.as_ref() == Some(rivalry) {
				return Reconciled::Unchanged;
			}
			let mut next = entity.clone();
			next.rivalry = Some(rivalry.clone());
			Reconciled::Updated(next)
		}

		MatchDelta::Deleted { .. } => Reconciled::Deleted,
	}
}

#[cfg(test)]
mod tests {
	use chrono::TimeZone;
	use matchday_domain::{MatchId, MatchStatus, RivalryAgreement, RivalryStatus};
	use proptest::prelude::*;

	use super::*;

	fn uid(s: &str) -> UserId {
		UserId::new(s).expect("valid user id")
	}

	fn mid(s: &str) -> MatchId {
		MatchId::new(s).expect("valid match id")
	}

	fn ts() -> DateTime<Utc> {
		Utc.with_ymd_and_hms(2026, 3, 14, 18, 30, 0).single().expect("valid timestamp")
	}

	fn entity() -> MatchDetail {
		MatchDetail::new(mid("m1"), uid("U1"))
	}

	fn apply(entity: &MatchDetail, delta: &MatchDelta) -> MatchDetail {
		match reconcile(entity, delta) {
			Reconciled::Updated(next) => next,
			Reconciled::Unchanged => entity.clone(),
			Reconciled::Deleted => panic!("unexpected terminal delta"),
		}
	}

	#[test]
	fn request_accept_expel_scenario() {
		let e0 = entity();

		let e1 = apply(
			&e0,
			&MatchDelta::NewRequest {
				match_id: mid("m1"),
				user: uid("U2"),
				joined_at: ts(),
			},
		);
		assert_eq!(e1.waiting_list.len(), 1);
		assert!(e1.in_waiting_list(&uid("U2")));

		let e2 = apply(
			&e1,
			&MatchDelta::Accepted {
				match_id: mid("m1"),
				user: uid("U2"),
				joined_at: ts(),
			},
		);
		assert!(e2.waiting_list.is_empty());
		assert!(e2.is_participant(&uid("U2")));

		let e3 = apply(
			&e2,
			&MatchDelta::Expelled {
				match_id: mid("m1"),
				user: uid("U2"),
			},
		);
		assert!(e3.participants.is_empty());
	}

	#[test]
	fn accepted_twice_equals_accepted_once() {
		let mut e = entity();
		e.waiting_list.push(Entrant::new(uid("U2"), ts()));

		let delta = MatchDelta::Accepted {
			match_id: mid("m1"),
			user: uid("U2"),
			joined_at: ts(),
		};

		let once = apply(&e, &delta);
		assert!(matches!(reconcile(&once, &delta), Reconciled::Unchanged));
		let twice = apply(&once, &delta);
		assert_eq!(once, twice);
	}

	#[test]
	fn accept_before_request_still_lands() {
		let e = entity();
		let accepted = apply(
			&e,
			&MatchDelta::Accepted {
				match_id: mid("m1"),
				user: uid("U2"),
				joined_at: ts(),
			},
		);
		assert!(accepted.is_participant(&uid("U2")));
		assert!(accepted.waiting_list.is_empty());

		// The late request finds the user already seated.
		assert!(matches!(
			reconcile(
				&accepted,
				&MatchDelta::NewRequest {
					match_id: mid("m1"),
					user: uid("U2"),
					joined_at: ts(),
				}
			),
			Reconciled::Unchanged
		));
	}

	#[test]
	fn expelling_an_unknown_user_is_a_noop() {
		let e = entity();
		assert!(matches!(
			reconcile(
				&e,
				&MatchDelta::Expelled {
					match_id: mid("m1"),
					user: uid("ghost"),
				}
			),
			Reconciled::Unchanged
		));
	}

	#[test]
	fn delta_for_another_match_is_ignored() {
		let e = entity();
		assert!(matches!(
			reconcile(
				&e,
				&MatchDelta::StatusChanged {
					match_id: mid("other"),
					status: MatchStatus::Cancelled,
				}
			),
			Reconciled::Unchanged
		));
		// Even a deletion of another match is not terminal here.
		assert!(matches!(
			reconcile(&e, &MatchDelta::Deleted { match_id: mid("other") }),
			Reconciled::Unchanged
		));
	}

	#[test]
	fn left_reassigns_creator_into_admin_set() {
		let mut e = entity();
		e.participants.push(Entrant::new(uid("U1"), ts()));
		e.participants.push(Entrant::new(uid("U2"), ts()));

		let next = apply(
			&e,
			&MatchDelta::Left {
				match_id: mid("m1"),
				user: uid("U1"),
				new_creator: Some(uid("U2")),
			},
		);
		assert!(!next.is_participant(&uid("U1")));
		assert_eq!(next.creator, uid("U2"));
		assert!(next.admins.contains(&uid("U2")));
		assert!(next.is_admin(&uid("U2")));
	}

	#[test]
	fn independent_field_deltas_commute() {
		let mut e = entity();
		e.waiting_list.push(Entrant::new(uid("U2"), ts()));

		let accept = MatchDelta::Accepted {
			match_id: mid("m1"),
			user: uid("U2"),
			joined_at: ts(),
		};
		let promote = MatchDelta::AdminAdded {
			match_id: mid("m1"),
			user: uid("U3"),
		};
		let toggle = MatchDelta::StatusChanged {
			match_id: mid("m1"),
			status: MatchStatus::Full,
		};

		let ab = apply(&apply(&apply(&e, &accept), &promote), &toggle);
		let ba = apply(&apply(&apply(&e, &toggle), &promote), &accept);
		assert_eq!(ab, ba);
	}

	#[test]
	fn agreement_toggle_replaces_sub_record() {
		let e = entity();
		let rivalry = RivalryAgreement {
			status: RivalryStatus::Confirmed,
			agreed: true,
			updated_at: ts(),
		};
		let next = apply(
			&e,
			&MatchDelta::AgreementToggled {
				match_id: mid("m1"),
				rivalry: rivalry.clone(),
			},
		);
		assert_eq!(next.rivalry, Some(rivalry.clone()));

		// Replaying the same toggle changes nothing.
		assert!(matches!(
			reconcile(
				&next,
				&MatchDelta::AgreementToggled {
					match_id: mid("m1"),
					rivalry,
				}
			),
			Reconciled::Unchanged
		));
	}

	fn arb_user() -> impl Strategy<Value = UserId> {
		prop_oneof![Just(uid("U1")), Just(uid("U2")), Just(uid("U3")), Just(uid("U4"))]
	}

	fn arb_delta() -> impl Strategy<Value = MatchDelta> {
		let m = mid("m1");
		prop_oneof![
			arb_user().prop_map({
				let m = m.clone();
				move |user| MatchDelta::NewRequest {
					match_id: m.clone(),
					user,
					joined_at: ts(),
				}
			}),
			arb_user().prop_map({
				let m = m.clone();
				move |user| MatchDelta::Accepted {
					match_id: m.clone(),
					user,
					joined_at: ts(),
				}
			}),
			arb_user().prop_map({
				let m = m.clone();
				move |user| MatchDelta::Rejected { match_id: m.clone(), user }
			}),
			arb_user().prop_map({
				let m = m.clone();
				move |user| MatchDelta::AdminAdded { match_id: m.clone(), user }
			}),
			arb_user().prop_map({
				let m = m.clone();
				move |user| MatchDelta::AdminRemoved { match_id: m.clone(), user }
			}),
			arb_user().prop_map({
				let m = m.clone();
				move |user| MatchDelta::Expelled { match_id: m.clone(), user }
			}),
			arb_user().prop_map({
				let m = m.clone();
				move |user| MatchDelta::Left {
					match_id: m.clone(),
					user,
					new_creator: None,
				}
			}),
			arb_user().prop_map({
				let m = m.clone();
				move |user| MatchDelta::LinkJoined {
					match_id: m.clone(),
					user,
					joined_at: ts(),
				}
			}),
		]
	}

	proptest! {
		/// Replaying any delta immediately after applying it is a no-op,
		/// and the one-list-per-user invariant survives any sequence.
		#[test]
		fn duplicate_delivery_is_idempotent(deltas in proptest::collection::vec(arb_delta(), 1..24)) {
			let mut e = entity();
			for delta in &deltas {
				let once = apply(&e, delta);
				let twice = apply(&once, delta);
				prop_assert_eq!(&once, &twice);

				for entrant in &once.participants {
					prop_assert!(!once.in_waiting_list(&entrant.user));
				}
				e = once;
			}
		}
	}
}

#![forbid(unsafe_code)]

use std::time::Duration;

use matchday_domain::{ChatMessage, MatchDelta, MatchDetail, MatchId, MessageId, UserId};
use tracing::{debug, info};

use crate::membership::{MembershipCommand, RoomMembership};
use crate::pipeline::{DayBucket, TypingTracker, group_by_day, normalize_message};
use crate::reconcile::{Reconciled, reconcile};

/// What one reconciliation pass asks the caller to do.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DetailEffect {
	/// Membership command to fire-and-forget over the chat channel.
	pub command: Option<MembershipCommand>,
	/// The match is gone; navigate away and drop the controller.
	pub closed: bool,
}

/// Controller for the one currently-viewed match.
///
/// Exclusive owner of the cached entity: every server delta funnels
/// through [`reconcile`] here, and membership is re-derived after each
/// update, so no other component needs its own change bookkeeping. Dropped
/// (after [`close`](Self::close)) when the user navigates away.
pub struct MatchDetailController {
	me: UserId,
	entity: MatchDetail,
	membership: RoomMembership,
	typing: TypingTracker,
	messages: Vec<ChatMessage>,
	closed: bool,
}

impl MatchDetailController {
	/// Open a match for viewing. The initial evaluation joins the
	/// restricted room right away when the user is already a participant.
	pub fn new(me: UserId, entity: MatchDetail, typing_timeout: Duration) -> (Self, Option<MembershipCommand>) {
		let mut membership = RoomMembership::new(entity.id.clone());
		let command = membership.evaluate(&me, &entity.participant_key());

		let controller = Self {
			me,
			entity,
			membership,
			typing: TypingTracker::new(typing_timeout),
			messages: Vec::new(),
			closed: false,
		};
		(controller, command)
	}

	pub fn entity(&self) -> &MatchDetail {
		&self.entity
	}

	pub fn messages(&self) -> &[ChatMessage] {
		&self.messages
	}

	pub fn is_closed(&self) -> bool {
		self.closed
	}

	/// Fold one server delta into the cached entity and re-derive
	/// membership.
	pub fn apply_delta(&mut self, delta: &MatchDelta) -> DetailEffect {
		if self.closed {
			return DetailEffect::default();
		}

		match reconcile(&self.entity, delta) {
			Reconciled::Updated(next) => {
				self.entity = next;
				DetailEffect {
					command: self.membership.evaluate(&self.me, &self.entity.participant_key()),
					closed: false,
				}
			}
			Reconciled::Unchanged => DetailEffect::default(),
			Reconciled::Deleted => {
				info!(match_id = %self.entity.id, "match deleted; closing");
				self.closed = true;
				DetailEffect {
					command: self.membership.teardown(),
					closed: true,
				}
			}
		}
	}

	/// Replace the entity from a REST fetch. Responses for a different
	/// match (the user already navigated on) are dropped.
	pub fn apply_fetched(&mut self, fetched: MatchDetail) -> Option<MembershipCommand> {
		if self.closed {
			return None;
		}
		if fetched.id != self.entity.id {
			debug!(fetched = %fetched.id, viewing = %self.entity.id, "stale fetch response dropped");
			return None;
		}

		self.entity = fetched;
		self.membership.evaluate(&self.me, &self.entity.participant_key())
	}

	/// Inbound chat message for this match's room.
	pub fn on_message(&mut self, room_id: &MatchId, message: &ChatMessage) {
		if self.closed || room_id != &self.entity.id {
			return;
		}
		self.typing.message_sent(&message.sender);
		self.messages.push(normalize_message(message));
	}

	pub fn on_message_seen(&mut self, room_id: &MatchId, message_id: MessageId, user: &UserId) {
		if self.closed || room_id != &self.entity.id {
			return;
		}
		if let Some(msg) = self.messages.iter_mut().find(|m| m.id == message_id) {
			msg.mark_seen(user);
		}
	}

	pub fn on_typing_started(&mut self, room_id: &MatchId, user: UserId) {
		if self.closed || room_id != &self.entity.id {
			return;
		}
		self.typing.mark_typing(user);
	}

	pub fn on_typing_stopped(&mut self, room_id: &MatchId, user: &UserId) {
		if self.closed || room_id != &self.entity.id {
			return;
		}
		self.typing.mark_stopped(user);
	}

	/// Users to render as typing, local user excluded.
	pub fn typing_snapshot(&mut self) -> Vec<UserId> {
		let me = self.me.clone();
		self.typing.snapshot(&me)
	}

	/// Messages bucketed by calendar day for display.
	pub fn day_groups(&self) -> Vec<DayBucket> {
		group_by_day(&self.messages)
	}

	/// Navigating away, or losing authentication/connectivity: one leave
	/// if joined.
	pub fn close(&mut self) -> Option<MembershipCommand> {
		self.closed = true;
		self.typing.clear();
		self.membership.teardown()
	}
}

#[cfg(test)]
mod tests {
	use chrono::{TimeZone, Utc};
	use matchday_domain::Entrant;

	use super::*;

	fn uid(s: &str) -> UserId {
		UserId::new(s).expect("valid user id")
	}

	fn mid(s: &str) -> MatchId {
		MatchId::new(s).expect("valid match id")
	}

	fn ts() -> chrono::DateTime<Utc> {
		Utc.with_ymd_and_hms(2026, 3, 14, 18, 30, 0).single().expect("valid timestamp")
	}

	fn open_as_viewer() -> MatchDetailController {
		let entity = MatchDetail::new(mid("m1"), uid("creator"));
		let (c, cmd) = MatchDetailController::new(uid("me"), entity, Duration::from_secs(6));
		assert!(cmd.is_none());
		c
	}

	fn accepted_me() -> MatchDelta {
		MatchDelta::Accepted {
			match_id: mid("m1"),
			user: uid("me"),
			joined_at: ts(),
		}
	}

	#[test]
	fn opening_as_participant_joins_immediately() {
		let mut entity = MatchDetail::new(mid("m1"), uid("creator"));
		entity.participants.push(Entrant::new(uid("me"), ts()));

		let (_c, cmd) = MatchDetailController::new(uid("me"), entity, Duration::from_secs(6));
		assert_eq!(cmd, Some(MembershipCommand::Join(mid("m1"))));
	}

	#[test]
	fn acceptance_joins_exactly_once() {
		let mut c = open_as_viewer();

		let effect = c.apply_delta(&accepted_me());
		assert_eq!(effect.command, Some(MembershipCommand::Join(mid("m1"))));
		assert!(!effect.closed);

		// An unrelated admin promotion must not re-fire anything.
		let effect = c.apply_delta(&MatchDelta::AdminAdded {
			match_id: mid("m1"),
			user: uid("other"),
		});
		assert_eq!(effect.command, None);
	}

	#[test]
	fn expulsion_leaves_exactly_once() {
		let mut c = open_as_viewer();
		assert!(c.apply_delta(&accepted_me()).command.is_some());

		let expelled = MatchDelta::Expelled {
			match_id: mid("m1"),
			user: uid("me"),
		};
		let effect = c.apply_delta(&expelled);
		assert_eq!(effect.command, Some(MembershipCommand::Leave(mid("m1"))));

		// Redelivery of the same event is silent.
		let effect = c.apply_delta(&expelled);
		assert_eq!(effect.command, None);
	}

	#[test]
	fn deletion_closes_and_leaves_if_joined() {
		let mut c = open_as_viewer();
		assert!(c.apply_delta(&accepted_me()).command.is_some());

		let effect = c.apply_delta(&MatchDelta::Deleted { match_id: mid("m1") });
		assert!(effect.closed);
		assert_eq!(effect.command, Some(MembershipCommand::Leave(mid("m1"))));
		assert!(c.is_closed());

		// Nothing moves after the terminal state.
		let effect = c.apply_delta(&accepted_me());
		assert_eq!(effect, DetailEffect::default());
	}

	#[test]
	fn stale_fetch_is_dropped() {
		let mut c = open_as_viewer();
		let stale = MatchDetail::new(mid("other"), uid("creator"));
		assert_eq!(c.apply_fetched(stale), None);
		assert_eq!(c.entity().id, mid("m1"));
	}

	#[test]
	fn refetch_with_equal_participants_is_silent() {
		let mut c = open_as_viewer();
		assert!(c.apply_delta(&accepted_me()).command.is_some());

		// A re-fetch rebuilds an equal-content entity; the sorted
		// projection keeps the membership machine quiet.
		let mut refetched = MatchDetail::new(mid("m1"), uid("creator"));
		refetched.participants.push(Entrant::new(uid("me"), ts()));
		assert_eq!(c.apply_fetched(refetched), None);
	}

	#[test]
	fn close_tears_down_membership() {
		let mut c = open_as_viewer();
		assert!(c.apply_delta(&accepted_me()).command.is_some());
		assert_eq!(c.close(), Some(MembershipCommand::Leave(mid("m1"))));
		assert_eq!(c.close(), None);
	}

	#[test]
	fn messages_for_other_rooms_are_ignored() {
		let mut c = open_as_viewer();
		let msg = ChatMessage::text(MessageId::new_v4(), uid("u2"), ts(), "elsewhere");
		c.on_message(&mid("other"), &msg);
		assert!(c.messages().is_empty());

		c.on_message(&mid("m1"), &msg);
		assert_eq!(c.messages().len(), 1);
	}

	#[test]
	fn message_ends_senders_typing_indicator() {
		let mut c = open_as_viewer();
		c.on_typing_started(&mid("m1"), uid("u2"));
		assert_eq!(c.typing_snapshot(), vec![uid("u2")]);

		let msg = ChatMessage::text(MessageId::new_v4(), uid("u2"), ts(), "done typing");
		c.on_message(&mid("m1"), &msg);
		assert!(c.typing_snapshot().is_empty());
	}

	#[test]
	fn seen_marker_updates_message() {
		let mut c = open_as_viewer();
		let mut msg = ChatMessage::text(MessageId::new_v4(), uid("u2"), ts(), "hi");
		msg.not_seen_by = vec![uid("me")];
		let id = msg.id;
		c.on_message(&mid("m1"), &msg);

		c.on_message_seen(&mid("m1"), id, &uid("me"));
		assert!(c.messages()[0].not_seen_by.is_empty());
	}
}

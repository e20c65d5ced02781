#![forbid(unsafe_code)]

use matchday_domain::{MatchId, UserId};
use tracing::debug;

use crate::transport::ClientEvent;

/// Join or leave the restricted room of one match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipCommand {
	Join(MatchId),
	Leave(MatchId),
}

impl MembershipCommand {
	/// The outbound control event for this command.
	pub fn into_client_event(self, user: &UserId) -> ClientEvent {
		match self {
			MembershipCommand::Join(room_id) => ClientEvent::JoinRealRoom {
				room_id,
				user_id: user.clone(),
			},
			MembershipCommand::Leave(room_id) => ClientEvent::LeaveRealRoom {
				room_id,
				user_id: user.clone(),
			},
		}
	}
}

/// Edge-triggered membership decision for one viewed match.
///
/// Evaluated against the sorted, deduplicated participant-id projection so
/// unrelated entity changes (messages, admin churn elsewhere) never re-fire
/// a join or leave. `last_known == None` means not yet evaluated for this
/// match.
#[derive(Debug, Clone)]
pub struct RoomMembership {
	match_id: MatchId,
	last_known: Option<bool>,
}

impl RoomMembership {
	pub fn new(match_id: MatchId) -> Self {
		Self {
			match_id,
			last_known: None,
		}
	}

	pub fn match_id(&self) -> &MatchId {
		&self.match_id
	}

	pub fn last_known(&self) -> Option<bool> {
		self.last_known
	}

	/// Re-derive membership from the participant key; emits a command only
	/// on a genuine transition.
	pub fn evaluate(&mut self, me: &UserId, participant_key: &[UserId]) -> Option<MembershipCommand> {
		let present = participant_key.contains(me);

		let command = match (self.last_known, present) {
			(None, true) | (Some(false), true) => Some(MembershipCommand::Join(self.match_id.clone())),
			(Some(true), false) => Some(MembershipCommand::Leave(self.match_id.clone())),
			_ => None,
		};

		self.last_known = Some(present);

		if command.is_none() {
			debug!(match_id = %self.match_id, present, "membership unchanged");
		}
		command
	}

	/// Leaving the page, or losing authentication/connectivity: one leave
	/// if currently joined, then back to unevaluated.
	pub fn teardown(&mut self) -> Option<MembershipCommand> {
		let command = if self.last_known == Some(true) {
			Some(MembershipCommand::Leave(self.match_id.clone()))
		} else {
			None
		};
		self.last_known = None;
		command
	}
}

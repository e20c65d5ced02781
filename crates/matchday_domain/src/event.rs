#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{MatchId, MatchStatus, RivalryAgreement, UserId};

/// One server-pushed delta against a cached match entity.
///
/// Wire form is `{"event": "<kebab-case name>", "data": {...}}`; payload
/// fields are camelCase. Every payload names the match it targets so
/// deltas for other matches can be dropped before reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum MatchDelta {
	/// A user asked to join; lands on the waiting list.
	NewRequest {
		match_id: MatchId,
		user: UserId,
		joined_at: DateTime<Utc>,
	},
	/// A waiting user was accepted into the participants.
	Accepted {
		match_id: MatchId,
		user: UserId,
		joined_at: DateTime<Utc>,
	},
	/// A waiting user was turned away.
	Rejected { match_id: MatchId, user: UserId },
	AdminAdded { match_id: MatchId, user: UserId },
	AdminRemoved { match_id: MatchId, user: UserId },
	/// A participant was removed by an admin.
	Expelled { match_id: MatchId, user: UserId },
	/// A participant left on their own; the creator role may move.
	Left {
		match_id: MatchId,
		user: UserId,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		new_creator: Option<UserId>,
	},
	/// A user joined directly through a private invite link.
	LinkJoined {
		match_id: MatchId,
		user: UserId,
		joined_at: DateTime<Utc>,
	},
	StatusChanged { match_id: MatchId, status: MatchStatus },
	AgreementToggled {
		match_id: MatchId,
		rivalry: RivalryAgreement,
	},
	/// The match is gone; the viewer must navigate away.
	Deleted { match_id: MatchId },
}

impl MatchDelta {
	/// The match this delta targets.
	pub fn match_id(&self) -> &MatchId {
		match self {
			MatchDelta::NewRequest { match_id, .. }
			| MatchDelta::Accepted { match_id, .. }
			| MatchDelta::Rejected { match_id, .. }
			| MatchDelta::AdminAdded { match_id, .. }
			| MatchDelta::AdminRemoved { match_id, .. }
			| MatchDelta::Expelled { match_id, .. }
			| MatchDelta::Left { match_id, .. }
			| MatchDelta::LinkJoined { match_id, .. }
			| MatchDelta::StatusChanged { match_id, .. }
			| MatchDelta::AgreementToggled { match_id, .. }
			| MatchDelta::Deleted { match_id } => match_id,
		}
	}

	/// Stable event name as it appears on the wire.
	pub const fn event_name(&self) -> &'static str {
		match self {
			MatchDelta::NewRequest { .. } => "new-request",
			MatchDelta::Accepted { .. } => "accepted",
			MatchDelta::Rejected { .. } => "rejected",
			MatchDelta::AdminAdded { .. } => "admin-added",
			MatchDelta::AdminRemoved { .. } => "admin-removed",
			MatchDelta::Expelled { .. } => "expelled",
			MatchDelta::Left { .. } => "left",
			MatchDelta::LinkJoined { .. } => "link-joined",
			MatchDelta::StatusChanged { .. } => "status-changed",
			MatchDelta::AgreementToggled { .. } => "agreement-toggled",
			MatchDelta::Deleted { .. } => "deleted",
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn uid(s: &str) -> UserId {
		UserId::new(s).expect("valid user id")
	}

	fn mid(s: &str) -> MatchId {
		MatchId::new(s).expect("valid match id")
	}

	#[test]
	fn delta_wire_shape() {
		let delta = MatchDelta::Rejected {
			match_id: mid("m1"),
			user: uid("u2"),
		};
		let json = serde_json::to_value(&delta).expect("serialize");
		assert_eq!(json["event"], "rejected");
		assert_eq!(json["data"]["matchId"], "m1");
		assert_eq!(json["data"]["user"], "u2");
	}

	#[test]
	fn left_with_new_creator_roundtrip() {
		let raw = r#"{"event":"left","data":{"matchId":"m1","user":"u1","newCreator":"u2"}}"#;
		let delta: MatchDelta = serde_json::from_str(raw).expect("deserialize");
		match &delta {
			MatchDelta::Left { new_creator, .. } => {
				assert_eq!(new_creator.as_ref().map(|u| u.as_str()), Some("u2"));
			}
			other => panic!("expected Left, got: {other:?}"),
		}
		assert_eq!(delta.event_name(), "left");
	}

	#[test]
	fn left_without_new_creator_parses() {
		let raw = r#"{"event":"left","data":{"matchId":"m1","user":"u1"}}"#;
		let delta: MatchDelta = serde_json::from_str(raw).expect("deserialize");
		assert!(matches!(delta, MatchDelta::Left { new_creator: None, .. }));
	}
}

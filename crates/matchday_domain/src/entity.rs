#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{MatchId, MatchStatus, UserId};

/// One participant or waiting-list entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entrant {
	pub user: UserId,
	pub joined_at: DateTime<Utc>,
}

impl Entrant {
	pub fn new(user: UserId, joined_at: DateTime<Utc>) -> Self {
		Self { user, joined_at }
	}
}

/// State of a rivalry agreement between two sides of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RivalryStatus {
	Proposed,
	Confirmed,
	Cancelled,
}

/// Rivalry-agreement sub-record of a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RivalryAgreement {
	pub status: RivalryStatus,
	pub agreed: bool,
	pub updated_at: DateTime<Utc>,
}

/// The cached match entity for one viewed match.
///
/// Invariants: a user id appears in at most one of
/// `participants`/`waiting_list`; the creator is an admin whether or not it
/// is present in `admins`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchDetail {
	pub id: MatchId,
	pub creator: UserId,
	pub participants: Vec<Entrant>,
	pub waiting_list: Vec<Entrant>,
	pub admins: BTreeSet<UserId>,
	pub status: MatchStatus,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub rivalry: Option<RivalryAgreement>,
}

impl MatchDetail {
	/// A fresh entity with no entrants beyond the creator's implicit role.
	pub fn new(id: MatchId, creator: UserId) -> Self {
		Self {
			id,
			creator,
			participants: Vec::new(),
			waiting_list: Vec::new(),
			admins: BTreeSet::new(),
			status: MatchStatus::Open,
			rivalry: None,
		}
	}

	pub fn is_participant(&self, user: &UserId) -> bool {
		self.participants.iter().any(|e| &e.user == user)
	}

	pub fn in_waiting_list(&self, user: &UserId) -> bool {
		self.waiting_list.iter().any(|e| &e.user == user)
	}

	/// The creator is always an admin, even when absent from the admin set.
	pub fn is_admin(&self, user: &UserId) -> bool {
		user == &self.creator || self.admins.contains(user)
	}

	/// Sorted, deduplicated participant-id projection.
	///
	/// Insensitive to append order and to re-fetches that rebuild
	/// equal-content lists, so equality on the key means the membership
	/// question has the same answer.
	pub fn participant_key(&self) -> Vec<UserId> {
		let mut ids: Vec<UserId> = self.participants.iter().map(|e| e.user.clone()).collect();
		ids.sort();
		ids.dedup();
		ids
	}
}

#![forbid(unsafe_code)]

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod entity;
mod event;
mod message;

pub use entity::{Entrant, MatchDetail, RivalryAgreement, RivalryStatus};
pub use event::MatchDelta;
pub use message::{AttachmentBundle, AttachmentItem, AttachmentRef, ChatMessage, MessageBody};

/// Errors for parsing identifiers from strings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseIdError {
	#[error("empty value")]
	Empty,
	#[error("unknown status: {0}")]
	UnknownStatus(String),
	#[error("invalid format: {0}")]
	InvalidFormat(String),
}

/// Opaque identifier of an authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
	/// Create a non-empty `UserId`.
	pub fn new(id: impl Into<String>) -> Result<Self, ParseIdError> {
		let id = id.into();
		if id.trim().is_empty() {
			return Err(ParseIdError::Empty);
		}
		Ok(Self(id))
	}
	pub fn as_str(&self) -> &str {
		&self.0
	}
	pub fn into_string(self) -> String {
		self.0
	}
}

impl fmt::Display for UserId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl FromStr for UserId {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		UserId::new(s.to_string())
	}
}

/// Opaque identifier of a match advert.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchId(String);

impl MatchId {
	/// Create a non-empty `MatchId`.
	pub fn new(id: impl Into<String>) -> Result<Self, ParseIdError> {
		let id = id.into();
		if id.trim().is_empty() {
			return Err(ParseIdError::Empty);
		}
		Ok(Self(id))
	}
	pub fn as_str(&self) -> &str {
		&self.0
	}
	pub fn into_string(self) -> String {
		self.0
	}
}

impl fmt::Display for MatchId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl FromStr for MatchId {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		MatchId::new(s.to_string())
	}
}

/// Server-assigned chat message identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub uuid::Uuid);

impl MessageId {
	/// Create a new random message id.
	pub fn new_v4() -> Self {
		Self(uuid::Uuid::new_v4())
	}
}

impl fmt::Display for MessageId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Lifecycle status of a match advert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
	Open,
	Active,
	Full,
	Cancelled,
	Expired,
	Completed,
}

impl MatchStatus {
	/// Stable string identifier.
	pub const fn as_str(self) -> &'static str {
		match self {
			MatchStatus::Open => "open",
			MatchStatus::Active => "active",
			MatchStatus::Full => "full",
			MatchStatus::Cancelled => "cancelled",
			MatchStatus::Expired => "expired",
			MatchStatus::Completed => "completed",
		}
	}
}

impl fmt::Display for MatchStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for MatchStatus {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();
		if s.is_empty() {
			return Err(ParseIdError::Empty);
		}

		match s.to_ascii_lowercase().as_str() {
			"open" => Ok(MatchStatus::Open),
			"active" => Ok(MatchStatus::Active),
			"full" => Ok(MatchStatus::Full),
			"cancelled" | "canceled" => Ok(MatchStatus::Cancelled),
			"expired" => Ok(MatchStatus::Expired),
			"completed" => Ok(MatchStatus::Completed),
			other => Err(ParseIdError::UnknownStatus(other.to_string())),
		}
	}
}

/// A server-side broadcast room scoped to one match.
///
/// Every match has two rooms: the general notification room any viewer may
/// join, and the restricted ("real") room reserved for confirmed
/// participants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoomTopic {
	Match(MatchId),
	Real(MatchId),
}

impl RoomTopic {
	/// Prefix for general match rooms.
	pub const MATCH_PREFIX: &'static str = "match:";
	/// Prefix for restricted participant rooms.
	pub const REAL_PREFIX: &'static str = "real:";

	/// The match this room belongs to.
	pub fn match_id(&self) -> &MatchId {
		match self {
			RoomTopic::Match(id) | RoomTopic::Real(id) => id,
		}
	}

	/// Format a room topic (e.g. `match:m42` or `real:m42`).
	pub fn format(&self) -> String {
		match self {
			RoomTopic::Match(id) => format!("{}{}", Self::MATCH_PREFIX, id.as_str()),
			RoomTopic::Real(id) => format!("{}{}", Self::REAL_PREFIX, id.as_str()),
		}
	}

	/// Parse a room topic of the form `match:<id>` or `real:<id>`.
	pub fn parse(s: &str) -> Result<Self, ParseIdError> {
		let s = s.trim();
		if s.is_empty() {
			return Err(ParseIdError::Empty);
		}

		if let Some(rest) = s.strip_prefix(Self::MATCH_PREFIX) {
			return Ok(RoomTopic::Match(MatchId::new(rest.to_string())?));
		}
		if let Some(rest) = s.strip_prefix(Self::REAL_PREFIX) {
			return Ok(RoomTopic::Real(MatchId::new(rest.to_string())?));
		}

		Err(ParseIdError::InvalidFormat("expected match:<id> or real:<id>".into()))
	}
}

impl fmt::Display for RoomTopic {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.format())
	}
}

impl FromStr for RoomTopic {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		RoomTopic::parse(s)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn status_parse_and_display() {
		assert_eq!("open".parse::<MatchStatus>().unwrap(), MatchStatus::Open);
		assert_eq!("Canceled".parse::<MatchStatus>().unwrap(), MatchStatus::Cancelled);
		assert_eq!(MatchStatus::Full.to_string(), "full");
		assert!("pending".parse::<MatchStatus>().is_err());
	}

	#[test]
	fn room_topic_parse_roundtrip() {
		let topic = RoomTopic::parse("match:m42").unwrap();
		assert_eq!(topic.match_id().as_str(), "m42");
		assert_eq!(topic.format(), "match:m42");

		let real = RoomTopic::parse("real:m42").unwrap();
		assert!(matches!(real, RoomTopic::Real(_)));
		assert_eq!(real.format(), "real:m42");
	}

	#[test]
	fn rejects_empty_ids() {
		assert!(UserId::new("").is_err());
		assert!(MatchId::new("   ").is_err());
		assert!("".parse::<RoomTopic>().is_err());
		assert!(RoomTopic::parse("lobby:m42").is_err());
	}
}

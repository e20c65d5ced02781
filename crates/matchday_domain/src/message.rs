#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{MessageId, UserId};

/// A raw attachment item as received, before normalization.
///
/// Either `url` already points at displayable content, or `content` holds
/// base64 payload bytes that still need to be wrapped into a data
/// reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentItem {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub content: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub mime_type: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
}

/// A displayable attachment reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRef {
	pub url: String,
	pub mime_type: String,
	pub name: String,
}

/// Attachments travelling with one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentBundle {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub caption: Option<String>,
	pub items: Vec<AttachmentItem>,
}

/// Message content: plain text or an attachment bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageBody {
	Text(String),
	Attachments(AttachmentBundle),
}

/// One chat message.
///
/// Never mutated after creation except for the seen marker: `mark_seen`
/// removes a reader from `not_seen_by`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
	pub id: MessageId,
	pub sender: UserId,
	pub sent_at: DateTime<Utc>,
	pub body: MessageBody,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub not_seen_by: Vec<UserId>,
}

impl ChatMessage {
	pub fn text(id: MessageId, sender: UserId, sent_at: DateTime<Utc>, text: impl Into<String>) -> Self {
		Self {
			id,
			sender,
			sent_at,
			body: MessageBody::Text(text.into()),
			not_seen_by: Vec::new(),
		}
	}

	/// Record that `user` has seen this message. Idempotent.
	pub fn mark_seen(&mut self, user: &UserId) {
		self.not_seen_by.retain(|u| u != user);
	}
}

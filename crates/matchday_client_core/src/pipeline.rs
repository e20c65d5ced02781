#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::time::Duration;

use chrono::NaiveDate;
use matchday_domain::{AttachmentBundle, AttachmentItem, AttachmentRef, ChatMessage, MessageBody, UserId};
use tokio::time::Instant;

/// MIME type used when an attachment declares none.
pub const FALLBACK_MIME: &str = "application/octet-stream";
/// Display name used when an attachment declares none.
pub const FALLBACK_NAME: &str = "attachment";

fn is_displayable_reference(s: &str) -> bool {
	s.starts_with("data:") || s.starts_with("http://") || s.starts_with("https://")
}

/// Turn one raw attachment item into a displayable reference.
///
/// Content that is already a fully-qualified reference passes through;
/// raw base64 content is wrapped into a data reference with the declared
/// (or fallback) MIME type. Idempotent: normalizing a normalized item
/// yields the same reference.
pub fn normalize_attachment(item: &AttachmentItem) -> AttachmentRef {
	let mime_type = item.mime_type.clone().unwrap_or_else(|| FALLBACK_MIME.to_string());
	let name = item.name.clone().unwrap_or_else(|| FALLBACK_NAME.to_string());

	let url = if let Some(url) = &item.url {
		url.clone()
	} else {
		match &item.content {
			Some(content) if is_displayable_reference(content) => content.clone(),
			Some(content) => format!("data:{mime_type};base64,{content}"),
			None => format!("data:{mime_type};base64,"),
		}
	};

	AttachmentRef { url, mime_type, name }
}

fn normalized_item(item: &AttachmentItem) -> AttachmentItem {
	let r = normalize_attachment(item);
	AttachmentItem {
		content: None,
		url: Some(r.url),
		mime_type: Some(r.mime_type),
		name: Some(r.name),
	}
}

/// Normalize every attachment of an inbound message. Text messages pass
/// through untouched.
pub fn normalize_message(msg: &ChatMessage) -> ChatMessage {
	match &msg.body {
		MessageBody::Text(_) => msg.clone(),
		MessageBody::Attachments(bundle) => {
			let mut next = msg.clone();
			next.body = MessageBody::Attachments(AttachmentBundle {
				caption: bundle.caption.clone(),
				items: bundle.items.iter().map(normalized_item).collect(),
			});
			next
		}
	}
}

/// Messages of one calendar day, in receipt order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayBucket {
	pub day: NaiveDate,
	pub messages: Vec<ChatMessage>,
}

/// Bucket messages by calendar day, preserving the given order.
///
/// A pure projection: the input list is the source of truth and is never
/// reordered.
pub fn group_by_day(messages: &[ChatMessage]) -> Vec<DayBucket> {
	let mut buckets: Vec<DayBucket> = Vec::new();

	for msg in messages {
		let day = msg.sent_at.date_naive();
		match buckets.last_mut() {
			Some(bucket) if bucket.day == day => bucket.messages.push(msg.clone()),
			_ => buckets.push(DayBucket {
				day,
				messages: vec![msg.clone()],
			}),
		}
	}

	buckets
}

/// Currently-typing set for one room.
///
/// Entries are added on a typing signal and removed on a stop signal or a
/// message from that user. A sender that vanishes mid-type would leave a
/// stale indicator forever, so entries also expire after an inactivity
/// window, evaluated at snapshot time. Nothing here survives a reconnect.
#[derive(Debug)]
pub struct TypingTracker {
	timeout: Duration,
	entries: HashMap<UserId, Instant>,
}

impl TypingTracker {
	pub fn new(timeout: Duration) -> Self {
		Self {
			timeout,
			entries: HashMap::new(),
		}
	}

	pub fn mark_typing(&mut self, user: UserId) {
		self.entries.insert(user, Instant::now());
	}

	pub fn mark_stopped(&mut self, user: &UserId) {
		self.entries.remove(user);
	}

	/// A message from a user ends their typing indicator.
	pub fn message_sent(&mut self, user: &UserId) {
		self.entries.remove(user);
	}

	/// Users to render as typing: expired entries pruned, the local user
	/// excluded, sorted for stable display.
	pub fn snapshot(&mut self, me: &UserId) -> Vec<UserId> {
		let now = Instant::now();
		self.entries.retain(|_, at| now.duration_since(*at) < self.timeout);

		let mut users: Vec<UserId> = self.entries.keys().filter(|u| *u != me).cloned().collect();
		users.sort();
		users
	}

	pub fn clear(&mut self) {
		self.entries.clear();
	}
}

#[cfg(test)]
mod tests {
	use chrono::{TimeZone, Utc};
	use matchday_domain::MessageId;

	use super::*;

	fn uid(s: &str) -> UserId {
		UserId::new(s).expect("valid user id")
	}

	fn text_at(y: i32, mo: u32, d: u32, h: u32, text: &str) -> ChatMessage {
		let at = Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).single().expect("valid timestamp");
		ChatMessage::text(MessageId::new_v4(), uid("u1"), at, text)
	}

	fn attachment_message(items: Vec<AttachmentItem>) -> ChatMessage {
		let at = Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).single().expect("valid timestamp");
		ChatMessage {
			id: MessageId::new_v4(),
			sender: uid("u1"),
			sent_at: at,
			body: MessageBody::Attachments(AttachmentBundle { caption: None, items }),
			not_seen_by: Vec::new(),
		}
	}

	#[test]
	fn raw_content_becomes_a_data_reference() {
		let item = AttachmentItem {
			content: Some("aGVsbG8=".to_string()),
			url: None,
			mime_type: Some("image/png".to_string()),
			name: None,
		};
		let r = normalize_attachment(&item);
		assert_eq!(r.url, "data:image/png;base64,aGVsbG8=");
		assert_eq!(r.mime_type, "image/png");
		assert_eq!(r.name, FALLBACK_NAME);
	}

	#[test]
	fn qualified_content_passes_through() {
		let item = AttachmentItem {
			content: Some("data:image/gif;base64,R0lGOD=".to_string()),
			url: None,
			mime_type: None,
			name: Some("kickoff.gif".to_string()),
		};
		let r = normalize_attachment(&item);
		assert_eq!(r.url, "data:image/gif;base64,R0lGOD=");
		assert_eq!(r.mime_type, FALLBACK_MIME);
		assert_eq!(r.name, "kickoff.gif");
	}

	#[test]
	fn missing_mime_and_name_get_fallbacks() {
		let item = AttachmentItem {
			content: Some("Zm9v".to_string()),
			url: None,
			mime_type: None,
			name: None,
		};
		let r = normalize_attachment(&item);
		assert_eq!(r.url, format!("data:{FALLBACK_MIME};base64,Zm9v"));
		assert_eq!(r.name, FALLBACK_NAME);
	}

	#[test]
	fn normalization_is_idempotent() {
		let msg = attachment_message(vec![
			AttachmentItem {
				content: Some("aGVsbG8=".to_string()),
				url: None,
				mime_type: None,
				name: None,
			},
			AttachmentItem {
				content: None,
				url: Some("https://cdn.example.com/pitch.jpg".to_string()),
				mime_type: Some("image/jpeg".to_string()),
				name: Some("pitch.jpg".to_string()),
			},
		]);

		let once = normalize_message(&msg);
		let twice = normalize_message(&once);
		assert_eq!(once, twice);
	}

	#[test]
	fn groups_by_calendar_day_in_order() {
		let messages = vec![
			text_at(2026, 3, 13, 22, "late one"),
			text_at(2026, 3, 13, 23, "late two"),
			text_at(2026, 3, 14, 9, "morning"),
			text_at(2026, 3, 14, 10, "warmup"),
			text_at(2026, 3, 15, 8, "matchday"),
		];

		let buckets = group_by_day(&messages);
		assert_eq!(buckets.len(), 3);
		assert_eq!(buckets[0].messages.len(), 2);
		assert_eq!(buckets[1].messages.len(), 2);
		assert_eq!(buckets[2].messages.len(), 1);
		assert!(buckets[0].day < buckets[1].day);
	}

	#[test]
	fn empty_message_list_has_no_buckets() {
		assert!(group_by_day(&[]).is_empty());
	}

	#[tokio::test(start_paused = true)]
	async fn typing_snapshot_excludes_self_and_stopped() {
		let mut t = TypingTracker::new(Duration::from_secs(6));
		t.mark_typing(uid("me"));
		t.mark_typing(uid("u2"));
		t.mark_typing(uid("u3"));

		assert_eq!(t.snapshot(&uid("me")), vec![uid("u2"), uid("u3")]);

		t.mark_stopped(&uid("u2"));
		assert_eq!(t.snapshot(&uid("me")), vec![uid("u3")]);

		t.message_sent(&uid("u3"));
		assert!(t.snapshot(&uid("me")).is_empty());
	}

	#[tokio::test(start_paused = true)]
	async fn typing_entries_expire_after_inactivity() {
		let mut t = TypingTracker::new(Duration::from_secs(6));
		t.mark_typing(uid("u2"));

		tokio::time::advance(Duration::from_secs(3)).await;
		assert_eq!(t.snapshot(&uid("me")), vec![uid("u2")]);

		// A fresh signal extends the window.
		t.mark_typing(uid("u2"));
		tokio::time::advance(Duration::from_secs(5)).await;
		assert_eq!(t.snapshot(&uid("me")), vec![uid("u2")]);

		tokio::time::advance(Duration::from_secs(2)).await;
		assert!(t.snapshot(&uid("me")).is_empty());
	}
}

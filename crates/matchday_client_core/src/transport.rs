#![forbid(unsafe_code)]

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use matchday_domain::{ChatMessage, MatchDelta, MatchId, MessageId, UserId};
use matchday_util::endpoint::WsEndpoint;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

/// The three persistent event channels, one identity each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
	Presence,
	Notifications,
	Chat,
}

impl ChannelKind {
	pub const ALL: [ChannelKind; 3] = [ChannelKind::Presence, ChannelKind::Notifications, ChannelKind::Chat];

	/// Path namespace the channel hangs off the event endpoint.
	pub const fn namespace(self) -> &'static str {
		match self {
			ChannelKind::Presence => "presence",
			ChannelKind::Notifications => "notify",
			ChannelKind::Chat => "chat",
		}
	}
}

impl core::fmt::Display for ChannelKind {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.write_str(self.namespace())
	}
}

/// Transport-level failures. Retried per policy, never surfaced as user
/// errors.
#[derive(Debug, Error, Clone)]
pub enum TransportError {
	#[error("endpoint: {0}")]
	Endpoint(String),
	#[error("connect: {0}")]
	Connect(String),
	#[error("handshake: {0}")]
	Handshake(String),
	#[error("io: {0}")]
	Io(String),
	#[error("encode: {0}")]
	Encode(String),
	#[error("channel closed")]
	Closed,
}

/// Outbound control events. `{"event": ..., "data": {...}}` text frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
	/// Handshake frame carrying the identity; first frame on every channel.
	Hello { user_id: UserId },
	JoinRoom { room_id: MatchId, user_id: UserId },
	LeaveRoom { room_id: MatchId, user_id: UserId },
	JoinRealRoom { room_id: MatchId, user_id: UserId },
	LeaveRealRoom { room_id: MatchId, user_id: UserId },
	TypingStart { room_id: MatchId, user_id: UserId },
	TypingStop { room_id: MatchId, user_id: UserId },
}

/// Inbound events that are not match deltas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ChannelEvent {
	/// Full roster of online user ids; replaces, never diffs.
	RosterSnapshot(Vec<UserId>),
	NewMessage { room_id: MatchId, message: ChatMessage },
	TypingStart { room_id: MatchId, user_id: UserId },
	TypingStop { room_id: MatchId, user_id: UserId },
	MessageSeen {
		room_id: MatchId,
		message_id: MessageId,
		user_id: UserId,
	},
}

/// Any inbound event: a match delta or a channel event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerEvent {
	Delta(MatchDelta),
	Channel(ChannelEvent),
}

pub type BoxedChannelSender = Box<dyn ChannelSender>;
pub type BoxedChannelEvents = Box<dyn ChannelEvents>;

/// Write half of one connected channel.
pub trait ChannelSender: Send {
	fn send<'a>(
		&'a mut self,
		event: &'a ClientEvent,
	) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + 'a>>;

	/// Best-effort close; errors are swallowed.
	fn close<'a>(&'a mut self) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}

/// Read half of one connected channel.
pub trait ChannelEvents: Send {
	/// Deliver inbound events to `on_event` until the stream ends.
	///
	/// `Ok(())` means the remote closed the stream; `Err` is a transport
	/// failure. Frames that do not decode are skipped, not fatal.
	fn run_events_loop<'a>(
		&'a mut self,
		on_event: Box<dyn FnMut(ServerEvent) + Send + 'a>,
	) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + 'a>>;
}

/// Dials one channel for one identity.
pub trait Connector: Send + Sync {
	fn connect<'a>(
		&'a self,
		kind: ChannelKind,
		identity: &'a UserId,
	) -> Pin<Box<dyn Future<Output = Result<(BoxedChannelSender, BoxedChannelEvents), TransportError>> + Send + 'a>>;
}

/// Production connector: WebSocket per channel, JSON text frames, `hello`
/// handshake, the whole dial bounded by `handshake_timeout`.
#[derive(Debug, Clone)]
pub struct WsConnector {
	endpoint: WsEndpoint,
	handshake_timeout: Duration,
}

impl WsConnector {
	pub fn new(endpoint: WsEndpoint, handshake_timeout: Duration) -> Self {
		Self {
			endpoint,
			handshake_timeout,
		}
	}
}

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

struct WsSender {
	sink: WsSink,
}

struct WsEvents {
	kind: ChannelKind,
	source: WsSource,
}

fn encode_event(event: &ClientEvent) -> Result<Message, TransportError> {
	let text = serde_json::to_string(event).map_err(|e| TransportError::Encode(e.to_string()))?;
	Ok(Message::text(text))
}

impl Connector for WsConnector {
	fn connect<'a>(
		&'a self,
		kind: ChannelKind,
		identity: &'a UserId,
	) -> Pin<Box<dyn Future<Output = Result<(BoxedChannelSender, BoxedChannelEvents), TransportError>> + Send + 'a>> {
		Box::pin(async move {
			let url = self.endpoint.channel_url(kind.namespace());

			let dial = async {
				let (ws, _response) = connect_async(url.as_str())
					.await
					.map_err(|e| TransportError::Connect(format!("{url}: {e}")))?;

				let (mut sink, source) = ws.split();

				let hello = ClientEvent::Hello {
					user_id: identity.clone(),
				};
				sink.send(encode_event(&hello)?)
					.await
					.map_err(|e| TransportError::Handshake(e.to_string()))?;

				Ok::<_, TransportError>((sink, source))
			};

			let (sink, source) = tokio::time::timeout(self.handshake_timeout, dial)
				.await
				.map_err(|_| TransportError::Handshake(format!("{url}: timed out")))??;

			debug!(channel = %kind, %url, "channel connected");

			Ok((
				Box::new(WsSender { sink }) as BoxedChannelSender,
				Box::new(WsEvents { kind, source }) as BoxedChannelEvents,
			))
		})
	}
}

impl ChannelSender for WsSender {
	fn send<'a>(
		&'a mut self,
		event: &'a ClientEvent,
	) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + 'a>> {
		Box::pin(async move {
			let frame = encode_event(event)?;
			self.sink.send(frame).await.map_err(|e| TransportError::Io(e.to_string()))
		})
	}

	fn close<'a>(&'a mut self) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
		Box::pin(async move {
			let _ = self.sink.send(Message::Close(None)).await;
			let _ = self.sink.close().await;
		})
	}
}

impl ChannelEvents for WsEvents {
	fn run_events_loop<'a>(
		&'a mut self,
		mut on_event: Box<dyn FnMut(ServerEvent) + Send + 'a>,
	) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + 'a>> {
		Box::pin(async move {
			while let Some(frame) = self.source.next().await {
				match frame {
					Ok(Message::Text(text)) => match serde_json::from_str::<ServerEvent>(&text) {
						Ok(ev) => on_event(ev),
						Err(e) => {
							debug!(channel = %self.kind, error = %e, "skipping undecodable frame");
						}
					},
					Ok(Message::Close(_)) => return Ok(()),
					// Pings are answered by the websocket layer on the
					// next write; binary frames are not part of the
					// protocol.
					Ok(_) => {}
					Err(e) => return Err(TransportError::Io(e.to_string())),
				}
			}
			Ok(())
		})
	}
}

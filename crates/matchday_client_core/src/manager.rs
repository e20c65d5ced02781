#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use matchday_domain::{ChatMessage, MatchDelta, MatchId, MessageId, UserId};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::SyncConfigV1;
use crate::backoff::{BackoffPolicy, jittered};
use crate::transport::{
	BoxedChannelEvents, BoxedChannelSender, ChannelEvent, ChannelKind, ClientEvent, Connector, ServerEvent,
};

/// Events emitted by the engine toward the application layer.
#[derive(Debug, Clone)]
pub enum EngineEvent {
	ChannelUp {
		channel: ChannelKind,
	},
	ChannelDown {
		channel: ChannelKind,
		reason: String,
	},
	Reconnecting {
		channel: ChannelKind,
		attempt: u32,
		next_retry_in_ms: u64,
	},
	/// The retry budget is spent; the channel stays down until the next
	/// explicit connect or resume check.
	GaveUp {
		channel: ChannelKind,
	},
	/// Identity was cleared; cached presence must be dropped.
	IdentityCleared,
	Roster(Vec<UserId>),
	Delta(MatchDelta),
	Message {
		room_id: MatchId,
		message: ChatMessage,
	},
	TypingStarted {
		room_id: MatchId,
		user: UserId,
	},
	TypingStopped {
		room_id: MatchId,
		user: UserId,
	},
	MessageSeen {
		room_id: MatchId,
		message_id: MessageId,
		user: UserId,
	},
}

#[derive(Debug)]
enum ChannelCommand {
	Connect,
	Disconnect { reason: String },
	Emit { event: ClientEvent },
	SetIdentity { identity: Option<UserId> },
	SetParticipation { rooms: Vec<MatchId> },
}

/// Handle to the three channel tasks.
#[derive(Clone)]
pub struct ConnectionManager {
	presence_tx: mpsc::Sender<ChannelCommand>,
	notify_tx: mpsc::Sender<ChannelCommand>,
	chat_tx: mpsc::Sender<ChannelCommand>,
	event_tx: mpsc::UnboundedSender<EngineEvent>,
}

impl ConnectionManager {
	fn tx(&self, kind: ChannelKind) -> &mpsc::Sender<ChannelCommand> {
		match kind {
			ChannelKind::Presence => &self.presence_tx,
			ChannelKind::Notifications => &self.notify_tx,
			ChannelKind::Chat => &self.chat_tx,
		}
	}

	async fn send(&self, kind: ChannelKind, cmd: ChannelCommand) -> Result<(), String> {
		self.tx(kind)
			.send(cmd)
			.await
			.map_err(|_| "engine task is not running".to_string())
	}

	/// Connect one channel. No-op when it is already connected.
	pub async fn connect(&self, kind: ChannelKind) -> Result<(), String> {
		self.send(kind, ChannelCommand::Connect).await
	}

	pub async fn connect_all(&self) -> Result<(), String> {
		for kind in ChannelKind::ALL {
			self.connect(kind).await?;
		}
		Ok(())
	}

	pub async fn disconnect(&self, kind: ChannelKind, reason: impl Into<String>) -> Result<(), String> {
		self.send(kind, ChannelCommand::Disconnect { reason: reason.into() }).await
	}

	pub async fn disconnect_all(&self, reason: impl Into<String>) -> Result<(), String> {
		let reason = reason.into();
		for kind in ChannelKind::ALL {
			self.disconnect(kind, reason.clone()).await?;
		}
		Ok(())
	}

	/// Fire-and-forget emit. Dropped with a debug log when the channel is
	/// not connected; the resync step on reconnect is the recovery path.
	pub async fn emit(&self, kind: ChannelKind, event: ClientEvent) -> Result<(), String> {
		self.send(kind, ChannelCommand::Emit { event }).await
	}

	/// Set or clear the identity on all channels. Clearing disconnects
	/// every channel and invalidates cached presence.
	pub async fn set_identity(&self, identity: Option<UserId>) -> Result<(), String> {
		let cleared = identity.is_none();
		for kind in ChannelKind::ALL {
			self.send(
				kind,
				ChannelCommand::SetIdentity {
					identity: identity.clone(),
				},
			)
			.await?;
		}
		if cleared {
			let _ = self.event_tx.send(EngineEvent::IdentityCleared);
		}
		Ok(())
	}

	/// Snapshot of the matches the user participates in; re-joined on
	/// every successful chat connect.
	pub async fn set_participation(&self, rooms: Vec<MatchId>) -> Result<(), String> {
		self.send(ChannelKind::Chat, ChannelCommand::SetParticipation { rooms }).await
	}

	/// Foreground/visibility hook: re-dial whatever is down. Connect is
	/// idempotent, so live channels are untouched.
	pub async fn resume_check(&self) -> Result<(), String> {
		self.connect_all().await
	}
}

/// Teardown handle for the three channel tasks.
pub struct ShutdownHandle {
	shutdown_txs: Vec<oneshot::Sender<()>>,
	join_handles: Vec<tokio::task::JoinHandle<()>>,
}

impl ShutdownHandle {
	/// Best-effort disconnect of all channels, then wait for the tasks.
	pub async fn shutdown(self) {
		for tx in self.shutdown_txs {
			let _ = tx.send(());
		}
		for handle in self.join_handles {
			let _ = handle.await;
		}
	}
}

/// Spawn the three channel tasks and return the handles.
pub fn start_engine(
	cfg: &SyncConfigV1,
	connector: Arc<dyn Connector>,
) -> (ConnectionManager, mpsc::UnboundedReceiver<EngineEvent>, ShutdownHandle) {
	let (event_tx, event_rx) = mpsc::unbounded_channel::<EngineEvent>();

	let mut shutdown_txs = Vec::with_capacity(ChannelKind::ALL.len());
	let mut join_handles = Vec::with_capacity(ChannelKind::ALL.len());
	let mut cmd_txs = Vec::with_capacity(ChannelKind::ALL.len());

	for kind in ChannelKind::ALL {
		let (cmd_tx, cmd_rx) = mpsc::channel::<ChannelCommand>(128);
		let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

		join_handles.push(tokio::spawn(run_channel_task(
			kind,
			cfg.backoff,
			cfg.remote_close_retry_delay,
			Arc::clone(&connector),
			cmd_rx,
			event_tx.clone(),
			shutdown_rx,
		)));
		shutdown_txs.push(shutdown_tx);
		cmd_txs.push(cmd_tx);
	}

	let chat_tx = cmd_txs.pop().expect("three channel tasks");
	let notify_tx = cmd_txs.pop().expect("three channel tasks");
	let presence_tx = cmd_txs.pop().expect("three channel tasks");

	let manager = ConnectionManager {
		presence_tx,
		notify_tx,
		chat_tx,
		event_tx,
	};

	(manager, event_rx, ShutdownHandle { shutdown_txs, join_handles })
}

fn map_server_event(ev: ServerEvent) -> EngineEvent {
	match ev {
		ServerEvent::Delta(delta) => EngineEvent::Delta(delta),
		ServerEvent::Channel(ChannelEvent::RosterSnapshot(users)) => EngineEvent::Roster(users),
		ServerEvent::Channel(ChannelEvent::NewMessage { room_id, message }) => {
			EngineEvent::Message { room_id, message }
		}
		ServerEvent::Channel(ChannelEvent::TypingStart { room_id, user_id }) => EngineEvent::TypingStarted {
			room_id,
			user: user_id,
		},
		ServerEvent::Channel(ChannelEvent::TypingStop { room_id, user_id }) => EngineEvent::TypingStopped {
			room_id,
			user: user_id,
		},
		ServerEvent::Channel(ChannelEvent::MessageSeen {
			room_id,
			message_id,
			user_id,
		}) => EngineEvent::MessageSeen {
			room_id,
			message_id,
			user: user_id,
		},
	}
}

struct ChannelState {
	kind: ChannelKind,
	backoff: BackoffPolicy,
	remote_close_retry_delay: Duration,
	connector: Arc<dyn Connector>,
	event_tx: mpsc::UnboundedSender<EngineEvent>,
	link_tx: mpsc::UnboundedSender<(u64, String)>,

	identity: Option<UserId>,
	participation: Vec<MatchId>,
	sender: Option<BoxedChannelSender>,
	events_task: Option<tokio::task::JoinHandle<()>>,
	link_gen: u64,
	reconnect_attempt: u32,
	reconnect_deadline: Option<Instant>,
}

impl ChannelState {
	/// Explicit connect: resets the retry budget, then dials unless a
	/// live session already exists.
	async fn connect(&mut self) {
		self.reconnect_attempt = 0;
		self.reconnect_deadline = None;

		if self.sender.is_some() {
			debug!(channel = %self.kind, "connect ignored; already connected");
			return;
		}
		if self.identity.is_none() {
			debug!(channel = %self.kind, "connect ignored; no identity");
			return;
		}

		self.dial().await;
	}

	async fn dial(&mut self) {
		let Some(identity) = self.identity.clone() else {
			return;
		};

		let connected = self.connector.connect(self.kind, &identity).await;
		match connected {
			Ok((sender, events)) => {
				self.sender = Some(sender);
				self.link_gen += 1;
				self.events_task = Some(spawn_events_loop(
					self.link_gen,
					events,
					self.event_tx.clone(),
					self.link_tx.clone(),
				));
				self.reconnect_attempt = 0;
				self.reconnect_deadline = None;

				info!(channel = %self.kind, "connected");
				let _ = self.event_tx.send(EngineEvent::ChannelUp { channel: self.kind });

				if self.kind == ChannelKind::Chat {
					self.resync_rooms(&identity).await;
				}
			}
			Err(e) => {
				warn!(channel = %self.kind, error = %e, "connect failed");
				self.schedule_backoff_retry();
			}
		}
	}

	/// Re-join every room in the participation snapshot. Runs on each
	/// successful chat connect; not a membership decision.
	async fn resync_rooms(&mut self, identity: &UserId) {
		for room in self.participation.clone() {
			let joined = self
				.try_send(ClientEvent::JoinRoom {
					room_id: room.clone(),
					user_id: identity.clone(),
				})
				.await;
			if !joined {
				return;
			}
			if !self
				.try_send(ClientEvent::JoinRealRoom {
					room_id: room,
					user_id: identity.clone(),
				})
				.await
			{
				return;
			}
		}
	}

	/// Send over the live session, treating failure as a lost link.
	/// Returns false when the link went down.
	async fn try_send(&mut self, event: ClientEvent) -> bool {
		let Some(sender) = self.sender.as_mut() else {
			debug!(channel = %self.kind, "emit dropped; channel not connected");
			return false;
		};

		let sent = sender.send(&event).await;
		match sent {
			Ok(()) => true,
			Err(e) => {
				warn!(channel = %self.kind, error = %e, "send failed; treating link as down");
				self.drop_session().await;
				let _ = self.event_tx.send(EngineEvent::ChannelDown {
					channel: self.kind,
					reason: e.to_string(),
				});
				self.schedule_remote_close_retry();
				false
			}
		}
	}

	async fn drop_session(&mut self) {
		if let Some(task) = self.events_task.take() {
			task.abort();
		}
		if let Some(mut sender) = self.sender.take() {
			sender.close().await;
		}
		// Anything the aborted events loop still reports is stale.
		self.link_gen += 1;
	}

	async fn disconnect(&mut self, reason: &str) {
		let was_connected = self.sender.is_some();
		self.drop_session().await;
		self.reconnect_attempt = 0;
		self.reconnect_deadline = None;

		if was_connected {
			info!(channel = %self.kind, %reason, "disconnected");
			let _ = self.event_tx.send(EngineEvent::ChannelDown {
				channel: self.kind,
				reason: reason.to_string(),
			});
		}
	}

	async fn set_identity(&mut self, identity: Option<UserId>) {
		match identity {
			Some(user) => {
				self.identity = Some(user);
			}
			None => {
				self.identity = None;
				self.disconnect("identity cleared").await;
			}
		}
	}

	/// The spawned events loop ended: remote close or transport error.
	async fn on_link_down(&mut self, generation: u64, reason: String) {
		if generation != self.link_gen {
			debug!(channel = %self.kind, generation, "stale link notification ignored");
			return;
		}

		self.events_task = None;
		if let Some(mut sender) = self.sender.take() {
			sender.close().await;
		}

		warn!(channel = %self.kind, %reason, "link down");
		let _ = self.event_tx.send(EngineEvent::ChannelDown {
			channel: self.kind,
			reason,
		});

		if self.identity.is_some() {
			self.schedule_remote_close_retry();
		}
	}

	/// One quiet retry after a remote close; dial failures from there go
	/// through the backoff budget.
	fn schedule_remote_close_retry(&mut self) {
		let delay = self.remote_close_retry_delay;
		self.reconnect_deadline = Some(Instant::now() + delay);
		let _ = self.event_tx.send(EngineEvent::Reconnecting {
			channel: self.kind,
			attempt: self.reconnect_attempt,
			next_retry_in_ms: delay.as_millis() as u64,
		});
	}

	fn schedule_backoff_retry(&mut self) {
		self.reconnect_attempt = self.reconnect_attempt.saturating_add(1);

		match self.backoff.delay_for(self.reconnect_attempt) {
			Some(delay) => {
				let delay = jittered(delay);
				self.reconnect_deadline = Some(Instant::now() + delay);
				let _ = self.event_tx.send(EngineEvent::Reconnecting {
					channel: self.kind,
					attempt: self.reconnect_attempt,
					next_retry_in_ms: delay.as_millis() as u64,
				});
			}
			None => {
				debug!(channel = %self.kind, attempts = self.reconnect_attempt, "retry budget spent; giving up");
				self.reconnect_deadline = None;
				let _ = self.event_tx.send(EngineEvent::GaveUp { channel: self.kind });
			}
		}
	}

	async fn on_retry_due(&mut self) {
		self.reconnect_deadline = None;
		if self.sender.is_some() || self.identity.is_none() {
			return;
		}
		self.dial().await;
	}

	async fn teardown(&mut self, reason: &str) {
		self.drop_session().await;
		let _ = self.event_tx.send(EngineEvent::ChannelDown {
			channel: self.kind,
			reason: reason.to_string(),
		});
	}
}

fn spawn_events_loop(
	generation: u64,
	mut events: BoxedChannelEvents,
	event_tx: mpsc::UnboundedSender<EngineEvent>,
	link_tx: mpsc::UnboundedSender<(u64, String)>,
) -> tokio::task::JoinHandle<()> {
	tokio::spawn(async move {
		let res = events
			.run_events_loop(Box::new(|ev| {
				let _ = event_tx.send(map_server_event(ev));
			}))
			.await;

		let reason = match res {
			Ok(()) => "event stream closed".to_string(),
			Err(e) => e.to_string(),
		};
		let _ = link_tx.send((generation, reason));
	})
}

async fn run_channel_task(
	kind: ChannelKind,
	backoff: BackoffPolicy,
	remote_close_retry_delay: Duration,
	connector: Arc<dyn Connector>,
	mut cmd_rx: mpsc::Receiver<ChannelCommand>,
	event_tx: mpsc::UnboundedSender<EngineEvent>,
	mut shutdown_rx: oneshot::Receiver<()>,
) {
	let (link_tx, mut link_rx) = mpsc::unbounded_channel::<(u64, String)>();

	let mut st = ChannelState {
		kind,
		backoff,
		remote_close_retry_delay,
		connector,
		event_tx,
		link_tx,
		identity: None,
		participation: Vec::new(),
		sender: None,
		events_task: None,
		link_gen: 0,
		reconnect_attempt: 0,
		reconnect_deadline: None,
	};

	loop {
		let reconnect_deadline = st.reconnect_deadline;

		tokio::select! {
			_ = &mut shutdown_rx => {
				st.teardown("shutdown").await;
				break;
			}

			cmd = cmd_rx.recv() => {
				let Some(cmd) = cmd else {
					st.teardown("engine dropped handle").await;
					break;
				};

				match cmd {
					ChannelCommand::Connect => st.connect().await,
					ChannelCommand::Disconnect { reason } => st.disconnect(&reason).await,
					ChannelCommand::Emit { event } => {
						let _ = st.try_send(event).await;
					}
					ChannelCommand::SetIdentity { identity } => st.set_identity(identity).await,
					ChannelCommand::SetParticipation { rooms } => st.participation = rooms,
				}
			}

			ended = link_rx.recv() => {
				if let Some((generation, reason)) = ended {
					st.on_link_down(generation, reason).await;
				}
			}

			_ = async {
				if let Some(deadline) = reconnect_deadline {
					tokio::time::sleep_until(deadline).await;
				}
			}, if reconnect_deadline.is_some() => {
				st.on_retry_due().await;
			}
		}
	}
}

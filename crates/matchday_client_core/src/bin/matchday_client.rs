#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use matchday_client_core::{EngineEvent, SyncConfigV1, WsConnector, start_engine};
use matchday_domain::{MatchId, UserId};
use serde::Deserialize;
use tracing::{info, warn};

fn usage_and_exit() -> ! {
	eprintln!(
		"Usage: matchday_client --user <id> [--connect ws://host:port] [--match <id>]... [--config file.toml]\n\
\n\
Options:\n\
	--user      Identity to hand to every channel (required)\n\
	--connect   Event endpoint (default: ws://localhost:9087)\n\
	            Format: ws://host:port\n\
	--match     Match the user participates in (repeatable; re-joined on\n\
	            every chat reconnect)\n\
	--config    TOML file overlaying the defaults\n\
	--help      Show this help\n\
\n\
Examples:\n\
	matchday_client --user u42 --connect ws://127.0.0.1:9087 --match m1\n\
	matchday_client --user u42 --config matchday.toml\n"
	);
	std::process::exit(2)
}

fn init_tracing() {
	let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,matchday_client_core=debug".to_string());
	tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

/// Optional config-file overlay; every field falls back to the default.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
	server_endpoint: Option<String>,
	rest_base_url: Option<String>,
	client_name: Option<String>,
	handshake_timeout_ms: Option<u64>,
	remote_close_retry_delay_ms: Option<u64>,
	typing_timeout_ms: Option<u64>,
}

fn load_file_config(path: &str) -> anyhow::Result<FileConfig> {
	let raw = std::fs::read_to_string(path)?;
	Ok(toml::from_str(&raw)?)
}

struct Args {
	user: UserId,
	endpoint: Option<String>,
	matches: Vec<MatchId>,
	config_path: Option<String>,
}

fn parse_args() -> Args {
	let mut user: Option<UserId> = None;
	let mut endpoint: Option<String> = None;
	let mut matches: Vec<MatchId> = Vec::new();
	let mut config_path: Option<String> = None;

	let mut it = std::env::args().skip(1);
	while let Some(arg) = it.next() {
		match arg.as_str() {
			"--help" | "-h" => usage_and_exit(),
			"--user" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				user = Some(v.parse().unwrap_or_else(|e| {
					eprintln!("Invalid --user value: {e}");
					usage_and_exit()
				}));
			}
			"--connect" | "--endpoint" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				if v.trim().is_empty() {
					eprintln!("--connect must be non-empty (expected ws://host:port)");
					usage_and_exit();
				}
				endpoint = Some(v);
			}
			"--match" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				matches.push(v.parse().unwrap_or_else(|e| {
					eprintln!("Invalid --match value: {e}");
					usage_and_exit()
				}));
			}
			"--config" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				config_path = Some(v);
			}
			other => {
				eprintln!("Unknown argument: {other}");
				usage_and_exit();
			}
		}
	}

	let Some(user) = user else {
		eprintln!("--user is required");
		usage_and_exit();
	};

	Args {
		user,
		endpoint,
		matches,
		config_path,
	}
}

fn build_config(args: &Args) -> anyhow::Result<SyncConfigV1> {
	let mut cfg = SyncConfigV1::default();

	if let Some(path) = &args.config_path {
		let file = load_file_config(path)?;
		if let Some(v) = file.server_endpoint {
			cfg.server_endpoint = v;
		}
		if let Some(v) = file.rest_base_url {
			cfg.rest_base_url = v;
		}
		if let Some(v) = file.client_name {
			cfg.client_name = v;
		}
		if let Some(ms) = file.handshake_timeout_ms {
			cfg.handshake_timeout = Duration::from_millis(ms);
		}
		if let Some(ms) = file.remote_close_retry_delay_ms {
			cfg.remote_close_retry_delay = Duration::from_millis(ms);
		}
		if let Some(ms) = file.typing_timeout_ms {
			cfg.typing_timeout = Duration::from_millis(ms);
		}
	}

	if let Some(endpoint) = &args.endpoint {
		cfg.server_endpoint = endpoint.clone();
	}
	cfg.client_instance_id = format!("cli-{}", std::process::id());

	Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	init_tracing();
	let args = parse_args();
	let cfg = build_config(&args)?;

	let endpoint = cfg.ws_endpoint().map_err(|e| anyhow::anyhow!("{e}"))?;
	info!(endpoint = %endpoint.hostport(), user = %args.user, "starting engine");

	let connector = Arc::new(WsConnector::new(endpoint, cfg.handshake_timeout));
	let (manager, mut events, shutdown) = start_engine(&cfg, connector);

	manager
		.set_identity(Some(args.user.clone()))
		.await
		.map_err(|e| anyhow::anyhow!(e))?;
	manager
		.set_participation(args.matches.clone())
		.await
		.map_err(|e| anyhow::anyhow!(e))?;
	manager.connect_all().await.map_err(|e| anyhow::anyhow!(e))?;

	loop {
		tokio::select! {
			_ = tokio::signal::ctrl_c() => {
				info!("interrupted; shutting down");
				break;
			}

			ev = events.recv() => {
				let Some(ev) = ev else {
					warn!("engine stopped");
					break;
				};

				match ev {
					EngineEvent::ChannelUp { channel } => info!(%channel, "channel up"),
					EngineEvent::ChannelDown { channel, reason } => info!(%channel, %reason, "channel down"),
					EngineEvent::Reconnecting { channel, attempt, next_retry_in_ms } => {
						info!(%channel, attempt, next_retry_in_ms, "reconnecting");
					}
					EngineEvent::GaveUp { channel } => warn!(%channel, "gave up reconnecting"),
					EngineEvent::IdentityCleared => info!("identity cleared"),
					EngineEvent::Roster(users) => info!(online = users.len(), "roster snapshot"),
					EngineEvent::Delta(delta) => {
						info!(event = delta.event_name(), match_id = %delta.match_id(), "match delta");
					}
					EngineEvent::Message { room_id, message } => {
						println!("[{}] {}: {:?}", room_id, message.sender, message.body);
					}
					EngineEvent::TypingStarted { room_id, user } => info!(%room_id, %user, "typing"),
					EngineEvent::TypingStopped { room_id, user } => info!(%room_id, %user, "stopped typing"),
					EngineEvent::MessageSeen { room_id, user, .. } => info!(%room_id, %user, "message seen"),
				}
			}
		}
	}

	// Best-effort teardown of all three channels on the way out.
	shutdown.shutdown().await;
	Ok(())
}

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::TcpStream,
    sync::Notify,
    time::{sleep, Duration},
};
use tracing::{debug, info, warn};

use crate::{
    dispatch::{Dispatcher, PurgeRequest},
    entry::ChatEntry,
    parser,
    render::Renderer,
    scrollback::ScrollbackBuffer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Backoff,
}

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub channel: String,
    pub nick: Option<String>,
    pub auth_token: Option<String>,
    pub backoff: BackoffConfig,
}

#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub base_ms: u64,
    pub ceiling_ms: u64,
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_ms: 1_000,
            ceiling_ms: 100_000,
            // Chosen over 2.0 to track the relay's slower timeout.
            multiplier: 1.5,
        }
    }
}

/// Reconnect delay state machine. The delay only ever multiplies upward;
/// it resets to base on a successful open or on final give-up.
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: BackoffConfig,
    current_ms: u64,
}

impl ReconnectPolicy {
    pub fn new(config: BackoffConfig) -> Self {
        let current_ms = config.base_ms;
        Self { config, current_ms }
    }

    pub fn reset(&mut self) {
        self.current_ms = self.config.base_ms;
    }

    /// Delay before the next attempt, or `None` once the grown value exceeds
    /// the ceiling (which also resets the policy).
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.current_ms > self.config.ceiling_ms {
            self.reset();
            return None;
        }
        let delay = Duration::from_millis(self.current_ms);
        self.current_ms = (self.current_ms as f64 * self.config.multiplier).round() as u64;
        Some(delay)
    }
}

#[derive(Debug, Default)]
struct ConnectionShared {
    reconnect: AtomicBool,
    /// Bumped by connect/disconnect; a backoff timer that wakes up under a
    /// newer generation is stale and must not reconnect.
    generation: AtomicU64,
    close: Notify,
}

/// Cloneable control surface for a running connection.
#[derive(Clone)]
pub struct ConnectionHandle {
    shared: Arc<ConnectionShared>,
}

impl ConnectionHandle {
    /// Stops reconnecting and closes the active socket. A backoff timer that
    /// already fired observes the cleared flag and stale generation.
    pub fn disconnect(&self) {
        self.shared.reconnect.store(false, Ordering::Release);
        self.shared.generation.fetch_add(1, Ordering::AcqRel);
        self.shared.close.notify_waiters();
    }
}

/// Owns the socket lifecycle: connect, handshake, session read loop,
/// reconnect with multiplicative backoff.
pub struct ConnectionManager {
    config: ConnectionConfig,
    policy: ReconnectPolicy,
    state: ConnectionState,
    shared: Arc<ConnectionShared>,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig) -> Self {
        let policy = ReconnectPolicy::new(config.backoff.clone());
        Self {
            config,
            policy,
            state: ConnectionState::Disconnected,
            shared: Arc::new(ConnectionShared::default()),
        }
    }

    pub fn handle(&self) -> ConnectionHandle {
        ConnectionHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    fn set_state(&mut self, next: ConnectionState) {
        if next != self.state {
            debug!(from = ?self.state, to = ?next, "connection state");
            self.state = next;
        }
    }

    /// Connects and keeps the session alive until `disconnect()` or the
    /// backoff ceiling gives up. Dispatch runs inline: frames are handled in
    /// arrival order and keep-alive replies go out before the next read.
    pub async fn run<R: Renderer>(
        &mut self,
        dispatcher: &Dispatcher,
        buffer: &ScrollbackBuffer<R>,
    ) {
        self.shared.reconnect.store(true, Ordering::Release);
        self.shared.generation.fetch_add(1, Ordering::AcqRel);

        let channel = normalize_channel(&self.config.channel);
        if channel.is_empty() {
            warn!("chat channel is empty; connection disabled");
            return;
        }

        loop {
            self.set_state(ConnectionState::Connecting);
            let generation = self.shared.generation.load(Ordering::Acquire);
            match TcpStream::connect((self.config.host.as_str(), self.config.port)).await {
                Ok(stream) => {
                    self.set_state(ConnectionState::Open);
                    self.policy.reset();
                    if let Err(err) = self.run_session(stream, &channel, dispatcher, buffer).await
                    {
                        warn!(?err, channel = %channel, "chat session ended");
                    }
                }
                Err(err) => {
                    warn!(?err, host = %self.config.host, "failed connecting to chat relay");
                }
            }

            if !self.shared.reconnect.load(Ordering::Acquire) {
                self.set_state(ConnectionState::Disconnected);
                self.policy.reset();
                return;
            }
            let Some(delay) = self.policy.next_delay() else {
                warn!("reconnect backoff exceeded ceiling; giving up");
                self.shared.reconnect.store(false, Ordering::Release);
                self.set_state(ConnectionState::Disconnected);
                buffer
                    .generate(ChatEntry::error("ERROR: BAD CONNECTION WITH CHAT RELAY"))
                    .await;
                return;
            };

            self.set_state(ConnectionState::Backoff);
            info!(delay_ms = delay.as_millis() as u64, "scheduling reconnect");
            tokio::select! {
                _ = sleep(delay) => {}
                _ = self.shared.close.notified() => {}
            }
            if self.shared.generation.load(Ordering::Acquire) != generation
                || !self.shared.reconnect.load(Ordering::Acquire)
            {
                info!("reconnect timer is stale; staying disconnected");
                self.set_state(ConnectionState::Disconnected);
                self.policy.reset();
                return;
            }
        }
    }

    async fn run_session<R: Renderer>(
        &self,
        stream: TcpStream,
        channel: &str,
        dispatcher: &Dispatcher,
        buffer: &ScrollbackBuffer<R>,
    ) -> Result<()> {
        let (read_half, mut write_half) = stream.into_split();
        for frame in handshake_frames(&self.config, channel) {
            write_line(&mut write_half, &frame).await?;
        }
        info!(channel = %channel, "joined chat relay");

        let mut lines = BufReader::new(read_half).lines();
        loop {
            let line = tokio::select! {
                next = lines.next_line() => match next? {
                    Some(line) => line,
                    None => return Ok(()),
                },
                _ = self.shared.close.notified() => {
                    info!("connection closed by disconnect()");
                    return Ok(());
                }
            };
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }

            let outcome = dispatcher.dispatch(&parser::parse(line)).await;
            if let Some(reply) = &outcome.reply {
                write_line(&mut write_half, reply).await?;
            }
            match &outcome.purge {
                Some(PurgeRequest::All) => buffer.clear().await,
                Some(PurgeRequest::Matching { user, id }) => {
                    buffer.delete_by(user.as_deref(), id.as_deref()).await;
                }
                None => {}
            }
            if let Some(entry) = outcome.entry {
                buffer.generate(entry).await;
            }
            if outcome.reconnect {
                return Ok(());
            }
        }
    }
}

/// Handshake sent synchronously on open, in this fixed order: credentials,
/// nickname, channel join, then the two capability requests.
pub fn handshake_frames(config: &ConnectionConfig, channel: &str) -> Vec<String> {
    let token = config
        .auth_token
        .as_deref()
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .unwrap_or("kappa");
    let nick = config
        .nick
        .clone()
        .map(|nick| nick.trim().to_owned())
        .filter(|nick| !nick.is_empty())
        .unwrap_or_else(random_anonymous_nick);
    vec![
        format!("PASS oauth:{token}"),
        format!("NICK {nick}"),
        format!("JOIN #{channel}"),
        "CAP REQ :twitch.tv/commands".to_owned(),
        "CAP REQ :twitch.tv/tags".to_owned(),
    ]
}

async fn write_line(writer: &mut tokio::net::tcp::OwnedWriteHalf, line: &str) -> Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\r\n").await?;
    Ok(())
}

fn normalize_channel(value: &str) -> String {
    value.trim().trim_start_matches('#').to_ascii_lowercase()
}

fn random_anonymous_nick() -> String {
    let seed = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|value| value.as_millis() % 90_000)
        .unwrap_or(0);
    format!("justinfan{}", 10_000 + seed)
}

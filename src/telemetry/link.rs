//! Connection lifecycle to the CNC controller.
//!
//! ```text
//!                 connect()                 Connected event
//!  NeverAttempted ─────────▶ Connecting ──────────────────▶ Connected
//!                             │  ▲   │ timeout / error            │
//!                   open err  │  │   ▼                            │ Disconnected event
//!                             └─▶ Disconnected ◀──────────────────┘
//!                                  │  ▲
//!                                  └──┘ every reconnect_interval_ms
//! ```
//!
//! Nothing here blocks: `connect()` only starts an attempt, and `pump()`
//! (called every loop iteration) drains transport events, runs the
//! connect timeout and schedules reconnects. Failures are logged and
//! retried forever at a fixed interval.

use log::{debug, info, warn};
use serde::Serialize;

use super::parser;
use super::{JobTransition, MachineStatus};
use crate::app::events::AppEvent;
use crate::app::ports::{EventSink, LinkTransport, ServiceBrowser, TransportEvent};
use crate::config::SystemConfig;
use crate::error::{LinkError, Result};

/// Single byte that asks the controller for a status report.
pub const STATUS_REQUEST: &str = "?";
/// Hostname fragment that marks a controller during discovery.
pub const DISCOVERY_HOST_MATCH: &str = "fluidnc";
pub const DISCOVERY_SERVICE: &str = "_http";
pub const DISCOVERY_PROTO: &str = "_tcp";
pub const DISCOVERY_TIMEOUT_MS: u32 = 3000;
pub const CONNECT_TIMEOUT_MS: u32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LinkState {
    NeverAttempted,
    Connecting,
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkConfig {
    pub poll_interval_ms: u32,
    pub reconnect_interval_ms: u32,
    pub connect_timeout_ms: u32,
}

impl From<&SystemConfig> for LinkConfig {
    fn from(cfg: &SystemConfig) -> Self {
        Self {
            poll_interval_ms: cfg.status_poll_interval_ms,
            reconnect_interval_ms: cfg.reconnect_interval_ms,
            connect_timeout_ms: CONNECT_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    pub lines_accepted: u32,
    pub lines_ignored: u32,
    pub connect_attempts: u32,
    pub polls_sent: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    /// A controller answered; the link now targets `address`.
    Found { hostname: String, address: String },
    /// Nothing matched; the configured host is used.
    Fallback,
}

pub struct TelemetryLink<T: LinkTransport> {
    transport: T,
    cfg: LinkConfig,
    host: String,
    port: u16,
    state: LinkState,
    state_since_ms: u64,
    reported: Option<LinkState>,
    last_poll_ms: Option<u64>,
    status: MachineStatus,
    /// Job transition caused outside `pump` (a forced reconnect), emitted
    /// on the next pump.
    pending_job: Option<JobTransition>,
    stats: LinkStats,
}

impl<T: LinkTransport> TelemetryLink<T> {
    pub fn new(transport: T, cfg: &SystemConfig) -> Self {
        Self {
            transport,
            cfg: LinkConfig::from(cfg),
            host: cfg.controller_host.as_str().into(),
            port: cfg.controller_port,
            state: LinkState::NeverAttempted,
            state_since_ms: 0,
            reported: None,
            last_poll_ms: None,
            status: MachineStatus::new(),
            pending_job: None,
            stats: LinkStats::default(),
        }
    }

    /// Pick up new intervals. Host and port only change through
    /// [`connect`](Self::connect).
    pub fn apply_config(&mut self, cfg: &SystemConfig) {
        self.cfg = LinkConfig {
            connect_timeout_ms: self.cfg.connect_timeout_ms,
            ..LinkConfig::from(cfg)
        };
    }

    pub fn set_connect_timeout(&mut self, ms: u32) {
        self.cfg.connect_timeout_ms = ms;
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Start connecting to `host:port`, dropping any current connection.
    pub fn connect(&mut self, host: &str, port: u16, now_ms: u64) {
        host.clone_into(&mut self.host);
        self.port = port;
        if matches!(self.state, LinkState::Connecting | LinkState::Connected) {
            self.transport.close();
            if let Some(t) = self.status.mark_offline(now_ms) {
                self.pending_job = Some(t);
            }
        }
        self.attempt(now_ms);
    }

    /// Look the controller up by service name, then connect.
    ///
    /// The configured port is kept either way: discovery finds the
    /// controller's HTTP service, not its websocket.
    pub fn discover(&mut self, browser: &mut impl ServiceBrowser, now_ms: u64) -> DiscoveryOutcome {
        info!(
            "TelemetryLink: browsing {}.{} for '{}'",
            DISCOVERY_SERVICE, DISCOVERY_PROTO, DISCOVERY_HOST_MATCH
        );
        let records = browser.browse(DISCOVERY_SERVICE, DISCOVERY_PROTO, DISCOVERY_TIMEOUT_MS);
        let found = records
            .into_iter()
            .find(|r| r.hostname.to_ascii_lowercase().contains(DISCOVERY_HOST_MATCH));

        let outcome = match found {
            Some(rec) => {
                info!("TelemetryLink: found {} at {}", rec.hostname, rec.address);
                DiscoveryOutcome::Found {
                    hostname: rec.hostname,
                    address: rec.address,
                }
            }
            None => {
                warn!("TelemetryLink: no controller found, using {}", self.host);
                DiscoveryOutcome::Fallback
            }
        };
        let host = match &outcome {
            DiscoveryOutcome::Found { address, .. } => address.clone(),
            DiscoveryOutcome::Fallback => self.host.clone(),
        };
        self.connect(&host, self.port, now_ms);
        outcome
    }

    /// Send a status request if connected and the poll interval elapsed.
    /// Returns `true` when a request went out.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        if self.state != LinkState::Connected {
            return false;
        }
        if let Some(last) = self.last_poll_ms {
            if now_ms.saturating_sub(last) < u64::from(self.cfg.poll_interval_ms) {
                return false;
            }
        }
        self.last_poll_ms = Some(now_ms);
        match self.send_line(STATUS_REQUEST) {
            Ok(()) => {
                self.stats.polls_sent += 1;
                true
            }
            Err(e) => {
                warn!("TelemetryLink: poll failed: {}", e);
                false
            }
        }
    }

    /// Send one raw line to the controller (e.g. `$X`, `!`, `~`).
    pub fn send_line(&mut self, line: &str) -> Result<()> {
        if self.state != LinkState::Connected {
            return Err(LinkError::NotConnected.into());
        }
        self.transport
            .send_text(line)
            .map_err(|e| LinkError::from(e).into())
    }

    /// Drive the link. Must run every loop iteration.
    pub fn pump(&mut self, now_ms: u64, sink: &mut impl EventSink) {
        emit_job(self.pending_job.take(), sink);
        self.flush_state(sink);

        while let Some(event) = self.transport.next_event() {
            match event {
                TransportEvent::Connected => {
                    info!("TelemetryLink: connected to {}:{}", self.host, self.port);
                    self.set_state(LinkState::Connected, now_ms);
                    self.last_poll_ms = None;
                    let t = self.status.mark_connected(now_ms);
                    emit_job(t, sink);
                }
                TransportEvent::Disconnected => {
                    // A late close for an attempt already given up on must
                    // not restart the reconnect timer.
                    if self.state != LinkState::Disconnected {
                        warn!("TelemetryLink: disconnected from {}:{}", self.host, self.port);
                        self.go_offline(now_ms, sink);
                    }
                }
                TransportEvent::Text(_) | TransportEvent::Binary(_)
                    if self.state == LinkState::Disconnected =>
                {
                    debug!("TelemetryLink: dropped frame from a closed session");
                }
                TransportEvent::Text(text) => self.ingest(&text, now_ms, sink),
                TransportEvent::Binary(bytes) => {
                    let text = String::from_utf8_lossy(&bytes);
                    self.ingest(&text, now_ms, sink);
                }
                TransportEvent::Error(e) => {
                    warn!("TelemetryLink: transport error: {}", e);
                    if self.state == LinkState::Connecting {
                        self.transport.close();
                        self.go_offline(now_ms, sink);
                    }
                }
            }
            self.flush_state(sink);
        }

        let elapsed = now_ms.saturating_sub(self.state_since_ms);
        match self.state {
            LinkState::Connecting if elapsed >= u64::from(self.cfg.connect_timeout_ms) => {
                warn!("TelemetryLink: connect to {}:{} timed out", self.host, self.port);
                self.transport.close();
                self.go_offline(now_ms, sink);
            }
            LinkState::Disconnected if elapsed >= u64::from(self.cfg.reconnect_interval_ms) => {
                debug!("TelemetryLink: reconnecting to {}:{}", self.host, self.port);
                self.attempt(now_ms);
            }
            _ => {}
        }
        self.flush_state(sink);
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn status(&self) -> &MachineStatus {
        &self.status
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn url(&self) -> String {
        format!("ws://{}:{}/ws", self.host, self.port)
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    // ── Internals ─────────────────────────────────────────────

    fn attempt(&mut self, now_ms: u64) {
        self.stats.connect_attempts += 1;
        let url = self.url();
        match self.transport.open(&url) {
            Ok(()) => {
                info!("TelemetryLink: connecting to {}", url);
                self.set_state(LinkState::Connecting, now_ms);
            }
            Err(e) => {
                warn!("TelemetryLink: open {} failed: {}", url, e);
                self.set_state(LinkState::Disconnected, now_ms);
            }
        }
    }

    fn go_offline(&mut self, now_ms: u64, sink: &mut impl EventSink) {
        self.set_state(LinkState::Disconnected, now_ms);
        let t = self.status.mark_offline(now_ms);
        emit_job(t, sink);
    }

    fn set_state(&mut self, next: LinkState, now_ms: u64) {
        self.state = next;
        self.state_since_ms = now_ms;
    }

    fn flush_state(&mut self, sink: &mut impl EventSink) {
        if self.reported != Some(self.state) {
            self.reported = Some(self.state);
            sink.emit(&AppEvent::LinkStateChanged(self.state));
        }
    }

    /// One frame may hold several newline-separated lines.
    fn ingest(&mut self, frame: &str, now_ms: u64, sink: &mut impl EventSink) {
        for line in frame.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some(report) = parser::parse(line) else {
                self.stats.lines_ignored += 1;
                debug!("TelemetryLink: ignored '{}'", line);
                continue;
            };
            self.stats.lines_accepted += 1;
            let before = self.status.state;
            let t = self.status.apply(&report, now_ms);
            if self.status.state != before {
                sink.emit(&AppEvent::MachineStateChanged {
                    from: before,
                    to: self.status.state,
                });
            }
            emit_job(t, sink);
        }
    }
}

fn emit_job(transition: Option<JobTransition>, sink: &mut impl EventSink) {
    match transition {
        Some(JobTransition::Started) => sink.emit(&AppEvent::JobStarted),
        Some(JobTransition::Finished { duration_ms }) => {
            sink.emit(&AppEvent::JobFinished { duration_ms });
        }
        None => {}
    }
}


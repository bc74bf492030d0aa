//! Websocket transport to the controller.
//!
//! Implements [`LinkTransport`]. On ESP-IDF the `esp-idf-svc` websocket
//! client runs its own task and calls back from there; the callback only
//! forwards owned [`TransportEvent`]s into an `mpsc` channel that
//! [`next_event`](LinkTransport::next_event) drains on the main loop.
//!
//! On host/test the transport is a scripted queue: tests inject events
//! and inspect what was sent.

#[cfg(not(target_os = "espidf"))]
use std::collections::VecDeque;

use log::{debug, info};

use crate::app::ports::{LinkTransport, TransportError, TransportEvent};

#[cfg(target_os = "espidf")]
use std::sync::mpsc;

#[cfg(target_os = "espidf")]
use esp_idf_svc::ws::FrameType;
#[cfg(target_os = "espidf")]
use esp_idf_svc::ws::client::{EspWebSocketClient, EspWebSocketClientConfig, WebSocketEventType};

/// Time the client waits for a frame send to complete.
#[cfg(target_os = "espidf")]
const SEND_TIMEOUT: core::time::Duration = core::time::Duration::from_secs(2);

pub struct WsTransport {
    #[cfg(target_os = "espidf")]
    client: Option<EspWebSocketClient<'static>>,
    #[cfg(target_os = "espidf")]
    rx: Option<mpsc::Receiver<TransportEvent>>,

    #[cfg(not(target_os = "espidf"))]
    sim: SimState,

    connected: bool,
}

#[cfg(not(target_os = "espidf"))]
#[derive(Default)]
struct SimState {
    inbox: VecDeque<TransportEvent>,
    sent: Vec<String>,
    opened: Vec<String>,
    fail_open: bool,
    is_open: bool,
}

impl Default for WsTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl WsTransport {
    pub fn new() -> Self {
        Self {
            #[cfg(target_os = "espidf")]
            client: None,
            #[cfg(target_os = "espidf")]
            rx: None,
            #[cfg(not(target_os = "espidf"))]
            sim: SimState::default(),
            connected: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    fn track(&mut self, event: &TransportEvent) {
        match event {
            TransportEvent::Connected => self.connected = true,
            TransportEvent::Disconnected => self.connected = false,
            _ => {}
        }
    }
}

// ── Simulation hooks ──────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
impl WsTransport {
    /// Queue an event as if the stack had delivered it.
    pub fn sim_push(&mut self, event: TransportEvent) {
        self.sim.inbox.push_back(event);
    }

    /// Queue a text frame.
    pub fn sim_push_text(&mut self, text: &str) {
        self.sim_push(TransportEvent::Text(text.into()));
    }

    /// Make the next `open()` calls fail until cleared.
    pub fn sim_fail_open(&mut self, fail: bool) {
        self.sim.fail_open = fail;
    }

    /// Frames sent so far, oldest first.
    pub fn sim_sent(&self) -> &[String] {
        &self.sim.sent
    }

    /// URLs passed to `open()`, oldest first.
    pub fn sim_opened(&self) -> &[String] {
        &self.sim.opened
    }

    pub fn sim_is_open(&self) -> bool {
        self.sim.is_open
    }
}

impl LinkTransport for WsTransport {
    #[cfg(target_os = "espidf")]
    fn open(&mut self, url: &str) -> Result<(), TransportError> {
        self.close();
        let (tx, rx) = mpsc::channel();
        // Reconnects are paced by TelemetryLink, not the client task.
        let config = EspWebSocketClientConfig {
            disable_auto_reconnect: true,
            ..Default::default()
        };
        let client = EspWebSocketClient::new(url, &config, SEND_TIMEOUT, move |event| {
            let forwarded = match event {
                Ok(ev) => match ev.event_type {
                    WebSocketEventType::Connected => Some(TransportEvent::Connected),
                    WebSocketEventType::Disconnected | WebSocketEventType::Closed => {
                        Some(TransportEvent::Disconnected)
                    }
                    WebSocketEventType::Text(text) => Some(TransportEvent::Text(text.into())),
                    WebSocketEventType::Binary(bytes) => Some(TransportEvent::Binary(bytes.to_vec())),
                    _ => None,
                },
                Err(_) => Some(TransportEvent::Error(TransportError::Protocol)),
            };
            if let Some(ev) = forwarded {
                // The receiver only goes away in close(), after which
                // late events are irrelevant.
                let _ = tx.send(ev);
            }
        })
        .map_err(|e| {
            log::warn!("WsTransport: client create failed: {:?}", e);
            TransportError::OpenFailed
        })?;
        self.client = Some(client);
        self.rx = Some(rx);
        info!("WsTransport: opening {}", url);
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn open(&mut self, url: &str) -> Result<(), TransportError> {
        self.sim.opened.push(url.into());
        if self.sim.fail_open {
            return Err(TransportError::OpenFailed);
        }
        self.sim.is_open = true;
        info!("WsTransport(sim): opening {}", url);
        Ok(())
    }

    fn close(&mut self) {
        #[cfg(target_os = "espidf")]
        {
            // Dropping the client stops its task.
            self.client = None;
            self.rx = None;
        }
        #[cfg(not(target_os = "espidf"))]
        {
            self.sim.is_open = false;
        }
        if self.connected {
            debug!("WsTransport: closed");
        }
        self.connected = false;
    }

    fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        #[cfg(target_os = "espidf")]
        {
            let client = self.client.as_mut().ok_or(TransportError::NotConnected)?;
            client
                .send(FrameType::Text(false), text.as_bytes())
                .map_err(|_| TransportError::SendFailed)
        }
        #[cfg(not(target_os = "espidf"))]
        {
            self.sim.sent.push(text.into());
            Ok(())
        }
    }

    fn next_event(&mut self) -> Option<TransportEvent> {
        #[cfg(target_os = "espidf")]
        let event = self.rx.as_ref().and_then(|rx| rx.try_recv().ok());
        #[cfg(not(target_os = "espidf"))]
        let event = self.sim.inbox.pop_front();

        if let Some(ev) = &event {
            self.track(ev);
        }
        event
    }
}

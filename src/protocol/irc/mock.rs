//! In-memory transport for agent tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::common::error::{ConnectionError, ConnectionResult};
use crate::protocol::irc::event::IrcEvent;
use crate::protocol::irc::transport::{ConnectParams, Transport};

/// Records every line and lets tests inject events.
#[derive(Default)]
pub struct MockTransport {
    connected: AtomicBool,
    failures_left: AtomicUsize,
    connect_attempts: AtomicUsize,
    lines: Mutex<Vec<String>>,
    disconnects: Mutex<Vec<Option<String>>>,
    params: Mutex<Vec<ConnectParams>>,
    events: Mutex<Option<mpsc::UnboundedSender<IrcEvent>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport whose first `count` connect attempts fail.
    pub fn failing(count: usize) -> Self {
        let transport = Self::new();
        transport.failures_left.store(count, Ordering::SeqCst);
        transport
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn connect_attempts(&self) -> usize {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> Vec<Option<String>> {
        self.disconnects.lock().clone()
    }

    pub fn last_params(&self) -> Option<ConnectParams> {
        self.params.lock().last().cloned()
    }

    /// Push an event as if it came from the server.
    pub fn emit(&self, event: IrcEvent) {
        if let Some(events) = self.events.lock().as_ref() {
            let _ = events.send(event);
        }
    }

    /// Simulate the server dropping the link.
    pub fn drop_connection(&self, reason: &str) {
        self.set_connected(false);
        self.emit(IrcEvent::Disconnected {
            reason: reason.to_string(),
        });
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(
        &self,
        params: &ConnectParams,
        events: mpsc::UnboundedSender<IrcEvent>,
    ) -> ConnectionResult<()> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);
        self.params.lock().push(params.clone());

        let should_fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(ConnectionError::ConnectionClosed);
        }

        *self.events.lock() = Some(events);
        self.set_connected(true);
        Ok(())
    }

    fn send_raw_line(&self, line: &str) {
        if self.connected.load(Ordering::SeqCst) {
            self.lines.lock().push(line.to_string());
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn disconnect(&self, reason: Option<&str>) {
        self.disconnects.lock().push(reason.map(str::to_string));
        if self.connected.swap(false, Ordering::SeqCst) {
            self.emit(IrcEvent::Disconnected {
                reason: "Disconnected by request".to_string(),
            });
        }
    }
}

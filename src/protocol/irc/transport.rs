//! IRC transport: connection lifecycle and line I/O.
//!
//! `TcpTransport` connects, registers, and then runs the session on a
//! background task. Outbound lines are queued to that task so sends never
//! block the caller and silently drop while disconnected.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::common::error::{ConnectionError, ConnectionResult};
use crate::protocol::irc::codec::{new_irc_connection, IrcConnection};
use crate::protocol::irc::event::IrcEvent;
use crate::protocol::irc::message::IrcMessage;
use crate::protocol::irc::session::IrcSession;

/// Everything needed to open one session.
#[derive(Debug, Clone)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub nick: String,
    /// Login (USER) name.
    pub username: String,
    pub realname: String,
    pub max_nick_attempts: u32,
    pub connect_timeout: Duration,
    pub registration_timeout: Duration,
    /// Log raw protocol lines at info instead of trace.
    pub verbose: bool,
}

impl Default for ConnectParams {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6667,
            password: None,
            nick: String::new(),
            username: String::new(),
            realname: "IRCTransport".to_string(),
            max_nick_attempts: 9,
            connect_timeout: Duration::from_secs(30),
            registration_timeout: Duration::from_secs(60),
            verbose: false,
        }
    }
}

/// Connection capability the agent drives.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open and register a session. Events flow into `events` until the
    /// session ends, which is always reported as `IrcEvent::Disconnected`.
    async fn connect(
        &self,
        params: &ConnectParams,
        events: mpsc::UnboundedSender<IrcEvent>,
    ) -> ConnectionResult<()>;

    /// Queue one raw line. Dropped when not connected.
    fn send_raw_line(&self, line: &str);

    fn is_connected(&self) -> bool;

    /// Send QUIT and close the session. No-op when not connected.
    fn disconnect(&self, reason: Option<&str>);
}

enum Outbound {
    Line(String),
    Quit(Option<String>),
}

struct SessionHandle {
    id: u64,
    tx: mpsc::UnboundedSender<Outbound>,
}

#[derive(Default)]
struct TransportState {
    handle: Mutex<Option<SessionHandle>>,
    next_id: AtomicU64,
}

/// Plain TCP transport.
#[derive(Clone, Default)]
pub struct TcpTransport {
    state: Arc<TransportState>,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register over an already-open stream and start the session task.
    pub async fn attach<S>(
        &self,
        stream: S,
        params: &ConnectParams,
        events: mpsc::UnboundedSender<IrcEvent>,
    ) -> ConnectionResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let mut connection = new_irc_connection(stream);
        let mut session = IrcSession::new(params);

        let buffered = tokio::time::timeout(
            params.registration_timeout,
            register(&mut connection, &mut session, params.verbose),
        )
        .await
        .map_err(|_| ConnectionError::Timeout {
            stage: "registration",
        })??;

        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.state.next_id.fetch_add(1, Ordering::SeqCst);
        *self.state.handle.lock() = Some(SessionHandle { id, tx });

        info!(
            "Registered on {}:{} as '{}'",
            params.host,
            params.port,
            session.nick()
        );

        // Events seen during registration go out only once sends are possible
        for event in buffered {
            let _ = events.send(event);
        }

        tokio::spawn(run_session(
            connection,
            session,
            rx,
            events,
            self.state.clone(),
            id,
            params.verbose,
        ));
        Ok(())
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(
        &self,
        params: &ConnectParams,
        events: mpsc::UnboundedSender<IrcEvent>,
    ) -> ConnectionResult<()> {
        if self.is_connected() {
            debug!("connect() called while already connected, ignoring");
            return Ok(());
        }

        info!("Connecting to IRC server {}:{}", params.host, params.port);
        let stream = tokio::time::timeout(
            params.connect_timeout,
            TcpStream::connect((params.host.as_str(), params.port)),
        )
        .await
        .map_err(|_| ConnectionError::Timeout { stage: "connect" })?
        .map_err(|source| ConnectionError::ConnectFailed {
            host: params.host.clone(),
            port: params.port,
            source,
        })?;
        stream.set_nodelay(true)?;

        self.attach(stream, params, events).await
    }

    fn send_raw_line(&self, line: &str) {
        match self.state.handle.lock().as_ref() {
            Some(handle) => {
                if handle.tx.send(Outbound::Line(line.to_string())).is_err() {
                    debug!("Session task gone, dropping line");
                }
            }
            None => debug!("Not connected, dropping line"),
        }
    }

    fn is_connected(&self) -> bool {
        self.state
            .handle
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.tx.is_closed())
    }

    fn disconnect(&self, reason: Option<&str>) {
        if let Some(handle) = self.state.handle.lock().take() {
            let _ = handle.tx.send(Outbound::Quit(reason.map(str::to_string)));
        }
    }
}

fn log_line(verbose: bool, direction: &str, line: &dyn std::fmt::Display) {
    if verbose {
        info!("{} {}", direction, line);
    } else {
        trace!("{} {}", direction, line);
    }
}

async fn send_line<S>(
    connection: &mut IrcConnection<S>,
    message: IrcMessage,
    verbose: bool,
) -> ConnectionResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    log_line(verbose, ">>", &message);
    connection.send(message).await
}

/// Send registration lines and read until the welcome reply.
///
/// Returns the events produced along the way.
async fn register<S>(
    connection: &mut IrcConnection<S>,
    session: &mut IrcSession,
    verbose: bool,
) -> ConnectionResult<Vec<IrcEvent>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    for line in session.registration_lines() {
        send_line(connection, line, verbose).await?;
    }

    let mut buffered = Vec::new();
    while !session.is_registered() {
        let message = match connection.next().await {
            Some(message) => message?,
            None => return Err(ConnectionError::ConnectionClosed),
        };
        log_line(verbose, "<<", &message);

        let step = session.handle(&message)?;
        for reply in step.replies {
            send_line(connection, reply, verbose).await?;
        }
        buffered.extend(step.events);
    }
    Ok(buffered)
}

async fn run_session<S>(
    mut connection: IrcConnection<S>,
    mut session: IrcSession,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<IrcEvent>,
    state: Arc<TransportState>,
    id: u64,
    verbose: bool,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let reason = loop {
        tokio::select! {
            frame = connection.next() => {
                match frame {
                    Some(Ok(message)) => {
                        log_line(verbose, "<<", &message);
                        let step = match session.handle(&message) {
                            Ok(step) => step,
                            Err(e) => break e.to_string(),
                        };
                        let mut failed = None;
                        for reply in step.replies {
                            if let Err(e) = send_line(&mut connection, reply, verbose).await {
                                failed = Some(e.to_string());
                                break;
                            }
                        }
                        for event in step.events {
                            let _ = events.send(event);
                        }
                        if let Some(reason) = failed {
                            break reason;
                        }
                    }
                    // A server ERROR is usually followed by a reset; its reason wins
                    Some(Err(e)) => {
                        break session
                            .last_error()
                            .map_or_else(|| e.to_string(), str::to_string)
                    }
                    None => {
                        break session
                            .last_error()
                            .unwrap_or("Connection closed by remote")
                            .to_string()
                    }
                }
            }

            command = rx.recv() => {
                match command {
                    Some(Outbound::Line(line)) => {
                        log_line(verbose, ">>", &line);
                        if let Err(e) = connection.send(line).await {
                            break e.to_string();
                        }
                    }
                    Some(Outbound::Quit(reason)) => {
                        let quit = IrcMessage::quit(reason.as_deref());
                        if let Err(e) = send_line(&mut connection, quit, verbose).await {
                            warn!("Failed to send QUIT: {}", e);
                        }
                        let _ = SinkExt::<IrcMessage>::close(&mut connection).await;
                        break "Disconnected by request".to_string();
                    }
                    None => break "Session handle dropped".to_string(),
                }
            }
        }
    };

    {
        let mut handle = state.handle.lock();
        if handle.as_ref().is_some_and(|h| h.id == id) {
            *handle = None;
        }
    }

    info!("IRC session ended: {}", reason);
    let _ = events.send(IrcEvent::Disconnected { reason });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    fn params_for(port: u16) -> ConnectParams {
        ConnectParams {
            host: "127.0.0.1".to_string(),
            port,
            nick: "mc_Steve".to_string(),
            username: "Steve".to_string(),
            ..ConnectParams::default()
        }
    }

    async fn read_line(reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>) -> String {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        line.trim_end().to_string()
    }

    #[tokio::test]
    async fn test_register_with_nick_retry_and_exchange_lines() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read, mut write) = socket.into_split();
            let mut reader = BufReader::new(read);

            assert_eq!(read_line(&mut reader).await, "NICK mc_Steve");
            assert_eq!(read_line(&mut reader).await, "USER Steve 0 * :IRCTransport");
            write
                .write_all(b":irc.test 433 * mc_Steve :Nickname is already in use.\r\n")
                .await
                .unwrap();
            assert_eq!(read_line(&mut reader).await, "NICK mc_Steve1");
            write
                .write_all(b":irc.test 001 mc_Steve1 :Welcome\r\nPING :keepalive\r\n")
                .await
                .unwrap();
            // PONG and the queued message race each other
            let mut lines = vec![read_line(&mut reader).await, read_line(&mut reader).await];
            lines.sort();
            assert_eq!(lines, vec!["PONG keepalive", "PRIVMSG #mc :hello there"]);
            write
                .write_all(b":alex!a@h PRIVMSG #mc :hi Steve\r\n")
                .await
                .unwrap();
            assert_eq!(read_line(&mut reader).await, "QUIT bye");
        });

        let transport = TcpTransport::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        transport.connect(&params_for(port), tx).await.unwrap();
        assert!(transport.is_connected());

        // Registration-time events arrive first
        assert!(matches!(
            rx.recv().await.unwrap(),
            IrcEvent::ServerResponse { code: 433, .. }
        ));
        assert_eq!(
            rx.recv().await.unwrap(),
            IrcEvent::Registered {
                nick: "mc_Steve1".to_string()
            }
        );

        transport.send_raw_line("PRIVMSG #mc :hello there");
        loop {
            if let IrcEvent::Message { message, .. } = rx.recv().await.unwrap() {
                assert_eq!(message, "hi Steve");
                break;
            }
        }

        transport.disconnect(Some("bye"));
        assert!(!transport.is_connected());
        loop {
            if let IrcEvent::Disconnected { reason } = rx.recv().await.unwrap() {
                assert_eq!(reason, "Disconnected by request");
                break;
            }
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_remote_close_reports_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = socket.into_split();
            let mut reader = BufReader::new(read_half);

            // Consume registration so closing does not reset the connection
            assert!(read_line(&mut reader).await.starts_with("NICK "));
            assert!(read_line(&mut reader).await.starts_with("USER "));
            write_half
                .write_all(b":irc.test 001 mc_Steve :Welcome\r\nERROR :Closing Link: K-lined\r\n")
                .await
                .unwrap();
        });

        let transport = TcpTransport::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        transport.connect(&params_for(port), tx).await.unwrap();

        loop {
            if let IrcEvent::Disconnected { reason } = rx.recv().await.unwrap() {
                assert_eq!(reason, "Closing Link: K-lined");
                break;
            }
        }
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_reset_after_error_reports_server_reason() {
        let stream = tokio_test::io::Builder::new()
            .write(b"NICK mc_Steve\r\nUSER Steve 0 * :IRCTransport\r\n")
            .read(b":irc.test 001 mc_Steve :Welcome\r\nERROR :Closing Link: K-lined\r\n")
            .read_error(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset",
            ))
            .build();
        let transport = TcpTransport::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let params = ConnectParams {
            nick: "mc_Steve".to_string(),
            username: "Steve".to_string(),
            ..ConnectParams::default()
        };

        transport.attach(stream, &params, tx).await.unwrap();

        loop {
            if let IrcEvent::Disconnected { reason } = rx.recv().await.unwrap() {
                assert_eq!(reason, "Closing Link: K-lined");
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let transport = TcpTransport::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = transport.connect(&params_for(port), tx).await;

        assert!(matches!(result, Err(ConnectionError::ConnectFailed { .. })));
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_registration_timeout() {
        let (client, _server) = tokio::io::duplex(1024);
        let transport = TcpTransport::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let params = ConnectParams {
            registration_timeout: Duration::from_millis(50),
            nick: "mc_Steve".to_string(),
            ..ConnectParams::default()
        };

        let result = transport.attach(client, &params, tx).await;
        assert!(matches!(
            result,
            Err(ConnectionError::Timeout {
                stage: "registration"
            })
        ));
    }

    #[tokio::test]
    async fn test_erroneous_nick_fails_registration() {
        let stream = tokio_test::io::Builder::new()
            .write(b"NICK mc_Steve\r\nUSER Steve 0 * :IRCTransport\r\n")
            .read(b":irc.test 432 * mc_Steve :Erroneous Nickname\r\n")
            .build();
        let transport = TcpTransport::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let params = ConnectParams {
            nick: "mc_Steve".to_string(),
            username: "Steve".to_string(),
            ..ConnectParams::default()
        };

        let result = transport.attach(stream, &params, tx).await;
        assert!(matches!(result, Err(ConnectionError::RegistrationFailed { .. })));
        assert!(!transport.is_connected());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_while_disconnected_is_dropped() {
        let transport = TcpTransport::new();
        transport.send_raw_line("PRIVMSG #mc :nobody hears this");
        transport.disconnect(None);
        assert!(!transport.is_connected());
    }
}

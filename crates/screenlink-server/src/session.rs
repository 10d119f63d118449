//! Client-session lifecycle: listen, accept, handshake, pump, teardown.
//!
//! One task per connection.  The session handshakes under a deadline,
//! registers a [`ClientProxy`] with the server, spawns a writer task that
//! drains the proxy's outbound queue, then pumps inbound messages until the
//! peer says goodbye, misbehaves, or the session is cancelled.  Whatever the
//! exit path, the connection is unregistered and the socket closed.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use screenlink_core::protocol::codec;
use screenlink_core::protocol::messages::{
    Message, MAX_MESSAGE_LENGTH, PROTOCOL_MAJOR, PROTOCOL_MINOR,
};
use screenlink_core::{ClientInfo, ScreenShape};

use crate::client::ClientProxy;
use crate::error::SessionError;
use crate::screen::ScreenSink;
use crate::server::Server;

/// A client must finish the whole handshake within this window.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Pause between attempts to bind a busy listen address.
pub const BIND_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// How long shutdown waits for session tasks before giving up on them.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Admin connections served concurrently.
pub const ADMIN_MAX_CONNECTIONS: usize = 3;

// ── Admin endpoint ────────────────────────────────────────────────────────────

/// Serves one admitted admin connection.
///
/// The supervisor only provides the accept loop and its concurrency bound; a
/// richer admin surface plugs in here.
#[async_trait::async_trait]
pub trait AdminHandler: Send + Sync {
    async fn handle(&self, server: &Server, stream: TcpStream) -> std::io::Result<()>;
}

/// Minimal plain-text status responder.
pub struct StatusHandler;

#[async_trait::async_trait]
impl AdminHandler for StatusHandler {
    async fn handle(&self, server: &Server, mut stream: TcpStream) -> std::io::Result<()> {
        let screens = server.connected_screens();
        let mut body = format!("screenlink: {} screen(s) connected\n", screens.len());
        for screen in screens {
            body.push_str(&screen);
            body.push('\n');
        }
        stream.write_all(body.as_bytes()).await?;
        stream.shutdown().await
    }
}

// ── Supervisor ────────────────────────────────────────────────────────────────

/// Owns the acceptors and every session task.
pub struct SessionSupervisor {
    server: Arc<Server>,
    tracker: TaskTracker,
    admin_handler: Arc<dyn AdminHandler>,
}

impl SessionSupervisor {
    pub fn new(server: Arc<Server>) -> Self {
        Self {
            server,
            tracker: TaskTracker::new(),
            admin_handler: Arc::new(StatusHandler),
        }
    }

    /// Replaces the admin-connection handler.
    pub fn with_admin_handler(mut self, handler: Arc<dyn AdminHandler>) -> Self {
        self.admin_handler = handler;
        self
    }

    /// Binds the configured addresses and starts accepting.
    ///
    /// Returns the bound client-listener address (useful when the config
    /// asked for port 0).
    ///
    /// # Errors
    ///
    /// [`SessionError::Bind`] once the bind timeout is exhausted — fatal, the
    /// server cannot serve clients.
    pub async fn start(&self) -> Result<SocketAddr, SessionError> {
        let shutdown = self.server.shutdown_token();
        let config = self.server.config();

        let address = config.server_address();
        let listener = bind_with_retry(&address, self.server.bind_timeout(), &shutdown).await?;
        let local_addr = listener.local_addr()?;
        info!(address = %local_addr, "listening for clients");
        self.tracker.spawn(accept_loop(
            Arc::clone(&self.server),
            listener,
            self.tracker.clone(),
        ));

        if let Some(admin_address) = config.admin_address() {
            let admin_listener =
                bind_with_retry(admin_address, self.server.bind_timeout(), &shutdown).await?;
            let admin_local = admin_listener.local_addr()?;
            info!(address = %admin_local, "admin endpoint listening");
            self.tracker.spawn(admin_loop(
                Arc::clone(&self.server),
                admin_listener,
                Arc::clone(&self.admin_handler),
                self.tracker.clone(),
            ));
        }

        Ok(local_addr)
    }

    /// Blocks until shutdown is requested, then tears everything down.
    pub async fn wait(&self) {
        self.server.shutdown_token().cancelled().await;
        self.shutdown().await;
    }

    /// Serves until shutdown: [`start`](Self::start) + [`wait`](Self::wait).
    pub async fn run(&self) -> Result<(), SessionError> {
        self.start().await?;
        self.wait().await;
        Ok(())
    }

    async fn shutdown(&self) {
        info!("stopping server");
        // session tasks run on child tokens of the shutdown token, so they
        // are already cancelled; give them the grace period to unwind
        self.tracker.close();
        if tokio::time::timeout(SHUTDOWN_GRACE, self.tracker.wait())
            .await
            .is_err()
        {
            warn!("session tasks did not stop within the grace period");
        }
        self.server.close_primary();
        info!("stopped server");
    }
}

// ── Accept loops ──────────────────────────────────────────────────────────────

/// Binds `address`, retrying while it is busy until `bind_timeout` elapses.
async fn bind_with_retry(
    address: &str,
    bind_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<TcpListener, SessionError> {
    let started = tokio::time::Instant::now();
    loop {
        match TcpListener::bind(address).await {
            Ok(listener) => return Ok(listener),
            Err(e) => {
                if started.elapsed() >= bind_timeout {
                    error!(address, error = %e, "waited too long to bind, giving up");
                    return Err(SessionError::Bind {
                        addr: address.to_string(),
                        source: e,
                    });
                }
                debug!(address, error = %e, "bind failed, retrying");
                tokio::select! {
                    _ = tokio::time::sleep(BIND_RETRY_INTERVAL) => {}
                    _ = cancel.cancelled() => return Err(SessionError::Cancelled),
                }
            }
        }
    }
}

async fn accept_loop(server: Arc<Server>, listener: TcpListener, tracker: TaskTracker) {
    let shutdown = server.shutdown_token();
    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((stream, peer)) => {
                info!(%peer, "accepted client connection");
                tracker.spawn(run_session(Arc::clone(&server), stream));
            }
            Err(e) => {
                // transient accept failures (e.g. fd exhaustion) must not
                // spin the loop
                warn!(error = %e, "accept failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
    debug!("accept loop stopped");
}

async fn admin_loop(
    server: Arc<Server>,
    listener: TcpListener,
    handler: Arc<dyn AdminHandler>,
    tracker: TaskTracker,
) {
    let shutdown = server.shutdown_token();
    let permits = Arc::new(Semaphore::new(ADMIN_MAX_CONNECTIONS));
    loop {
        // take a permit before accepting so admissions stay bounded
        let permit = tokio::select! {
            _ = shutdown.cancelled() => break,
            permit = Arc::clone(&permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((stream, peer)) => {
                debug!(%peer, "accepted admin connection");
                let server = Arc::clone(&server);
                let handler = Arc::clone(&handler);
                tracker.spawn(async move {
                    let _permit = permit;
                    if let Err(e) = handler.handle(&server, stream).await {
                        debug!(error = %e, "admin connection failed");
                    }
                });
            }
            Err(e) => {
                warn!(error = %e, "admin accept failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
    debug!("admin loop stopped");
}

// ── Session ───────────────────────────────────────────────────────────────────

async fn run_session(server: Arc<Server>, stream: TcpStream) {
    let (mut reader, mut writer) = stream.into_split();

    let handshake_result = tokio::time::timeout(
        HANDSHAKE_TIMEOUT,
        handshake(&server, &mut reader, &mut writer),
    )
    .await;
    let (name, version, info) = match handshake_result {
        Ok(Ok(negotiated)) => negotiated,
        Ok(Err(e)) => {
            fail_handshake(&mut writer, &e).await;
            return;
        }
        Err(_) => {
            warn!("client handshake timed out");
            let _ = codec::write_frame(&mut writer, &Message::Bad).await;
            return;
        }
    };

    let token = server.shutdown_token().child_token();
    let (tx, rx) = mpsc::unbounded_channel();
    let proxy = Arc::new(ClientProxy::new(name.clone(), version, info, tx));

    if let Err(e) = server.add_connection(Arc::clone(&proxy) as Arc<dyn ScreenSink>, Some(token.clone())) {
        let reply = match &e {
            SessionError::DuplicateClient(_) => {
                warn!(client = %name, "a client with this name is already connected");
                Message::Busy
            }
            SessionError::UnknownClient(_) => {
                warn!(client = %name, "client name is not in the screen map");
                Message::UnknownName
            }
            _ => Message::Bad,
        };
        let _ = codec::write_frame(&mut writer, &reply).await;
        return;
    }

    let writer_task = tokio::spawn(write_loop(rx, writer, token.clone()));

    // a client joining during an active screensaver hears about it right away
    if server.is_screensaver_active() {
        proxy.screensaver(true);
    }

    info!(client = %name, major = version.0, minor = version.1, "client connected");
    let result = pump(&server, &proxy, &mut reader, &token).await;
    match &result {
        Ok(()) => info!(client = %name, "client closed its session"),
        Err(SessionError::Cancelled) => debug!(client = %name, "session cancelled"),
        Err(SessionError::BadClient(reason)) => {
            warn!(client = %name, reason, "protocol error from client");
            proxy.send(Message::Bad);
        }
        Err(e) => warn!(client = %name, error = %e, "error communicating with client"),
    }

    server.remove_connection(&name);
    // dropping our handles closes the queue once the server's copy is gone;
    // the writer drains what is left (e.g. the EBAD) and shuts the socket
    drop(proxy);
    let _ = tokio::time::timeout(Duration::from_secs(1), writer_task).await;
}

/// Greeting, version negotiation, and the info exchange.
async fn handshake(
    server: &Server,
    reader: &mut OwnedReadHalf,
    writer: &mut OwnedWriteHalf,
) -> Result<(String, (i16, i16), ClientInfo), SessionError> {
    debug!("saying hello");
    codec::write_hello(writer, PROTOCOL_MAJOR, PROTOCOL_MINOR).await?;

    let (major, minor, name) = codec::read_hello_reply(reader).await?;
    debug!(%name, major, minor, "parsed hello reply");

    if major < 0 || minor < 0 {
        return Err(SessionError::BadClient(
            "negative protocol version".to_string(),
        ));
    }
    // test builds (major 0) may not talk to release servers
    if major == 0 && PROTOCOL_MAJOR != 0 {
        return Err(SessionError::IncompatibleClient { major, minor });
    }
    if major > PROTOCOL_MAJOR || (major == PROTOCOL_MAJOR && minor > PROTOCOL_MINOR) {
        return Err(SessionError::IncompatibleClient { major, minor });
    }
    // the client's minor is the highest both sides support at this point
    let version = (major, minor);

    // canonicalize known names; unknown ones are refused at registration
    let name = server
        .config()
        .canonical_name(&name)
        .map(str::to_string)
        .unwrap_or(name);

    debug!(client = %name, "requesting screen info");
    codec::write_frame(writer, &Message::QueryInfo).await?;
    let info = loop {
        match codec::read_message(reader, MAX_MESSAGE_LENGTH).await? {
            Message::Info {
                x,
                y,
                w,
                h,
                zone,
                mx,
                my,
            } => {
                break ClientInfo {
                    shape: ScreenShape::new(x as i32, y as i32, w as i32, h as i32),
                    zone_size: zone as i32,
                    mx: mx as i32,
                    my: my as i32,
                }
            }
            Message::Noop | Message::KeepAlive => continue,
            other => {
                return Err(SessionError::BadClient(format!(
                    "expected screen info, got {}",
                    other.code_str()
                )));
            }
        }
    };
    codec::write_frame(writer, &Message::InfoAck).await?;

    // bring the client's options in line with the adopted map
    codec::write_frame(writer, &Message::ResetOptions).await?;
    let options = server.config().option_pairs();
    if !options.is_empty() {
        codec::write_frame(writer, &Message::SetOptions(options)).await?;
    }

    Ok((name, version, info))
}

/// Writes the error reply a failed handshake owes the peer, if any.
async fn fail_handshake(writer: &mut OwnedWriteHalf, error: &SessionError) {
    match error {
        SessionError::IncompatibleClient { major, minor } => {
            warn!(major, minor, "client has incompatible version");
            let _ = codec::write_frame(
                writer,
                &Message::Incompatible {
                    major: PROTOCOL_MAJOR,
                    minor: PROTOCOL_MINOR,
                },
            )
            .await;
        }
        SessionError::BadClient(reason) => {
            warn!(reason, "protocol error during handshake");
            let _ = codec::write_frame(writer, &Message::Bad).await;
        }
        SessionError::Protocol(e) => {
            warn!(error = %e, "unparseable handshake");
            let _ = codec::write_frame(writer, &Message::Bad).await;
        }
        e => warn!(error = %e, "handshake failed"),
    }
}

/// Drains the proxy's outbound queue onto the socket.
async fn write_loop(
    mut rx: mpsc::UnboundedReceiver<Message>,
    mut writer: OwnedWriteHalf,
    cancel: CancellationToken,
) {
    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => break,
            msg = rx.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };
        if let Err(e) = codec::write_frame(&mut writer, &msg).await {
            debug!(error = %e, "client write failed");
            break;
        }
    }
    let _ = writer.shutdown().await;
}

/// Demultiplexes inbound messages until the session ends.
async fn pump(
    server: &Arc<Server>,
    proxy: &Arc<ClientProxy>,
    reader: &mut OwnedReadHalf,
    cancel: &CancellationToken,
) -> Result<(), SessionError> {
    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => return Err(SessionError::Cancelled),
            msg = codec::read_message(reader, MAX_MESSAGE_LENGTH) => msg?,
        };
        match msg {
            Message::Noop => {}
            Message::KeepAlive => proxy.send(Message::KeepAlive),
            Message::Bye => return Ok(()),
            msg @ Message::Info { .. } => {
                if let Some(info) = ClientInfo::from_message(&msg) {
                    proxy.set_info(info);
                    server.client_info_changed(proxy.name(), info)?;
                    proxy.send(Message::InfoAck);
                }
            }
            Message::ClipboardGrab { id, seq } => {
                server.client_grab_clipboard(proxy.name(), id, seq)?;
            }
            Message::ClipboardData { id, seq, data } => {
                server.client_clipboard_changed(id, seq, data);
            }
            other => {
                return Err(SessionError::BadClient(format!(
                    "unexpected command {}",
                    other.code_str()
                )));
            }
        }
    }
}

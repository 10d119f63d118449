//! The server singleton: shared state, client registration, and
//! configuration swaps.
//!
//! All shared state — the adopted config, the connected-client map, switch
//! state, and the clipboard registry — lives in one [`ServerState`] behind a
//! single mutex.  Every state-mutating entry point takes that lock; nothing
//! holds it across a blocking socket operation (outbound commands go through
//! the proxies' non-blocking queues).

pub mod clipboard;
pub mod router;
pub mod switch;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use screenlink_core::{
    domain::config::Direction, ClientInfo, ClipboardId, ScreenConfig, SequenceCounter,
};

use crate::client::PrimaryClient;
use crate::error::SessionError;
use crate::platform::PlatformScreen;
use crate::screen::ScreenSink;
use self::clipboard::ClipboardInfo;

/// How long the acceptor keeps retrying a busy listen address.
pub const DEFAULT_BIND_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Where the cursor was when the screensaver kicked in.
pub(crate) struct SaverState {
    pub screen: String,
    pub x: i32,
    pub y: i32,
}

/// Everything protected by the server lock.
pub(crate) struct ServerState {
    pub config: ScreenConfig,
    /// Connected screens by canonical name, the primary included.
    pub clients: HashMap<String, Arc<dyn ScreenSink>>,
    /// Cancellation tokens for remote sessions, keyed like `clients`.
    pub session_tokens: HashMap<String, CancellationToken>,
    pub primary: Option<Arc<PrimaryClient>>,
    /// Canonical name of the screen currently receiving input.
    pub active: String,
    /// Cursor position on the active screen.
    pub x: i32,
    pub y: i32,
    pub seq: SequenceCounter,
    pub saver: Option<SaverState>,
    pub clipboards: [ClipboardInfo; ClipboardId::COUNT],
}

impl ServerState {
    fn new(config: ScreenConfig) -> Self {
        Self {
            config,
            clients: HashMap::new(),
            session_tokens: HashMap::new(),
            primary: None,
            active: String::new(),
            x: 0,
            y: 0,
            seq: SequenceCounter::new(),
            saver: None,
            clipboards: Default::default(),
        }
    }

    pub(crate) fn primary_name(&self) -> Option<&str> {
        self.primary.as_deref().map(PrimaryClient::name)
    }

    pub(crate) fn active_is_primary(&self) -> bool {
        self.primary_name() == Some(self.active.as_str())
    }

    pub(crate) fn active_sink(&self) -> Option<Arc<dyn ScreenSink>> {
        self.clients.get(&self.active).cloned()
    }

    /// Mask of primary-screen sides that currently have neighbor links.
    pub(crate) fn active_primary_sides(&self) -> u32 {
        let Some(name) = self.primary_name() else {
            return 0;
        };
        let mut mask = 0;
        for dir in Direction::ALL {
            if self.config.neighbor(name, dir).is_some() {
                mask |= dir.mask();
            }
        }
        mask
    }

    fn add_connection(
        &mut self,
        client: Arc<dyn ScreenSink>,
        token: Option<CancellationToken>,
    ) -> Result<(), SessionError> {
        let name = client.name().to_string();
        if !self.config.is_screen(&name) {
            return Err(SessionError::UnknownClient(name));
        }
        if self.clients.contains_key(&name) {
            return Err(SessionError::DuplicateClient(name));
        }
        debug!(screen = %name, "added connection");
        if let Some(token) = token {
            self.session_tokens.insert(name.clone(), token);
        }
        self.clients.insert(name, client);
        Ok(())
    }

    fn remove_connection(&mut self, name: &str) {
        if self.clients.remove(name).is_none() {
            return;
        }
        debug!(screen = %name, "removed connection");
        self.session_tokens.remove(name);

        // if the removed screen held the cursor (directly, or as the screen
        // the screensaver will restore to) jump home to the primary
        let jump_target = self
            .saver
            .as_ref()
            .map(|s| s.screen.clone())
            .unwrap_or_else(|| self.active.clone());
        if jump_target == name {
            if let Some(primary) = self.primary.clone() {
                if primary.name() != name {
                    let (cx, cy) = primary.cursor_center();
                    self.x = cx;
                    self.y = cy;
                    info!(
                        from = %name,
                        to = %primary.name(),
                        x = cx,
                        y = cy,
                        "active screen vanished; jumping to primary"
                    );
                    self.active = primary.name().to_string();
                    // unless the screensaver already forced us onto the
                    // primary, re-enter it at the cursor's new home
                    if self.saver.is_none() {
                        let mask = primary.toggle_mask();
                        primary.enter(cx, cy, self.seq.current(), mask, false);
                    }
                }
            }
        }

        // the saver screen can no longer be restored to
        if self.saver.as_ref().is_some_and(|s| s.screen == name) {
            self.saver = None;
        }
    }
}

/// The screenlink server.
///
/// Owns all proxies; sessions hold only a non-owning `Arc` back to it, and
/// shutdown cancels and drains the session tasks before the proxies drop, so
/// no late callback can observe a dead server.
pub struct Server {
    name: String,
    bind_timeout: Duration,
    state: Mutex<ServerState>,
    shutdown: CancellationToken,
}

impl Server {
    /// Creates a server that will present `name` as its primary screen.
    pub fn new(name: impl Into<String>, config: ScreenConfig) -> Self {
        Self {
            name: name.into(),
            bind_timeout: DEFAULT_BIND_TIMEOUT,
            state: Mutex::new(ServerState::new(config)),
            shutdown: CancellationToken::new(),
        }
    }

    /// Overrides how long the acceptor retries a busy listen address.
    pub fn with_bind_timeout(mut self, timeout: Duration) -> Self {
        self.bind_timeout = timeout;
        self
    }

    /// The (possibly non-canonical) name this server was started with.
    pub fn screen_name(&self) -> &str {
        &self.name
    }

    pub fn bind_timeout(&self) -> Duration {
        self.bind_timeout
    }

    /// Token cancelled when the server should stop.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Requests an orderly shutdown.
    pub fn request_shutdown(&self) {
        self.shutdown.cancel();
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().expect("server lock poisoned")
    }

    // ── Primary screen lifecycle ──────────────────────────────────────────────

    /// Opens the primary screen and registers it as the active screen.
    ///
    /// # Errors
    ///
    /// [`SessionError::UnknownClient`] if the server's name is not in the
    /// map, [`SessionError::ScreenOpen`] if the driver fails.  Both are
    /// fatal: the server cannot run without its own screen.
    pub fn open_primary(&self, platform: Arc<dyn PlatformScreen>) -> Result<(), SessionError> {
        let mut state = self.lock_state();

        let canonical = state
            .config
            .canonical_name(&self.name)
            .ok_or_else(|| SessionError::UnknownClient(self.name.clone()))?
            .to_string();

        // fresh switch state: sequence restarts and the primary owns empty
        // clipboards
        state.seq.reset();
        for id in ClipboardId::ALL {
            state.clipboards[id.index()] = ClipboardInfo {
                owner: canonical.clone(),
                seq: 0,
                data: Vec::new(),
            };
        }

        let primary = Arc::new(PrimaryClient::new(canonical.clone(), platform));
        state.add_connection(primary.clone() as Arc<dyn ScreenSink>, None)?;

        info!(screen = %canonical, "opening primary screen");
        if let Err(e) = primary.open() {
            state.remove_connection(&canonical);
            return Err(SessionError::ScreenOpen(e.to_string()));
        }

        state.active = canonical;
        let (cx, cy) = primary.cursor_center();
        state.x = cx;
        state.y = cy;
        state.primary = Some(primary.clone());

        let sides = state.active_primary_sides();
        primary.reconfigure(sides);
        Ok(())
    }

    /// Closes the primary screen and unregisters it.
    pub fn close_primary(&self) {
        let mut state = self.lock_state();
        if let Some(primary) = state.primary.take() {
            info!(screen = %primary.name(), "closing primary screen");
            primary.close();
            let name = primary.name().to_string();
            state.remove_connection(&name);
        }
    }

    // ── Client registration ───────────────────────────────────────────────────

    /// Registers a connected screen.
    ///
    /// # Errors
    ///
    /// [`SessionError::UnknownClient`] when the name is not in the map,
    /// [`SessionError::DuplicateClient`] when the name is already connected.
    pub fn add_connection(
        &self,
        client: Arc<dyn ScreenSink>,
        token: Option<CancellationToken>,
    ) -> Result<(), SessionError> {
        self.lock_state().add_connection(client, token)
    }

    /// Unregisters a screen; jumps the cursor home if it was active.
    pub fn remove_connection(&self, name: &str) {
        self.lock_state().remove_connection(name);
    }

    /// Names of all connected screens, primary included.
    pub fn connected_screens(&self) -> Vec<String> {
        let state = self.lock_state();
        let mut names: Vec<String> = state.clients.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// `true` while the server-side screensaver is active.
    pub fn is_screensaver_active(&self) -> bool {
        self.lock_state().saver.is_some()
    }

    /// Current owner and grab sequence of clipboard `id`.
    pub fn clipboard_owner(&self, id: ClipboardId) -> (String, u32) {
        let state = self.lock_state();
        let entry = &state.clipboards[id.index()];
        (entry.owner.clone(), entry.seq)
    }

    // ── Configuration ─────────────────────────────────────────────────────────

    /// A copy of the adopted config.
    pub fn config(&self) -> ScreenConfig {
        self.lock_state().config.clone()
    }

    /// Atomically replaces the screen map.
    ///
    /// Returns `false` (and changes nothing) if the new map does not include
    /// the primary screen.  Clients whose names are not canonical in the new
    /// map are disconnected first, with a short pause so peers observe a
    /// clean EOF.
    pub async fn set_config(&self, config: ScreenConfig) -> bool {
        {
            let state = self.lock_state();
            if let Some(primary) = state.primary_name() {
                if !config.is_screen(primary) {
                    warn!("rejecting config that drops the primary screen");
                    return false;
                }
            }
        }

        // disconnect clients being dropped (or whose canonical name changes)
        let doomed: Vec<(String, CancellationToken)> = {
            let state = self.lock_state();
            state
                .session_tokens
                .iter()
                .filter(|(name, _)| config.canonical_name(name) != Some(name.as_str()))
                .map(|(name, token)| (name.clone(), token.clone()))
                .collect()
        };
        if !doomed.is_empty() {
            for (name, token) in &doomed {
                info!(screen = %name, "disconnecting client dropped by new config");
                token.cancel();
            }
            // let each client see EOF before we move on
            tokio::time::sleep(Duration::from_secs(1)).await;
            let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
            while tokio::time::Instant::now() < deadline {
                let any_left = {
                    let state = self.lock_state();
                    doomed.iter().any(|(name, _)| state.clients.contains_key(name))
                };
                if !any_left {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }

        let mut state = self.lock_state();
        state.config = config;
        let sides = state.active_primary_sides();
        if let Some(primary) = &state.primary {
            primary.reconfigure(sides);
        }
        true
    }

    // ── Inbound client events ─────────────────────────────────────────────────

    /// A connected screen reported new shape/position info.
    pub fn client_info_changed(&self, name: &str, info: ClientInfo) -> Result<(), SessionError> {
        self.lock_state().info_changed(name, info)
    }

    /// A connected screen grabbed one of its clipboards.
    pub fn client_grab_clipboard(
        &self,
        name: &str,
        id: ClipboardId,
        seq: u32,
    ) -> Result<(), SessionError> {
        self.lock_state().grab_clipboard(name, id, seq).map(|_| ())
    }

    /// A connected screen pushed new clipboard contents.
    pub fn client_clipboard_changed(&self, id: ClipboardId, seq: u32, data: Vec<u8>) {
        self.lock_state().clipboard_changed(id, seq, data);
    }
}

// ── Test support ──────────────────────────────────────────────────────────────

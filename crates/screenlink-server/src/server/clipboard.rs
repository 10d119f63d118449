//! Per-clipboard ownership, sequencing, and propagation.
//!
//! Every clipboard has exactly one owner screen at a time.  Grabs and
//! updates carry the sequence number the reporting screen was last entered
//! with; anything older than the clipboard's recorded sequence is a stale
//! report from before a switch and is dropped.  That rule alone makes
//! concurrent grabs converge without conflict.

use tracing::{debug, info, warn};

use screenlink_core::ClipboardId;

use super::ServerState;
use crate::error::SessionError;
use crate::screen::ScreenSink;

/// Registry entry for one clipboard id.
#[derive(Debug, Clone, Default)]
pub(crate) struct ClipboardInfo {
    /// Canonical name of the owning screen.
    pub owner: String,
    /// Sequence number of the grab that made `owner` the owner.
    pub seq: u32,
    /// Cached marshalled contents; empty right after a grab until the owner
    /// pushes data.
    pub data: Vec<u8>,
}

impl ServerState {
    /// A screen took ownership of clipboard `id`.
    ///
    /// Returns `Ok(false)` for stale grabs (non-primary screens only; the
    /// primary may always grab).  On success every other screen is told to
    /// relinquish ownership and the grabber's dirty flag is cleared.
    ///
    /// # Errors
    ///
    /// [`SessionError::BadClient`] when `name` is not a connected screen.
    pub(crate) fn grab_clipboard(
        &mut self,
        name: &str,
        id: ClipboardId,
        seq: u32,
    ) -> Result<bool, SessionError> {
        if !self.clients.contains_key(name) {
            return Err(SessionError::BadClient(format!(
                "clipboard grab from unregistered screen \"{name}\""
            )));
        }

        let is_primary = self.primary_name() == Some(name);
        {
            let entry = &self.clipboards[id.index()];
            if !is_primary && seq < entry.seq {
                info!(
                    screen = %name,
                    clipboard = id.index(),
                    "ignored stale clipboard grab"
                );
                return Ok(false);
            }
        }

        let entry = &mut self.clipboards[id.index()];
        let previous = std::mem::replace(&mut entry.owner, name.to_string());
        entry.seq = seq;
        // contents are unknown until the new owner pushes them
        entry.data.clear();
        info!(
            screen = %name,
            from = %previous,
            clipboard = id.index(),
            "clipboard grabbed"
        );

        for (screen, client) in &self.clients {
            if screen == name {
                client.set_clipboard_dirty(id, false);
            } else {
                client.grab_clipboard(id);
            }
        }
        Ok(true)
    }

    /// The owner of clipboard `id` pushed new contents.
    ///
    /// Missequenced and no-op updates are dropped; otherwise the cache is
    /// replaced, every non-owner is marked dirty, and the active screen gets
    /// the new contents immediately.
    pub(crate) fn clipboard_changed(&mut self, id: ClipboardId, seq: u32, data: Vec<u8>) {
        let owner = {
            let entry = &self.clipboards[id.index()];
            if seq < entry.seq {
                info!(
                    screen = %entry.owner,
                    clipboard = id.index(),
                    "ignored clipboard update (missequenced)"
                );
                return;
            }
            if data == entry.data {
                debug!(
                    screen = %entry.owner,
                    clipboard = id.index(),
                    "ignored clipboard update (unchanged)"
                );
                return;
            }
            entry.owner.clone()
        };

        info!(screen = %owner, clipboard = id.index(), bytes = data.len(), "clipboard updated");
        self.clipboards[id.index()].data = data;

        for (screen, client) in &self.clients {
            client.set_clipboard_dirty(id, screen != &owner);
        }
        if let Some(active) = self.active_sink() {
            active.set_clipboard(id, &self.clipboards[id.index()].data);
        }
    }

    /// Re-reads every primary-owned clipboard from the platform and runs it
    /// through [`clipboard_changed`](Self::clipboard_changed).  Called just
    /// before the cursor leaves the primary screen, so remote screens see
    /// whatever was copied locally while the cursor was home.
    pub(crate) fn snapshot_primary_clipboards(&mut self) {
        let Some(primary) = self.primary.clone() else {
            warn!("no primary screen to snapshot clipboards from");
            return;
        };
        let primary_name = primary.name().to_string();
        for id in ClipboardId::ALL {
            let entry = &self.clipboards[id.index()];
            if entry.owner == primary_name {
                let seq = entry.seq;
                let data = primary.read_clipboard(id);
                self.clipboard_changed(id, seq, data);
            }
        }
    }
}

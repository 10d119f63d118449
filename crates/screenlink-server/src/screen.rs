//! The screen abstraction the switch engine routes into.
//!
//! Every connected screen — remote clients and the server's own — is driven
//! through [`ScreenSink`].  The source-side capabilities (lock queries,
//! toggle-key state, clipboard reads) exist only on the primary and live on
//! [`crate::client::primary::PrimaryClient`] directly; remote proxies never
//! provide them.

use screenlink_core::{ClipboardId, ScreenShape};

/// A screen that can receive input, clipboard, and focus events.
///
/// Implementations must be callable while the server lock is held, so none
/// of these methods may block: remote proxies queue commands on a
/// non-blocking channel and a writer task does the socket work.
pub trait ScreenSink: Send + Sync {
    /// Canonical screen name.
    fn name(&self) -> &str;

    /// The screen's rectangle as last reported.
    fn shape(&self) -> ScreenShape;

    /// Width in pixels of this screen's jump zones.
    fn jump_zone_size(&self) -> i32;

    /// The cursor entered this screen at `(x, y)`.
    ///
    /// `seq` is the server's enter sequence number; the client tags its
    /// subsequent reports with it so stale ones can be discarded.  `mask` is
    /// the primary keyboard's current toggle-modifier state.
    fn enter(&self, x: i32, y: i32, seq: u32, mask: u16, for_screensaver: bool);

    /// The cursor is leaving this screen.  Returns `false` if the screen
    /// could not release the cursor (only the primary can refuse, when its
    /// driver fails to install input hooks); a refusal aborts the switch.
    fn leave(&self) -> bool;

    fn key_down(&self, key: u16, mask: u16, button: u16);
    fn key_up(&self, key: u16, mask: u16, button: u16);
    fn key_repeat(&self, key: u16, mask: u16, count: u16, button: u16);

    fn mouse_down(&self, button: u8);
    fn mouse_up(&self, button: u8);
    fn mouse_move(&self, x: i32, y: i32);
    fn mouse_wheel(&self, delta: i32);

    /// The server's screensaver started or stopped.
    fn screensaver(&self, on: bool);

    /// Another screen took ownership of clipboard `id`.
    fn grab_clipboard(&self, id: ClipboardId);

    /// Push the current contents of clipboard `id`.
    fn set_clipboard(&self, id: ClipboardId, data: &[u8]);

    /// Mark whether this screen's copy of clipboard `id` is stale.
    fn set_clipboard_dirty(&self, id: ClipboardId, dirty: bool);
}

//! Abstract primary-screen driver interface.
//!
//! Platform-specific input capture and injection are not part of this crate;
//! the server depends only on these traits.  A real driver (X11, Windows,
//! macOS) implements [`PlatformScreen`] and is constructed with an
//! `Arc<dyn PrimaryReceiver>` — the server — that it calls for every captured
//! event.  The driver is not re-entrant and may only be called from the
//! thread that opened it; drivers post cross-thread requests through their
//! own platform queue.

pub mod mock;

use thiserror::Error;

use screenlink_core::{ClientInfo, ClipboardId, ScreenShape};

/// Raised when the primary screen driver cannot start.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct PlatformError(pub String);

/// The platform driver for the server's own screen.
pub trait PlatformScreen: Send + Sync {
    /// Opens the driver.  Failure is fatal to the server.
    fn open(&self) -> Result<(), PlatformError>;

    /// Shuts the driver down.
    fn close(&self);

    /// The cursor returned to this screen: release exclusive capture and
    /// show the cursor again.
    fn enter(&self);

    /// The cursor left this screen: install input hooks and hide the
    /// cursor.  Returns `false` if the hooks could not be installed.
    fn leave(&self) -> bool;

    /// Teleports the hardware cursor.
    fn warp_cursor(&self, x: i32, y: i32);

    fn shape(&self) -> ScreenShape;
    fn jump_zone_size(&self) -> i32;

    /// Pixel at the center of the screen, used when a vanished client forces
    /// the cursor home.
    fn cursor_center(&self) -> (i32, i32);

    /// `true` while the platform refuses to let the cursor leave (e.g. a
    /// mouse button is held down mid-drag).
    fn is_locked_to_screen(&self) -> bool;

    /// Current toggle-modifier mask (caps/num/scroll lock bits).
    fn toggle_mask(&self) -> u16;

    /// Tells the driver which sides have configured neighbors so jump zones
    /// are only armed there.
    fn reconfigure(&self, active_sides: u32);

    /// Starts or stops the local screensaver in sympathy with the server's.
    fn screensaver(&self, on: bool);

    /// Takes ownership of the local clipboard `id`.
    fn grab_clipboard(&self, id: ClipboardId);

    /// Writes marshalled contents into the local clipboard `id`.
    fn set_clipboard(&self, id: ClipboardId, data: &[u8]);

    /// Reads the local clipboard `id` in marshalled form.
    fn read_clipboard(&self, id: ClipboardId) -> Vec<u8>;
}

/// What the platform driver calls back into for every captured event.
///
/// Implemented by the server; every handler takes the single server lock
/// before consulting the switch engine, then relays to the active screen or
/// mutates switch state.
pub trait PrimaryReceiver: Send + Sync {
    /// The local screensaver activated or deactivated.
    fn on_screensaver(&self, activated: bool);

    fn on_key_down(&self, key: u16, mask: u16, button: u16);
    fn on_key_up(&self, key: u16, mask: u16, button: u16);
    fn on_key_repeat(&self, key: u16, mask: u16, count: u16, button: u16);

    fn on_mouse_down(&self, button: u8);
    fn on_mouse_up(&self, button: u8);

    /// Absolute cursor motion while the primary screen is active.  Returns
    /// `true` if the motion crossed a jump zone and switched screens.
    fn on_mouse_move_primary(&self, x: i32, y: i32) -> bool;

    /// Relative cursor motion while a secondary screen is active.
    fn on_mouse_move_secondary(&self, dx: i32, dy: i32);

    fn on_mouse_wheel(&self, delta: i32);

    /// The primary screen's resolution or layout changed.
    fn on_info_changed(&self, info: ClientInfo);

    /// Another local application grabbed clipboard `id`.
    fn on_grab_clipboard(&self, id: ClipboardId, seq: u32);

    /// The local clipboard `id` has new contents.
    fn on_clipboard_changed(&self, id: ClipboardId, seq: u32, data: Vec<u8>);

    /// The driver hit an unrecoverable error; the server shuts down with a
    /// short grace period.
    fn on_error(&self);
}

//! The server's own machine presented through the screen interface.
//!
//! The switch engine treats every screen uniformly; this adapter makes the
//! local machine one of them.  Input events need no forwarding — when the
//! primary is active the hardware already delivered them locally — so the
//! key and button sinks are no-ops.  What matters is focus (capture and
//! cursor visibility), the cursor warp, and the clipboard bridge to the
//! platform driver.

use std::sync::Arc;
use std::sync::Mutex;

use screenlink_core::{ClipboardId, ScreenShape};

use crate::platform::{PlatformError, PlatformScreen};
use crate::screen::ScreenSink;

/// Adapter presenting the local machine as a client of itself.
pub struct PrimaryClient {
    name: String,
    platform: Arc<dyn PlatformScreen>,
    dirty: Mutex<[bool; ClipboardId::COUNT]>,
}

impl PrimaryClient {
    pub fn new(name: String, platform: Arc<dyn PlatformScreen>) -> Self {
        Self {
            name,
            platform,
            dirty: Mutex::new([false; ClipboardId::COUNT]),
        }
    }

    /// Opens the underlying platform driver.
    pub fn open(&self) -> Result<(), PlatformError> {
        self.platform.open()
    }

    /// Closes the underlying platform driver.
    pub fn close(&self) {
        self.platform.close();
    }

    /// `true` while the platform refuses to release the cursor.
    pub fn is_locked_to_screen(&self) -> bool {
        self.platform.is_locked_to_screen()
    }

    /// Current toggle-modifier mask from the local keyboard.
    pub fn toggle_mask(&self) -> u16 {
        self.platform.toggle_mask()
    }

    /// Center of the primary screen, the cursor's home position.
    pub fn cursor_center(&self) -> (i32, i32) {
        self.platform.cursor_center()
    }

    /// Arms jump zones only on sides that have neighbors.
    pub fn reconfigure(&self, active_sides: u32) {
        self.platform.reconfigure(active_sides);
    }

    /// Reads the local clipboard, marshalled; used to snapshot primary-owned
    /// clipboards when the cursor leaves this screen.
    pub fn read_clipboard(&self, id: ClipboardId) -> Vec<u8> {
        self.platform.read_clipboard(id)
    }

    /// Whether the local copy of clipboard `id` is marked stale.
    pub fn is_clipboard_dirty(&self, id: ClipboardId) -> bool {
        self.dirty.lock().expect("lock poisoned")[id.index()]
    }
}

impl ScreenSink for PrimaryClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn shape(&self) -> ScreenShape {
        self.platform.shape()
    }

    fn jump_zone_size(&self) -> i32 {
        self.platform.jump_zone_size()
    }

    fn enter(&self, x: i32, y: i32, _seq: u32, _mask: u16, _for_screensaver: bool) {
        self.platform.warp_cursor(x, y);
        self.platform.enter();
    }

    fn leave(&self) -> bool {
        self.platform.leave()
    }

    // input originated here; nothing to inject
    fn key_down(&self, _key: u16, _mask: u16, _button: u16) {}
    fn key_up(&self, _key: u16, _mask: u16, _button: u16) {}
    fn key_repeat(&self, _key: u16, _mask: u16, _count: u16, _button: u16) {}
    fn mouse_down(&self, _button: u8) {}
    fn mouse_up(&self, _button: u8) {}

    fn mouse_move(&self, x: i32, y: i32) {
        self.platform.warp_cursor(x, y);
    }

    fn mouse_wheel(&self, _delta: i32) {}

    fn screensaver(&self, on: bool) {
        self.platform.screensaver(on);
    }

    fn grab_clipboard(&self, id: ClipboardId) {
        self.platform.grab_clipboard(id);
    }

    fn set_clipboard(&self, id: ClipboardId, data: &[u8]) {
        self.platform.set_clipboard(id, data);
    }

    fn set_clipboard_dirty(&self, id: ClipboardId, dirty: bool) {
        self.dirty.lock().expect("lock poisoned")[id.index()] = dirty;
    }
}

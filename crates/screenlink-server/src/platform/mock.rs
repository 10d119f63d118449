//! Mock primary-screen driver.
//!
//! Lets tests (and the headless build, which has no real input driver) run
//! the full server without OS hooks.  Records every call so tests can assert
//! on cursor warps, capture transitions, and clipboard traffic, and exposes
//! knobs for the states the switch engine branches on: lock-to-screen, the
//! toggle-modifier mask, and a refusable `leave`.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use screenlink_core::{ClipboardId, ScreenShape};

use super::{PlatformError, PlatformScreen};

/// A scriptable in-memory [`PlatformScreen`].
pub struct MockScreen {
    shape: Mutex<ScreenShape>,
    zone_size: i32,
    locked: AtomicBool,
    toggle_mask: AtomicU32,
    leave_succeeds: AtomicBool,
    open_fails: AtomicBool,
    opened: AtomicBool,
    captured: AtomicBool,
    active_sides: AtomicU32,
    warps: Mutex<Vec<(i32, i32)>>,
    screensaver_calls: Mutex<Vec<bool>>,
    clipboards: Mutex<[Vec<u8>; ClipboardId::COUNT]>,
    grabs: Mutex<Vec<ClipboardId>>,
}

impl MockScreen {
    pub fn new(shape: ScreenShape, zone_size: i32) -> Self {
        Self {
            shape: Mutex::new(shape),
            zone_size,
            locked: AtomicBool::new(false),
            toggle_mask: AtomicU32::new(0),
            leave_succeeds: AtomicBool::new(true),
            open_fails: AtomicBool::new(false),
            opened: AtomicBool::new(false),
            captured: AtomicBool::new(false),
            active_sides: AtomicU32::new(0),
            warps: Mutex::new(Vec::new()),
            screensaver_calls: Mutex::new(Vec::new()),
            clipboards: Mutex::new(Default::default()),
            grabs: Mutex::new(Vec::new()),
        }
    }

    /// 1920×1080 at the origin with a one-pixel jump zone.
    pub fn standard() -> Self {
        Self::new(ScreenShape::new(0, 0, 1920, 1080), 1)
    }

    // ── Test knobs ────────────────────────────────────────────────────────────

    pub fn set_shape(&self, shape: ScreenShape) {
        *self.shape.lock().expect("lock poisoned") = shape;
    }

    pub fn set_locked(&self, locked: bool) {
        self.locked.store(locked, Ordering::SeqCst);
    }

    pub fn set_toggle_mask(&self, mask: u16) {
        self.toggle_mask.store(mask as u32, Ordering::SeqCst);
    }

    /// Makes subsequent `leave` calls fail, as when hook installation fails.
    pub fn set_leave_succeeds(&self, ok: bool) {
        self.leave_succeeds.store(ok, Ordering::SeqCst);
    }

    pub fn set_open_fails(&self, fails: bool) {
        self.open_fails.store(fails, Ordering::SeqCst);
    }

    pub fn set_clipboard_contents(&self, id: ClipboardId, data: Vec<u8>) {
        self.clipboards.lock().expect("lock poisoned")[id.index()] = data;
    }

    // ── Recorded state ────────────────────────────────────────────────────────

    pub fn warps(&self) -> Vec<(i32, i32)> {
        self.warps.lock().expect("lock poisoned").clone()
    }

    pub fn screensaver_calls(&self) -> Vec<bool> {
        self.screensaver_calls.lock().expect("lock poisoned").clone()
    }

    pub fn clipboard_contents(&self, id: ClipboardId) -> Vec<u8> {
        self.clipboards.lock().expect("lock poisoned")[id.index()].clone()
    }

    pub fn grab_calls(&self) -> Vec<ClipboardId> {
        self.grabs.lock().expect("lock poisoned").clone()
    }

    pub fn is_opened(&self) -> bool {
        self.opened.load(Ordering::SeqCst)
    }

    /// `true` while input hooks are installed (cursor is elsewhere).
    pub fn is_captured(&self) -> bool {
        self.captured.load(Ordering::SeqCst)
    }

    pub fn active_sides(&self) -> u32 {
        self.active_sides.load(Ordering::SeqCst)
    }
}

impl Default for MockScreen {
    fn default() -> Self {
        Self::standard()
    }
}

impl PlatformScreen for MockScreen {
    fn open(&self) -> Result<(), PlatformError> {
        if self.open_fails.load(Ordering::SeqCst) {
            return Err(PlatformError("mock driver scripted to fail".to_string()));
        }
        self.opened.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) {
        self.opened.store(false, Ordering::SeqCst);
    }

    fn enter(&self) {
        self.captured.store(false, Ordering::SeqCst);
    }

    fn leave(&self) -> bool {
        if !self.leave_succeeds.load(Ordering::SeqCst) {
            return false;
        }
        self.captured.store(true, Ordering::SeqCst);
        true
    }

    fn warp_cursor(&self, x: i32, y: i32) {
        self.warps.lock().expect("lock poisoned").push((x, y));
    }

    fn shape(&self) -> ScreenShape {
        *self.shape.lock().expect("lock poisoned")
    }

    fn jump_zone_size(&self) -> i32 {
        self.zone_size
    }

    fn cursor_center(&self) -> (i32, i32) {
        self.shape().center()
    }

    fn is_locked_to_screen(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    fn toggle_mask(&self) -> u16 {
        self.toggle_mask.load(Ordering::SeqCst) as u16
    }

    fn reconfigure(&self, active_sides: u32) {
        self.active_sides.store(active_sides, Ordering::SeqCst);
    }

    fn screensaver(&self, on: bool) {
        self.screensaver_calls.lock().expect("lock poisoned").push(on);
    }

    fn grab_clipboard(&self, id: ClipboardId) {
        self.grabs.lock().expect("lock poisoned").push(id);
    }

    fn set_clipboard(&self, id: ClipboardId, data: &[u8]) {
        self.clipboards.lock().expect("lock poisoned")[id.index()] = data.to_vec();
    }

    fn read_clipboard(&self, id: ClipboardId) -> Vec<u8> {
        self.clipboards.lock().expect("lock poisoned")[id.index()].clone()
    }
}

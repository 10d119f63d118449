//! Fans events from the platform primary-screen driver into the switch
//! engine and the active screen.
//!
//! This is the server's [`PrimaryReceiver`] face: each handler takes the
//! single server lock, gives the command-key hook a chance to intercept, and
//! then either relays to the active screen's sink or hands the event to the
//! switch engine.

use tracing::warn;

use screenlink_core::{ClientInfo, ClipboardId};

use crate::platform::PrimaryReceiver;
use crate::screen::ScreenSink;
use crate::server::Server;

impl PrimaryReceiver for Server {
    fn on_screensaver(&self, activated: bool) {
        self.lock_state().on_screensaver(activated);
    }

    fn on_key_down(&self, key: u16, mask: u16, button: u16) {
        let mut state = self.lock_state();
        if state.on_command_key(key, mask, true) {
            return;
        }
        if let Some(active) = state.active_sink() {
            active.key_down(key, mask, button);
        }
    }

    fn on_key_up(&self, key: u16, mask: u16, button: u16) {
        let mut state = self.lock_state();
        if state.on_command_key(key, mask, false) {
            return;
        }
        if let Some(active) = state.active_sink() {
            active.key_up(key, mask, button);
        }
    }

    fn on_key_repeat(&self, key: u16, mask: u16, count: u16, button: u16) {
        let mut state = self.lock_state();
        // a command key intercepts repeats as a release/press pair
        if state.on_command_key(key, mask, false) {
            state.on_command_key(key, mask, true);
            return;
        }
        if let Some(active) = state.active_sink() {
            active.key_repeat(key, mask, count, button);
        }
    }

    fn on_mouse_down(&self, button: u8) {
        if let Some(active) = self.lock_state().active_sink() {
            active.mouse_down(button);
        }
    }

    fn on_mouse_up(&self, button: u8) {
        if let Some(active) = self.lock_state().active_sink() {
            active.mouse_up(button);
        }
    }

    fn on_mouse_move_primary(&self, x: i32, y: i32) -> bool {
        self.lock_state().on_mouse_move_primary(x, y)
    }

    fn on_mouse_move_secondary(&self, dx: i32, dy: i32) {
        self.lock_state().on_mouse_move_secondary(dx, dy);
    }

    fn on_mouse_wheel(&self, delta: i32) {
        if let Some(active) = self.lock_state().active_sink() {
            active.mouse_wheel(delta);
        }
    }

    fn on_info_changed(&self, info: ClientInfo) {
        let mut state = self.lock_state();
        let Some(name) = state.primary_name().map(str::to_string) else {
            return;
        };
        // the primary is always registered while open; an error here would
        // mean the driver outlived the screen
        if let Err(e) = state.info_changed(&name, info) {
            warn!(error = %e, "dropping primary info change");
        }
    }

    fn on_grab_clipboard(&self, id: ClipboardId, seq: u32) {
        let mut state = self.lock_state();
        let Some(name) = state.primary_name().map(str::to_string) else {
            return;
        };
        if let Err(e) = state.grab_clipboard(&name, id, seq) {
            warn!(error = %e, "dropping primary clipboard grab");
        }
    }

    fn on_clipboard_changed(&self, id: ClipboardId, seq: u32, data: Vec<u8>) {
        self.lock_state().clipboard_changed(id, seq, data);
    }

    fn on_error(&self) {
        warn!("primary screen driver reported a fatal error; shutting down");
        self.request_shutdown();
    }
}

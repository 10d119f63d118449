//! Per-connection proxy for a remote client screen.
//!
//! A proxy is created by a successful handshake and lives until its session
//! ends.  The outbound side queues protocol commands on an unbounded channel
//! drained by the session's writer task, so engine code can emit commands
//! while holding the server lock without ever blocking on the socket.  A
//! closed channel means the writer (and thus the peer) is gone; commands are
//! then dropped and session teardown handles the rest.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use screenlink_core::{ClientInfo, ClipboardId, Message, ScreenShape};

use crate::screen::ScreenSink;

/// Server-side representation of one connected client.
pub struct ClientProxy {
    name: String,
    /// Negotiated protocol version (major, minor).
    version: (i16, i16),
    tx: UnboundedSender<Message>,
    info: Mutex<ClientInfo>,
    /// Sequence number of the most recent `Enter` sent to this client.
    enter_seq: AtomicU32,
    dirty: Mutex<[bool; ClipboardId::COUNT]>,
}

impl ClientProxy {
    pub fn new(
        name: String,
        version: (i16, i16),
        info: ClientInfo,
        tx: UnboundedSender<Message>,
    ) -> Self {
        Self {
            name,
            version,
            tx,
            info: Mutex::new(info),
            enter_seq: AtomicU32::new(0),
            dirty: Mutex::new([false; ClipboardId::COUNT]),
        }
    }

    /// Queues one command for the writer task.
    pub fn send(&self, msg: Message) {
        if self.tx.send(msg).is_err() {
            // writer is gone; the session is tearing down
            debug!(client = %self.name, "dropped command for closed session");
        }
    }

    /// Negotiated protocol version.
    pub fn version(&self) -> (i16, i16) {
        self.version
    }

    /// Updates the cached screen info after a `DINF` report.
    pub fn set_info(&self, info: ClientInfo) {
        *self.info.lock().expect("lock poisoned") = info;
    }

    pub fn info(&self) -> ClientInfo {
        *self.info.lock().expect("lock poisoned")
    }

    /// Sequence number of the most recent `Enter`.
    pub fn last_enter_seq(&self) -> u32 {
        self.enter_seq.load(Ordering::SeqCst)
    }

    /// Whether this client's copy of clipboard `id` is marked stale.
    pub fn is_clipboard_dirty(&self, id: ClipboardId) -> bool {
        self.dirty.lock().expect("lock poisoned")[id.index()]
    }

    /// Tells the client to reset its options to defaults.
    pub fn reset_options(&self) {
        self.send(Message::ResetOptions);
    }

    /// Sends the flat `(id, value)` option pair list.
    pub fn set_options(&self, pairs: &[u32]) {
        self.send(Message::SetOptions(pairs.to_vec()));
    }
}

impl ScreenSink for ClientProxy {
    fn name(&self) -> &str {
        &self.name
    }

    fn shape(&self) -> ScreenShape {
        self.info().shape
    }

    fn jump_zone_size(&self) -> i32 {
        self.info().zone_size
    }

    fn enter(&self, x: i32, y: i32, seq: u32, mask: u16, _for_screensaver: bool) {
        self.enter_seq.store(seq, Ordering::SeqCst);
        self.send(Message::Enter {
            x: x as i16,
            y: y as i16,
            seq,
            mask,
        });
    }

    fn leave(&self) -> bool {
        self.send(Message::Leave);
        true
    }

    fn key_down(&self, key: u16, mask: u16, button: u16) {
        self.send(Message::KeyDown { key, mask, button });
    }

    fn key_up(&self, key: u16, mask: u16, button: u16) {
        self.send(Message::KeyUp { key, mask, button });
    }

    fn key_repeat(&self, key: u16, mask: u16, count: u16, button: u16) {
        self.send(Message::KeyRepeat {
            key,
            mask,
            count,
            button,
        });
    }

    fn mouse_down(&self, button: u8) {
        self.send(Message::MouseDown { button });
    }

    fn mouse_up(&self, button: u8) {
        self.send(Message::MouseUp { button });
    }

    fn mouse_move(&self, x: i32, y: i32) {
        self.send(Message::MouseMove {
            x: x as i16,
            y: y as i16,
        });
    }

    fn mouse_wheel(&self, delta: i32) {
        self.send(Message::MouseWheel {
            delta: delta as i16,
        });
    }

    fn screensaver(&self, on: bool) {
        self.send(Message::Screensaver { on });
    }

    fn grab_clipboard(&self, id: ClipboardId) {
        self.send(Message::ClipboardGrab {
            id,
            seq: self.last_enter_seq(),
        });
    }

    fn set_clipboard(&self, id: ClipboardId, data: &[u8]) {
        self.send(Message::ClipboardData {
            id,
            seq: self.last_enter_seq(),
            data: data.to_vec(),
        });
    }

    fn set_clipboard_dirty(&self, id: ClipboardId, dirty: bool) {
        self.dirty.lock().expect("lock poisoned")[id.index()] = dirty;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn make_proxy() -> (ClientProxy, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let info = ClientInfo {
            shape: ScreenShape::new(0, 0, 800, 600),
            zone_size: 1,
            mx: 0,
            my: 0,
        };
        (
            ClientProxy::new("laptop".to_string(), (1, 3), info, tx),
            rx,
        )
    }

    #[test]
    fn test_enter_records_sequence_and_queues_command() {
        let (proxy, mut rx) = make_proxy();
        proxy.enter(1, 300, 7, 0, false);

        assert_eq!(proxy.last_enter_seq(), 7);
        assert_eq!(
            rx.try_recv().unwrap(),
            Message::Enter {
                x: 1,
                y: 300,
                seq: 7,
                mask: 0
            }
        );
    }

    #[test]
    fn test_leave_always_succeeds_and_queues_cout() {
        let (proxy, mut rx) = make_proxy();
        assert!(proxy.leave());
        assert_eq!(rx.try_recv().unwrap(), Message::Leave);
    }

    #[test]
    fn test_clipboard_commands_carry_last_enter_sequence() {
        let (proxy, mut rx) = make_proxy();
        proxy.enter(0, 0, 5, 0, false);
        let _ = rx.try_recv();

        proxy.grab_clipboard(ClipboardId::Primary);
        proxy.set_clipboard(ClipboardId::Clipboard, b"text");

        assert_eq!(
            rx.try_recv().unwrap(),
            Message::ClipboardGrab {
                id: ClipboardId::Primary,
                seq: 5
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            Message::ClipboardData {
                id: ClipboardId::Clipboard,
                seq: 5,
                data: b"text".to_vec()
            }
        );
    }

    #[test]
    fn test_dirty_flags_track_per_clipboard() {
        let (proxy, _rx) = make_proxy();
        proxy.set_clipboard_dirty(ClipboardId::Primary, true);
        assert!(proxy.is_clipboard_dirty(ClipboardId::Primary));
        assert!(!proxy.is_clipboard_dirty(ClipboardId::Clipboard));
    }

    #[test]
    fn test_shape_follows_info_updates() {
        let (proxy, _rx) = make_proxy();
        proxy.set_info(ClientInfo {
            shape: ScreenShape::new(0, 0, 2560, 1440),
            zone_size: 2,
            mx: 10,
            my: 20,
        });
        assert_eq!(proxy.shape(), ScreenShape::new(0, 0, 2560, 1440));
        assert_eq!(proxy.jump_zone_size(), 2);
    }

    #[test]
    fn test_send_after_writer_gone_does_not_panic() {
        let (proxy, rx) = make_proxy();
        drop(rx);
        proxy.key_down(0x61, 0, 38);
    }
}

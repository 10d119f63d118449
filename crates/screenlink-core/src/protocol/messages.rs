//! All screenlink session-protocol message types.
//!
//! After the greeting exchange, every message on the wire is a
//! length-prefixed frame whose payload starts with a 4-byte ASCII command
//! code followed by zero or more typed fields.  All multi-byte integers are
//! big-endian.  The field type codes are a small fixed set: `i1`/`i2`/`i4`
//! (1/2/4-byte integers), `s` (32-bit length-prefixed byte string), and `vi`
//! (count-prefixed vector of 4-byte integers).

// ── Protocol constants ────────────────────────────────────────────────────────

/// Major protocol version spoken by this server.
pub const PROTOCOL_MAJOR: i16 = 1;

/// Minor protocol version spoken by this server.
pub const PROTOCOL_MINOR: i16 = 3;

/// ASCII prefix of the greeting sent by the server and echoed by clients.
pub const HELLO_PREFIX: &[u8; 7] = b"Synergy";

/// Hard ceiling on the greeting-reply frame.  A peer announcing a bigger
/// hello is not speaking this protocol.
pub const MAX_HELLO_LENGTH: u32 = 1024;

/// Hard ceiling on any post-greeting frame.  Bounds clipboard transfers.
pub const MAX_MESSAGE_LENGTH: u32 = 4 * 1024 * 1024;

/// Default TCP port for client sessions.
pub const DEFAULT_PORT: u16 = 24800;

// ── Modifier and side bitmasks ────────────────────────────────────────────────

/// Keyboard modifier mask bits carried in `Enter` and key events.
pub mod modifiers {
    pub const SHIFT: u16 = 0x0001;
    pub const CTRL: u16 = 0x0002;
    pub const ALT: u16 = 0x0004;
    pub const META: u16 = 0x0008;
    pub const SUPER: u16 = 0x0010;
    pub const CAPS_LOCK: u16 = 0x1000;
    pub const NUM_LOCK: u16 = 0x2000;
    pub const SCROLL_LOCK: u16 = 0x4000;
}

/// Bitmask of screen sides that have configured neighbors, passed to the
/// primary driver so jump zones are only armed where a jump can succeed.
pub mod sides {
    pub const LEFT: u32 = 1 << 0;
    pub const RIGHT: u32 = 1 << 1;
    pub const TOP: u32 = 1 << 2;
    pub const BOTTOM: u32 = 1 << 3;
}

// ── Screen options ────────────────────────────────────────────────────────────

/// Packs a 4-character option code into the `u32` id used by `SetOptions`.
pub const fn option_id(code: [u8; 4]) -> u32 {
    ((code[0] as u32) << 24) | ((code[1] as u32) << 16) | ((code[2] as u32) << 8) | (code[3] as u32)
}

/// Option ids understood by the screen-map `options` section and forwarded
/// to clients as `(id, value)` pairs in `SetOptions`.
pub mod options {
    use super::option_id;

    /// Keepalive interval in milliseconds; 0 disables keepalives.
    pub const HEARTBEAT: u32 = option_id(*b"HBRT");
    /// Delay in milliseconds before an edge crossing triggers a switch.
    pub const SWITCH_DELAY: u32 = option_id(*b"SWDL");
    /// Treat caps lock as a half-duplex key on the client.
    pub const HALF_DUPLEX_CAPS_LOCK: u32 = option_id(*b"HDCL");
    /// Treat num lock as a half-duplex key on the client.
    pub const HALF_DUPLEX_NUM_LOCK: u32 = option_id(*b"HDNL");
}

// ── Clipboard identifiers ─────────────────────────────────────────────────────

/// The two clipboards tracked per screen.
///
/// `Primary` is the implicit-selection clipboard (middle-click paste on X11);
/// `Clipboard` is the explicit cut/copy/paste one.  Platforms without a
/// primary selection only ever report the latter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ClipboardId {
    Primary = 0,
    Clipboard = 1,
}

impl ClipboardId {
    /// Number of clipboards per screen.
    pub const COUNT: usize = 2;

    /// All clipboard ids, in wire order.
    pub const ALL: [ClipboardId; Self::COUNT] = [ClipboardId::Primary, ClipboardId::Clipboard];

    /// Index into per-clipboard arrays.
    pub fn index(self) -> usize {
        self as usize
    }
}

impl TryFrom<u8> for ClipboardId {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ClipboardId::Primary),
            1 => Ok(ClipboardId::Clipboard),
            _ => Err(()),
        }
    }
}

// ── Message enum ──────────────────────────────────────────────────────────────

/// All valid post-greeting messages, discriminated by their 4-byte code.
///
/// Directionality follows the protocol table: commands the server emits to a
/// client session, events a client reports back, and the `E*` error replies
/// written just before the server closes a misbehaving or unwanted session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// `QINF`: ask the client for its screen info.
    QueryInfo,
    /// `DINF`: screen shape, jump-zone size, and cursor position.  Sent by a
    /// client on open and again whenever its resolution changes.
    Info {
        x: i16,
        y: i16,
        w: i16,
        h: i16,
        zone: i16,
        mx: i16,
        my: i16,
    },
    /// `CIAK`: info received.
    InfoAck,
    /// `CROP`: reset all options to defaults.
    ResetOptions,
    /// `DSOP`: set options; flat list of `(id, value)` pairs.
    SetOptions(Vec<u32>),
    /// `CINN`: the cursor entered this screen.
    Enter { x: i16, y: i16, seq: u32, mask: u16 },
    /// `COUT`: the cursor left this screen.
    Leave,
    /// `DKDN`: key press.
    KeyDown { key: u16, mask: u16, button: u16 },
    /// `DKUP`: key release.
    KeyUp { key: u16, mask: u16, button: u16 },
    /// `DKRP`: key auto-repeat.
    KeyRepeat {
        key: u16,
        mask: u16,
        count: u16,
        button: u16,
    },
    /// `DMDN`: mouse button press.
    MouseDown { button: u8 },
    /// `DMUP`: mouse button release.
    MouseUp { button: u8 },
    /// `DMMV`: absolute mouse move in the target screen's coordinates.
    MouseMove { x: i16, y: i16 },
    /// `DMWM`: mouse wheel rotation.
    MouseWheel { delta: i16 },
    /// `CCLP`: take (or propagate) ownership of a clipboard.
    ClipboardGrab { id: ClipboardId, seq: u32 },
    /// `DCLP`: clipboard contents in marshalled form.
    ClipboardData {
        id: ClipboardId,
        seq: u32,
        data: Vec<u8>,
    },
    /// `CSEC`: screensaver started or stopped on the server.
    Screensaver { on: bool },
    /// `CALV`: keepalive; echoed by the receiver.
    KeepAlive,
    /// `CBYE`: client is closing the session.
    Bye,
    /// `CNOP`: no operation.
    Noop,
    /// `EICV`: incompatible protocol version; payload is the server's version.
    Incompatible { major: i16, minor: i16 },
    /// `EBSY`: a client with the same name is already connected.
    Busy,
    /// `EUNK`: the client's name is not in the screen map.
    UnknownName,
    /// `EBAD`: protocol violation.
    Bad,
}

impl Message {
    /// Returns the 4-byte ASCII command code for this message.
    pub fn code(&self) -> &'static [u8; 4] {
        match self {
            Message::QueryInfo => b"QINF",
            Message::Info { .. } => b"DINF",
            Message::InfoAck => b"CIAK",
            Message::ResetOptions => b"CROP",
            Message::SetOptions(_) => b"DSOP",
            Message::Enter { .. } => b"CINN",
            Message::Leave => b"COUT",
            Message::KeyDown { .. } => b"DKDN",
            Message::KeyUp { .. } => b"DKUP",
            Message::KeyRepeat { .. } => b"DKRP",
            Message::MouseDown { .. } => b"DMDN",
            Message::MouseUp { .. } => b"DMUP",
            Message::MouseMove { .. } => b"DMMV",
            Message::MouseWheel { .. } => b"DMWM",
            Message::ClipboardGrab { .. } => b"CCLP",
            Message::ClipboardData { .. } => b"DCLP",
            Message::Screensaver { .. } => b"CSEC",
            Message::KeepAlive => b"CALV",
            Message::Bye => b"CBYE",
            Message::Noop => b"CNOP",
            Message::Incompatible { .. } => b"EICV",
            Message::Busy => b"EBSY",
            Message::UnknownName => b"EUNK",
            Message::Bad => b"EBAD",
        }
    }

    /// Printable form of the command code, for log lines.
    pub fn code_str(&self) -> &'static str {
        // command codes are ASCII by construction
        std::str::from_utf8(self.code()).unwrap_or("????")
    }
}

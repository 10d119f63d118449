//! Binary codec for the screenlink session protocol.
//!
//! Wire format:
//! ```text
//! [frame_len:4][code:4][field...]
//! ```
//! `frame_len` is a 32-bit big-endian count of the bytes that follow it.
//! Field encodings: `i1`/`i2`/`i4` are unsigned big-endian integers
//! (coordinates travel as two's-complement `i2`), `s` is a 32-bit
//! length-prefixed byte string, `vi` is a 32-bit count-prefixed vector of
//! `i4` values.
//!
//! [`encode_message`]/[`decode_message`] work on frame payloads (code plus
//! fields, without the length prefix); [`read_frame`]/[`write_frame`] add the
//! framing on top of async byte streams.  Trailing bytes after the fields a
//! command defines are ignored on decode, so newer minor revisions can append
//! fields without breaking older peers.

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use crate::protocol::messages::{
    ClipboardId, Message, HELLO_PREFIX, MAX_HELLO_LENGTH,
};

/// Errors that can occur while encoding, decoding, or framing messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The payload ended before all declared fields were read.
    #[error("truncated message: need at least {needed} bytes, got {available}")]
    Truncated { needed: usize, available: usize },

    /// The 4-byte command code is not part of the protocol.
    #[error("unknown command code {0:?}")]
    UnknownCommand([u8; 4]),

    /// The frame length prefix exceeds the applicable ceiling.
    #[error("oversize frame: declared {declared} bytes, ceiling is {ceiling}")]
    OversizeFrame { declared: u32, ceiling: u32 },

    /// A frame must at least carry a command code.
    #[error("empty frame")]
    EmptyFrame,

    /// A field value is out of range or otherwise unparseable.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// The greeting reply did not start with the expected prefix.
    #[error("bad greeting from peer")]
    BadGreeting,

    /// The underlying stream failed (including EOF mid-frame).
    #[error("stream error: {0}")]
    Io(#[from] std::io::Error),
}

// ── Field primitives ──────────────────────────────────────────────────────────

fn put_u8(buf: &mut Vec<u8>, v: u8) {
    buf.push(v);
}

fn put_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn put_i16(buf: &mut Vec<u8>, v: i16) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn put_bytes(buf: &mut Vec<u8>, data: &[u8]) {
    put_u32(buf, data.len() as u32);
    buf.extend_from_slice(data);
}

fn put_u32_vec(buf: &mut Vec<u8>, values: &[u32]) {
    put_u32(buf, values.len() as u32);
    for v in values {
        put_u32(buf, *v);
    }
}

/// Sequential reader over a frame payload.
struct Reader<'a> {
    buf: &'a [u8],
    off: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, off: 0 }
    }

    fn need(&self, n: usize) -> Result<(), ProtocolError> {
        if self.buf.len() - self.off < n {
            Err(ProtocolError::Truncated {
                needed: self.off + n,
                available: self.buf.len(),
            })
        } else {
            Ok(())
        }
    }

    fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        self.need(1)?;
        let v = self.buf[self.off];
        self.off += 1;
        Ok(v)
    }

    fn read_u16(&mut self) -> Result<u16, ProtocolError> {
        self.need(2)?;
        let v = u16::from_be_bytes([self.buf[self.off], self.buf[self.off + 1]]);
        self.off += 2;
        Ok(v)
    }

    fn read_i16(&mut self) -> Result<i16, ProtocolError> {
        Ok(self.read_u16()? as i16)
    }

    fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        self.need(4)?;
        let v = u32::from_be_bytes([
            self.buf[self.off],
            self.buf[self.off + 1],
            self.buf[self.off + 2],
            self.buf[self.off + 3],
        ]);
        self.off += 4;
        Ok(v)
    }

    fn read_bytes(&mut self) -> Result<Vec<u8>, ProtocolError> {
        let len = self.read_u32()? as usize;
        self.need(len)?;
        let data = self.buf[self.off..self.off + len].to_vec();
        self.off += len;
        Ok(data)
    }

    fn read_u32_vec(&mut self) -> Result<Vec<u32>, ProtocolError> {
        let count = self.read_u32()? as usize;
        // each element is 4 bytes; reject counts the payload cannot hold
        self.need(count.saturating_mul(4))?;
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(self.read_u32()?);
        }
        Ok(values)
    }

    fn read_clipboard_id(&mut self) -> Result<ClipboardId, ProtocolError> {
        let raw = self.read_u8()?;
        ClipboardId::try_from(raw)
            .map_err(|_| ProtocolError::Malformed(format!("unknown clipboard id: {raw}")))
    }
}

// ── Message encoding ──────────────────────────────────────────────────────────

/// Encodes a [`Message`] into a frame payload (command code plus fields,
/// without the length prefix).
pub fn encode_message(msg: &Message) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16);
    buf.extend_from_slice(msg.code());
    match msg {
        Message::Info {
            x,
            y,
            w,
            h,
            zone,
            mx,
            my,
        } => {
            put_i16(&mut buf, *x);
            put_i16(&mut buf, *y);
            put_i16(&mut buf, *w);
            put_i16(&mut buf, *h);
            put_i16(&mut buf, *zone);
            put_i16(&mut buf, *mx);
            put_i16(&mut buf, *my);
        }
        Message::SetOptions(opts) => put_u32_vec(&mut buf, opts),
        Message::Enter { x, y, seq, mask } => {
            put_i16(&mut buf, *x);
            put_i16(&mut buf, *y);
            put_u32(&mut buf, *seq);
            put_u16(&mut buf, *mask);
        }
        Message::KeyDown { key, mask, button } | Message::KeyUp { key, mask, button } => {
            put_u16(&mut buf, *key);
            put_u16(&mut buf, *mask);
            put_u16(&mut buf, *button);
        }
        Message::KeyRepeat {
            key,
            mask,
            count,
            button,
        } => {
            put_u16(&mut buf, *key);
            put_u16(&mut buf, *mask);
            put_u16(&mut buf, *count);
            put_u16(&mut buf, *button);
        }
        Message::MouseDown { button } | Message::MouseUp { button } => put_u8(&mut buf, *button),
        Message::MouseMove { x, y } => {
            put_i16(&mut buf, *x);
            put_i16(&mut buf, *y);
        }
        Message::MouseWheel { delta } => put_i16(&mut buf, *delta),
        Message::ClipboardGrab { id, seq } => {
            put_u8(&mut buf, *id as u8);
            put_u32(&mut buf, *seq);
        }
        Message::ClipboardData { id, seq, data } => {
            put_u8(&mut buf, *id as u8);
            put_u32(&mut buf, *seq);
            put_bytes(&mut buf, data);
        }
        Message::Screensaver { on } => put_u8(&mut buf, u8::from(*on)),
        Message::Incompatible { major, minor } => {
            put_i16(&mut buf, *major);
            put_i16(&mut buf, *minor);
        }
        // all remaining commands carry no fields
        Message::QueryInfo
        | Message::InfoAck
        | Message::ResetOptions
        | Message::Leave
        | Message::KeepAlive
        | Message::Bye
        | Message::Noop
        | Message::Busy
        | Message::UnknownName
        | Message::Bad => {}
    }
    buf
}

// ── Message decoding ──────────────────────────────────────────────────────────

/// Decodes one [`Message`] from a frame payload.
///
/// # Errors
///
/// Returns [`ProtocolError::UnknownCommand`] for codes outside the protocol
/// and [`ProtocolError::Truncated`]/[`ProtocolError::Malformed`] for payloads
/// that do not match the command's field list.
pub fn decode_message(payload: &[u8]) -> Result<Message, ProtocolError> {
    if payload.is_empty() {
        return Err(ProtocolError::EmptyFrame);
    }
    if payload.len() < 4 {
        return Err(ProtocolError::Truncated {
            needed: 4,
            available: payload.len(),
        });
    }
    let code: [u8; 4] = payload[..4].try_into().expect("slice length checked");
    let mut r = Reader::new(&payload[4..]);

    let msg = match &code {
        b"QINF" => Message::QueryInfo,
        b"DINF" => Message::Info {
            x: r.read_i16()?,
            y: r.read_i16()?,
            w: r.read_i16()?,
            h: r.read_i16()?,
            zone: r.read_i16()?,
            mx: r.read_i16()?,
            my: r.read_i16()?,
        },
        b"CIAK" => Message::InfoAck,
        b"CROP" => Message::ResetOptions,
        b"DSOP" => Message::SetOptions(r.read_u32_vec()?),
        b"CINN" => Message::Enter {
            x: r.read_i16()?,
            y: r.read_i16()?,
            seq: r.read_u32()?,
            mask: r.read_u16()?,
        },
        b"COUT" => Message::Leave,
        b"DKDN" => Message::KeyDown {
            key: r.read_u16()?,
            mask: r.read_u16()?,
            button: r.read_u16()?,
        },
        b"DKUP" => Message::KeyUp {
            key: r.read_u16()?,
            mask: r.read_u16()?,
            button: r.read_u16()?,
        },
        b"DKRP" => Message::KeyRepeat {
            key: r.read_u16()?,
            mask: r.read_u16()?,
            count: r.read_u16()?,
            button: r.read_u16()?,
        },
        b"DMDN" => Message::MouseDown {
            button: r.read_u8()?,
        },
        b"DMUP" => Message::MouseUp {
            button: r.read_u8()?,
        },
        b"DMMV" => Message::MouseMove {
            x: r.read_i16()?,
            y: r.read_i16()?,
        },
        b"DMWM" => Message::MouseWheel {
            delta: r.read_i16()?,
        },
        b"CCLP" => Message::ClipboardGrab {
            id: r.read_clipboard_id()?,
            seq: r.read_u32()?,
        },
        b"DCLP" => Message::ClipboardData {
            id: r.read_clipboard_id()?,
            seq: r.read_u32()?,
            data: r.read_bytes()?,
        },
        b"CSEC" => Message::Screensaver {
            on: r.read_u8()? != 0,
        },
        b"CALV" => Message::KeepAlive,
        b"CBYE" => Message::Bye,
        b"CNOP" => Message::Noop,
        b"EICV" => Message::Incompatible {
            major: r.read_i16()?,
            minor: r.read_i16()?,
        },
        b"EBSY" => Message::Busy,
        b"EUNK" => Message::UnknownName,
        b"EBAD" => Message::Bad,
        _ => return Err(ProtocolError::UnknownCommand(code)),
    };
    Ok(msg)
}

// ── Greeting ──────────────────────────────────────────────────────────────────

/// Encodes the server greeting payload: `Synergy` + major + minor.
pub fn encode_hello(major: i16, minor: i16) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HELLO_PREFIX.len() + 4);
    buf.extend_from_slice(HELLO_PREFIX);
    put_i16(&mut buf, major);
    put_i16(&mut buf, minor);
    buf
}

/// Encodes the client greeting reply: `Synergy` + major + minor + name.
pub fn encode_hello_reply(major: i16, minor: i16, name: &str) -> Vec<u8> {
    let mut buf = encode_hello(major, minor);
    put_bytes(&mut buf, name.as_bytes());
    buf
}

/// Parses a client greeting reply, returning `(major, minor, name)`.
///
/// # Errors
///
/// Returns [`ProtocolError::BadGreeting`] when the prefix is wrong and
/// [`ProtocolError::Malformed`] when the name is not valid UTF-8.
pub fn parse_hello_reply(payload: &[u8]) -> Result<(i16, i16, String), ProtocolError> {
    if payload.len() < HELLO_PREFIX.len() || &payload[..HELLO_PREFIX.len()] != HELLO_PREFIX {
        return Err(ProtocolError::BadGreeting);
    }
    let mut r = Reader::new(&payload[HELLO_PREFIX.len()..]);
    let major = r.read_i16()?;
    let minor = r.read_i16()?;
    let name_bytes = r.read_bytes()?;
    let name = String::from_utf8(name_bytes)
        .map_err(|e| ProtocolError::Malformed(format!("client name is not UTF-8: {e}")))?;
    Ok((major, minor, name))
}

// ── Frame I/O ─────────────────────────────────────────────────────────────────

/// Reads one length-prefixed frame and returns its payload.
///
/// `ceiling` is [`MAX_HELLO_LENGTH`] for the greeting reply and
/// [`crate::protocol::messages::MAX_MESSAGE_LENGTH`] thereafter.
///
/// # Errors
///
/// Returns [`ProtocolError::OversizeFrame`] for frames above the ceiling,
/// [`ProtocolError::EmptyFrame`] for a zero-length frame, and
/// [`ProtocolError::Io`] on EOF mid-frame or stream failure.
pub async fn read_frame<R>(stream: &mut R, ceiling: u32) -> Result<Vec<u8>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut len_bytes = [0u8; 4];
    stream.read_exact(&mut len_bytes).await?;
    let len = u32::from_be_bytes(len_bytes);
    if len == 0 {
        return Err(ProtocolError::EmptyFrame);
    }
    if len > ceiling {
        debug!(declared = len, ceiling, "rejecting oversize frame");
        return Err(ProtocolError::OversizeFrame {
            declared: len,
            ceiling,
        });
    }
    let mut payload = vec![0u8; len as usize];
    stream.read_exact(&mut payload).await?;
    trace!(len, "read frame");
    Ok(payload)
}

/// Writes one length-prefixed frame and flushes the stream.
///
/// Flushing here keeps the invariant that every command emission ends at a
/// frame boundary on the wire.
pub async fn write_frame_payload<W>(stream: &mut W, payload: &[u8]) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    stream.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    stream.write_all(payload).await?;
    stream.flush().await?;
    Ok(())
}

/// Encodes and writes one [`Message`] as a frame.
pub async fn write_frame<W>(stream: &mut W, msg: &Message) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    write_frame_payload(stream, &encode_message(msg)).await
}

/// Reads and decodes one [`Message`] frame.
pub async fn read_message<R>(stream: &mut R, ceiling: u32) -> Result<Message, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let payload = read_frame(stream, ceiling).await?;
    decode_message(&payload)
}

/// Writes the server greeting frame.
pub async fn write_hello<W>(stream: &mut W, major: i16, minor: i16) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    write_frame_payload(stream, &encode_hello(major, minor)).await
}

/// Reads the client greeting reply, bounded by [`MAX_HELLO_LENGTH`].
pub async fn read_hello_reply<R>(stream: &mut R) -> Result<(i16, i16, String), ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let payload = read_frame(stream, MAX_HELLO_LENGTH).await?;
    parse_hello_reply(&payload)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::{modifiers, MAX_MESSAGE_LENGTH};

    fn round_trip(msg: &Message) -> Message {
        let payload = encode_message(msg);
        decode_message(&payload).expect("decode failed")
    }

    // ── Per-command round-trips ───────────────────────────────────────────────

    #[test]
    fn test_empty_payload_commands_round_trip() {
        for msg in [
            Message::QueryInfo,
            Message::InfoAck,
            Message::ResetOptions,
            Message::Leave,
            Message::KeepAlive,
            Message::Bye,
            Message::Noop,
            Message::Busy,
            Message::UnknownName,
            Message::Bad,
        ] {
            assert_eq!(round_trip(&msg), msg);
        }
    }

    #[test]
    fn test_info_round_trip() {
        let msg = Message::Info {
            x: -1920,
            y: 0,
            w: 1920,
            h: 1080,
            zone: 1,
            mx: 320,
            my: 200,
        };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_enter_round_trip() {
        let msg = Message::Enter {
            x: 1,
            y: 300,
            seq: 7,
            mask: modifiers::SHIFT | modifiers::SCROLL_LOCK,
        };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_key_messages_round_trip() {
        let down = Message::KeyDown {
            key: 0x61,
            mask: modifiers::CTRL,
            button: 38,
        };
        let up = Message::KeyUp {
            key: 0x61,
            mask: 0,
            button: 38,
        };
        let repeat = Message::KeyRepeat {
            key: 0x61,
            mask: 0,
            count: 3,
            button: 38,
        };
        assert_eq!(round_trip(&down), down);
        assert_eq!(round_trip(&up), up);
        assert_eq!(round_trip(&repeat), repeat);
    }

    #[test]
    fn test_mouse_messages_round_trip() {
        for msg in [
            Message::MouseDown { button: 1 },
            Message::MouseUp { button: 3 },
            Message::MouseMove { x: -5, y: 1079 },
            Message::MouseWheel { delta: -120 },
        ] {
            assert_eq!(round_trip(&msg), msg);
        }
    }

    #[test]
    fn test_clipboard_grab_round_trip() {
        let msg = Message::ClipboardGrab {
            id: ClipboardId::Clipboard,
            seq: 42,
        };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_clipboard_data_round_trip() {
        let msg = Message::ClipboardData {
            id: ClipboardId::Primary,
            seq: 9,
            data: b"pasted text".to_vec(),
        };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_clipboard_data_empty_round_trip() {
        let msg = Message::ClipboardData {
            id: ClipboardId::Clipboard,
            seq: 0,
            data: Vec::new(),
        };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_set_options_round_trip() {
        let msg = Message::SetOptions(vec![
            crate::protocol::messages::options::HEARTBEAT,
            5000,
            crate::protocol::messages::options::SWITCH_DELAY,
            250,
        ]);
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_screensaver_round_trip() {
        assert_eq!(
            round_trip(&Message::Screensaver { on: true }),
            Message::Screensaver { on: true }
        );
        assert_eq!(
            round_trip(&Message::Screensaver { on: false }),
            Message::Screensaver { on: false }
        );
    }

    #[test]
    fn test_incompatible_round_trip() {
        let msg = Message::Incompatible { major: 1, minor: 3 };
        assert_eq!(round_trip(&msg), msg);
    }

    // ── Error conditions ──────────────────────────────────────────────────────

    #[test]
    fn test_decode_empty_payload_is_empty_frame() {
        assert!(matches!(decode_message(&[]), Err(ProtocolError::EmptyFrame)));
    }

    #[test]
    fn test_decode_short_code_is_truncated() {
        assert!(matches!(
            decode_message(b"DM"),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    #[test]
    fn test_decode_unknown_command_is_rejected() {
        let result = decode_message(b"XXXX");
        assert!(matches!(
            result,
            Err(ProtocolError::UnknownCommand(code)) if &code == b"XXXX"
        ));
    }

    #[test]
    fn test_decode_truncated_fields_is_rejected() {
        // DMMV declares x:i2,y:i2 but only two bytes follow
        let result = decode_message(b"DMMV\x00\x05");
        assert!(matches!(result, Err(ProtocolError::Truncated { .. })));
    }

    #[test]
    fn test_decode_unknown_clipboard_id_is_malformed() {
        let mut payload = b"CCLP".to_vec();
        payload.push(7); // only ids 0 and 1 exist
        payload.extend_from_slice(&1u32.to_be_bytes());
        assert!(matches!(
            decode_message(&payload),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_set_options_with_absurd_count_is_truncated() {
        // count claims u32::MAX elements but no data follows
        let mut payload = b"DSOP".to_vec();
        payload.extend_from_slice(&u32::MAX.to_be_bytes());
        assert!(matches!(
            decode_message(&payload),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    #[test]
    fn test_trailing_bytes_are_ignored() {
        let mut payload = encode_message(&Message::MouseMove { x: 10, y: 20 });
        payload.extend_from_slice(&[0xAA, 0xBB]);
        assert_eq!(
            decode_message(&payload).unwrap(),
            Message::MouseMove { x: 10, y: 20 }
        );
    }

    // ── Greeting ──────────────────────────────────────────────────────────────

    #[test]
    fn test_hello_reply_round_trip() {
        let payload = encode_hello_reply(1, 3, "workbench");
        let (major, minor, name) = parse_hello_reply(&payload).unwrap();
        assert_eq!((major, minor), (1, 3));
        assert_eq!(name, "workbench");
    }

    #[test]
    fn test_hello_reply_with_negative_version_parses() {
        // negative versions must parse so the handshake can reject them
        let payload = encode_hello_reply(-1, 0, "bad");
        let (major, _, _) = parse_hello_reply(&payload).unwrap();
        assert!(major < 0);
    }

    #[test]
    fn test_hello_reply_wrong_prefix_is_bad_greeting() {
        let payload = b"Wayland\x00\x01\x00\x03".to_vec();
        assert!(matches!(
            parse_hello_reply(&payload),
            Err(ProtocolError::BadGreeting)
        ));
    }

    #[test]
    fn test_hello_encodes_prefix_then_versions() {
        let payload = encode_hello(1, 3);
        assert_eq!(&payload[..7], b"Synergy");
        assert_eq!(&payload[7..], &[0, 1, 0, 3]);
    }

    // ── Frame layer ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_write_then_read_frame_round_trips() {
        let (mut client, mut server) = tokio::io::duplex(256);
        write_frame(&mut client, &Message::Enter { x: 1, y: 300, seq: 1, mask: 0 })
            .await
            .unwrap();
        let msg = read_message(&mut server, MAX_MESSAGE_LENGTH).await.unwrap();
        assert_eq!(
            msg,
            Message::Enter {
                x: 1,
                y: 300,
                seq: 1,
                mask: 0
            }
        );
    }

    #[tokio::test]
    async fn test_read_frame_rejects_oversize_declaration() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client
            .write_all(&(MAX_HELLO_LENGTH + 1).to_be_bytes())
            .await
            .unwrap();
        let result = read_frame(&mut server, MAX_HELLO_LENGTH).await;
        assert!(matches!(result, Err(ProtocolError::OversizeFrame { .. })));
    }

    #[tokio::test]
    async fn test_read_frame_rejects_zero_length() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&0u32.to_be_bytes()).await.unwrap();
        let result = read_frame(&mut server, MAX_HELLO_LENGTH).await;
        assert!(matches!(result, Err(ProtocolError::EmptyFrame)));
    }

    #[tokio::test]
    async fn test_read_frame_eof_mid_frame_is_io_error() {
        let (mut client, mut server) = tokio::io::duplex(64);
        // declare 10 bytes, deliver 3, then hang up
        client.write_all(&10u32.to_be_bytes()).await.unwrap();
        client.write_all(&[1, 2, 3]).await.unwrap();
        drop(client);
        let result = read_frame(&mut server, MAX_HELLO_LENGTH).await;
        assert!(matches!(result, Err(ProtocolError::Io(_))));
    }
}

//! Screen geometry shared between the protocol and the switch engine.

use crate::protocol::messages::Message;

/// A screen's rectangle in its own coordinate space.
///
/// The origin may be negative; the wire carries coordinates as 16-bit
/// two's-complement values, while the switch engine does its arithmetic in
/// `i32` so intermediate sums cannot overflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenShape {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl ScreenShape {
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    /// Returns `true` if `(px, py)` lies inside the rectangle.
    pub fn contains(&self, px: i32, py: i32) -> bool {
        px >= self.x && px < self.x + self.w && py >= self.y && py < self.y + self.h
    }

    /// Center pixel of the rectangle.
    pub fn center(&self) -> (i32, i32) {
        (self.x + self.w / 2, self.y + self.h / 2)
    }
}

/// Everything a screen reports about itself in a `DINF` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientInfo {
    pub shape: ScreenShape,
    /// Width in pixels of the edge strips that trigger a jump.
    pub zone_size: i32,
    /// Cursor position last reported by the owner of the screen.
    pub mx: i32,
    pub my: i32,
}

impl ClientInfo {
    /// Builds the `DINF` message carrying this info.
    pub fn to_message(&self) -> Message {
        Message::Info {
            x: self.shape.x as i16,
            y: self.shape.y as i16,
            w: self.shape.w as i16,
            h: self.shape.h as i16,
            zone: self.zone_size as i16,
            mx: self.mx as i16,
            my: self.my as i16,
        }
    }

    /// Extracts info from a decoded `DINF` message; `None` for other commands.
    pub fn from_message(msg: &Message) -> Option<Self> {
        match *msg {
            Message::Info {
                x,
                y,
                w,
                h,
                zone,
                mx,
                my,
            } => Some(Self {
                shape: ScreenShape::new(x as i32, y as i32, w as i32, h as i32),
                zone_size: zone as i32,
                mx: mx as i32,
                my: my as i32,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_is_inclusive_of_origin_exclusive_of_far_edge() {
        let shape = ScreenShape::new(0, 0, 1000, 800);
        assert!(shape.contains(0, 0));
        assert!(shape.contains(999, 799));
        assert!(!shape.contains(1000, 400));
        assert!(!shape.contains(500, 800));
    }

    #[test]
    fn test_contains_with_negative_origin() {
        let shape = ScreenShape::new(-800, 0, 800, 600);
        assert!(shape.contains(-1, 10));
        assert!(!shape.contains(0, 10));
    }

    #[test]
    fn test_center_of_even_rectangle() {
        let shape = ScreenShape::new(0, 0, 1000, 800);
        assert_eq!(shape.center(), (500, 400));
    }

    #[test]
    fn test_info_message_round_trip() {
        let info = ClientInfo {
            shape: ScreenShape::new(-1920, 0, 1920, 1080),
            zone_size: 1,
            mx: 320,
            my: 200,
        };
        let restored = ClientInfo::from_message(&info.to_message()).unwrap();
        assert_eq!(restored, info);
    }

    #[test]
    fn test_from_message_rejects_other_commands() {
        assert!(ClientInfo::from_message(&Message::Leave).is_none());
    }
}

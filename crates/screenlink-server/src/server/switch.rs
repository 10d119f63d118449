//! The cursor switching state machine.
//!
//! Tracks which screen has the cursor and where it is, detects jump-zone
//! crossings on the primary screen and out-of-bounds motion on secondaries,
//! resolves the destination through the neighbor links (skipping screens
//! that are configured but not connected), and performs the switch: leave
//! the old screen, enter the new one with a fresh sequence number, and push
//! the clipboards along.
//!
//! All methods here run under the server lock.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use screenlink_core::domain::config::Direction;
use screenlink_core::protocol::messages::modifiers;
use screenlink_core::{ClientInfo, ClipboardId, ScreenShape};

use super::{SaverState, ServerState};
use crate::error::SessionError;
use crate::screen::ScreenSink;

impl ServerState {
    /// `true` while the cursor may not leave the active screen: the primary
    /// driver holds it (e.g. mid-drag) or scroll lock is toggled on.
    pub(crate) fn is_locked_to_screen(&self) -> bool {
        let Some(primary) = &self.primary else {
            return false;
        };
        if primary.is_locked_to_screen() {
            return true;
        }
        primary.toggle_mask() & modifiers::SCROLL_LOCK != 0
    }

    /// Absolute cursor motion on the primary screen.
    ///
    /// Returns `true` if the motion crossed a jump zone and the cursor
    /// switched screens.  Precondition: the primary is active; motion that
    /// races a concurrent switch is ignored.
    pub(crate) fn on_mouse_move_primary(&mut self, mut x: i32, mut y: i32) -> bool {
        if !self.active_is_primary() {
            return false;
        }
        if self.is_locked_to_screen() {
            return false;
        }
        let (shape, zone) = match self.active_sink() {
            Some(active) => (active.shape(), active.jump_zone_size()),
            None => return false,
        };

        // which jump zone, if any, did the cursor land in?  the coordinate
        // is pushed one zone-width outward so the traversal sees it beyond
        // the shared edge
        let dir = if x < shape.x + zone {
            x -= zone;
            Direction::Left
        } else if x >= shape.x + shape.w - zone {
            x += zone;
            Direction::Right
        } else if y < shape.y + zone {
            y -= zone;
            Direction::Top
        } else if y >= shape.y + shape.h - zone {
            y += zone;
            Direction::Bottom
        } else {
            return false;
        };
        debug!(side = %dir, "cursor crossed into jump zone");

        let active = self.active.clone();
        let Some((dst, nx, ny)) = self.map_to_neighbor(&active, dir, x, y) else {
            return false;
        };
        self.switch_screen(&dst, nx, ny, false);
        true
    }

    /// Relative cursor motion while a secondary screen is active.
    ///
    /// Accumulates into the tracked position; when the position leaves the
    /// active screen's rectangle the cursor either moves to a neighbor or is
    /// clamped to the edge.
    pub(crate) fn on_mouse_move_secondary(&mut self, dx: i32, dy: i32) {
        if self.active_is_primary() {
            // the active secondary disconnected while this motion was in
            // flight and we already jumped home; drop the motion
            return;
        }
        let Some(active) = self.active_sink() else {
            return;
        };
        let (x_old, y_old) = (self.x, self.y);
        self.x += dx;
        self.y += dy;
        let shape = active.shape();

        let mut target = None;
        if self.is_locked_to_screen() {
            debug!(screen = %self.active, "locked to screen; clamping");
            self.clamp_cursor_to(shape);
        } else {
            let dir = if self.x < shape.x {
                Some(Direction::Left)
            } else if self.x > shape.x + shape.w - 1 {
                Some(Direction::Right)
            } else if self.y < shape.y {
                Some(Direction::Top)
            } else if self.y > shape.y + shape.h - 1 {
                Some(Direction::Bottom)
            } else {
                None
            };
            if let Some(dir) = dir {
                debug!(screen = %self.active, side = %dir, "cursor left the active screen");
                let active_name = self.active.clone();
                target = self.map_to_neighbor(&active_name, dir, self.x, self.y);
                if target.is_none() {
                    debug!("no neighbor; clamping");
                    self.clamp_cursor_to(shape);
                }
            }
        }

        match target {
            Some((dst, nx, ny)) => self.switch_screen(&dst, nx, ny, false),
            None => {
                if (self.x, self.y) != (x_old, y_old) {
                    active.mouse_move(self.x, self.y);
                }
            }
        }
    }

    /// Moves the cursor to `(x, y)` on screen `dst`.
    ///
    /// A switch to the already-active screen is just a warp.  Otherwise the
    /// old screen is left (a refusal aborts the switch), primary-owned
    /// clipboards are snapshotted when leaving the primary, and the new
    /// screen is entered with the next sequence number and the current
    /// clipboard contents.
    pub(crate) fn switch_screen(&mut self, dst: &str, x: i32, y: i32, for_screensaver: bool) {
        let Some(dst_sink) = self.clients.get(dst).cloned() else {
            warn!(screen = %dst, "switch target is not connected");
            return;
        };
        self.x = x;
        self.y = y;

        if self.active == dst {
            // wrapping means leaving and re-entering the same screen; skip
            // the round trip and just warp
            dst_sink.mouse_move(x, y);
            return;
        }

        info!(from = %self.active, to = %dst, x, y, "switching screens");

        if let Some(active) = self.active_sink() {
            if !active.leave() {
                warn!(screen = %self.active, "cannot leave screen");
                return;
            }
        }

        if self.active_is_primary() {
            self.snapshot_primary_clipboards();
        }

        self.active = dst.to_string();
        let seq = self.seq.next();
        let mask = self.primary.as_ref().map(|p| p.toggle_mask()).unwrap_or(0);
        dst_sink.enter(x, y, seq, mask, for_screensaver);

        for id in ClipboardId::ALL {
            dst_sink.set_clipboard(id, &self.clipboards[id.index()].data);
        }
    }

    /// Screensaver transition on the server.
    ///
    /// Activation remembers where the cursor was and forces it home to the
    /// primary; deactivation restores it if the saved screen is still
    /// connected, clamping the saved position into the screen's interior in
    /// case it changed resolution while the saver ran.  All connected
    /// screens are told about the transition either way.
    pub(crate) fn on_screensaver(&mut self, activated: bool) {
        debug!(activated, "screensaver state changed");
        if activated {
            self.saver = Some(SaverState {
                screen: self.active.clone(),
                x: self.x,
                y: self.y,
            });
            if !self.active_is_primary() {
                if let Some(primary) = self.primary_name().map(str::to_string) {
                    self.switch_screen(&primary, 0, 0, true);
                }
            }
        } else if let Some(saver) = self.saver.take() {
            if self.primary_name() != Some(saver.screen.as_str()) {
                if let Some(screen) = self.clients.get(&saver.screen).cloned() {
                    let shape = screen.shape();
                    let zone = screen.jump_zone_size();
                    let x = saver.x.clamp(shape.x + zone, shape.x + shape.w - zone - 1);
                    let y = saver.y.clamp(shape.y + zone, shape.y + shape.h - zone - 1);
                    self.switch_screen(&saver.screen, x, y, false);
                }
            }
        }

        for client in self.clients.values() {
            client.screensaver(activated);
        }
    }

    /// A connected screen reported new shape or cursor info.
    ///
    /// # Errors
    ///
    /// [`SessionError::BadClient`] when the name is not connected.
    pub(crate) fn info_changed(&mut self, name: &str, info: ClientInfo) -> Result<(), SessionError> {
        if !self.clients.contains_key(name) {
            return Err(SessionError::BadClient(format!(
                "info from unregistered screen \"{name}\""
            )));
        }
        if self.active == name {
            self.x = info.mx;
            self.y = info.my;
        }
        info!(
            screen = %name,
            x = info.shape.x,
            y = info.shape.y,
            w = info.shape.w,
            h = info.shape.h,
            zone = info.zone_size,
            mx = info.mx,
            my = info.my,
            "screen info changed"
        );

        // a primary resolution change can strand the cursor inside a jump
        // zone or outside a secondary's rectangle; re-evaluate immediately
        if self.primary_name() == Some(name) {
            if self.active_is_primary() {
                let (x, y) = (self.x, self.y);
                self.on_mouse_move_primary(x, y);
            } else {
                self.on_mouse_move_secondary(0, 0);
            }
        }
        Ok(())
    }

    /// Hook for key combinations that switch screens without cursor motion.
    /// The base engine defines none.
    pub(crate) fn on_command_key(&mut self, _key: u16, _mask: u16, _down: bool) -> bool {
        false
    }

    fn clamp_cursor_to(&mut self, shape: ScreenShape) {
        self.x = self.x.clamp(shape.x, shape.x + shape.w - 1);
        self.y = self.y.clamp(shape.y, shape.y + shape.h - 1);
    }

    // ── Neighbor traversal ────────────────────────────────────────────────────

    /// First *connected* screen in direction `dir` of `from`, skipping over
    /// configured-but-unconnected names.  A cycle of unconnected names
    /// terminates the walk.
    fn connected_neighbor(&self, from: &str, dir: Direction) -> Option<String> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut cur = from.to_string();
        loop {
            let next = self.config.neighbor(&cur, dir)?.to_string();
            if self.clients.contains_key(&next) {
                return Some(next);
            }
            debug!(screen = %next, side = %dir, "skipping unconnected screen");
            if !visited.insert(next.clone()) {
                return None;
            }
            cur = next;
        }
    }

    fn screen_shape(&self, name: &str) -> Option<ScreenShape> {
        self.clients.get(name).map(|c| c.shape())
    }

    /// Resolves a cursor that crossed `src`'s edge in direction `dir` to a
    /// destination screen and position.
    ///
    /// `(x, y)` is the cursor after being pushed past the shared edge.  The
    /// walk runs in each screen's canonical space (origin at top-left),
    /// fetching the candidate's dimensions, adjusting the travel-axis
    /// coordinate, then testing — identically in all four directions.  If
    /// the chain of connected screens ends before the coordinate lands, the
    /// last good screen wins and the coordinate is clamped into it.  The
    /// orthogonal coordinate is rescaled by linear proportion between the
    /// source and destination extents.
    pub(crate) fn map_to_neighbor(
        &self,
        src: &str,
        dir: Direction,
        x: i32,
        y: i32,
    ) -> Option<(String, i32, i32)> {
        let src_shape = self.screen_shape(src)?;
        let mut dst = self.connected_neighbor(src, dir)?;
        let mut dst_shape = self.screen_shape(&dst)?;

        let mut p = match dir {
            Direction::Left | Direction::Right => x - src_shape.x,
            Direction::Top | Direction::Bottom => y - src_shape.y,
        };

        match dir {
            Direction::Left => loop {
                p += dst_shape.w;
                if p >= 0 {
                    break;
                }
                match self.connected_neighbor(&dst, dir) {
                    Some(next) => {
                        debug!(screen = %dst, "skipping over screen");
                        dst = next;
                        dst_shape = self.screen_shape(&dst)?;
                    }
                    None => {
                        p = 0;
                        break;
                    }
                }
            },
            Direction::Right => {
                let mut leaving = src_shape.w;
                loop {
                    p -= leaving;
                    if p < dst_shape.w {
                        break;
                    }
                    leaving = dst_shape.w;
                    match self.connected_neighbor(&dst, dir) {
                        Some(next) => {
                            debug!(screen = %dst, "skipping over screen");
                            dst = next;
                            dst_shape = self.screen_shape(&dst)?;
                        }
                        None => {
                            p = dst_shape.w - 1;
                            break;
                        }
                    }
                }
            }
            Direction::Top => loop {
                p += dst_shape.h;
                if p >= 0 {
                    break;
                }
                match self.connected_neighbor(&dst, dir) {
                    Some(next) => {
                        debug!(screen = %dst, "skipping over screen");
                        dst = next;
                        dst_shape = self.screen_shape(&dst)?;
                    }
                    None => {
                        p = 0;
                        break;
                    }
                }
            },
            Direction::Bottom => {
                let mut leaving = src_shape.h;
                loop {
                    p -= leaving;
                    if p < dst_shape.h {
                        break;
                    }
                    leaving = dst_shape.h;
                    match self.connected_neighbor(&dst, dir) {
                        Some(next) => {
                            debug!(screen = %dst, "skipping over screen");
                            dst = next;
                            dst_shape = self.screen_shape(&dst)?;
                        }
                        None => {
                            p = dst_shape.h - 1;
                            break;
                        }
                    }
                }
            }
        }

        // entering the primary must land past its jump zone when the side
        // being entered also has a neighbor, or the cursor would jump
        // straight back out
        if self.primary_name() == Some(dst.as_str()) {
            let zone = self.clients.get(&dst)?.jump_zone_size();
            match dir {
                Direction::Left => {
                    if self.config.neighbor(&dst, Direction::Right).is_some() {
                        p = p.min(dst_shape.w - 1 - zone);
                    }
                }
                Direction::Right => {
                    if self.config.neighbor(&dst, Direction::Left).is_some() {
                        p = p.max(zone);
                    }
                }
                Direction::Top => {
                    if self.config.neighbor(&dst, Direction::Bottom).is_some() {
                        p = p.min(dst_shape.h - 1 - zone);
                    }
                }
                Direction::Bottom => {
                    if self.config.neighbor(&dst, Direction::Top).is_some() {
                        p = p.max(zone);
                    }
                }
            }
        }

        // rescale the orthogonal coordinate: a cursor 20% down the source
        // edge enters 20% down the destination edge
        let (ortho, src_lo, src_extent, dst_lo, dst_extent) = match dir {
            Direction::Left | Direction::Right => {
                (y, src_shape.y, src_shape.h, dst_shape.y, dst_shape.h)
            }
            Direction::Top | Direction::Bottom => {
                (x, src_shape.x, src_shape.w, dst_shape.x, dst_shape.w)
            }
        };
        let mut q = ortho - src_lo;
        q = if q < 0 {
            0
        } else if q >= src_extent {
            dst_extent - 1
        } else if src_extent > 1 {
            (q as f64 * (dst_extent - 1) as f64 / (src_extent - 1) as f64 + 0.5) as i32
        } else {
            0
        };
        q += dst_lo;

        let (nx, ny) = match dir {
            Direction::Left | Direction::Right => (p + dst_shape.x, q),
            Direction::Top | Direction::Bottom => (q, p + dst_shape.y),
        };
        Some((dst, nx, ny))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Screen-map configuration: screens, aliases, neighbor links, and options.
//!
//! The map is declared in a line-oriented text format:
//!
//! ```text
//! section: screens
//!     desk:
//!     laptop:
//!         portable = laptop
//! end
//! section: links
//!     desk:
//!         right = laptop
//!     laptop:
//!         left = desk
//! end
//! section: options
//!     heartbeat = 5000
//! end
//! ```
//!
//! Screens declare canonical names (lines ending in `:`) and aliases
//! (`alias = canonical`).  Links are directed: `right = laptop` under `desk`
//! says the screen to the right of `desk` is `laptop`, and says nothing about
//! what is to the left of `laptop`.  A link target must be a declared name
//! but need not be connected at runtime; the switch engine skips over
//! unconnected screens when it resolves a jump.
//!
//! A config is immutable once adopted by the server; reconfiguration swaps
//! the whole value atomically.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use thiserror::Error;

use crate::protocol::messages::{options, sides, DEFAULT_PORT};

// ── Directions ────────────────────────────────────────────────────────────────

/// One of the four sides of a screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Left,
    Right,
    Top,
    Bottom,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Left,
        Direction::Right,
        Direction::Top,
        Direction::Bottom,
    ];

    /// The side a cursor travelling in this direction enters on.
    pub fn opposite(self) -> Direction {
        match self {
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
            Direction::Top => Direction::Bottom,
            Direction::Bottom => Direction::Top,
        }
    }

    /// Bit in the active-sides mask handed to the primary driver.
    pub fn mask(self) -> u32 {
        match self {
            Direction::Left => sides::LEFT,
            Direction::Right => sides::RIGHT,
            Direction::Top => sides::TOP,
            Direction::Bottom => sides::BOTTOM,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::Top => "top",
            Direction::Bottom => "bottom",
        }
    }

    fn parse(s: &str) -> Option<Direction> {
        match s.to_ascii_lowercase().as_str() {
            "left" => Some(Direction::Left),
            "right" => Some(Direction::Right),
            "top" | "up" => Some(Direction::Top),
            "bottom" | "down" => Some(Direction::Bottom),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors raised while building or parsing a screen map.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// A canonical name was declared twice.
    #[error("duplicate screen name: {0}")]
    DuplicateScreen(String),

    /// An alias collides with a canonical name or another alias.
    #[error("name already in use: {0}")]
    NameInUse(String),

    /// A link or alias references a name that was never declared.
    #[error("undefined screen name: {0}")]
    UndefinedScreen(String),

    /// A line could not be parsed.
    #[error("screen map syntax error at line {line}: {message}")]
    Syntax { line: usize, message: String },
}

fn syntax(line: usize, message: impl Into<String>) -> ConfigError {
    ConfigError::Syntax {
        line,
        message: message.into(),
    }
}

// ── ScreenConfig ──────────────────────────────────────────────────────────────

/// The complete screen map adopted by the server.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScreenConfig {
    /// Canonical names in declaration order.
    screens: Vec<String>,
    /// alias → canonical.
    aliases: HashMap<String, String>,
    /// (canonical, side) → canonical neighbor.
    links: HashMap<(String, Direction), String>,
    /// Numeric screen options forwarded to clients via `SetOptions`.
    options: BTreeMap<String, u32>,
    /// Listen address for client sessions, `host:port`.
    address: Option<String>,
    /// Optional listen address for the admin endpoint.
    admin_address: Option<String>,
}

impl ScreenConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Construction ──────────────────────────────────────────────────────────

    /// Declares a canonical screen name.
    ///
    /// # Errors
    ///
    /// [`ConfigError::DuplicateScreen`] if the name is already a canonical
    /// name, [`ConfigError::NameInUse`] if it collides with an alias.
    pub fn add_screen(&mut self, name: &str) -> Result<(), ConfigError> {
        if self.screens.iter().any(|s| s == name) {
            return Err(ConfigError::DuplicateScreen(name.to_string()));
        }
        if self.aliases.contains_key(name) {
            return Err(ConfigError::NameInUse(name.to_string()));
        }
        self.screens.push(name.to_string());
        Ok(())
    }

    /// Declares `alias` as another name for the canonical screen `canonical`.
    pub fn add_alias(&mut self, alias: &str, canonical: &str) -> Result<(), ConfigError> {
        if !self.screens.iter().any(|s| s == canonical) {
            return Err(ConfigError::UndefinedScreen(canonical.to_string()));
        }
        if self.screens.iter().any(|s| s == alias) || self.aliases.contains_key(alias) {
            return Err(ConfigError::NameInUse(alias.to_string()));
        }
        self.aliases
            .insert(alias.to_string(), canonical.to_string());
        Ok(())
    }

    /// Declares that the screen on side `side` of `from` is `to`.
    ///
    /// Both names may be canonical or aliases; the link is stored in
    /// canonical form.  Links are directed; callers wanting symmetric
    /// traversal declare both edges.
    pub fn add_link(&mut self, from: &str, side: Direction, to: &str) -> Result<(), ConfigError> {
        let from = self
            .canonical_name(from)
            .ok_or_else(|| ConfigError::UndefinedScreen(from.to_string()))?
            .to_string();
        let to = self
            .canonical_name(to)
            .ok_or_else(|| ConfigError::UndefinedScreen(to.to_string()))?
            .to_string();
        self.links.insert((from, side), to);
        Ok(())
    }

    /// Sets a numeric screen option by its config-file name.
    pub fn set_option(&mut self, name: &str, value: u32) {
        self.options.insert(name.to_string(), value);
    }

    /// Sets the client-session listen address (`host:port`).
    pub fn set_address(&mut self, address: &str) {
        self.address = Some(address.to_string());
    }

    /// Sets the admin listen address (`host:port`).
    pub fn set_admin_address(&mut self, address: &str) {
        self.admin_address = Some(address.to_string());
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    /// Returns `true` if `name` is a canonical name or an alias.
    pub fn is_screen(&self, name: &str) -> bool {
        self.canonical_name(name).is_some()
    }

    /// Resolves a canonical name or alias to the canonical name.
    pub fn canonical_name(&self, name: &str) -> Option<&str> {
        if let Some(canonical) = self.screens.iter().find(|s| s.as_str() == name) {
            return Some(canonical);
        }
        self.aliases.get(name).map(String::as_str)
    }

    /// Returns the canonical neighbor on `side` of `name`, if any is linked.
    pub fn neighbor(&self, name: &str, side: Direction) -> Option<&str> {
        let canonical = self.canonical_name(name)?;
        self.links
            .get(&(canonical.to_string(), side))
            .map(String::as_str)
    }

    /// Canonical screen names in declaration order.
    pub fn screen_names(&self) -> impl Iterator<Item = &str> {
        self.screens.iter().map(String::as_str)
    }

    /// Numeric options as the flat `(id, value)` pair list `SetOptions` carries.
    pub fn option_pairs(&self) -> Vec<u32> {
        let mut pairs = Vec::with_capacity(self.options.len() * 2);
        for (name, value) in &self.options {
            if let Some(id) = option_id_for(name) {
                pairs.push(id);
                pairs.push(*value);
            }
        }
        pairs
    }

    /// Listen address for client sessions.
    pub fn server_address(&self) -> String {
        self.address
            .clone()
            .unwrap_or_else(|| format!("0.0.0.0:{DEFAULT_PORT}"))
    }

    /// Admin listen address, if one was configured.
    pub fn admin_address(&self) -> Option<&str> {
        self.admin_address.as_deref()
    }

    // ── Parsing ───────────────────────────────────────────────────────────────

    /// Parses the textual screen-map format.
    ///
    /// The `screens` section must precede `links` so every link target can be
    /// validated against the declared names.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on syntax errors, duplicate or colliding
    /// names, and links to undeclared screens.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        #[derive(PartialEq)]
        enum Section {
            None,
            Screens,
            Links,
            Options,
        }

        let mut config = ScreenConfig::new();
        let mut section = Section::None;
        let mut current_screen: Option<String> = None;
        // (line, from, side, to) resolved after the whole section is read so
        // forward references within the links section work
        let mut pending_links: Vec<(usize, String, Direction, String)> = Vec::new();

        for (idx, raw) in text.lines().enumerate() {
            let lineno = idx + 1;
            let line = match raw.find('#') {
                Some(pos) => &raw[..pos],
                None => raw,
            }
            .trim();
            if line.is_empty() {
                continue;
            }

            if let Some(rest) = line.strip_prefix("section:") {
                if section != Section::None {
                    return Err(syntax(lineno, "missing `end` before new section"));
                }
                section = match rest.trim() {
                    "screens" => Section::Screens,
                    "links" => Section::Links,
                    "options" => Section::Options,
                    other => return Err(syntax(lineno, format!("unknown section `{other}`"))),
                };
                current_screen = None;
                continue;
            }

            if line == "end" {
                if section == Section::None {
                    return Err(syntax(lineno, "`end` outside of a section"));
                }
                section = Section::None;
                current_screen = None;
                continue;
            }

            match section {
                Section::None => {
                    return Err(syntax(lineno, "expected `section:` or `end`"));
                }
                Section::Screens => {
                    if let Some(name) = line.strip_suffix(':') {
                        let name = name.trim();
                        if name.is_empty() {
                            return Err(syntax(lineno, "empty screen name"));
                        }
                        config.add_screen(name)?;
                        current_screen = Some(name.to_string());
                    } else if let Some((alias, canonical)) = split_assignment(line) {
                        config.add_alias(alias, canonical)?;
                    } else {
                        return Err(syntax(lineno, "expected `name:` or `alias = name`"));
                    }
                }
                Section::Links => {
                    if let Some(name) = line.strip_suffix(':') {
                        let name = name.trim().to_string();
                        if name.is_empty() {
                            return Err(syntax(lineno, "empty screen name"));
                        }
                        current_screen = Some(name);
                    } else if let Some((side, target)) = split_assignment(line) {
                        let from = current_screen
                            .clone()
                            .ok_or_else(|| syntax(lineno, "link before any screen name"))?;
                        let side = Direction::parse(side)
                            .ok_or_else(|| syntax(lineno, format!("unknown side `{side}`")))?;
                        pending_links.push((lineno, from, side, target.to_string()));
                    } else {
                        return Err(syntax(lineno, "expected `name:` or `side = name`"));
                    }
                }
                Section::Options => {
                    let (key, value) = split_assignment(line)
                        .ok_or_else(|| syntax(lineno, "expected `key = value`"))?;
                    match key {
                        "address" => config.set_address(value),
                        "adminAddress" => config.set_admin_address(value),
                        _ => {
                            if option_id_for(key).is_none() {
                                return Err(syntax(lineno, format!("unknown option `{key}`")));
                            }
                            let value = parse_option_value(value)
                                .ok_or_else(|| syntax(lineno, format!("bad value `{value}`")))?;
                            config.set_option(key, value);
                        }
                    }
                }
            }
        }

        if section != Section::None {
            return Err(syntax(text.lines().count(), "unterminated section"));
        }

        for (lineno, from, side, to) in pending_links {
            config.add_link(&from, side, &to).map_err(|e| match e {
                ConfigError::UndefinedScreen(name) => {
                    syntax(lineno, format!("link references undefined screen `{name}`"))
                }
                other => other,
            })?;
        }

        Ok(config)
    }
}

/// Renders the same textual format [`ScreenConfig::parse`] accepts.
impl fmt::Display for ScreenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "section: screens")?;
        for screen in &self.screens {
            writeln!(f, "\t{screen}:")?;
            let mut aliases: Vec<&str> = self
                .aliases
                .iter()
                .filter(|(_, canonical)| canonical.as_str() == screen.as_str())
                .map(|(alias, _)| alias.as_str())
                .collect();
            aliases.sort_unstable();
            for alias in aliases {
                writeln!(f, "\t\t{alias} = {screen}")?;
            }
        }
        writeln!(f, "end")?;

        writeln!(f, "section: links")?;
        for screen in &self.screens {
            let mut wrote_header = false;
            for side in Direction::ALL {
                if let Some(neighbor) = self.links.get(&(screen.clone(), side)) {
                    if !wrote_header {
                        writeln!(f, "\t{screen}:")?;
                        wrote_header = true;
                    }
                    writeln!(f, "\t\t{side} = {neighbor}")?;
                }
            }
        }
        writeln!(f, "end")?;

        writeln!(f, "section: options")?;
        if let Some(address) = &self.address {
            writeln!(f, "\taddress = {address}")?;
        }
        if let Some(admin) = &self.admin_address {
            writeln!(f, "\tadminAddress = {admin}")?;
        }
        for (name, value) in &self.options {
            writeln!(f, "\t{name} = {value}")?;
        }
        writeln!(f, "end")
    }
}

// ── Parse helpers ─────────────────────────────────────────────────────────────

fn split_assignment(line: &str) -> Option<(&str, &str)> {
    let (lhs, rhs) = line.split_once('=')?;
    let lhs = lhs.trim();
    let rhs = rhs.trim();
    if lhs.is_empty() || rhs.is_empty() {
        None
    } else {
        Some((lhs, rhs))
    }
}

/// Maps a config-file option name to its wire id.
fn option_id_for(name: &str) -> Option<u32> {
    match name {
        "heartbeat" => Some(options::HEARTBEAT),
        "switchDelay" => Some(options::SWITCH_DELAY),
        "halfDuplexCapsLock" => Some(options::HALF_DUPLEX_CAPS_LOCK),
        "halfDuplexNumLock" => Some(options::HALF_DUPLEX_NUM_LOCK),
        _ => None,
    }
}

fn parse_option_value(value: &str) -> Option<u32> {
    match value {
        "true" | "on" => Some(1),
        "false" | "off" => Some(0),
        other => other.parse().ok(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! screenlink server library.
//!
//! Re-exports all public modules so integration tests in `tests/` and the
//! binary entry point in `main.rs` share the same module tree.

pub mod client;
pub mod error;
pub mod platform;
pub mod screen;
pub mod server;
pub mod session;
pub mod settings;

pub use error::SessionError;
pub use server::Server;
pub use session::SessionSupervisor;

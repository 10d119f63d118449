//! Screen implementations: the remote-client proxy and the local-machine
//! adapter.

pub mod primary;
pub mod proxy;

pub use primary::PrimaryClient;
pub use proxy::ClientProxy;

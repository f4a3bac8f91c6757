//! Wire envelope and transports for the scenecomp service
//!
//! Requests are single JSON lines `{"id"?, "method", "params"}`; every
//! request gets exactly one response line.
//!
//! ```ignore
//! let handler = Arc::new(Mutex::new(service));
//! let _server = ProtocolServer::start(handler, DEFAULT_PORT);
//! ```

pub mod protocol;
pub mod server;

pub use protocol::*;
pub use server::{handle_line, ProtocolServer, RequestHandler};

/// Default TCP port
pub const DEFAULT_PORT: u16 = 9752;

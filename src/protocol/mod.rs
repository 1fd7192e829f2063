//! RESP2 framing
//!
//! Just enough of the wire format to carry an opaque request and read back
//! one reply. Which commands exist and what their arguments mean is left to
//! callers.

pub mod reply;
pub mod request;

pub use reply::{ProtocolError, Reply};
pub use request::Request;

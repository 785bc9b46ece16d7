//! The local UI control socket: message shapes (§4.1, §6), the
//! multi-client channel adapter, and the WebSocket transport that carries
//! it (§4.1a).

pub mod channel;
pub mod message;
pub mod transport;

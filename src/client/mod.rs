//! Client side of the chat protocol.
//!
//! The client is a single-connection, half-duplex process that:
//! - Connects to the server over TCP
//! - Sends one line per user message
//! - Frames the reply without a length prefix
//! - Renders plain-text and tagged replies to the terminal

pub mod framer;
pub mod render;
pub mod session;
pub mod socket;

pub use framer::Framer;
pub use render::Renderer;
pub use session::{Session, SessionEnd};
pub use socket::connect;

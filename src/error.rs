//! Error kinds for talking to the server.
//!
//! Every [`ClientError`] ends the current exchange, and the session ends with
//! it: there is no retry or reconnect. Tag parsing never produces an error;
//! missing tags fall back to verbatim output instead.

use std::io;
use thiserror::Error;

/// Failure while connecting to or exchanging data with the server.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The hostname could not be resolved to any address.
    #[error("failed to resolve hostname: {host}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },

    /// The TCP handshake failed for every resolved address.
    #[error("failed to connect to {addr}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The outbound line could not be written in full.
    #[error("failed to send message")]
    Send(#[source] io::Error),

    /// The peer closed the connection before any byte of a reply arrived.
    #[error("server closed the connection")]
    ConnectionClosed,

    /// A read failed for a reason other than would-block.
    #[error("failed to receive response")]
    Receive(#[source] io::Error),
}

/// Reasons a line of user text cannot be sent as-is.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("message is {len} bytes, the limit is {max}")]
    TooLong { len: usize, max: usize },

    #[error("message contains a line terminator")]
    EmbeddedTerminator,
}

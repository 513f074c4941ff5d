//! Interactive read-send-render loop.
//!
//! The session owns the connection. Exchanges run strictly one at a time on
//! a blocking worker; a termination signal is raced against both the input
//! read and the in-flight exchange, and releases the connection when it wins.

use crate::client::framer::Framer;
use crate::client::render::Renderer;
use crate::client::socket::Transport;
use crate::error::{ClientError, MessageError};
use crate::protocol::OutboundMessage;
use anyhow::{Context, Result};
use std::future::Future;
use std::io::{self, Write};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

const WELCOME: &str = "Enter a message (type '/help' for commands, 'exit' to quit):";
const PROMPT: &str = "> ";

const HELP: &str = "
=== Available Commands ===
/help   - Display this help message
/clear  - Clear conversation history
/models - Show available models and current model
/model model_name - Change the model being used
exit    - Exit the client
========================
";

/// Why a session stopped without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The user typed `exit`.
    Exit,
    /// Input reached end of file.
    EndOfInput,
    /// A termination signal arrived; the connection has been released.
    Signalled,
}

/// One connected conversation with the server.
pub struct Session<T: Transport> {
    connection: Arc<T>,
    framer: Framer,
    renderer: Renderer,
    max_input: usize,
}

impl<T: Transport> Session<T> {
    pub fn new(connection: T, framer: Framer, renderer: Renderer, max_input: usize) -> Self {
        Self {
            connection: Arc::new(connection),
            framer,
            renderer,
            max_input,
        }
    }

    /// Run until `exit`, end of input, a signal or the first connection error.
    pub async fn run<I, W, S>(&self, mut input: I, out: &mut W, shutdown: S) -> Result<SessionEnd>
    where
        I: AsyncBufRead + Unpin,
        W: Write,
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        writeln!(out, "{}", WELCOME)?;

        loop {
            write!(out, "{}", PROMPT)?;
            out.flush()?;

            let mut line = Vec::new();
            let read = tokio::select! {
                biased;
                _ = &mut shutdown => return Ok(self.release()),
                read = input.read_until(b'\n', &mut line) => read.context("Failed to read input")?,
            };
            if read == 0 {
                debug!("End of input");
                return Ok(SessionEnd::EndOfInput);
            }
            strip_line_ending(&mut line);

            match line.as_slice() {
                b"exit" => {
                    writeln!(out, "Terminating connection...")?;
                    return Ok(SessionEnd::Exit);
                }
                b"/help" => {
                    writeln!(out, "{}", HELP)?;
                    continue;
                }
                _ => {}
            }

            let message = match OutboundMessage::new(line, self.max_input) {
                Ok(message) => message,
                Err(e @ MessageError::TooLong { .. }) => {
                    writeln!(out, "Message not sent: {}", e)?;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            debug!("Sending {:?}", message.text());
            let connection = Arc::clone(&self.connection);
            let framer = self.framer.clone();
            let exchange = tokio::task::spawn_blocking(move || framer.exchange(&*connection, &message));

            let payload = tokio::select! {
                biased;
                _ = &mut shutdown => return Ok(self.release()),
                joined = exchange => joined
                    .map_err(|e| ClientError::Receive(io::Error::new(io::ErrorKind::Other, e)))??,
            };

            debug!("Rendering {} byte reply", payload.len());
            self.renderer
                .render(payload.as_bytes(), out)
                .context("Failed to write response")?;
        }
    }

    fn release(&self) -> SessionEnd {
        debug!("Shutdown requested; releasing connection");
        if let Err(e) = self.connection.release() {
            warn!("Failed to release connection: {}", e);
        }
        SessionEnd::Signalled
    }
}

/// Drop a trailing `\n` or `\r\n`.
fn strip_line_ending(line: &mut Vec<u8>) {
    if line.last() == Some(&b'\n') {
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
    }
}

//! Request/response framing over an unframed byte stream.
//!
//! Replies carry no length prefix. A reply is complete when a chunk ends in
//! the line terminator. If the first chunk does not, the connection switches
//! to non-blocking reads and the reply is complete once no data arrives
//! within the idle timeout.

use crate::client::socket::Transport;
use crate::error::ClientError;
use crate::protocol::{OutboundMessage, Payload, TERMINATOR};
use std::io::{self, ErrorKind};
use std::time::Duration;
use tracing::{debug, trace};

/// Bytes requested per read.
pub const DEFAULT_CHUNK_SIZE: usize = 4095;

/// How long a partially received reply may stay silent before it is complete.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(1);

/// Where the receive loop is within one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadPhase {
    /// Blocking read of the first chunk.
    AwaitingFirstChunk,
    /// Non-blocking reads, each preceded by a readiness wait.
    IdlePolling,
}

/// Sends one line and collects the reply that answers it.
#[derive(Debug, Clone)]
pub struct Framer {
    chunk_size: usize,
    idle_timeout: Duration,
}

impl Default for Framer {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_IDLE_TIMEOUT)
    }
}

impl Framer {
    pub fn new(chunk_size: usize, idle_timeout: Duration) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            idle_timeout,
        }
    }

    /// Send `message` and read until the reply is judged complete.
    ///
    /// The connection is back in blocking mode when this returns, whatever
    /// the outcome. Bytes that arrive after the return belong to the next
    /// exchange.
    pub fn exchange<T>(&self, connection: &T, message: &OutboundMessage) -> Result<Payload, ClientError>
    where
        T: Transport + ?Sized,
    {
        self.send(connection, message)?;
        self.receive(connection)
    }

    fn send<T>(&self, connection: &T, message: &OutboundMessage) -> Result<(), ClientError>
    where
        T: Transport + ?Sized,
    {
        let frame = message.frame();
        let written = connection.send(&frame).map_err(ClientError::Send)?;
        if written != frame.len() {
            return Err(ClientError::Send(io::Error::new(
                ErrorKind::WriteZero,
                format!("wrote {} of {} bytes", written, frame.len()),
            )));
        }
        debug!("Sent {} bytes", written);
        Ok(())
    }

    fn receive<T>(&self, connection: &T) -> Result<Payload, ClientError>
    where
        T: Transport + ?Sized,
    {
        let mut response = Vec::new();
        let mut phase = ReadPhase::AwaitingFirstChunk;

        let outcome = self.read_response(connection, &mut response, &mut phase);

        if phase == ReadPhase::IdlePolling {
            connection.set_nonblocking(false).map_err(ClientError::Receive)?;
            trace!("Restored blocking mode");
        }

        outcome?;
        debug!("Received {} byte response", response.len());
        Ok(Payload::new(response))
    }

    fn read_response<T>(
        &self,
        connection: &T,
        response: &mut Vec<u8>,
        phase: &mut ReadPhase,
    ) -> Result<(), ClientError>
    where
        T: Transport + ?Sized,
    {
        let mut chunk = vec![0u8; self.chunk_size];

        loop {
            match *phase {
                ReadPhase::AwaitingFirstChunk => {
                    let n = recv_blocking(connection, &mut chunk)?;
                    if n == 0 {
                        return Err(ClientError::ConnectionClosed);
                    }
                    response.extend_from_slice(&chunk[..n]);
                    trace!("First chunk: {} bytes", n);

                    if chunk[n - 1] == TERMINATOR {
                        return Ok(());
                    }

                    connection.set_nonblocking(true).map_err(ClientError::Receive)?;
                    *phase = ReadPhase::IdlePolling;
                    debug!("Reply continues past first chunk; polling with {:?} idle timeout", self.idle_timeout);
                }
                ReadPhase::IdlePolling => {
                    let ready = connection
                        .wait_readable(self.idle_timeout)
                        .map_err(ClientError::Receive)?;
                    if !ready {
                        debug!("No data for {:?}; reply complete", self.idle_timeout);
                        return Ok(());
                    }

                    match connection.recv(&mut chunk) {
                        Ok(0) => {
                            debug!("Peer closed after partial reply");
                            return Ok(());
                        }
                        Ok(n) => {
                            response.extend_from_slice(&chunk[..n]);
                            trace!("Chunk: {} bytes ({} total)", n, response.len());
                            if chunk[n - 1] == TERMINATOR {
                                return Ok(());
                            }
                        }
                        Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::Interrupted => {
                            continue;
                        }
                        Err(e) => return Err(ClientError::Receive(e)),
                    }
                }
            }
        }
    }
}

/// Blocking read that retries when interrupted by a signal.
fn recv_blocking<T>(connection: &T, buf: &mut [u8]) -> Result<usize, ClientError>
where
    T: Transport + ?Sized,
{
    loop {
        match connection.recv(buf) {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(ClientError::Receive(e)),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{data, ScriptedTransport, Step};
    use super::*;
    use crate::protocol::DEFAULT_MAX_INPUT;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread;

    fn message(text: &str) -> OutboundMessage {
        OutboundMessage::new(text, DEFAULT_MAX_INPUT).unwrap()
    }

    #[test]
    fn test_sends_line_with_terminator() {
        let conn = ScriptedTransport::new([data("ok\n")]);
        Framer::default().exchange(&conn, &message("/models")).unwrap();
        assert_eq!(conn.sent(), b"/models\n".to_vec());
    }

    #[test]
    fn test_short_write_is_send_error() {
        let conn = ScriptedTransport::new([data("ok\n")]).with_short_write(3);
        let err = Framer::default().exchange(&conn, &message("hello")).unwrap_err();
        assert!(matches!(err, ClientError::Send(_)), "got {:?}", err);
        assert_eq!(conn.remaining(), 1);
    }

    #[test]
    fn test_single_terminated_chunk_skips_idle_path() {
        let conn = ScriptedTransport::new([data("<model>m</model><content>hi</content>\n")]);
        let payload = Framer::default().exchange(&conn, &message("hi")).unwrap();

        assert_eq!(payload.text(), "<model>m</model><content>hi</content>\n");
        assert_eq!(conn.polls(), 0);
        assert!(conn.mode_changes().is_empty());
    }

    #[test]
    fn test_unterminated_chunks_end_on_idle() {
        let conn = ScriptedTransport::new([data("abc"), data("def"), data("ghi"), Step::Idle]);
        let payload = Framer::default().exchange(&conn, &message("x")).unwrap();

        assert_eq!(payload.text(), "abcdefghi");
        assert_eq!(conn.mode_changes(), vec![true, false]);
        assert!(!conn.is_nonblocking());
    }

    #[test]
    fn test_terminator_in_later_chunk_completes() {
        let conn = ScriptedTransport::new([data("part one, "), data("part two\n"), data("next reply\n")]);
        let payload = Framer::default().exchange(&conn, &message("x")).unwrap();

        assert_eq!(payload.text(), "part one, part two\n");
        assert_eq!(conn.remaining(), 1);
        assert!(!conn.is_nonblocking());
    }

    #[test]
    fn test_late_bytes_belong_to_next_exchange() {
        let conn = ScriptedTransport::new([data("one"), Step::Idle]);
        let framer = Framer::default();
        assert_eq!(framer.exchange(&conn, &message("a")).unwrap().text(), "one");

        // Bytes arriving after the idle timeout answer the next request.
        conn.push([data(" late\n")]);
        assert_eq!(framer.exchange(&conn, &message("b")).unwrap().text(), " late\n");
        assert_eq!(conn.sent(), b"a\nb\n".to_vec());
        assert_eq!(conn.mode_changes(), vec![true, false]);
    }

    #[test]
    fn test_reply_longer_than_chunk_enters_idle_mode() {
        let conn = ScriptedTransport::new([data("abcdefg\n")]);
        let payload = Framer::new(4, DEFAULT_IDLE_TIMEOUT)
            .exchange(&conn, &message("x"))
            .unwrap();

        assert_eq!(payload.text(), "abcdefg\n");
        assert_eq!(conn.mode_changes(), vec![true, false]);
        assert_eq!(conn.polls(), 1);
    }

    #[test]
    fn test_chunk_ending_in_terminator_ends_early() {
        // A terminator at a chunk boundary mid-reply ends the read there.
        let conn = ScriptedTransport::new([data("abc\ndef\n")]);
        let payload = Framer::new(4, DEFAULT_IDLE_TIMEOUT)
            .exchange(&conn, &message("x"))
            .unwrap();

        assert_eq!(payload.text(), "abc\n");
        assert_eq!(conn.remaining(), 1);
    }

    #[test]
    fn test_close_before_any_byte_is_connection_closed() {
        let conn = ScriptedTransport::new([Step::Eof]);
        let err = Framer::default().exchange(&conn, &message("x")).unwrap_err();
        assert!(matches!(err, ClientError::ConnectionClosed), "got {:?}", err);
        assert!(conn.mode_changes().is_empty());
    }

    #[test]
    fn test_close_after_partial_reply_returns_bytes() {
        let conn = ScriptedTransport::new([data("partial"), Step::Eof]);
        let payload = Framer::default().exchange(&conn, &message("x")).unwrap();
        assert_eq!(payload.text(), "partial");
        assert!(!conn.is_nonblocking());
    }

    #[test]
    fn test_blocking_read_error_is_receive_error() {
        let conn = ScriptedTransport::new([Step::Fail(ErrorKind::ConnectionReset)]);
        let err = Framer::default().exchange(&conn, &message("x")).unwrap_err();
        assert!(matches!(err, ClientError::Receive(_)), "got {:?}", err);
    }

    #[test]
    fn test_interrupted_first_read_is_retried() {
        let conn = ScriptedTransport::new([Step::Fail(ErrorKind::Interrupted), data("ok\n")]);
        let payload = Framer::default().exchange(&conn, &message("x")).unwrap();
        assert_eq!(payload.text(), "ok\n");
    }

    #[test]
    fn test_error_while_polling_discards_bytes_and_restores_mode() {
        let conn = ScriptedTransport::new([data("abc"), Step::Fail(ErrorKind::ConnectionReset)]);
        let err = Framer::default().exchange(&conn, &message("x")).unwrap_err();

        assert!(matches!(err, ClientError::Receive(_)), "got {:?}", err);
        assert_eq!(conn.mode_changes(), vec![true, false]);
    }

    #[test]
    fn test_spurious_would_block_keeps_polling() {
        let conn = ScriptedTransport::new([
            data("abc"),
            Step::Fail(ErrorKind::WouldBlock),
            data("def\n"),
        ]);
        let payload = Framer::default().exchange(&conn, &message("x")).unwrap();
        assert_eq!(payload.text(), "abcdef\n");
    }

    #[test]
    fn test_tcp_multi_chunk_reply_without_terminator() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (mut peer, _) = listener.accept().unwrap();
            let mut line = [0u8; 5];
            peer.read_exact(&mut line).unwrap();
            for part in ["<model>m</model>", "<content>slow", " reply</content>"] {
                peer.write_all(part.as_bytes()).unwrap();
                peer.flush().unwrap();
                thread::sleep(Duration::from_millis(30));
            }
            // Keep the stream open until the client has given up waiting.
            thread::sleep(Duration::from_millis(600));
            line
        });

        let stream = TcpStream::connect(addr).unwrap();
        let payload = Framer::new(DEFAULT_CHUNK_SIZE, Duration::from_millis(250))
            .exchange(&stream, &message("ping"))
            .unwrap();

        assert_eq!(server.join().unwrap(), *b"ping\n");
        assert_eq!(payload.text(), "<model>m</model><content>slow reply</content>");
    }

    #[test]
    fn test_tcp_consecutive_exchanges() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (mut peer, _) = listener.accept().unwrap();
            let mut buf = [0u8; 64];
            for reply in ["first\n", "second\n"] {
                let _ = peer.read(&mut buf).unwrap();
                peer.write_all(reply.as_bytes()).unwrap();
            }
        });

        let stream = TcpStream::connect(addr).unwrap();
        let framer = Framer::default();
        assert_eq!(framer.exchange(&stream, &message("a")).unwrap().text(), "first\n");
        assert_eq!(framer.exchange(&stream, &message("b")).unwrap().text(), "second\n");
        server.join().unwrap();
    }
}

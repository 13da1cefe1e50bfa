//! Single-connection streaming server
//!
//! Blocking I/O throughout: bind, accept exactly one client, read one
//! request, then stream response chunks until the iteration cap and drop the
//! connection. There is no framing; the client reads until EOF.

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::time::Instant;

use thiserror::Error;

use crate::generator::ChunkSource;
use crate::inference::EngineError;
use crate::settings::Settings;

/// Errors from the serving path
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Streams generated text to a single TCP client.
pub struct Server {
    host: String,
    port: u16,
    /// Upper bound on the request read, bytes
    recv_bytes: usize,
    /// Chunks streamed before the connection is closed
    max_iterations: usize,
}

impl Server {
    pub fn new(settings: &Settings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            recv_bytes: settings.recv_bytes,
            max_iterations: settings.max_iterations,
        }
    }

    /// Binds the listening socket.
    pub fn bind(&self) -> Result<TcpListener, ServerError> {
        let listener = TcpListener::bind((self.host.as_str(), self.port))?;
        tracing::info!(host = %self.host, port = self.port, "listening");
        Ok(listener)
    }

    /// Accepts one connection and reads the request.
    ///
    /// Reads at most `recv_bytes` in a single blocking read; whatever
    /// arrived is decoded lossily and logged.
    pub fn accept(&self, listener: &TcpListener) -> Result<(TcpStream, String), ServerError> {
        let (mut conn, peer) = listener.accept()?;
        tracing::info!(%peer, "client connected");

        let mut buf = vec![0u8; self.recv_bytes];
        let n = conn.read(&mut buf)?;
        let request = String::from_utf8_lossy(&buf[..n]).into_owned();
        tracing::info!(bytes = n, request = %request, "request received");

        Ok((conn, request))
    }

    /// Streams chunks to the client, prefixed with a 1-based iteration
    /// counter, until the source ends or the cap is reached.
    ///
    /// A client that disconnects mid-stream ends the response normally;
    /// engine failures propagate. Returns the number of chunks sent.
    pub fn stream_response(
        &self,
        conn: &mut TcpStream,
        source: &mut dyn ChunkSource,
    ) -> Result<usize, ServerError> {
        let start = Instant::now();
        let mut sent = 0;

        for i in 1..=self.max_iterations {
            let chunk = match source.next_chunk() {
                None => break,
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(chunk)) => chunk,
            };

            let msg = format!("Generator iteration {i}{chunk}");
            match conn.write_all(msg.as_bytes()) {
                Ok(()) => sent += 1,
                Err(e) if is_disconnect(&e) => {
                    tracing::info!("client disconnected mid-stream");
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::debug!(
            chunks = sent,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "response streamed"
        );
        Ok(sent)
    }
}

fn is_disconnect(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Client;
    use crate::generator::FixedGenerator;
    use std::time::Duration;

    fn test_settings() -> Settings {
        let mut settings = Settings::default();
        settings.port = 0; // let the OS pick
        settings
    }

    /// Source that yields a counted number of chunks, then ends.
    struct Limited(usize);

    impl ChunkSource for Limited {
        fn next_chunk(&mut self) -> Option<Result<String, EngineError>> {
            if self.0 == 0 {
                return None;
            }
            self.0 -= 1;
            Some(Ok("x".to_string()))
        }
    }

    #[test]
    fn test_full_exchange_with_fixed_source() {
        let settings = test_settings();
        let server = Server::new(&settings);
        let listener = server.bind().expect("bind");
        let port = listener.local_addr().unwrap().port();

        let handle = std::thread::spawn(move || {
            let (mut conn, request) = server.accept(&listener).expect("accept");
            assert_eq!(request, "get on with it");
            let mut source = FixedGenerator::new("Some prompt", Duration::ZERO);
            server.stream_response(&mut conn, &mut source).expect("stream")
        });

        let client = Client::new("127.0.0.1", port);
        let received = client.fetch("get on with it").expect("fetch");

        let sent = handle.join().expect("server thread");
        assert_eq!(sent, 10);
        assert!(received.starts_with("Generator iteration 1Some prompt"));
        assert!(received.contains("Generator iteration 10Some prompt"));
        assert!(!received.contains("Generator iteration 11"));
    }

    #[test]
    fn test_stream_stops_when_source_ends() {
        let settings = test_settings();
        let server = Server::new(&settings);
        let listener = server.bind().expect("bind");
        let port = listener.local_addr().unwrap().port();

        let handle = std::thread::spawn(move || {
            let (mut conn, _request) = server.accept(&listener).expect("accept");
            server
                .stream_response(&mut conn, &mut Limited(3))
                .expect("stream")
        });

        let client = Client::new("127.0.0.1", port);
        let received = client.fetch("go").expect("fetch");

        assert_eq!(handle.join().expect("server thread"), 3);
        assert_eq!(received, "Generator iteration 1xGenerator iteration 2xGenerator iteration 3x");
    }

    #[test]
    fn test_client_disconnect_ends_stream() {
        let mut settings = test_settings();
        settings.max_iterations = 20;
        let server = Server::new(&settings);
        let listener = server.bind().expect("bind");
        let port = listener.local_addr().unwrap().port();

        let handle = std::thread::spawn(move || {
            let (mut conn, _request) = server.accept(&listener).expect("accept");
            // Small delay so writes outlast the client hanging up
            let mut source = FixedGenerator::new("Some prompt", Duration::from_millis(20));
            server
                .stream_response(&mut conn, &mut source)
                .expect("disconnect must not be an error")
        });

        {
            let mut stream = TcpStream::connect(("127.0.0.1", port)).expect("connect");
            stream.write_all(b"go").expect("send");
            let mut buf = [0u8; 64];
            let _ = stream.read(&mut buf);
        } // hang up mid-stream

        // The write after the peer closed surfaces as a disconnect, not Err
        let sent = handle.join().expect("server thread");
        assert!(sent >= 1);
        assert!(sent < 20);
    }

    #[test]
    fn test_request_capped_at_recv_bytes() {
        let mut settings = test_settings();
        settings.recv_bytes = 8;
        let server = Server::new(&settings);
        let listener = server.bind().expect("bind");
        let port = listener.local_addr().unwrap().port();

        let handle = std::thread::spawn(move || {
            let (_conn, request) = server.accept(&listener).expect("accept");
            request
        });

        let client = Client::new("127.0.0.1", port);
        // fetch returns once the server drops the connection
        let _ = client.fetch("0123456789abcdef");

        // A single read may legally return fewer bytes than the cap
        let request = handle.join().expect("server thread");
        assert!(!request.is_empty() && request.len() <= 8);
        assert!("0123456789abcdef".starts_with(request.as_str()));
    }
}

//! Test client
//!
//! Connects to the streaming server, sends one request, and drains the
//! unframed response until the server closes the connection.

use std::io::{Read, Write};
use std::net::TcpStream;

/// Number of bytes pulled per read while draining the response
const READ_CHUNK_BYTES: usize = 4096;

pub struct Client {
    host: String,
    port: u16,
}

impl Client {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// "host:port" form of the target address
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Sends `request` and reads the whole response.
    ///
    /// There is no termination marker on the wire; the response is complete
    /// when the server closes the socket.
    pub fn fetch(&self, request: &str) -> std::io::Result<String> {
        let address = self.address();
        tracing::info!(%address, "connecting");

        let mut stream = TcpStream::connect(&address)?;
        stream.write_all(request.as_bytes())?;

        let mut received = Vec::new();
        let mut buf = [0u8; READ_CHUNK_BYTES];
        loop {
            let n = stream.read(&mut buf)?;
            if n == 0 {
                break;
            }
            received.extend_from_slice(&buf[..n]);
        }

        tracing::debug!(bytes = received.len(), "response complete");
        Ok(String::from_utf8_lossy(&received).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_format() {
        let client = Client::new("127.0.0.1", 5087);
        assert_eq!(client.address(), "127.0.0.1:5087");
    }

    #[test]
    fn test_fetch_refused_when_no_server() {
        // Port 1 on loopback should refuse immediately
        let client = Client::new("127.0.0.1", 1);
        assert!(client.fetch("hello").is_err());
    }
}

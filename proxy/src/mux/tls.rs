//! Peeks the TLS ClientHello to extract SNI, without consuming the stream.
//!
//! `rustls::server::Acceptor` is a small state machine that accumulates
//! bytes until a full ClientHello has arrived. Normally it is fed directly
//! from the socket (see the full-handshake path in the frontend splice
//! routine); here it is fed from repeated non-destructive
//! [`TcpStream::peek`] calls over a growing buffer, so once classification
//! is done the stream is handed on to the sub-listener completely
//! untouched — the frontend later performs the real handshake and sees the
//! ClientHello from byte 0.

use std::io::Cursor;
use std::time::Duration;

use rustls::server::Acceptor;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::errors::MuxError;

const MAX_PEEK: usize = 16 * 1024;

pub async fn extract_sni(stream: &TcpStream, deadline: Duration) -> Result<String, MuxError> {
	let mut buf = vec![0u8; MAX_PEEK];
	let mut last_n = 0usize;
	let fut = async {
		loop {
			let n = stream
				.peek(&mut buf)
				.await
				.map_err(|e| MuxError::BadRequest(format!("peek failed: {e}")))?;
			if n == 0 {
				return Err(MuxError::BadRequest("connection closed before any bytes arrived".into()));
			}
			let mut acceptor = Acceptor::default();
			let mut cursor = Cursor::new(&buf[..n]);
			match acceptor.read_tls(&mut cursor) {
				Ok(_) => {}
				Err(e) => return Err(MuxError::BadRequest(format!("invalid TLS record: {e}"))),
			}
			match acceptor.accept() {
				Ok(Some(accepted)) => {
					let hello = accepted.client_hello();
					return match hello.server_name() {
						Some(name) => Ok(name.to_string()),
						None => Err(MuxError::NotFound { host: None }),
					};
				}
				Ok(None) => {
					if n == MAX_PEEK {
						return Err(MuxError::BadRequest("ClientHello exceeded peek buffer".into()));
					}
					if n == last_n {
						tokio::time::sleep(Duration::from_millis(5)).await;
					}
					last_n = n;
					continue;
				}
				Err(e) => return Err(MuxError::BadRequest(format!("TLS accept error: {}", e.0))),
			}
		}
	};
	timeout(deadline, fut)
		.await
		.unwrap_or_else(|_| Err(MuxError::BadRequest("timed out waiting for ClientHello".into())))
}

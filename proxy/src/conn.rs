//! A small enum unifying plaintext and TLS-terminated connections so the
//! splice routine can treat either uniformly. Trimmed down from the sort of
//! `SocketType` delegation enum a full gateway needs (HBONE, boxed
//! wrappers, connection metadata) to just the two variants this proxy's
//! splice path actually produces.

use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;

pub enum Conn {
	Plain(TcpStream),
	Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for Conn {
	fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
		match self.get_mut() {
			Conn::Plain(s) => Pin::new(s).poll_read(cx, buf),
			Conn::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
		}
	}
}

impl AsyncWrite for Conn {
	fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
		match self.get_mut() {
			Conn::Plain(s) => Pin::new(s).poll_write(cx, buf),
			Conn::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
		}
	}

	fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
		match self.get_mut() {
			Conn::Plain(s) => Pin::new(s).poll_flush(cx),
			Conn::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
		}
	}

	fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
		match self.get_mut() {
			Conn::Plain(s) => Pin::new(s).poll_shutdown(cx),
			Conn::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
		}
	}
}

/// Writes a minimal HTTP/1.0 response with a plain-text/HTML body. Used for
/// the 301 HTTPS-upgrade redirect and the configured 502/503 error pages —
/// spec.md requires both pages be served as HTTP/1.0 regardless of whether
/// the inbound connection was TLS.
pub async fn write_http_1_0_response(
	conn: &mut (impl AsyncWrite + Unpin),
	status_line: &str,
	extra_headers: &[(&str, &str)],
	body: Option<&str>,
) -> std::io::Result<()> {
	use tokio::io::AsyncWriteExt;
	let mut resp = format!("HTTP/1.0 {status_line}\r\n");
	for (k, v) in extra_headers {
		resp.push_str(&format!("{k}: {v}\r\n"));
	}
	if let Some(body) = body {
		resp.push_str("Content-Type: text/html; charset=utf-8\r\n");
		resp.push_str(&format!("Content-Length: {}\r\n\r\n", body.len()));
		resp.push_str(body);
	} else {
		resp.push_str("\r\n");
	}
	conn.write_all(resp.as_bytes()).await?;
	conn.flush().await
}

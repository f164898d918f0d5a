//! Peeks the first request line of a plaintext connection to extract `Host`.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::errors::MuxError;

const MAX_PEEK: usize = 8192;

pub async fn extract_host(stream: &TcpStream, deadline: Duration) -> Result<String, MuxError> {
	let mut buf = vec![0u8; MAX_PEEK];
	let mut last_n = 0usize;
	let deadline_fut = async {
		loop {
			let n = stream
				.peek(&mut buf)
				.await
				.map_err(|e| MuxError::BadRequest(format!("peek failed: {e}")))?;
			if n == 0 {
				return Err(MuxError::BadRequest("connection closed before any bytes arrived".into()));
			}
			let mut headers = [httparse::EMPTY_HEADER; 32];
			let mut req = httparse::Request::new(&mut headers);
			match req.parse(&buf[..n]) {
				Ok(httparse::Status::Complete(_)) => {
					return host_header(&req);
				}
				Ok(httparse::Status::Partial) => {
					if n == MAX_PEEK {
						return Err(MuxError::BadRequest("request headers exceeded peek buffer".into()));
					}
					if n == last_n {
						tokio::time::sleep(Duration::from_millis(5)).await;
					}
					last_n = n;
					continue;
				}
				Err(e) => return Err(MuxError::BadRequest(format!("invalid HTTP request: {e}"))),
			}
		}
	};
	timeout(deadline, deadline_fut)
		.await
		.unwrap_or_else(|_| Err(MuxError::BadRequest("timed out waiting for request headers".into())))
}

fn host_header(req: &httparse::Request) -> Result<String, MuxError> {
	for header in req.headers.iter() {
		if header.name.eq_ignore_ascii_case("host") {
			let value = std::str::from_utf8(header.value).map_err(|_| MuxError::BadRequest("non-UTF8 Host header".into()))?;
			// Strip a trailing :port — routing is by hostname only.
			let host = value.split(':').next().unwrap_or(value).trim();
			if host.is_empty() {
				return Err(MuxError::NotFound { host: None });
			}
			return Ok(host.to_string());
		}
	}
	Err(MuxError::NotFound { host: None })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn extracts_host_from_request_line() {
		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		let client = tokio::spawn(async move {
			let mut s = TcpStream::connect(addr).await.unwrap();
			use tokio::io::AsyncWriteExt;
			s.write_all(b"GET / HTTP/1.1\r\nHost: a.test\r\n\r\n").await.unwrap();
			// keep alive until the server side reads it
			tokio::time::sleep(Duration::from_millis(50)).await;
		});
		let (server_stream, _) = listener.accept().await.unwrap();
		let host = extract_host(&server_stream, Duration::from_secs(1)).await.unwrap();
		assert_eq!(host, "a.test");
		client.await.unwrap();
	}

	#[tokio::test]
	async fn missing_host_header_is_not_found() {
		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		tokio::spawn(async move {
			let mut s = TcpStream::connect(addr).await.unwrap();
			use tokio::io::AsyncWriteExt;
			s.write_all(b"GET / HTTP/1.0\r\n\r\n").await.unwrap();
			tokio::time::sleep(Duration::from_millis(50)).await;
		});
		let (server_stream, _) = listener.accept().await.unwrap();
		let err = extract_host(&server_stream, Duration::from_secs(1)).await.unwrap_err();
		assert!(matches!(err, MuxError::NotFound { host: None }));
	}
}

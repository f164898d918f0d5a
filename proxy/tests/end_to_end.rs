//! Exercises the six literal end-to-end scenarios against real loopback
//! sockets: no mocked transport, no HTTP test client — this crate's domain
//! is pure L4/7 demuxing, so hand-written byte assertions are the more
//! direct check.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use gwcore::drain::{self, DrainTrigger};
use gwproxy::frontend::Frontend;
use gwproxy::metrics::Metrics;
use gwproxy::server::Server;
use gwproxy::types::{Backend, BackendId, FrontendId};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn free_addr() -> SocketAddr {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	drop(listener);
	addr
}

/// Accepts connections forever, each time reading whatever the caller sent
/// and writing back its own port number, after an optional delay.
async fn spawn_echo_upstream(delay: Duration) -> (SocketAddr, tokio::task::JoinHandle<()>) {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	let handle = tokio::spawn(async move {
		loop {
			let (mut stream, _) = match listener.accept().await {
				Ok(v) => v,
				Err(_) => break,
			};
			tokio::spawn(async move {
				let mut buf = [0u8; 1024];
				let _ = stream.read(&mut buf).await;
				if !delay.is_zero() {
					tokio::time::sleep(delay).await;
				}
				let _ = stream.write_all(addr.port().to_string().as_bytes()).await;
				let _ = stream.shutdown().await;
			});
		}
	});
	(addr, handle)
}

async fn start_server(secure: bool, error_page_502: Option<Arc<str>>, error_page_503: Option<Arc<str>>) -> (Arc<Server>, SocketAddr, DrainTrigger) {
	let addr = free_addr().await;
	let metrics = Metrics::new();
	let (server, err_rx) = Server::new(addr, secure, error_page_502, error_page_503, metrics);
	let server = Arc::new(server);
	let (trigger, watcher) = drain::new();
	let s = server.clone();
	tokio::spawn(async move {
		let _ = s.listen_and_serve(err_rx, watcher).await;
	});
	tokio::time::sleep(Duration::from_millis(50)).await;
	(server, addr, trigger)
}

async fn request(addr: SocketAddr, host: &str) -> String {
	let mut stream = TcpStream::connect(addr).await.unwrap();
	stream.write_all(format!("GET / HTTP/1.0\r\nHost: {host}\r\n\r\n").as_bytes()).await.unwrap();
	let mut resp = Vec::new();
	stream.read_to_end(&mut resp).await.unwrap();
	String::from_utf8(resp).unwrap()
}

#[tokio::test]
async fn plain_http_round_robin() {
	let (addr1, _up1) = spawn_echo_upstream(Duration::ZERO).await;
	let (addr2, _up2) = spawn_echo_upstream(Duration::ZERO).await;
	let (server, addr, _trigger) = start_server(false, None, None).await;

	let front = Arc::new(Frontend::new(FrontendId::from("f1")));
	front.set_hosts(vec!["a.test".to_string()]).unwrap();
	front.set_backends(vec![Backend::new(BackendId::from("b1"), addr1.to_string(), None), Backend::new(BackendId::from("b2"), addr2.to_string(), None)]);
	server.add_frontend(front).await.unwrap();

	let mut seen = Vec::new();
	for _ in 0..4 {
		seen.push(request(addr, "a.test").await);
	}
	assert_eq!(seen, vec![addr2.port().to_string(), addr1.port().to_string(), addr2.port().to_string(), addr1.port().to_string()]);
}

#[tokio::test]
async fn unknown_host_returns_503() {
	let page: Arc<str> = Arc::from("service unavailable");
	let (server, addr, _trigger) = start_server(false, None, Some(page)).await;

	let front = Arc::new(Frontend::new(FrontendId::from("f1")));
	front.set_hosts(vec!["a.test".to_string()]).unwrap();
	server.add_frontend(front).await.unwrap();

	let resp = request(addr, "unknown.test").await;
	assert!(resp.starts_with("HTTP/1.0 503"), "{resp}");
	assert!(resp.contains("service unavailable"));
}

#[tokio::test]
async fn backend_down_returns_502() {
	let page: Arc<str> = Arc::from("bad gateway");
	let (server, addr, _trigger) = start_server(false, Some(page), None).await;
	let dead = free_addr().await;

	let front = Arc::new(Frontend::new(FrontendId::from("f1")));
	front.set_hosts(vec!["a.test".to_string()]).unwrap();
	front.set_backends(vec![Backend::new(BackendId::from("b1"), dead.to_string(), Some(200))]);
	server.add_frontend(front).await.unwrap();

	let resp = request(addr, "a.test").await;
	assert!(resp.starts_with("HTTP/1.0 502"), "{resp}");
	assert!(resp.contains("bad gateway"));
}

#[tokio::test]
async fn https_redirect_on_plaintext_port() {
	let (cert_b64, key_b64) = generate_test_cert("s.test");
	let tls = gwproxy::tls::compile("f1", &cert_b64, &key_b64).unwrap();
	let (insecure, addr, _trigger) = start_server(false, None, None).await;

	let front = Arc::new(Frontend::new(FrontendId::from("f1")));
	front.set_hosts(vec!["s.test".to_string()]).unwrap();
	front.set_tls(Some(tls)).unwrap();
	insecure.add_frontend(front).await.unwrap();

	let resp = request(addr, "s.test").await;
	assert!(resp.starts_with("HTTP/1.0 301"), "{resp}");
	assert!(resp.contains("Location: https://s.test/"));
}

#[tokio::test]
async fn live_reconfigure_does_not_drop_in_flight_connections() {
	let (addr1, _up1) = spawn_echo_upstream(Duration::from_millis(200)).await;
	let (server, addr, _trigger) = start_server(false, None, None).await;

	let front = Arc::new(Frontend::new(FrontendId::from("f1")));
	front.set_hosts(vec!["a.test".to_string()]).unwrap();
	front.set_backends(vec![Backend::new(BackendId::from("b1"), addr1.to_string(), None)]);
	server.add_frontend(front.clone()).await.unwrap();

	let in_flight = tokio::spawn(async move { request(addr, "a.test").await });

	tokio::time::sleep(Duration::from_millis(50)).await;
	let (addr2, _up2) = spawn_echo_upstream(Duration::ZERO).await;
	front.add_backend(Backend::new(BackendId::from("b2"), addr2.to_string(), None));

	let result = in_flight.await.unwrap();
	assert_eq!(result, addr1.port().to_string());
}

/// The dominant real-world replace (TLS cert rotation, or an admin "update"
/// with unchanged `hosts`) registers a brand new `Frontend` object under the
/// *same* id and hostnames as the one already running. `add_frontend` must
/// take that hostname over rather than failing because it's "already
/// registered" to the predecessor.
#[tokio::test]
async fn replacing_a_frontend_with_the_same_hosts_keeps_it_routable() {
	let (addr1, _up1) = spawn_echo_upstream(Duration::ZERO).await;
	let (addr2, _up2) = spawn_echo_upstream(Duration::ZERO).await;
	let (server, addr, _trigger) = start_server(false, None, None).await;

	let first = Arc::new(Frontend::new(FrontendId::from("f1")));
	first.set_hosts(vec!["a.test".to_string()]).unwrap();
	first.set_backends(vec![Backend::new(BackendId::from("b1"), addr1.to_string(), None)]);
	server.add_frontend(first).await.unwrap();

	assert_eq!(request(addr, "a.test").await, addr1.port().to_string());

	let second = Arc::new(Frontend::new(FrontendId::from("f1")));
	second.set_hosts(vec!["a.test".to_string()]).unwrap();
	second.set_backends(vec![Backend::new(BackendId::from("b2"), addr2.to_string(), None)]);
	server.add_frontend(second).await.unwrap();

	assert_eq!(request(addr, "a.test").await, addr2.port().to_string());
}

#[tokio::test]
async fn tls_passthrough_routes_by_sni() {
	let _ = rustls::crypto::ring::default_provider().install_default();

	let (cert_b64, key_b64) = generate_test_cert("secure.test");
	let tls = gwproxy::tls::compile("f1", &cert_b64, &key_b64).unwrap();
	let (addr1, _up1) = spawn_echo_upstream(Duration::ZERO).await;
	let (server, addr, _trigger) = start_server(true, None, None).await;

	let front = Arc::new(Frontend::new(FrontendId::from("f1")));
	front.set_hosts(vec!["secure.test".to_string()]).unwrap();
	front.set_tls(Some(tls)).unwrap();
	front.set_backends(vec![Backend::new(BackendId::from("b1"), addr1.to_string(), None)]);
	server.add_frontend(front).await.unwrap();

	let tcp = TcpStream::connect(addr).await.unwrap();
	let client_config = rustls::ClientConfig::builder()
		.dangerous()
		.with_custom_certificate_verifier(Arc::new(NoVerify))
		.with_no_client_auth();
	let connector = tokio_rustls::TlsConnector::from(Arc::new(client_config));
	let server_name = rustls::pki_types::ServerName::try_from("secure.test").unwrap();
	let mut tls_stream = connector.connect(server_name, tcp).await.unwrap();

	tls_stream.write_all(b"hello").await.unwrap();
	let mut resp = Vec::new();
	tls_stream.read_to_end(&mut resp).await.unwrap();
	assert_eq!(String::from_utf8(resp).unwrap(), addr1.port().to_string());
}

fn generate_test_cert(sni: &str) -> (String, String) {
	let cert = rcgen::generate_simple_self_signed(vec![sni.to_string()]).unwrap();
	let cert_pem = cert.cert.pem();
	let key_pem = cert.key_pair.serialize_pem();
	let engine = base64::engine::general_purpose::STANDARD;
	(engine.encode(cert_pem), engine.encode(key_pem))
}

#[derive(Debug)]
struct NoVerify;

impl rustls::client::danger::ServerCertVerifier for NoVerify {
	fn verify_server_cert(
		&self,
		_end_entity: &rustls::pki_types::CertificateDer<'_>,
		_intermediates: &[rustls::pki_types::CertificateDer<'_>],
		_server_name: &rustls::pki_types::ServerName<'_>,
		_ocsp_response: &[u8],
		_now: rustls::pki_types::UnixTime,
	) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
		Ok(rustls::client::danger::ServerCertVerified::assertion())
	}

	fn verify_tls12_signature(&self, _message: &[u8], _cert: &rustls::pki_types::CertificateDer<'_>, _dss: &rustls::DigitallySignedStruct) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
		Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
	}

	fn verify_tls13_signature(&self, _message: &[u8], _cert: &rustls::pki_types::CertificateDer<'_>, _dss: &rustls::DigitallySignedStruct) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
		Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
	}

	fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
		rustls::crypto::ring::default_provider().signature_verification_algorithms.supported_schemes()
	}
}

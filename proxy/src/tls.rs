//! TLS material loading: base64-wrapped PEM decoding and rustls
//! `ServerConfig` compilation for a frontend's certificate/key pair.

use std::sync::Arc;

use anyhow::{Context, anyhow};
use rustls::ServerConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls_pemfile::Item;

use crate::errors::TopologyError;

#[derive(Clone)]
pub struct TlsConfig {
	pub config: Arc<ServerConfig>,
}

impl std::fmt::Debug for TlsConfig {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TlsConfig").finish_non_exhaustive()
	}
}

/// Decodes base64-wrapped PEM cert/key material and compiles a server TLS
/// config. `id` is only used to attribute errors to the offending frontend.
pub fn compile(id: &str, cert_b64: &str, key_b64: &str) -> Result<TlsConfig, TopologyError> {
	let cert_pem = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, cert_b64).map_err(|source| {
		TopologyError::InvalidBase64 {
			id: id.to_string(),
			field: "tls_crt",
			source,
		}
	})?;
	let key_pem = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, key_b64).map_err(|source| {
		TopologyError::InvalidBase64 {
			id: id.to_string(),
			field: "tls_key",
			source,
		}
	})?;

	let certs = parse_cert(&cert_pem).map_err(|source| TopologyError::InvalidCert {
		id: id.to_string(),
		source,
	})?;
	let key = parse_key(&key_pem).map_err(|source| TopologyError::InvalidKey {
		id: id.to_string(),
		source,
	})?;

	let config = ServerConfig::builder()
		.with_no_client_auth()
		.with_single_cert(certs, key)
		.map_err(|e| TopologyError::InvalidCert {
			id: id.to_string(),
			source: anyhow!(e),
		})?;

	Ok(TlsConfig {
		config: Arc::new(config),
	})
}

pub fn parse_cert(pem: &[u8]) -> anyhow::Result<Vec<CertificateDer<'static>>> {
	let certs = rustls_pemfile::certs(&mut &pem[..])
		.collect::<Result<Vec<_>, _>>()
		.context("failed to parse PEM certificate chain")?;
	if certs.is_empty() {
		return Err(anyhow!("no certificates found in PEM input"));
	}
	Ok(certs)
}

pub fn parse_key(pem: &[u8]) -> anyhow::Result<PrivateKeyDer<'static>> {
	let mut reader = &pem[..];
	loop {
		match rustls_pemfile::read_one(&mut reader).context("failed to parse PEM private key")? {
			Some(Item::Pkcs8Key(key)) => return Ok(PrivateKeyDer::Pkcs8(key)),
			Some(Item::Pkcs1Key(key)) => return Ok(PrivateKeyDer::Pkcs1(key)),
			Some(Item::Sec1Key(key)) => return Ok(PrivateKeyDer::Sec1(key)),
			Some(_) => continue,
			None => return Err(anyhow!("no private key found in PEM input")),
		}
	}
}

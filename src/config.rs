//! The JSON document pointed at by `--path`.

use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
	pub api_server_addr: String,
	pub secure_bind_addr: String,
	pub insecure_bind_addr: String,
	pub etcd_key: String,
	#[allow(dead_code)]
	pub etcd_servers: Vec<String>,
	#[serde(rename = "502_error_page")]
	pub error_page_502: Option<String>,
	#[serde(rename = "503_error_page")]
	pub error_page_503: Option<String>,
}

//! Shared identifier newtypes and the immutable [`Backend`] descriptor.

use std::fmt;
use std::sync::Arc;

pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

macro_rules! id_newtype {
	($name:ident) => {
		#[derive(Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
		pub struct $name(Arc<str>);

		impl $name {
			pub fn as_str(&self) -> &str {
				&self.0
			}
		}

		impl From<&str> for $name {
			fn from(s: &str) -> Self {
				$name(Arc::from(s))
			}
		}

		impl From<String> for $name {
			fn from(s: String) -> Self {
				$name(Arc::from(s.as_str()))
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				f.write_str(&self.0)
			}
		}

		impl fmt::Debug for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, "{}({:?})", stringify!($name), self.0)
			}
		}
	};
}

id_newtype!(AppId);
id_newtype!(FrontendId);
id_newtype!(BackendId);

/// An immutable descriptor of a TCP upstream. Equality is by `id` only,
/// matching the key-value store's replace-by-id semantics.
#[derive(Clone, Debug)]
pub struct Backend {
	pub id: BackendId,
	pub address: String,
	pub connect_timeout_ms: u64,
}

impl Backend {
	pub fn new(id: impl Into<BackendId>, address: impl Into<String>, connect_timeout_ms: Option<u64>) -> Self {
		Backend {
			id: id.into(),
			address: address.into(),
			connect_timeout_ms: match connect_timeout_ms {
				Some(0) | None => DEFAULT_CONNECT_TIMEOUT_MS,
				Some(ms) => ms,
			},
		}
	}
}

impl PartialEq for Backend {
	fn eq(&self, other: &Self) -> bool {
		self.id == other.id
	}
}
impl Eq for Backend {}

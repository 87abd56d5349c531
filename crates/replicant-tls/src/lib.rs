//! replicant-tls: mutual TLS for the Replicant API listener.
//!
//! Every connection on the API listener must complete a TLS 1.2+ handshake
//! with a client certificate that chains to the configured client CA. A
//! failed handshake drops the connection before any HTTP is parsed, so
//! application code only ever sees authenticated requests.
//!
//! # Components
//!
//! - **`config`**: builds a `rustls::ServerConfig` from PEM files
//! - **`serve`**: accept loops (mTLS and plain) serving an axum router with
//!   graceful drain
//! - **`pki`**: generates a development CA plus server and client certificates

pub mod config;
pub mod error;
pub mod pki;
pub mod serve;

pub use config::{TlsPaths, load_server_config};
pub use error::{TlsError, TlsResult};
pub use pki::{BundlePaths, CertKeyPair, CertificateAuthority, write_bundle};
pub use serve::{ServeOptions, serve_plain, serve_tls};

//! Secret types for protecting sensitive values from accidental logging.
//!
//! This module re-exports types from the [`secrecy`] crate. Use these types
//! for all sensitive values: pooled host-account credentials, provider API
//! keys, and user bearer tokens.
//!
//! `SecretString` implements `Debug` with redaction, so any struct that
//! derives `Debug` while holding one gets safe logging behavior for free.
//! Secrets are zeroized on drop.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct HostCredentials {
//!     client_id: String,
//!     client_secret: SecretString,  // Debug shows "[REDACTED]"
//! }
//!
//! let creds = HostCredentials {
//!     client_id: "acct-7".to_string(),
//!     client_secret: SecretString::from("s3cr3t"),
//! };
//!
//! // Safe: the secret is redacted
//! println!("{:?}", creds);
//!
//! // Access requires an explicit expose_secret() call
//! let raw: &str = creds.client_secret.expose_secret();
//! # assert_eq!(raw, "s3cr3t");
//! ```

// Re-export the main types from secrecy
pub use secrecy::{ExposeSecret, SecretBox, SecretString};

//! # strand: an MTProto 2.0 client core
//!
//! Four sub-crates wired together here for convenience:
//!
//! | Sub-crate         | Role                                                   |
//! |-------------------|--------------------------------------------------------|
//! | `strand-tl-types` | TL binary codec, service-layer schema, type registry   |
//! | `strand-crypto`   | AES-IGE, SHA, RSA padding, factorization, `AuthKey`    |
//! | `strand-mtproto`  | Plain and encrypted envelopes, sans-IO handshake       |
//! | `strand-client`   | Async session engine over the intermediate transport   |
//!
//! ## Quick start
//!
//! ```rust,no_run
//! # async fn f() -> Result<(), strand::InvocationError> {
//! use strand::{Client, Config, tl::functions};
//!
//! let client = Client::connect(Config::default()).await?;
//! let salts = client.invoke(&functions::GetFutureSalts { num: 4 }).await?;
//! println!("{salts:?}");
//! # Ok(()) }
//! ```
//!
//! ## Sans-IO handshake
//!
//! ```rust,no_run
//! use strand::authentication;
//!
//! let (req_pq, state) = authentication::step1();
//! // Send `req_pq` in a plain envelope, feed the answer to `step2`, …
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Re-export of [`strand_tl_types`]: codec, schema and registry.
pub use strand_tl_types as tl;

/// Re-export of [`strand_mtproto`]: envelopes and the handshake.
pub use strand_mtproto as mtproto;

/// Re-export of [`strand_crypto`]: AES-IGE, SHA, RSA, factorize, AuthKey.
pub use strand_crypto as crypto;

/// Re-export of [`strand_client`]: the async session engine.
pub use strand_client as client;

// ─── Convenience re-exports ───────────────────────────────────────────────────

pub use strand_tl_types::{Deserializable, Identifiable, Object, Registry, RemoteCall, Serializable};

pub use strand_crypto::{AuthKey, Scheme};
pub use strand_mtproto::authentication::{self, Finished, finish, step1, step2, step3};
pub use strand_mtproto::{EncryptedSession, PlainSession};

pub use strand_client::{Client, Config, InvocationError, Reply, RpcError, State, Warning};

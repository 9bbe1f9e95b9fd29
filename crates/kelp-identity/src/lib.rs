//! Writer identities for kelp logs.
//!
//! An [`Identity`] is the handle a log appends with: a public
//! [`IdentityRecord`] plus the [`IdentityProvider`] that can sign on its
//! behalf. Entries only ever carry the filtered record; private key
//! material stays in the provider's [`Keystore`].
//!
//! [`Ed25519Provider`] is the built-in provider.

mod error;
mod identity;
mod provider;

pub use ed25519_dalek::VerifyingKey;
pub use error::IdentityError;
pub use identity::{Identity, IdentityRecord, IdentitySignatures};
pub use provider::{Ed25519Provider, IdentityProvider, Keystore};

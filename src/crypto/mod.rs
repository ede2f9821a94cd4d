//! Cryptographic primitives for secret material at rest.
//!
//! Only envelope encryption lives here. Everything that persists a secret goes
//! through [`EnvelopeCipher`]; nothing else in the crate touches AES directly.

mod envelope;

pub use envelope::{CipherError, EncryptedSecret, EnvelopeCipher, MasterKey, KEY_SIZE, NONCE_SIZE};

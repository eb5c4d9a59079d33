//! Key custody.
//!
//! The engine never touches key bytes directly; it asks a [`Keyring`] to sign
//! and verify. A constructed keyring is ready to use, so there is no separate
//! "initialized" state to wait on.

use std::sync::Arc;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

use crate::{env::Environment, error::AuthError};

/// Signing and verification over detached signatures.
pub trait Keyring: Send + Sync + 'static {
    /// Our public key bytes.
    fn public_key(&self) -> Vec<u8>;

    /// Our private key bytes.
    fn private_key(&self) -> Vec<u8>;

    /// Detached signature over `message`.
    fn sign(&self, message: &[u8]) -> Vec<u8>;

    /// Checks a detached signature against an arbitrary public key.
    ///
    /// Returns false for malformed keys or signatures.
    fn verify(&self, message: &[u8], signature: &[u8], public_key: &[u8]) -> bool;

    /// Lowercase hex of [`Keyring::public_key`], as sent on the wire.
    fn public_key_hex(&self) -> String {
        hex::encode(self.public_key())
    }

    /// Lowercase hex signature over the UTF-8 bytes of `text`.
    fn sign_hex(&self, text: &str) -> String {
        hex::encode(self.sign(text.as_bytes()))
    }
}

impl<K: Keyring + ?Sized> Keyring for Arc<K> {
    fn public_key(&self) -> Vec<u8> {
        (**self).public_key()
    }

    fn private_key(&self) -> Vec<u8> {
        (**self).private_key()
    }

    fn sign(&self, message: &[u8]) -> Vec<u8> {
        (**self).sign(message)
    }

    fn verify(&self, message: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
        (**self).verify(message, signature, public_key)
    }
}

/// Ed25519 keyring holding one signing key.
#[derive(Clone)]
pub struct Ed25519Keyring {
    signing: SigningKey,
}

impl Ed25519Keyring {
    /// Keyring from a 32-byte secret seed.
    pub fn from_secret(secret: [u8; 32]) -> Self {
        Self { signing: SigningKey::from_bytes(&secret) }
    }

    /// Keyring from a hex-encoded 32-byte secret seed.
    ///
    /// # Errors
    ///
    /// - `AuthError::InvalidKey` if the text is not hex or not 32 bytes
    pub fn from_hex(secret: &str) -> Result<Self, AuthError> {
        let bytes = hex::decode(secret.trim()).map_err(|e| AuthError::InvalidKey(e.to_string()))?;
        let secret: [u8; 32] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            AuthError::InvalidKey(format!("expected 32 secret bytes, got {}", bytes.len()))
        })?;
        Ok(Self::from_secret(secret))
    }

    /// Fresh keyring seeded from the environment's RNG.
    pub fn generate<E: Environment>(env: &E) -> Self {
        let mut secret = [0u8; 32];
        env.random_bytes(&mut secret);
        Self::from_secret(secret)
    }
}

impl std::fmt::Debug for Ed25519Keyring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519Keyring").field("public", &self.public_key_hex()).finish()
    }
}

impl Keyring for Ed25519Keyring {
    fn public_key(&self) -> Vec<u8> {
        self.signing.verifying_key().to_bytes().to_vec()
    }

    fn private_key(&self) -> Vec<u8> {
        self.signing.to_bytes().to_vec()
    }

    fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing.sign(message).to_bytes().to_vec()
    }

    fn verify(&self, message: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
        let Ok(key_bytes) = <[u8; 32]>::try_from(public_key) else {
            return false;
        };
        let Ok(key) = VerifyingKey::from_bytes(&key_bytes) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        key.verify(message, &signature).is_ok()
    }
}

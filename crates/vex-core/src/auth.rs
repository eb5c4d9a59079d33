//! Mutual challenge/response authentication.
//!
//! Each side proves possession of its Ed25519 key by signing a nonce chosen
//! by the other. The session is authenticated only when both directions have
//! completed on the current connection:
//!
//! - **Server verified**: we sent a nonce and the server's signature over it
//!   verified under the pinned server key.
//! - **Client accepted**: the server sent us a nonce, we signed it, and the
//!   server answered `success`.
//!
//! # Security
//!
//! - Trust on first use: with no key configured, the first key whose
//!   signature verifies is pinned and every later handshake must verify under
//!   it. A pinned key is never replaced.
//! - A failed verification never touches the pinned key, so an attacker who
//!   intercepts a later connection cannot re-pin.
//! - Per-connection flags reset on every reconnect; the pin survives.

use tracing::info;
use vex_proto::{Challenge, ChallengeResponse};

use crate::{error::AuthError, keyring::Keyring};

/// Handshake state.
#[derive(Debug, Clone, Default)]
pub struct Authenticator {
    pinned: Option<String>,
    server_verified: bool,
    client_accepted: bool,
}

impl Authenticator {
    /// Authenticator trusting `pinned` if given, or the first verified key.
    pub fn new(pinned: Option<String>) -> Self {
        Self { pinned: pinned.map(|key| key.to_lowercase()), ..Self::default() }
    }

    /// The pinned server key, hex-encoded.
    pub fn pinned_key(&self) -> Option<&str> {
        self.pinned.as_deref()
    }

    /// Whether the server proved its key on this connection.
    pub fn server_verified(&self) -> bool {
        self.server_verified
    }

    /// Whether the server accepted our proof on this connection.
    pub fn client_accepted(&self) -> bool {
        self.client_accepted
    }

    /// Both directions complete.
    pub fn is_complete(&self) -> bool {
        self.server_verified && self.client_accepted
    }

    /// Our challenge to the server.
    pub fn challenge<K: Keyring>(&self, keyring: &K, nonce: String) -> Challenge {
        Challenge { challenge: nonce, pubkey: keyring.public_key_hex() }
    }

    /// Our answer to a server challenge.
    pub fn answer<K: Keyring>(&self, keyring: &K, challenge: &Challenge) -> ChallengeResponse {
        ChallengeResponse {
            response: keyring.sign_hex(&challenge.challenge),
            pubkey: keyring.public_key_hex(),
        }
    }

    /// Verifies the server's answer to `nonce`.
    ///
    /// Verifies under the pinned key, or under the presented key when nothing
    /// is pinned yet. On success pins the key (if unpinned), marks the server
    /// verified, and returns the pinned key.
    ///
    /// # Errors
    ///
    /// - `AuthError::InvalidKey` if the key to verify under is not hex
    /// - `AuthError::SignatureMismatch` if the signature does not verify
    pub fn verify_response<K: Keyring>(
        &mut self,
        keyring: &K,
        nonce: &str,
        response: &ChallengeResponse,
    ) -> Result<String, AuthError> {
        let key_hex = match &self.pinned {
            Some(pinned) => pinned.clone(),
            None => response.pubkey.to_lowercase(),
        };
        let key = hex::decode(&key_hex).map_err(|e| AuthError::InvalidKey(e.to_string()))?;
        let signature =
            hex::decode(&response.response).map_err(|_| AuthError::SignatureMismatch)?;

        if !keyring.verify(nonce.as_bytes(), &signature, &key) {
            return Err(AuthError::SignatureMismatch);
        }

        if self.pinned.is_none() {
            info!(server_key = %key_hex, "pinned server key on first use");
            self.pinned = Some(key_hex.clone());
        }
        self.server_verified = true;

        Ok(key_hex)
    }

    /// Marks our proof accepted by the server.
    pub fn accept(&mut self) {
        self.client_accepted = true;
    }

    /// Forgets the server's proof so the next attempt challenges again.
    ///
    /// The client's own acceptance is kept: the server challenges once per
    /// connection and will not ask again.
    pub fn reset_server_proof(&mut self) {
        self.server_verified = false;
    }

    /// Forgets the server's acceptance of our proof after it rejected one.
    pub fn revoke_client_proof(&mut self) {
        self.client_accepted = false;
    }

    /// Clears per-connection progress; the pinned key is kept.
    pub fn reset(&mut self) {
        self.server_verified = false;
        self.client_accepted = false;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::keyring::Ed25519Keyring;

    fn client() -> Ed25519Keyring {
        Ed25519Keyring::from_secret([1; 32])
    }

    fn server() -> Ed25519Keyring {
        Ed25519Keyring::from_secret([2; 32])
    }

    fn respond(signer: &Ed25519Keyring, nonce: &str) -> ChallengeResponse {
        ChallengeResponse { response: signer.sign_hex(nonce), pubkey: signer.public_key_hex() }
    }

    #[test]
    fn first_verified_key_is_pinned() {
        let mut auth = Authenticator::new(None);

        let key = auth.verify_response(&client(), "n1", &respond(&server(), "n1")).unwrap();

        assert_eq!(key, server().public_key_hex());
        assert_eq!(auth.pinned_key(), Some(key.as_str()));
        assert!(auth.server_verified());
    }

    #[test]
    fn pinned_key_rejects_impostor() {
        let impostor = Ed25519Keyring::from_secret([3; 32]);
        let mut auth = Authenticator::new(Some(server().public_key_hex()));

        let result = auth.verify_response(&client(), "n1", &respond(&impostor, "n1"));

        assert_eq!(result, Err(AuthError::SignatureMismatch));
        assert_eq!(auth.pinned_key(), Some(server().public_key_hex().as_str()));
        assert!(!auth.server_verified());
    }

    #[test]
    fn failed_first_verification_does_not_pin() {
        let mut auth = Authenticator::new(None);
        let mut forged = respond(&server(), "other nonce");
        forged.pubkey = server().public_key_hex();

        assert!(auth.verify_response(&client(), "n1", &forged).is_err());
        assert_eq!(auth.pinned_key(), None);
    }

    #[test]
    fn reset_keeps_pin() {
        let mut auth = Authenticator::new(None);
        auth.verify_response(&client(), "n1", &respond(&server(), "n1")).unwrap();
        auth.accept();
        assert!(auth.is_complete());

        auth.reset();

        assert!(!auth.is_complete());
        assert_eq!(auth.pinned_key(), Some(server().public_key_hex().as_str()));
    }

    #[test]
    fn answer_verifies_under_client_key() {
        let auth = Authenticator::new(None);
        let challenge = Challenge { challenge: "nonce".into(), pubkey: server().public_key_hex() };

        let answer = auth.answer(&client(), &challenge);
        let signature = hex::decode(&answer.response).unwrap();

        assert!(server().verify(b"nonce", &signature, &client().public_key()));
        assert_eq!(answer.pubkey, client().public_key_hex());
    }

    #[test]
    fn undecodable_signature_is_a_mismatch() {
        let mut auth = Authenticator::new(None);
        let response =
            ChallengeResponse { response: "not hex".into(), pubkey: server().public_key_hex() };

        assert_eq!(
            auth.verify_response(&client(), "n1", &response),
            Err(AuthError::SignatureMismatch)
        );
    }
}

//! Claims to opaque string, and back.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use super::{Claims, Result, TOKEN_VERSION, TokenError};
use crate::crypto::{Cipher, HmacSigner, SelectedCipher, Signer};

/// Encrypt-then-sign token codec.
#[derive(Debug, Clone)]
pub struct Codec<C = SelectedCipher, S = HmacSigner> {
    cipher: C,
    signer: S,
}

impl<C: Cipher, S: Signer> Codec<C, S> {
    /// Create a new [`Codec`].
    pub fn new(cipher: C, signer: S) -> Self {
        Self { cipher, signer }
    }

    /// Serialize, encrypt, sign then frame `claims`.
    pub fn encode(&self, claims: &Claims) -> Result<String> {
        let plaintext =
            serde_json::to_vec(claims).map_err(TokenError::encoding)?;
        let payload = self
            .cipher
            .encrypt(&plaintext)
            .map_err(TokenError::encoding)?;
        let tag = self
            .signer
            .sign(&signed_message(&payload))
            .map_err(TokenError::encoding)?;

        Ok(format!(
            "{TOKEN_VERSION}.{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(tag)
        ))
    }

    /// Reverse [`Codec::encode`].
    ///
    /// The tag is checked before anything is decrypted.
    pub fn decode(&self, token: &str) -> Result<Claims> {
        let mut parts = token.split('.');
        let (Some(version), Some(payload), Some(tag), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed);
        };

        if version != TOKEN_VERSION {
            return Err(TokenError::Malformed);
        }

        let payload = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| TokenError::Malformed)?;
        let tag = URL_SAFE_NO_PAD
            .decode(tag)
            .map_err(|_| TokenError::Malformed)?;

        if !self.signer.verify(&signed_message(&payload), &tag) {
            return Err(TokenError::InvalidSignature);
        }

        // A valid tag over undecryptable data means a cipher key mismatch.
        // Reported like a bad signature so both layers look the same.
        let plaintext = self.cipher.decrypt(&payload).map_err(|err| {
            tracing::debug!(
                error = %err,
                "signed token payload failed to decrypt"
            );
            TokenError::InvalidSignature
        })?;

        serde_json::from_slice(&plaintext).map_err(|_| TokenError::Malformed)
    }
}

fn signed_message(payload: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(TOKEN_VERSION.len() + payload.len());
    message.extend_from_slice(TOKEN_VERSION.as_bytes());
    message.extend_from_slice(payload);
    message
}

//! Cryptogragic logics.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use argon2::password_hash::{
    PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::{Argon2, Params, Version};
use hmac::{Hmac, Mac};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::config::Argon2 as ArgonConfig;

const NONCE_SIZE: usize = 12;
const KEY_LENGTH: usize = 32;

type HmacSha256 = Hmac<Sha256>;
type Result<T> = std::result::Result<T, CryptoError>;

#[derive(thiserror::Error, Debug)]
pub enum CryptoError {
    #[error("argon2 error: {0}")]
    Argon2(String),
    #[error("key length is {value} while {excepted} is excepted")]
    KeyLength { value: usize, excepted: usize },
    #[error("signing key must not be empty")]
    EmptyKey,
    #[error("failed to initialize mac: {0}")]
    Mac(#[from] hmac::digest::InvalidLength),
    #[error("random generator failed: {0}")]
    Random(#[from] rand::Error),
}

/// Errors raised by a [`Cipher`].
#[derive(thiserror::Error, Debug)]
pub enum CipherError {
    /// Ciphertext was tampered with or sealed under another key.
    #[error("ciphertext authentication failed")]
    AuthenticationFailed,
    #[error("ciphertext is {len} bytes, at least {min} are required")]
    Malformed { len: usize, min: usize },
    #[error("encryption failed: {0}")]
    Internal(String),
}

/// Authenticated symmetric encryption.
///
/// Implementations must be safe to call concurrently; nonces are generated
/// per call and travel inside the returned envelope.
pub trait Cipher: Send + Sync {
    fn encrypt(
        &self,
        plaintext: &[u8],
    ) -> std::result::Result<Vec<u8>, CipherError>;

    fn decrypt(
        &self,
        ciphertext: &[u8],
    ) -> std::result::Result<Vec<u8>, CipherError>;
}

/// Identity cipher for deployments that do not need payload confidentiality.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCipher;

impl Cipher for NoopCipher {
    fn encrypt(
        &self,
        plaintext: &[u8],
    ) -> std::result::Result<Vec<u8>, CipherError> {
        Ok(plaintext.to_vec())
    }

    fn decrypt(
        &self,
        ciphertext: &[u8],
    ) -> std::result::Result<Vec<u8>, CipherError> {
        Ok(ciphertext.to_vec())
    }
}

/// SymmetricKey holds a fixed-size key protected by Zeroizing.
#[derive(Clone)]
pub struct SymmetricKey(Zeroizing<[u8; KEY_LENGTH]>);

impl SymmetricKey {
    /// Create from raw bytes (must be 32 bytes).
    pub fn from_bytes(bytes: impl AsRef<[u8]>) -> Result<Self> {
        let bytes = bytes.as_ref();
        let key: [u8; KEY_LENGTH] =
            bytes.try_into().map_err(|_| CryptoError::KeyLength {
                value: bytes.len(),
                excepted: KEY_LENGTH,
            })?;

        Ok(Self(Zeroizing::new(key)))
    }

    /// Derive key from a password + salt using Argon2id.
    pub fn derive_from_password(
        password: impl AsRef<[u8]>,
        salt: impl AsRef<[u8]>,
    ) -> Result<Self> {
        let params = Params::new(1024 * 64, 8, 2, Some(KEY_LENGTH))
            .map_err(|err| CryptoError::Argon2(err.to_string()))?;
        let argon2 =
            Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, params);

        let mut key = Zeroizing::new([0u8; KEY_LENGTH]);
        argon2
            .hash_password_into(password.as_ref(), salt.as_ref(), &mut *key)
            .map_err(|err| CryptoError::Argon2(err.to_string()))?;

        Ok(Self(key))
    }

    fn as_slice(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricKey(<redacted>)")
    }
}

/// AES-256-GCM cipher.
///
/// Envelope is `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
#[derive(Clone, Debug)]
pub struct AesGcmCipher {
    key: SymmetricKey,
}

impl AesGcmCipher {
    /// Create a new [`AesGcmCipher`].
    pub fn new(key: SymmetricKey) -> Self {
        Self { key }
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.key.as_slice()))
    }
}

impl Cipher for AesGcmCipher {
    fn encrypt(
        &self,
        plaintext: &[u8],
    ) -> std::result::Result<Vec<u8>, CipherError> {
        // Generate random 96-bit nonce.
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng
            .try_fill_bytes(&mut nonce_bytes)
            .map_err(|err| CipherError::Internal(err.to_string()))?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        let cipher_text = self
            .cipher()
            .encrypt(nonce, plaintext)
            .map_err(|err| CipherError::Internal(err.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + cipher_text.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&cipher_text);
        Ok(out)
    }

    fn decrypt(
        &self,
        data: &[u8],
    ) -> std::result::Result<Vec<u8>, CipherError> {
        if data.len() < NONCE_SIZE {
            return Err(CipherError::Malformed {
                len: data.len(),
                min: NONCE_SIZE,
            });
        }

        let (nonce_bytes, cipher_text) = data.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        self.cipher()
            .decrypt(nonce, cipher_text)
            .map_err(|_| CipherError::AuthenticationFailed)
    }
}

/// Cipher chosen at startup from configuration.
#[derive(Clone, Debug)]
pub enum SelectedCipher {
    Noop(NoopCipher),
    AesGcm(AesGcmCipher),
}

impl Default for SelectedCipher {
    fn default() -> Self {
        Self::Noop(NoopCipher)
    }
}

impl From<AesGcmCipher> for SelectedCipher {
    fn from(cipher: AesGcmCipher) -> Self {
        Self::AesGcm(cipher)
    }
}

impl Cipher for SelectedCipher {
    fn encrypt(
        &self,
        plaintext: &[u8],
    ) -> std::result::Result<Vec<u8>, CipherError> {
        match self {
            Self::Noop(cipher) => cipher.encrypt(plaintext),
            Self::AesGcm(cipher) => cipher.encrypt(plaintext),
        }
    }

    fn decrypt(
        &self,
        ciphertext: &[u8],
    ) -> std::result::Result<Vec<u8>, CipherError> {
        match self {
            Self::Noop(cipher) => cipher.decrypt(ciphertext),
            Self::AesGcm(cipher) => cipher.decrypt(ciphertext),
        }
    }
}

/// Secret bytes used to sign tokens of a single purpose.
#[derive(Clone)]
pub struct SigningKey(Zeroizing<Vec<u8>>);

impl SigningKey {
    /// Create a new [`SigningKey`]. Empty keys are rejected.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = Zeroizing::new(bytes.into());
        if bytes.is_empty() {
            return Err(CryptoError::EmptyKey);
        }

        Ok(Self(bytes))
    }

    /// Whether both keys hold the same secret.
    pub fn same_as(&self, other: &SigningKey) -> bool {
        self.0.as_slice() == other.0.as_slice()
    }

    fn as_slice(&self) -> &[u8] {
        self.0.as_slice()
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SigningKey(<redacted>)")
    }
}

/// Keyed message authentication.
pub trait Signer: Send + Sync {
    /// Compute the authentication tag of `message`.
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>>;

    /// Check `tag` against `message` in constant time.
    fn verify(&self, message: &[u8], tag: &[u8]) -> bool;
}

/// HMAC-SHA256 signer.
#[derive(Clone, Debug)]
pub struct HmacSigner {
    key: SigningKey,
}

impl HmacSigner {
    /// Create a new [`HmacSigner`].
    pub fn new(key: SigningKey) -> Self {
        Self { key }
    }

    fn mac(&self, message: &[u8]) -> Result<HmacSha256> {
        let mut mac =
            <HmacSha256 as Mac>::new_from_slice(self.key.as_slice())?;
        mac.update(message);
        Ok(mac)
    }
}

impl Signer for HmacSigner {
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        Ok(self.mac(message)?.finalize().into_bytes().to_vec())
    }

    fn verify(&self, message: &[u8], tag: &[u8]) -> bool {
        self.mac(message)
            .map(|mac| mac.verify_slice(tag).is_ok())
            .unwrap_or(false)
    }
}

/// Fill a fresh buffer with OS randomness.
pub fn random_bytes<const N: usize>() -> Result<[u8; N]> {
    let mut bytes = [0u8; N];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(bytes)
}

/// Hex encoded SHA256 of `data`. Used to reference tokens in logs.
pub fn fingerprint(data: impl AsRef<[u8]>) -> String {
    hex::encode(Sha256::digest(data.as_ref()))
}

/// Password manager that uses Argon2id and PHC string format for hashing and
/// verification.
#[derive(Clone)]
pub struct PasswordManager {
    params: Params,
}

impl PasswordManager {
    /// Create a new [`PasswordManager`].
    pub fn new(config: Option<ArgonConfig>) -> Result<Self> {
        let config = config.unwrap_or_default();

        let params = Params::new(
            config.memory_cost,
            config.iterations,
            config.parallelism,
            Some(config.hash_length),
        )
        .map_err(|err| CryptoError::Argon2(err.to_string()))?;

        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'_> {
        Argon2::new(
            argon2::Algorithm::Argon2id,
            Version::V0x13,
            self.params.clone(),
        )
    }

    /// Hash password using Argon2id.
    pub fn hash_password(&self, password: impl AsRef<[u8]>) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(password.as_ref(), &salt)
            .map_err(|e| CryptoError::Argon2(e.to_string()))?;

        Ok(hash.to_string())
    }

    /// Verify password against a PHC.
    pub fn verify_password(
        &self,
        password: impl AsRef<[u8]>,
        phc_hash: &str,
    ) -> bool {
        let Ok(parsed) = PasswordHash::new(phc_hash) else {
            return false;
        };

        self.argon2()
            .verify_password(password.as_ref(), &parsed)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer(key: &str) -> HmacSigner {
        HmacSigner::new(SigningKey::new(key).unwrap())
    }

    #[test]
    fn test_hmac() {
        let registration = signer("registration");
        let tag = registration.sign(b"payload").unwrap();

        assert_eq!(tag.len(), 32);
        assert!(registration.verify(b"payload", &tag));
        assert!(!registration.verify(b"payloaD", &tag));
        assert!(!registration.verify(b"payload", &tag[..31]));
        assert!(!registration.verify(b"payload", &[]));

        // Another key must never accept the tag.
        assert!(!signer("authentication").verify(b"payload", &tag));
    }

    #[test]
    fn test_hmac_rfc4231() {
        // RFC 4231, test case 2.
        let jefe = signer("Jefe");
        let tag = jefe.sign(b"what do ya want for nothing?").unwrap();
        assert_eq!(
            hex::encode(tag),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_empty_signing_key() {
        assert!(matches!(SigningKey::new(""), Err(CryptoError::EmptyKey)));
        assert!(
            SigningKey::new("a")
                .unwrap()
                .same_as(&SigningKey::new("a").unwrap())
        );
        assert_eq!(
            format!("{:?}", SigningKey::new("secret").unwrap()),
            "SigningKey(<redacted>)"
        );
    }

    #[test]
    fn test_aes256() {
        let key = SymmetricKey::from_bytes([0x42; 32]).unwrap();
        let cipher = AesGcmCipher::new(key);

        let plaintext = b"super_secret_data";
        let first = cipher.encrypt(plaintext).unwrap();
        let second = cipher.encrypt(plaintext).unwrap();

        // Fresh nonce on every call.
        assert_ne!(first[..NONCE_SIZE], second[..NONCE_SIZE]);
        assert_eq!(cipher.decrypt(&first).unwrap(), plaintext);
        assert_eq!(cipher.decrypt(&second).unwrap(), plaintext);
    }

    #[test]
    fn test_aes256_tampered() {
        let key = SymmetricKey::from_bytes([0x42; 32]).unwrap();
        let cipher = AesGcmCipher::new(key);
        let mut data = cipher.encrypt(b"super_secret_data").unwrap();
        let last = data.len() - 1;
        data[last] ^= 0x01;

        assert!(matches!(
            cipher.decrypt(&data),
            Err(CipherError::AuthenticationFailed)
        ));

        let foreign_key = SymmetricKey::from_bytes([0x24; 32]).unwrap();
        let foreign = AesGcmCipher::new(foreign_key);
        let data = cipher.encrypt(b"super_secret_data").unwrap();
        assert!(matches!(
            foreign.decrypt(&data),
            Err(CipherError::AuthenticationFailed)
        ));

        assert!(matches!(
            cipher.decrypt(&[0u8; 4]),
            Err(CipherError::Malformed { len: 4, .. })
        ));
    }

    #[test]
    fn test_symmetric_key_length() {
        assert!(matches!(
            SymmetricKey::from_bytes([0u8; 16]),
            Err(CryptoError::KeyLength {
                value: 16,
                excepted: 32
            })
        ));
    }

    #[test]
    fn test_derived_key() {
        let salt = [0x42; 16];
        let first =
            SymmetricKey::derive_from_password("secret", salt).unwrap();
        let second =
            SymmetricKey::derive_from_password("secret", salt).unwrap();
        assert_eq!(first.as_slice(), second.as_slice());

        let cipher = AesGcmCipher::new(first);
        let data = cipher.encrypt(b"data").unwrap();
        assert_eq!(AesGcmCipher::new(second).decrypt(&data).unwrap(), b"data");
    }

    #[test]
    fn test_noop_cipher() {
        let cipher = SelectedCipher::default();
        assert_eq!(cipher.encrypt(b"claims").unwrap(), b"claims");
        assert_eq!(cipher.decrypt(b"claims").unwrap(), b"claims");
    }

    #[test]
    fn test_password() {
        let pwd = PasswordManager::new(Some(ArgonConfig {
            memory_cost: 1024,
            iterations: 1,
            parallelism: 1,
            hash_length: 32,
        }))
        .unwrap();

        let hash = pwd.hash_password("P$soW%920$n&").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(pwd.verify_password("P$soW%920$n&", &hash));
        assert!(!pwd.verify_password("password", &hash));
        assert!(!pwd.verify_password("P$soW%920$n&", "not a phc"));
    }

    #[test]
    fn test_fingerprint() {
        assert_eq!(
            fingerprint("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}

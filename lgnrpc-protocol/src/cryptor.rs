//! Symmetric encryption and HMAC signing for LGNP frames.
//!
//! A `Cryptor` holds the shared salt and key for one server or client
//! instance. It is immutable once constructed and safe to share across
//! connections. Encryption is AES-CBC with PKCS7 padding; the key length
//! selects AES-128/192/256. The IV is derived from the salt and the
//! message id, so ciphertexts are deterministic per `(key, salt, id,
//! plaintext)` — id uniqueness substitutes for a random nonce, and an id
//! must never be reused across distinct plaintexts under the same key.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::{Aes128, Aes192, Aes256};
use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha384, Sha512};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::error::ProtocolError;
use crate::message::{ControlBitmask, SignatureAlgorithm};

/// Minimum salt length in bytes.
pub const MIN_SALT_LENGTH: usize = 6;
/// Maximum salt length in bytes.
pub const MAX_SALT_LENGTH: usize = 12;
/// Maximum key length in bytes (AES-256).
pub const MAX_KEY_LENGTH: usize = 32;

/// AES block size; also the derived IV length.
const BLOCK_SIZE: usize = 16;

/// Per-instance encryption and signing configuration.
pub struct Cryptor {
    salt: String,
    key: Vec<u8>,
}

impl Cryptor {
    /// Creates a cryptor, validating salt and key lengths up front so
    /// misconfiguration fails at startup rather than at request time.
    pub fn new(salt: impl Into<String>, key: impl Into<Vec<u8>>) -> Result<Self, ProtocolError> {
        let salt = salt.into();
        let key = key.into();

        if salt.len() < MIN_SALT_LENGTH || salt.len() > MAX_SALT_LENGTH {
            return Err(ProtocolError::InvalidSalt(salt.len()));
        }
        if !matches!(key.len(), 16 | 24 | 32) {
            return Err(ProtocolError::InvalidKey(key.len()));
        }

        Ok(Self { salt, key })
    }

    /// Derives the block-sized IV: salt bytes followed by the leading
    /// bytes of the id's 32-character lowercase hex rendering.
    fn iv(&self, id: &Uuid) -> [u8; BLOCK_SIZE] {
        let mut iv = [0u8; BLOCK_SIZE];
        let salt = self.salt.as_bytes();
        iv[..salt.len()].copy_from_slice(salt);

        let hex = id.simple().to_string();
        let fill = BLOCK_SIZE - salt.len();
        iv[salt.len()..].copy_from_slice(&hex.as_bytes()[..fill]);
        iv
    }

    /// Encrypts a blob under the AES variant selected by the key length.
    pub fn encrypt(&self, plain: &[u8], id: &Uuid) -> Result<Vec<u8>, ProtocolError> {
        let iv = self.iv(id);
        let ciphertext = match self.key.len() {
            16 => cbc::Encryptor::<Aes128>::new_from_slices(&self.key, &iv)
                .map_err(|_| ProtocolError::EncryptionFailed)?
                .encrypt_padded_vec_mut::<Pkcs7>(plain),
            24 => cbc::Encryptor::<Aes192>::new_from_slices(&self.key, &iv)
                .map_err(|_| ProtocolError::EncryptionFailed)?
                .encrypt_padded_vec_mut::<Pkcs7>(plain),
            32 => cbc::Encryptor::<Aes256>::new_from_slices(&self.key, &iv)
                .map_err(|_| ProtocolError::EncryptionFailed)?
                .encrypt_padded_vec_mut::<Pkcs7>(plain),
            _ => return Err(ProtocolError::EncryptionFailed),
        };
        Ok(ciphertext)
    }

    /// Decrypts a blob previously produced by [`Cryptor::encrypt`] with
    /// the same salt, key and id.
    pub fn decrypt(&self, cipher: &[u8], id: &Uuid) -> Result<Vec<u8>, ProtocolError> {
        let iv = self.iv(id);
        let plaintext = match self.key.len() {
            16 => cbc::Decryptor::<Aes128>::new_from_slices(&self.key, &iv)
                .map_err(|_| ProtocolError::DecryptionFailed)?
                .decrypt_padded_vec_mut::<Pkcs7>(cipher),
            24 => cbc::Decryptor::<Aes192>::new_from_slices(&self.key, &iv)
                .map_err(|_| ProtocolError::DecryptionFailed)?
                .decrypt_padded_vec_mut::<Pkcs7>(cipher),
            32 => cbc::Decryptor::<Aes256>::new_from_slices(&self.key, &iv)
                .map_err(|_| ProtocolError::DecryptionFailed)?
                .decrypt_padded_vec_mut::<Pkcs7>(cipher),
            _ => return Err(ProtocolError::DecryptionFailed),
        };
        plaintext.map_err(|_| ProtocolError::DecryptionFailed)
    }

    /// Computes the HMAC signature over `data ++ id` using the algorithm
    /// the bitmask selects. Returns an empty vec when no signature bit is
    /// set.
    pub fn sign(
        &self,
        data: &[u8],
        bitmask: ControlBitmask,
        id: &Uuid,
    ) -> Result<Vec<u8>, ProtocolError> {
        let Some(algorithm) = bitmask.signature_algorithm() else {
            return Ok(Vec::new());
        };

        match algorithm {
            SignatureAlgorithm::Sha256 => self.keyed_digest::<Hmac<Sha256>>(data, id),
            SignatureAlgorithm::Sha384 => self.keyed_digest::<Hmac<Sha384>>(data, id),
            SignatureAlgorithm::Sha512 => self.keyed_digest::<Hmac<Sha512>>(data, id),
        }
    }

    fn keyed_digest<M: Mac + KeyInit>(
        &self,
        data: &[u8],
        id: &Uuid,
    ) -> Result<Vec<u8>, ProtocolError> {
        // HMAC rejects no key length in practice; the constructor already
        // pinned ours to 16/24/32 bytes.
        let mut mac = <M as Mac>::new_from_slice(&self.key)
            .map_err(|_| ProtocolError::InvalidKey(self.key.len()))?;
        mac.update(data);
        mac.update(id.as_bytes());
        Ok(mac.finalize().into_bytes().to_vec())
    }

    /// Verifies a received signature in constant time.
    pub fn verify(
        &self,
        data: &[u8],
        signature: &[u8],
        bitmask: ControlBitmask,
        id: &Uuid,
    ) -> Result<(), ProtocolError> {
        let expected = self.sign(data, bitmask, id)?;
        if bool::from(signature.ct_eq(&expected)) {
            Ok(())
        } else {
            Err(ProtocolError::SignatureVerificationFailed)
        }
    }
}

impl std::fmt::Debug for Cryptor {
    // Never expose key material in logs.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cryptor")
            .field("salt_len", &self.salt.len())
            .field("key_len", &self.key.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cryptor() -> Cryptor {
        Cryptor::new("saltine", vec![7u8; 32]).unwrap()
    }

    #[test]
    fn test_salt_length_validation() {
        assert_eq!(
            Cryptor::new("short", vec![0u8; 16]).unwrap_err(),
            ProtocolError::InvalidSalt(5)
        );
        assert_eq!(
            Cryptor::new("thirteen-char", vec![0u8; 16]).unwrap_err(),
            ProtocolError::InvalidSalt(13)
        );
        assert!(Cryptor::new("sixsix", vec![0u8; 16]).is_ok());
        assert!(Cryptor::new("twelve-bytes", vec![0u8; 16]).is_ok());
    }

    #[test]
    fn test_key_length_validation() {
        assert_eq!(
            Cryptor::new("saltine", vec![0u8; 15]).unwrap_err(),
            ProtocolError::InvalidKey(15)
        );
        assert_eq!(
            Cryptor::new("saltine", vec![0u8; 33]).unwrap_err(),
            ProtocolError::InvalidKey(33)
        );
        for len in [16, 24, 32] {
            assert!(Cryptor::new("saltine", vec![0u8; len]).is_ok());
        }
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip_all_key_sizes() {
        let id = Uuid::new_v4();
        for len in [16, 24, 32] {
            let cryptor = Cryptor::new("saltine", vec![9u8; len]).unwrap();
            let plain = b"the quick brown fox";
            let cipher = cryptor.encrypt(plain, &id).unwrap();
            assert_ne!(&cipher[..], &plain[..]);
            assert_eq!(cryptor.decrypt(&cipher, &id).unwrap(), plain);
        }
    }

    #[test]
    fn test_encryption_is_deterministic() {
        let cryptor = test_cryptor();
        let id = Uuid::new_v4();
        let a = cryptor.encrypt(b"payload", &id).unwrap();
        let b = cryptor.encrypt(b"payload", &id).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_ids_give_different_ciphertext() {
        let cryptor = test_cryptor();
        let a = cryptor.encrypt(b"payload", &Uuid::new_v4()).unwrap();
        let b = cryptor.encrypt(b"payload", &Uuid::new_v4()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_decrypt_with_wrong_id_fails_or_garbles() {
        let cryptor = test_cryptor();
        let id = Uuid::new_v4();
        let cipher = cryptor.encrypt(b"payload", &id).unwrap();
        // A different id yields a different IV; CBC then either unpads to
        // garbage or fails outright. Either way the plaintext never matches.
        match cryptor.decrypt(&cipher, &Uuid::new_v4()) {
            Ok(garbled) => assert_ne!(garbled, b"payload"),
            Err(e) => assert_eq!(e, ProtocolError::DecryptionFailed),
        }
    }

    #[test]
    fn test_decrypt_truncated_ciphertext_fails() {
        let cryptor = test_cryptor();
        let id = Uuid::new_v4();
        let cipher = cryptor.encrypt(b"payload", &id).unwrap();
        assert_eq!(
            cryptor.decrypt(&cipher[..cipher.len() - 1], &id).unwrap_err(),
            ProtocolError::DecryptionFailed
        );
    }

    #[test]
    fn test_sign_lengths_per_algorithm() {
        let cryptor = test_cryptor();
        let id = Uuid::new_v4();
        let cases = [
            (SignatureAlgorithm::Sha256, 32),
            (SignatureAlgorithm::Sha384, 48),
            (SignatureAlgorithm::Sha512, 64),
        ];
        for (algorithm, len) in cases {
            let bitmask = ControlBitmask::new().with_signature(algorithm);
            assert_eq!(cryptor.sign(b"data", bitmask, &id).unwrap().len(), len);
        }
    }

    #[test]
    fn test_sign_without_signature_bit_is_empty() {
        let cryptor = test_cryptor();
        let signature = cryptor
            .sign(b"data", ControlBitmask::new(), &Uuid::new_v4())
            .unwrap();
        assert!(signature.is_empty());
    }

    #[test]
    fn test_verify_roundtrip_and_mismatch() {
        let cryptor = test_cryptor();
        let id = Uuid::new_v4();
        let bitmask = ControlBitmask::new().with_signature(SignatureAlgorithm::Sha512);

        let signature = cryptor.sign(b"data", bitmask, &id).unwrap();
        assert!(cryptor.verify(b"data", &signature, bitmask, &id).is_ok());
        assert_eq!(
            cryptor
                .verify(b"tampered", &signature, bitmask, &id)
                .unwrap_err(),
            ProtocolError::SignatureVerificationFailed
        );
    }

    #[test]
    fn test_signature_covers_id() {
        let cryptor = test_cryptor();
        let bitmask = ControlBitmask::new().with_signature(SignatureAlgorithm::Sha256);
        let signature = cryptor.sign(b"data", bitmask, &Uuid::new_v4()).unwrap();
        assert_eq!(
            cryptor
                .verify(b"data", &signature, bitmask, &Uuid::new_v4())
                .unwrap_err(),
            ProtocolError::SignatureVerificationFailed
        );
    }

    #[test]
    fn test_debug_hides_secrets() {
        let rendered = format!("{:?}", test_cryptor());
        assert!(!rendered.contains("saltine"));
    }
}

//! Field cipher: DES in ECB mode with PKCS#7 padding, base64 text form.
//!
//! Each field is enciphered on its own and stored as standard-alphabet
//! base64, so ciphertext can sit inside a CSV cell without quoting. ECB
//! enciphers every 8-byte block independently; identical plaintext blocks
//! under one key yield identical ciphertext.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use des::Des;
use ecb::cipher::block_padding::Pkcs7;
use ecb::cipher::{BlockDecryptMut, BlockEncryptMut, KeyInit};

/// DES key length in bytes.
pub const KEY_LEN: usize = 8;

/// A raw 8-byte cipher key.
pub type Key = [u8; KEY_LEN];

type FieldEncryptor = ecb::Encryptor<Des>;
type FieldDecryptor = ecb::Decryptor<Des>;

/// Why a field or table could not be deciphered.
///
/// Every variant is expected while trying wrong keys.
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    /// The field is not valid base64.
    #[error("field is not base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Ciphertext length or trailing padding is invalid for this key.
    #[error("invalid padding")]
    Padding,

    /// Deciphered bytes are not UTF-8 text.
    #[error("plaintext is not UTF-8")]
    Utf8,

    /// The table could not be read or written.
    #[error("malformed table: {0}")]
    Csv(#[from] csv::Error),

    /// The table has no non-empty field to decipher.
    #[error("nothing to decrypt")]
    Empty,
}

/// Derives a key from credential text.
///
/// The UTF-8 bytes are used as-is when exactly 8 long, truncated to the first
/// 8 when longer and right-padded with NUL bytes when shorter.
#[must_use]
pub fn derive_key(credential: &str) -> Key {
    let mut key = [0u8; KEY_LEN];
    let bytes = credential.as_bytes();
    let len = bytes.len().min(KEY_LEN);
    key[..len].copy_from_slice(&bytes[..len]);
    key
}

/// Readable form of a key: lossy UTF-8 with trailing NUL padding removed.
#[must_use]
pub fn key_label(key: &Key) -> String {
    String::from_utf8_lossy(key)
        .trim_end_matches('\0')
        .to_string()
}

/// Enciphers and deciphers single fields under one key.
#[derive(Clone)]
pub struct FieldCipher {
    key: Key,
}

impl std::fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldCipher").finish_non_exhaustive()
    }
}

impl FieldCipher {
    /// Creates a cipher for `key`.
    #[must_use]
    pub fn new(key: Key) -> Self {
        Self { key }
    }

    /// Creates a cipher keyed from credential text, see [`derive_key`].
    #[must_use]
    pub fn from_credential(credential: &str) -> Self {
        Self::new(derive_key(credential))
    }

    /// The raw key.
    #[must_use]
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Pads, enciphers and base64-encodes `plaintext`.
    #[must_use]
    pub fn encrypt_field(&self, plaintext: &[u8]) -> String {
        let ciphertext =
            FieldEncryptor::new(&self.key.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext);
        STANDARD.encode(ciphertext)
    }

    /// Reverses [`FieldCipher::encrypt_field`].
    ///
    /// # Errors
    ///
    /// Returns [`CipherError`] if the field is not base64, the padding does
    /// not check out under this key or the result is not UTF-8.
    pub fn decrypt_field(&self, field: &[u8]) -> Result<String, CipherError> {
        let ciphertext = STANDARD.decode(field)?;
        let plaintext = FieldDecryptor::new(&self.key.into())
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|_| CipherError::Padding)?;
        String::from_utf8(plaintext).map_err(|_| CipherError::Utf8)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_key_of_exactly_eight_bytes_is_unmodified() {
        assert_eq!(&derive_key("Secr3tK!"), b"Secr3tK!");
    }

    #[test]
    fn test_longer_key_is_truncated() {
        assert_eq!(&derive_key("Secr3tK!extra"), b"Secr3tK!");
    }

    #[test]
    fn test_shorter_key_is_nul_padded() {
        assert_eq!(&derive_key("Secr3tK"), b"Secr3tK\0");
        assert_eq!(derive_key(""), [0u8; 8]);
    }

    #[test]
    fn test_key_label_drops_padding() {
        assert_eq!(key_label(&derive_key("abc")), "abc");
        assert_eq!(key_label(&derive_key("abcdefghij")), "abcdefgh");
    }

    #[test]
    fn test_empty_field_is_one_padding_block() {
        let cipher = FieldCipher::new([0u8; 8]);
        let encrypted = cipher.encrypt_field(b"");
        assert_eq!(STANDARD.decode(&encrypted).unwrap().len(), 8);
        assert_eq!(cipher.decrypt_field(encrypted.as_bytes()).unwrap(), "");
    }

    #[test]
    fn test_field_round_trip_is_block_aligned() {
        let cipher = FieldCipher::from_credential("MySecKey");
        for text in ["a", "exactly8", "Contains ñ and á", "Multi\nLine, \"quoted\""] {
            let encrypted = cipher.encrypt_field(text.as_bytes());
            let raw = STANDARD.decode(&encrypted).unwrap();
            assert_eq!(raw.len() % KEY_LEN, 0);
            assert!(raw.len() > text.len());
            assert_eq!(cipher.decrypt_field(encrypted.as_bytes()).unwrap(), text);
        }
    }

    #[test]
    fn test_ecb_repeats_identical_blocks() {
        let cipher = FieldCipher::from_credential("MySecKey");
        let raw = STANDARD
            .decode(cipher.encrypt_field(b"AAAAAAAAAAAAAAAA"))
            .unwrap();
        assert_eq!(raw[..8], raw[8..16]);
    }

    #[test]
    fn test_wrong_key_or_garbage_is_an_error() {
        let right = FieldCipher::from_credential("rightkey");
        let wrong = FieldCipher::from_credential("wrongkey");
        let encrypted = right.encrypt_field(b"Name,Age,City,Salary,Notes and more text");

        assert!(wrong.decrypt_field(encrypted.as_bytes()).is_err());
        assert!(matches!(
            right.decrypt_field(b"not base64!"),
            Err(CipherError::Base64(_))
        ));
        assert!(matches!(
            right.decrypt_field(b"AAAA"),
            Err(CipherError::Padding)
        ));
    }
}

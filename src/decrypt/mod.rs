//! Decryption of harvested CSV artifacts with harvested credentials.
//!
//! - [`cipher`]: key derivation and the per-field DES/ECB/PKCS#7/base64 primitive
//! - [`encrypt_csv`] / [`decrypt_csv`]: whole-table transforms
//! - [`DecryptionEngine`]: the pass over the tracking store
//!
//! ```
//! use harvester_core::decrypt::{FieldCipher, decrypt_csv, encrypt_csv};
//!
//! let cipher = FieldCipher::from_credential("Secr3tK");
//! let sealed = encrypt_csv(b"name,pin\r\nann,1234\r\n", &cipher).unwrap();
//! assert_eq!(decrypt_csv(&sealed, &cipher).unwrap(), b"name,pin\r\nann,1234\r\n");
//! ```

pub mod cipher;
mod engine;
mod error;
mod table;

pub use cipher::{CipherError, FieldCipher, Key, derive_key, key_label};
pub use engine::{
    DECRYPTED_SUBDIR, DecryptionEngine, DecryptionStats, candidate_keys, decrypted_path_for,
};
pub use error::DecryptError;
pub use table::{decrypt_csv, encrypt_csv, encrypt_file};

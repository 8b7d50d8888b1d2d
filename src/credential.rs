//! Credential Hashing
//!
//! Salted PBKDF2-HMAC-SHA256 password hashing with constant-time
//! verification, plus one-time verification codes and random tokens.
//!
//! Verification fails closed: a record with a missing salt or a hash of the
//! wrong length never verifies.

use std::fmt;

use base64::Engine as Base64Engine;
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

/// Salt length in bytes
pub const SALT_LENGTH: usize = 32;

/// Derived hash length in bytes
pub const HASH_LENGTH: usize = 128;

/// Lowest iteration count accepted by the monitor configuration
pub const MIN_KDF_ITERATIONS: u32 = 100_000;

/// Default verification code length
pub const DEFAULT_CODE_LENGTH: usize = 6;

/// Stored form of a password
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Derived key
    #[serde(with = "hex::serde")]
    pub hash: Vec<u8>,
    /// Per-credential salt
    #[serde(with = "hex::serde")]
    pub salt: Vec<u8>,
}

impl CredentialRecord {
    /// True if the record has a salt and a hash of the expected length
    pub fn is_well_formed(&self) -> bool {
        !self.salt.is_empty() && self.hash.len() == HASH_LENGTH
    }
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("hash", &format_args!("<{} bytes>", self.hash.len()))
            .field("salt", &format_args!("<{} bytes>", self.salt.len()))
            .finish()
    }
}

/// Password hasher with a fixed iteration count
#[derive(Debug, Clone, Copy)]
pub struct CredentialHasher {
    iterations: u32,
}

impl CredentialHasher {
    /// Create a hasher. The monitor only constructs hashers from validated
    /// configuration, which enforces `MIN_KDF_ITERATIONS`.
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }

    /// Configured iteration count
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Hash `password`. A missing or empty salt is replaced by a fresh random one.
    pub fn hash(&self, password: &str, salt: Option<&[u8]>) -> CredentialRecord {
        let salt = match salt {
            Some(salt) if !salt.is_empty() => salt.to_vec(),
            _ => random_bytes(SALT_LENGTH),
        };

        CredentialRecord {
            hash: self.derive(password, &salt).to_vec(),
            salt,
        }
    }

    /// Check `password` against a stored record in constant time
    pub fn verify(&self, password: &str, record: &CredentialRecord) -> bool {
        if !record.is_well_formed() {
            return false;
        }

        let derived = self.derive(password, &record.salt);
        bool::from(derived.as_slice().ct_eq(record.hash.as_slice()))
    }

    fn derive(&self, password: &str, salt: &[u8]) -> [u8; HASH_LENGTH] {
        let mut out = [0u8; HASH_LENGTH];
        pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, self.iterations, &mut out);
        out
    }
}

impl Default for CredentialHasher {
    fn default() -> Self {
        Self::new(MIN_KDF_ITERATIONS)
    }
}

/// Generate a numeric one-time code of `length` digits
pub fn generate_code(length: usize) -> String {
    let mut rng = OsRng;
    (0..length)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

/// Compare a submitted code with the expected one in constant time.
///
/// Empty codes never verify.
pub fn verify_code(candidate: &str, expected: &str) -> bool {
    if candidate.is_empty() || expected.is_empty() {
        return false;
    }
    bool::from(candidate.as_bytes().ct_eq(expected.as_bytes()))
}

/// Generate a URL-safe token from `length` random bytes
pub fn generate_token(length: usize) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(random_bytes(length))
}

fn random_bytes(length: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; length];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    // Low iteration count keeps unit tests fast; production configs are validated
    fn test_hasher() -> CredentialHasher {
        CredentialHasher::new(1_000)
    }

    #[test]
    fn test_hash_and_verify() {
        let hasher = test_hasher();
        let record = hasher.hash("correct horse battery staple", None);

        assert_eq!(record.salt.len(), SALT_LENGTH);
        assert_eq!(record.hash.len(), HASH_LENGTH);
        assert!(hasher.verify("correct horse battery staple", &record));
        assert!(!hasher.verify("correct horse battery stapler", &record));
        assert!(!hasher.verify("", &record));
    }

    #[test]
    fn test_fresh_salt_per_hash() {
        let hasher = test_hasher();
        let a = hasher.hash("password", None);
        let b = hasher.hash("password", None);

        assert_ne!(a.salt, b.salt);
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn test_explicit_salt_is_deterministic() {
        let hasher = test_hasher();
        let salt = [7u8; SALT_LENGTH];
        let a = hasher.hash("password", Some(&salt));
        let b = hasher.hash("password", Some(&salt));

        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_salt_replaced() {
        let hasher = test_hasher();
        let record = hasher.hash("password", Some(&[]));
        assert_eq!(record.salt.len(), SALT_LENGTH);
    }

    #[test]
    fn test_iteration_count_changes_hash() {
        let salt = [1u8; SALT_LENGTH];
        let a = CredentialHasher::new(1_000).hash("password", Some(&salt));
        let b = CredentialHasher::new(1_001).hash("password", Some(&salt));
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn test_malformed_records_fail_closed() {
        let hasher = test_hasher();
        let good = hasher.hash("password", None);

        let no_salt = CredentialRecord {
            hash: good.hash.clone(),
            salt: vec![],
        };
        assert!(!hasher.verify("password", &no_salt));

        let short_hash = CredentialRecord {
            hash: good.hash[..32].to_vec(),
            salt: good.salt.clone(),
        };
        assert!(!hasher.verify("password", &short_hash));

        let empty = CredentialRecord {
            hash: vec![],
            salt: vec![],
        };
        assert!(!hasher.verify("password", &empty));
    }

    #[test]
    fn test_record_serde_hex() {
        let record = CredentialRecord {
            hash: vec![0xab; HASH_LENGTH],
            salt: vec![0x01, 0x02],
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"salt\":\"0102\""));

        let back: CredentialRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);

        // Non-hex input is rejected at the boundary
        assert!(serde_json::from_str::<CredentialRecord>(r#"{"hash":"zz","salt":"00"}"#).is_err());
    }

    #[test]
    fn test_debug_redacts() {
        let record = test_hasher().hash("password", None);
        let debug = format!("{:?}", record);
        assert!(debug.contains("<128 bytes>"));
        assert!(!debug.contains(&hex::encode(&record.hash)));
    }

    #[test]
    fn test_generate_code() {
        let code = generate_code(DEFAULT_CODE_LENGTH);
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(generate_code(8).len(), 8);
    }

    #[test]
    fn test_verify_code() {
        assert!(verify_code("123456", "123456"));
        assert!(!verify_code("123457", "123456"));
        assert!(!verify_code("12345", "123456"));
        assert!(!verify_code("", ""));
    }

    #[test]
    fn test_generate_token() {
        let a = generate_token(32);
        let b = generate_token(32);
        assert_ne!(a, b);
        // 32 bytes -> 43 base64 characters without padding
        assert_eq!(a.len(), 43);
        assert!(!a.contains('='));
        assert!(!a.contains('+') && !a.contains('/'));
    }
}

//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//


//! Name rules and password hashing.

use crate::error::{EngineError, Result};
use argon2::{Algorithm, Argon2, Params, Version};
use password_hash::rand_core::OsRng;
use password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};

/// Hashes and verifies passwords
pub trait CredentialHasher: Send + Sync {
    fn hash(&self, password: &str) -> Result<String>;

    fn verify(&self, password: &str, hash: &str) -> bool;
}

/// Argon2id with a random salt per password
#[derive(Default)]
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
}

impl Argon2Hasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Argon2id using `memory_kib` of memory and `iterations` passes
    ///
    /// Hashing runs on the pulse loop, so the cost bounds how long one login
    /// line can hold it up. Stored hashes carry their own cost and keep
    /// verifying after it changes.
    pub fn with_cost(memory_kib: u32, iterations: u32) -> Result<Self> {
        let params = Params::new(memory_kib, iterations, 1, None)
            .map_err(|err| EngineError::Config(format!("invalid password hash cost: {err}")))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }
}

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| EngineError::Credential(err.to_string()))
    }

    fn verify(&self, password: &str, hash: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => self
                .argon2
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }
}

/// Names are 3 to 12 letters
pub fn check_name(name: &str) -> bool {
    (3..=12).contains(&name.len()) && name.bytes().all(|b| b.is_ascii_alphabetic())
}

/// Passwords are 5 to 12 characters
pub fn check_password(password: &str) -> bool {
    (5..=12).contains(&password.chars().count())
}

/// Upper-case the first letter and lower-case the rest
pub fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_name() {
        assert!(check_name("Bob"));
        assert!(check_name("abcdefghijkl"));
        assert!(!check_name("Al"));
        assert!(!check_name("abcdefghijklm"));
        assert!(!check_name("Bob1"));
        assert!(!check_name("Bo b"));
    }

    #[test]
    fn test_check_password() {
        assert!(check_password("hunter"));
        assert!(!check_password("abcd"));
        assert!(!check_password("abcdefghijklm"));
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("aLICE"), "Alice");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn test_argon2_round_trip() {
        let hasher = Argon2Hasher::new();
        let hash = hasher.hash("secret1").unwrap();
        assert_ne!(hash, "secret1");
        assert!(hasher.verify("secret1", &hash));
        assert!(!hasher.verify("secret2", &hash));
        assert!(!hasher.verify("secret1", "not a phc string"));
    }

    #[test]
    fn test_cost_is_recorded_in_hash() {
        let cheap = Argon2Hasher::with_cost(64, 1).unwrap();
        let hash = cheap.hash("secret1").unwrap();
        assert!(hash.starts_with("$argon2id$v=19$m=64,t=1,p=1$"));
        assert!(Argon2Hasher::new().verify("secret1", &hash));
        assert!(!Argon2Hasher::new().verify("secret2", &hash));
    }

    #[test]
    fn test_invalid_cost_rejected() {
        assert!(matches!(
            Argon2Hasher::with_cost(64, 0),
            Err(EngineError::Config(_))
        ));
        assert!(Argon2Hasher::with_cost(1, 1).is_err());
    }
}

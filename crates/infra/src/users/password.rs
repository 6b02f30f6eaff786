//! Argon2id password hashing (PHC string format).

use anyhow::{Result, anyhow};
use argon2::{Algorithm, Argon2, Params, PasswordHasher, PasswordVerifier, Version};
use password_hash::{PasswordHash, SaltString};
use rand::RngCore;
use rand::rngs::OsRng;

#[derive(Debug, Clone)]
pub struct PasswordHasherConfig {
    params: Params,
}

impl Default for PasswordHasherConfig {
    fn default() -> Self {
        Self {
            params: Params::default(),
        }
    }
}

impl PasswordHasherConfig {
    /// Custom cost parameters: memory in KiB, iterations, lanes.
    pub fn with_cost(m_cost: u32, t_cost: u32, p_cost: u32) -> Result<Self> {
        let params = Params::new(m_cost, t_cost, p_cost, None).map_err(|e| anyhow!(e.to_string()))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    pub fn hash_password(&self, password: &str) -> Result<String> {
        let mut salt_bytes = [0u8; 16];
        OsRng.fill_bytes(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
        let phc = self
            .argon2()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow!(e.to_string()))?
            .to_string();
        Ok(phc)
    }

    /// A malformed stored hash never verifies.
    pub fn verify_password(&self, password: &str, hash: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => self.argon2().verify_password(password.as_bytes(), &parsed).is_ok(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> PasswordHasherConfig {
        PasswordHasherConfig::with_cost(8, 1, 1).unwrap()
    }

    #[test]
    fn hash_verifies_only_the_original_password() {
        let hasher = cheap();
        let hash = hasher.hash_password("correct horse").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify_password("correct horse", &hash));
        assert!(!hasher.verify_password("battery staple", &hash));
    }

    #[test]
    fn salts_differ_per_hash() {
        let hasher = cheap();
        assert_ne!(hasher.hash_password("pw").unwrap(), hasher.hash_password("pw").unwrap());
    }

    #[test]
    fn garbage_hash_does_not_verify() {
        assert!(!cheap().verify_password("pw", "not-a-phc-string"));
    }
}

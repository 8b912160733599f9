// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Vault key material.
//!
//! The ElGamal secret is a secp256k1 scalar stored as a PKCS#8 PEM file.
//! The ECDSA key that signs range attestations is derived from it, so
//! attestations stay verifiable across restarts without a second secret on
//! disk.

use std::fmt;
use std::path::Path;

use alloy::primitives::{keccak256, B256};
use k256::{
    ecdsa::{SigningKey, VerifyingKey},
    elliptic_curve::rand_core::OsRng,
    pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding},
    NonZeroScalar, ProjectivePoint, SecretKey,
};
use sha2::{Digest, Sha256};

use super::{ciphertext::encode_point, dlog, Ciphertext, FheError};

const ATTESTATION_DOMAIN: &[u8] = b"confidential-vault/attestation/v1";

/// Holder of the vault secret. Only the engine can reach it.
pub(crate) struct KeyHolder {
    secret: SecretKey,
    public: ProjectivePoint,
    fingerprint: B256,
    attestation: SigningKey,
}

impl KeyHolder {
    /// Generate fresh key material.
    pub(crate) fn generate() -> Result<Self, FheError> {
        Self::from_secret(SecretKey::random(&mut OsRng))
    }

    pub(crate) fn from_secret(secret: SecretKey) -> Result<Self, FheError> {
        let public = secret.public_key().to_projective();
        let fingerprint = keccak256(encode_point(&public));

        let derived = Sha256::new()
            .chain_update(ATTESTATION_DOMAIN)
            .chain_update(secret.to_bytes())
            .finalize();
        let attestation = SigningKey::from_bytes(&derived)
            .map_err(|e| FheError::KeyMaterial(format!("attestation key derivation: {e}")))?;

        Ok(Self {
            secret,
            public,
            fingerprint,
            attestation,
        })
    }

    /// Load the key file at `path`, generating and writing it if missing.
    pub(crate) fn load_or_generate(path: &Path) -> Result<Self, FheError> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| FheError::KeyMaterial(format!("read {}: {e}", path.display())))?;
            let parsed = pem::parse(contents.as_bytes())
                .map_err(|e| FheError::KeyMaterial(format!("invalid PEM: {e}")))?;
            let secret = SecretKey::from_pkcs8_der(parsed.contents())
                .map_err(|e| FheError::KeyMaterial(format!("invalid key: {e}")))?;
            tracing::info!(path = %path.display(), "Loaded vault key material");
            return Self::from_secret(secret);
        }

        let holder = Self::generate()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| FheError::KeyMaterial(format!("create {}: {e}", parent.display())))?;
        }
        let pem = holder
            .secret
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| FheError::KeyMaterial(format!("encode key: {e}")))?;
        std::fs::write(path, pem.as_bytes())
            .map_err(|e| FheError::KeyMaterial(format!("write {}: {e}", path.display())))?;
        tracing::info!(path = %path.display(), "Generated new vault key material");

        Ok(holder)
    }

    pub(crate) fn public(&self) -> &ProjectivePoint {
        &self.public
    }

    pub(crate) fn fingerprint(&self) -> B256 {
        self.fingerprint
    }

    pub(crate) fn attestation_signer(&self) -> &SigningKey {
        &self.attestation
    }

    pub(crate) fn attestation_key(&self) -> &VerifyingKey {
        self.attestation.verifying_key()
    }

    /// Recover the signed plaintext of `ct`, or `None` when it lies outside
    /// the searchable range. Callers must never let the value escape.
    pub(super) fn decrypt(&self, ct: &Ciphertext) -> Result<Option<i64>, FheError> {
        let (c1, c2) = ct.points()?;
        let scalar: NonZeroScalar = self.secret.to_nonzero_scalar();
        let message = c2 - c1 * *scalar;
        Ok(dlog::table().solve(&message))
    }
}

impl fmt::Debug for KeyHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyHolder")
            .field("fingerprint", &self.fingerprint)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_is_redacted() {
        let holder = KeyHolder::generate().unwrap();
        let secret_hex = alloy::hex::encode(holder.secret.to_bytes());
        let debug = format!("{holder:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains(&secret_hex));
    }

    #[test]
    fn key_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys").join("vault_key.pem");

        let first = KeyHolder::load_or_generate(&path).unwrap();
        assert!(path.exists());
        let second = KeyHolder::load_or_generate(&path).unwrap();

        assert_eq!(first.fingerprint(), second.fingerprint());
        assert_eq!(first.attestation_key(), second.attestation_key());
    }

    #[test]
    fn rejects_corrupt_key_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault_key.pem");
        std::fs::write(&path, "not a key").unwrap();

        assert!(matches!(
            KeyHolder::load_or_generate(&path),
            Err(FheError::KeyMaterial(_))
        ));
    }
}

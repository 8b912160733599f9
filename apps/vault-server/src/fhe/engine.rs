// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Homomorphic operations over vault ciphertexts.

use std::path::Path;

use alloy::primitives::B256;
use k256::{
    ecdsa::VerifyingKey, elliptic_curve::rand_core::OsRng, NonZeroScalar, ProjectivePoint, Scalar,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{
    ciphertext::encode_point, keys::KeyHolder, Ciphertext, EncryptedBool, FheError,
    RandomnessProof, RangeProof, RangeStatement, MAX_AMOUNT, SCHEME, SCHEME_VERSION,
};

/// Public key material handed to clients so they can encrypt locally.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PublicKeyInfo {
    /// Encryption scheme identifier.
    pub scheme: String,
    /// Scheme wire-format version.
    pub version: u16,
    /// Compressed secp256k1 public key, hex encoded.
    pub public_key: String,
    /// keccak256 of the compressed public key.
    #[schema(value_type = String)]
    pub fingerprint: B256,
    /// Largest amount accepted for a single operation.
    pub max_amount: u64,
}

/// The encrypted arithmetic engine.
///
/// All methods take `&self` and are safe to call from many tasks at once;
/// the only shared state is read-only key material.
#[derive(Debug)]
pub struct FheEngine {
    keys: KeyHolder,
    public_info: PublicKeyInfo,
}

impl FheEngine {
    fn from_holder(keys: KeyHolder) -> Self {
        let public_info = PublicKeyInfo {
            scheme: SCHEME.to_string(),
            version: SCHEME_VERSION,
            public_key: format!("0x{}", alloy::hex::encode(encode_point(keys.public()))),
            fingerprint: keys.fingerprint(),
            max_amount: MAX_AMOUNT,
        };
        Self { keys, public_info }
    }

    /// Engine with ephemeral key material (lost on restart).
    pub fn generate() -> Result<Self, FheError> {
        Ok(Self::from_holder(KeyHolder::generate()?))
    }

    /// Engine backed by a PEM key file, created on first use.
    pub fn load_or_generate(path: &Path) -> Result<Self, FheError> {
        Ok(Self::from_holder(KeyHolder::load_or_generate(path)?))
    }

    pub fn public_key(&self) -> &PublicKeyInfo {
        &self.public_info
    }

    pub fn key_fingerprint(&self) -> B256 {
        self.keys.fingerprint()
    }

    /// Key that verifies every [`RangeProof`] this engine issues.
    pub fn attestation_key(&self) -> &VerifyingKey {
        self.keys.attestation_key()
    }

    /// Reject ciphertexts not produced under this vault's key.
    pub fn check_compatible(&self, ct: &Ciphertext) -> Result<(), FheError> {
        if ct.scheme != SCHEME || ct.version != SCHEME_VERSION {
            return Err(FheError::SchemeMismatch(format!(
                "expected {SCHEME} v{SCHEME_VERSION}, got {} v{}",
                ct.scheme, ct.version
            )));
        }
        if ct.key_fingerprint != self.keys.fingerprint() {
            return Err(FheError::SchemeMismatch(format!(
                "ciphertext encrypted under key {}, vault key is {}",
                ct.key_fingerprint,
                self.keys.fingerprint()
            )));
        }
        ct.points().map(|_| ())
    }

    /// Encrypt an operation amount under the vault public key.
    pub fn encrypt(&self, amount: u64) -> Result<Ciphertext, FheError> {
        if amount > MAX_AMOUNT {
            return Err(FheError::AmountOutOfRange { max: MAX_AMOUNT });
        }
        Ok(self.encrypt_scalar(Scalar::from(amount)))
    }

    /// Encrypt an operation amount together with the proof of encryption
    /// the ledger requires, bound to `context`.
    pub fn encrypt_with_proof(
        &self,
        amount: u64,
        context: B256,
    ) -> Result<(Ciphertext, RandomnessProof), FheError> {
        if amount > MAX_AMOUNT {
            return Err(FheError::AmountOutOfRange { max: MAX_AMOUNT });
        }
        let (ciphertext, r) = self.encrypt_blinded(Scalar::from(amount));
        let proof = RandomnessProof::prove(&r, &ciphertext, context);
        Ok((ciphertext, proof))
    }

    /// Fresh encryption of zero.
    pub fn zero(&self) -> Ciphertext {
        self.encrypt_scalar(Scalar::ZERO)
    }

    fn encrypt_scalar(&self, m: Scalar) -> Ciphertext {
        self.encrypt_blinded(m).0
    }

    fn encrypt_blinded(&self, m: Scalar) -> (Ciphertext, Scalar) {
        let r = NonZeroScalar::random(&mut OsRng);
        let c1 = ProjectivePoint::GENERATOR * *r;
        let c2 = ProjectivePoint::GENERATOR * m + *self.keys.public() * *r;
        (
            Ciphertext::from_points(&c1, &c2, self.keys.fingerprint()),
            *r,
        )
    }

    fn binary_points(
        &self,
        a: &Ciphertext,
        b: &Ciphertext,
    ) -> Result<((ProjectivePoint, ProjectivePoint), (ProjectivePoint, ProjectivePoint)), FheError>
    {
        self.check_compatible(a)?;
        a.ensure_compatible(b)?;
        Ok((a.points()?, b.points()?))
    }

    /// `Enc(a + b)`.
    pub fn add(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext, FheError> {
        let ((a1, a2), (b1, b2)) = self.binary_points(a, b)?;
        Ok(Ciphertext::from_points(
            &(a1 + b1),
            &(a2 + b2),
            self.keys.fingerprint(),
        ))
    }

    fn subtract(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext, FheError> {
        let ((a1, a2), (b1, b2)) = self.binary_points(a, b)?;
        Ok(Ciphertext::from_points(
            &(a1 - b1),
            &(a2 - b2),
            self.keys.fingerprint(),
        ))
    }

    /// `Enc(a - b)` plus a proof that the difference did not underflow.
    pub fn subtract_with_underflow_proof(
        &self,
        a: &Ciphertext,
        b: &Ciphertext,
    ) -> Result<(Ciphertext, RangeProof), FheError> {
        let diff = self.subtract(a, b)?;
        let proof = self.attest(RangeStatement::NonNegative, &diff)?;
        Ok((diff, proof))
    }

    /// Fresh encryption of `1` if `a >= b`, else `0`.
    pub fn compare_encrypted(
        &self,
        a: &Ciphertext,
        b: &Ciphertext,
    ) -> Result<EncryptedBool, FheError> {
        let diff = self.subtract(a, b)?;
        let greater_or_equal = matches!(self.keys.decrypt(&diff)?, Some(d) if d >= 0);
        Ok(EncryptedBool(
            self.encrypt_scalar(Scalar::from(u64::from(greater_or_equal))),
        ))
    }

    /// Same plaintext, fresh blinding.
    pub fn rerandomize(&self, ct: &Ciphertext) -> Result<Ciphertext, FheError> {
        self.add(ct, &self.zero())
    }

    /// Attest that `amount` is a valid operation amount.
    pub fn prove_amount(&self, amount: &Ciphertext) -> Result<RangeProof, FheError> {
        self.check_compatible(amount)?;
        self.attest(RangeStatement::PositiveAmount, amount)
    }

    /// Attest that `balance` does not exceed the vault balance cap.
    pub fn prove_within_limit(&self, balance: &Ciphertext) -> Result<RangeProof, FheError> {
        self.check_compatible(balance)?;
        self.attest(RangeStatement::WithinLimit, balance)
    }

    fn attest(
        &self,
        statement: RangeStatement,
        subject: &Ciphertext,
    ) -> Result<RangeProof, FheError> {
        let holds = matches!(self.keys.decrypt(subject)?, Some(v) if statement.contains(v));
        Ok(RangeProof::sign(
            self.keys.attestation_signer(),
            statement,
            subject,
            holds,
        ))
    }

    /// Test oracle: plaintext of `ct`. Not compiled into the service.
    #[cfg(test)]
    pub(crate) fn reveal(&self, ct: &Ciphertext) -> Option<i64> {
        self.keys.decrypt(ct).ok().flatten()
    }
}

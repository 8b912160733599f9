// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Range attestations and proofs of encryption.
//!
//! A [`RangeProof`] is the key holder's signed verdict that the plaintext of
//! one specific ciphertext does (or does not) lie in the range named by its
//! [`RangeStatement`]. It binds to the ciphertext fingerprint, so a proof
//! for one balance cannot be replayed against another.
//!
//! A [`RandomnessProof`] comes from the encrypting party: a Schnorr proof
//! that it knows the blinding scalar `r` behind `c1 = r·G`. Anyone who knows
//! `r` already knows `m·G = c2 - r·P`, so range verdicts on such a
//! ciphertext tell its submitter nothing new. Ciphertexts derived from
//! somebody else's balance carry no such knowledge and are refused.

use alloy::primitives::{keccak256, Bytes, B256};
use k256::{
    ecdsa::{
        signature::{Signer, Verifier},
        Signature, SigningKey, VerifyingKey,
    },
    elliptic_curve::{ff::PrimeField, ops::Reduce, rand_core::OsRng},
    FieldBytes, NonZeroScalar, ProjectivePoint, Scalar, U256,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{
    ciphertext::{decode_point, encode_point, POINT_LEN},
    Ciphertext, MAX_AMOUNT, MAX_BALANCE,
};

const RANDOMNESS_DOMAIN: &[u8] = b"confidential-vault/amount-randomness/v1";

/// What a range proof asserts about its subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeStatement {
    /// `1 <= m <= MAX_AMOUNT`: a valid operation amount.
    PositiveAmount,
    /// `0 <= m <= MAX_BALANCE`: a subtraction did not underflow.
    NonNegative,
    /// `0 <= m <= MAX_BALANCE`: a credit did not exceed the balance cap.
    WithinLimit,
}

impl RangeStatement {
    fn tag(self) -> u8 {
        match self {
            RangeStatement::PositiveAmount => 1,
            RangeStatement::NonNegative => 2,
            RangeStatement::WithinLimit => 3,
        }
    }

    /// Inclusive plaintext bounds.
    pub fn bounds(self) -> (i64, i64) {
        match self {
            RangeStatement::PositiveAmount => (1, MAX_AMOUNT as i64),
            RangeStatement::NonNegative | RangeStatement::WithinLimit => (0, MAX_BALANCE as i64),
        }
    }

    pub(crate) fn contains(self, value: i64) -> bool {
        let (lo, hi) = self.bounds();
        (lo..=hi).contains(&value)
    }
}

/// Signed one-bit verdict about a ciphertext.
#[derive(Debug, Clone)]
pub struct RangeProof {
    statement: RangeStatement,
    subject: B256,
    holds: bool,
    signature: Signature,
}

impl RangeProof {
    pub(crate) fn sign(
        key: &SigningKey,
        statement: RangeStatement,
        subject: &Ciphertext,
        holds: bool,
    ) -> Self {
        let subject = subject.fingerprint();
        let message = Self::message(statement, subject, holds);
        let signature: Signature = key.sign(message.as_slice());

        Self {
            statement,
            subject,
            holds,
            signature,
        }
    }

    fn message(statement: RangeStatement, subject: B256, holds: bool) -> B256 {
        let mut buf = Vec::with_capacity(2 + 32);
        buf.push(statement.tag());
        buf.extend_from_slice(subject.as_slice());
        buf.push(u8::from(holds));
        keccak256(&buf)
    }

    /// The verdict, unauthenticated. Prefer [`RangeProof::confirms`].
    pub fn holds(&self) -> bool {
        self.holds
    }

    /// True when the proof is signed by `key`, concerns exactly `subject`,
    /// asserts `statement`, and the verdict is positive.
    pub fn confirms(
        &self,
        key: &VerifyingKey,
        statement: RangeStatement,
        subject: &Ciphertext,
    ) -> bool {
        if self.statement != statement || self.subject != subject.fingerprint() {
            return false;
        }
        let message = Self::message(self.statement, self.subject, self.holds);
        key.verify(message.as_slice(), &self.signature).is_ok() && self.holds
    }
}

/// Schnorr proof of knowledge of the blinding scalar of a ciphertext,
/// bound to a caller-chosen context (the operation it funds).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RandomnessProof {
    /// Compressed nonce point `R = k·G`, hex encoded.
    #[schema(value_type = String)]
    pub commitment: Bytes,
    /// Response scalar `s = k + e·r`, big-endian.
    #[schema(value_type = String)]
    pub response: B256,
}

impl RandomnessProof {
    /// Prove knowledge of `r` for `ciphertext`, whose first component must
    /// be `r·G`.
    pub(crate) fn prove(r: &Scalar, ciphertext: &Ciphertext, context: B256) -> Self {
        let k = NonZeroScalar::random(&mut OsRng);
        let commitment = encode_point(&(ProjectivePoint::GENERATOR * *k));
        let e = Self::challenge(ciphertext, &commitment, context);
        let s = *k + e * r;

        Self {
            commitment: Bytes::copy_from_slice(&commitment),
            response: B256::from_slice(s.to_bytes().as_slice()),
        }
    }

    /// True when the proof was made for `ciphertext` under `context` by
    /// someone who knows its blinding scalar.
    pub fn verify(&self, ciphertext: &Ciphertext, context: B256) -> bool {
        let Ok((c1, _)) = ciphertext.points() else {
            return false;
        };
        if self.commitment.len() != POINT_LEN {
            return false;
        }
        let Some(r_point) = decode_point(&self.commitment) else {
            return false;
        };
        let Some(s) = Option::<Scalar>::from(Scalar::from_repr(FieldBytes::from(self.response.0)))
        else {
            return false;
        };

        let e = Self::challenge(ciphertext, &self.commitment, context);
        ProjectivePoint::GENERATOR * s == r_point + c1 * e
    }

    fn challenge(ciphertext: &Ciphertext, commitment: &[u8], context: B256) -> Scalar {
        let mut buf = Vec::with_capacity(RANDOMNESS_DOMAIN.len() + 32 * 2 + POINT_LEN);
        buf.extend_from_slice(RANDOMNESS_DOMAIN);
        buf.extend_from_slice(ciphertext.fingerprint().as_slice());
        buf.extend_from_slice(commitment);
        buf.extend_from_slice(context.as_slice());
        let digest = keccak256(&buf);
        <Scalar as Reduce<U256>>::reduce_bytes(&FieldBytes::from(digest.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject(m: u64) -> Ciphertext {
        let p = ProjectivePoint::GENERATOR * Scalar::from(m);
        Ciphertext::from_points(&p, &p, B256::ZERO)
    }

    #[test]
    fn bounds_match_limits() {
        assert!(!RangeStatement::PositiveAmount.contains(0));
        assert!(RangeStatement::PositiveAmount.contains(1));
        assert!(!RangeStatement::PositiveAmount.contains(MAX_AMOUNT as i64 + 1));
        assert!(RangeStatement::NonNegative.contains(0));
        assert!(!RangeStatement::NonNegative.contains(-1));
        assert!(!RangeStatement::WithinLimit.contains(MAX_BALANCE as i64 + 1));
    }

    #[test]
    fn confirms_only_for_signed_subject() {
        let key = SigningKey::random(&mut OsRng);
        let other_key = SigningKey::random(&mut OsRng);
        let ct = subject(5);

        let proof = RangeProof::sign(&key, RangeStatement::NonNegative, &ct, true);
        assert!(proof.confirms(key.verifying_key(), RangeStatement::NonNegative, &ct));
        assert!(!proof.confirms(other_key.verifying_key(), RangeStatement::NonNegative, &ct));
        assert!(!proof.confirms(key.verifying_key(), RangeStatement::WithinLimit, &ct));
        assert!(!proof.confirms(key.verifying_key(), RangeStatement::NonNegative, &subject(6)));
    }

    #[test]
    fn negative_verdict_never_confirms() {
        let key = SigningKey::random(&mut OsRng);
        let ct = subject(5);
        let proof = RangeProof::sign(&key, RangeStatement::NonNegative, &ct, false);
        assert!(!proof.holds());
        assert!(!proof.confirms(key.verifying_key(), RangeStatement::NonNegative, &ct));
    }

    fn encrypted(r: u64, m: u64, public: &ProjectivePoint) -> (Scalar, Ciphertext) {
        let r = Scalar::from(r);
        let c1 = ProjectivePoint::GENERATOR * r;
        let c2 = ProjectivePoint::GENERATOR * Scalar::from(m) + *public * r;
        (r, Ciphertext::from_points(&c1, &c2, B256::ZERO))
    }

    #[test]
    fn randomness_proof_verifies_for_its_context_only() {
        let public = ProjectivePoint::GENERATOR * Scalar::from(99u64);
        let (r, ct) = encrypted(1234, 5, &public);
        let context = B256::repeat_byte(7);

        let proof = RandomnessProof::prove(&r, &ct, context);
        assert!(proof.verify(&ct, context));
        assert!(!proof.verify(&ct, B256::repeat_byte(8)));

        let (_, other) = encrypted(4321, 5, &public);
        assert!(!proof.verify(&other, context));
    }

    #[test]
    fn randomness_proof_needs_the_blinding_scalar() {
        let public = ProjectivePoint::GENERATOR * Scalar::from(99u64);
        let (_, ct) = encrypted(1234, 5, &public);
        let context = B256::repeat_byte(7);

        let guessed = RandomnessProof::prove(&Scalar::from(1u64), &ct, context);
        assert!(!guessed.verify(&ct, context));

        let mut garbage = RandomnessProof::prove(&Scalar::from(1234u64), &ct, context);
        garbage.commitment = Bytes::from(vec![0xffu8; POINT_LEN]);
        assert!(!garbage.verify(&ct, context));
    }
}

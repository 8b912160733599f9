// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ciphertext wire format.
//!
//! A ciphertext is two compressed secp256k1 points `(c1, c2)`, 33 bytes each.
//! The identity point has no SEC1 compressed form, so it is written as 33
//! zero bytes to keep the layout fixed-width.

use alloy::primitives::{keccak256, Bytes, B256};
use k256::{
    elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint},
    AffinePoint, EncodedPoint, ProjectivePoint,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::FheError;

/// Scheme identifier carried by every ciphertext.
pub const SCHEME: &str = "ec-elgamal-secp256k1";

/// Wire format version.
pub const SCHEME_VERSION: u16 = 1;

pub(crate) const POINT_LEN: usize = 33;

/// Length of the `data` field in bytes.
pub const CIPHERTEXT_LEN: usize = POINT_LEN * 2;

/// An encrypted value under the vault public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Ciphertext {
    /// Encryption scheme (`ec-elgamal-secp256k1`).
    pub scheme: String,
    /// Scheme wire-format version.
    pub version: u16,
    /// Fingerprint of the public key this value was encrypted under.
    #[schema(value_type = String, example = "0x5f1c...")]
    pub key_fingerprint: B256,
    /// `c1 || c2`, hex encoded.
    #[schema(value_type = String, example = "0x02...")]
    pub data: Bytes,
}

impl Ciphertext {
    pub(crate) fn from_points(
        c1: &ProjectivePoint,
        c2: &ProjectivePoint,
        key_fingerprint: B256,
    ) -> Self {
        let mut data = Vec::with_capacity(CIPHERTEXT_LEN);
        data.extend_from_slice(&encode_point(c1));
        data.extend_from_slice(&encode_point(c2));

        Self {
            scheme: SCHEME.to_string(),
            version: SCHEME_VERSION,
            key_fingerprint,
            data: data.into(),
        }
    }

    /// Decode the two curve points.
    pub(crate) fn points(&self) -> Result<(ProjectivePoint, ProjectivePoint), FheError> {
        if self.data.len() != CIPHERTEXT_LEN {
            return Err(FheError::MalformedCiphertext(format!(
                "expected {CIPHERTEXT_LEN} bytes, got {}",
                self.data.len()
            )));
        }

        let c1 = decode_point(&self.data[..POINT_LEN])
            .ok_or_else(|| FheError::MalformedCiphertext("c1 is not a curve point".into()))?;
        let c2 = decode_point(&self.data[POINT_LEN..])
            .ok_or_else(|| FheError::MalformedCiphertext("c2 is not a curve point".into()))?;

        Ok((c1, c2))
    }

    /// Digest identifying this exact ciphertext.
    ///
    /// Re-randomized ciphertexts of the same value have different
    /// fingerprints.
    pub fn fingerprint(&self) -> B256 {
        let mut buf = Vec::with_capacity(self.scheme.len() + 2 + 32 + self.data.len());
        buf.extend_from_slice(self.scheme.as_bytes());
        buf.extend_from_slice(&self.version.to_be_bytes());
        buf.extend_from_slice(self.key_fingerprint.as_slice());
        buf.extend_from_slice(&self.data);
        keccak256(&buf)
    }

    /// Whether two ciphertexts may be combined homomorphically.
    pub fn ensure_compatible(&self, other: &Ciphertext) -> Result<(), FheError> {
        if self.scheme != other.scheme || self.version != other.version {
            return Err(FheError::SchemeMismatch(format!(
                "{} v{} vs {} v{}",
                self.scheme, self.version, other.scheme, other.version
            )));
        }
        if self.key_fingerprint != other.key_fingerprint {
            return Err(FheError::SchemeMismatch(format!(
                "key fingerprint {} vs {}",
                self.key_fingerprint, other.key_fingerprint
            )));
        }
        Ok(())
    }
}

/// Encrypted boolean: a ciphertext of `1` (true) or `0` (false).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct EncryptedBool(pub Ciphertext);

pub(crate) fn encode_point(point: &ProjectivePoint) -> [u8; POINT_LEN] {
    let mut out = [0u8; POINT_LEN];
    if *point == ProjectivePoint::IDENTITY {
        return out;
    }
    let encoded = AffinePoint::from(*point).to_encoded_point(true);
    out.copy_from_slice(encoded.as_bytes());
    out
}

pub(crate) fn decode_point(bytes: &[u8]) -> Option<ProjectivePoint> {
    if bytes.iter().all(|b| *b == 0) {
        return Some(ProjectivePoint::IDENTITY);
    }
    let encoded = EncodedPoint::from_bytes(bytes).ok()?;
    Option::<AffinePoint>::from(AffinePoint::from_encoded_point(&encoded)).map(ProjectivePoint::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::Scalar;

    fn sample(fingerprint: B256) -> Ciphertext {
        let c1 = ProjectivePoint::GENERATOR * Scalar::from(7u64);
        let c2 = ProjectivePoint::GENERATOR * Scalar::from(11u64);
        Ciphertext::from_points(&c1, &c2, fingerprint)
    }

    #[test]
    fn points_survive_encoding() {
        let ct = sample(B256::repeat_byte(1));
        assert_eq!(ct.data.len(), CIPHERTEXT_LEN);

        let (c1, c2) = ct.points().unwrap();
        assert_eq!(c1, ProjectivePoint::GENERATOR * Scalar::from(7u64));
        assert_eq!(c2, ProjectivePoint::GENERATOR * Scalar::from(11u64));
    }

    #[test]
    fn identity_is_fixed_width() {
        let ct = Ciphertext::from_points(
            &ProjectivePoint::IDENTITY,
            &ProjectivePoint::IDENTITY,
            B256::ZERO,
        );
        assert_eq!(ct.data.len(), CIPHERTEXT_LEN);
        let (c1, c2) = ct.points().unwrap();
        assert_eq!(c1, ProjectivePoint::IDENTITY);
        assert_eq!(c2, ProjectivePoint::IDENTITY);
    }

    #[test]
    fn rejects_truncated_and_garbage_data() {
        let mut ct = sample(B256::ZERO);
        ct.data = Bytes::from(vec![2u8; 10]);
        assert!(matches!(ct.points(), Err(FheError::MalformedCiphertext(_))));

        ct.data = Bytes::from(vec![0xffu8; CIPHERTEXT_LEN]);
        assert!(matches!(ct.points(), Err(FheError::MalformedCiphertext(_))));
    }

    #[test]
    fn compatibility_requires_same_key() {
        let a = sample(B256::repeat_byte(1));
        let b = sample(B256::repeat_byte(2));
        assert!(a.ensure_compatible(&a.clone()).is_ok());
        assert!(matches!(
            a.ensure_compatible(&b),
            Err(FheError::SchemeMismatch(_))
        ));

        let mut c = a.clone();
        c.version = 2;
        assert!(matches!(
            a.ensure_compatible(&c),
            Err(FheError::SchemeMismatch(_))
        ));
    }

    #[test]
    fn fingerprint_tracks_content() {
        let a = sample(B256::repeat_byte(1));
        let b = sample(B256::repeat_byte(2));
        assert_eq!(a.fingerprint(), a.clone().fingerprint());
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn serializes_data_as_hex() {
        let ct = sample(B256::ZERO);
        let json = serde_json::to_value(&ct).unwrap();
        assert_eq!(json["scheme"], SCHEME);
        assert!(json["data"].as_str().unwrap().starts_with("0x"));

        let back: Ciphertext = serde_json::from_value(json).unwrap();
        assert_eq!(back, ct);
    }
}

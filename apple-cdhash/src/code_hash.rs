// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Digesting of code directories.

The identity of a signed binary is the digest of its code directory
blob: the blob header, the fixed fields, the identifier and the full
table of page hashes. This digest is the *cdhash*.

Regardless of the digest algorithm, the cdhash is always
[CS_CDHASH_LEN] bytes. Longer digests are truncated.
*/

use {
    crate::{embedded_signature::DigestType, error::AppleCdhashError},
    std::fmt::{Display, Formatter},
};

/// Length in bytes of a cdhash.
pub const CS_CDHASH_LEN: usize = 20;

/// A digest algorithm we are able to compute a cdhash with.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DigestAlgorithm {
    Sha1,
    Sha256,
}

impl DigestAlgorithm {
    fn ring_algorithm(&self) -> &'static ring::digest::Algorithm {
        match self {
            Self::Sha1 => &ring::digest::SHA1_FOR_LEGACY_USE_ONLY,
            Self::Sha256 => &ring::digest::SHA256,
        }
    }

    /// Length in bytes of digests produced by this algorithm.
    pub fn digest_len(&self) -> usize {
        match self {
            Self::Sha1 => ring::digest::SHA1_OUTPUT_LEN,
            Self::Sha256 => ring::digest::SHA256_OUTPUT_LEN,
        }
    }

    /// Digest data.
    ///
    /// The returned value is the full, untruncated digest.
    pub fn digest(&self, data: &[u8]) -> ring::digest::Digest {
        ring::digest::digest(self.ring_algorithm(), data)
    }
}

impl TryFrom<DigestType> for DigestAlgorithm {
    type Error = AppleCdhashError;

    fn try_from(v: DigestType) -> Result<Self, Self::Error> {
        match v {
            DigestType::Sha1 => Ok(Self::Sha1),
            DigestType::Sha256 => Ok(Self::Sha256),
            _ => Err(AppleCdhashError::UnsupportedHashType(v)),
        }
    }
}

/// A code directory hash.
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub struct CdHash([u8; CS_CDHASH_LEN]);

impl CdHash {
    /// Compute the cdhash of raw code directory bytes.
    pub fn compute(algorithm: DigestAlgorithm, data: &[u8]) -> Self {
        debug_assert!(algorithm.digest_len() >= CS_CDHASH_LEN);
        let digest = algorithm.digest(data);

        let mut cdhash = [0u8; CS_CDHASH_LEN];
        cdhash.copy_from_slice(&digest.as_ref()[0..CS_CDHASH_LEN]);

        Self(cdhash)
    }

    pub fn as_bytes(&self) -> &[u8; CS_CDHASH_LEN] {
        &self.0
    }

    pub fn as_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl From<[u8; CS_CDHASH_LEN]> for CdHash {
    fn from(v: [u8; CS_CDHASH_LEN]) -> Self {
        Self(v)
    }
}

impl From<CdHash> for [u8; CS_CDHASH_LEN] {
    fn from(v: CdHash) -> Self {
        v.0
    }
}

impl AsRef<[u8]> for CdHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for CdHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("CdHash({})", self.as_hex()))
    }
}

impl Display for CdHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_hex())
    }
}

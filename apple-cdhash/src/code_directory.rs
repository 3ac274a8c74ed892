// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Code directory data structure and related types.

use {
    crate::{
        code_hash::{CdHash, DigestAlgorithm},
        embedded_signature::{read_blob_header, Blob, CodeSigningMagic, DigestType},
        error::AppleCdhashError,
    },
    scroll::Pread,
};

/// Minimum amount of data a code directory must have available.
///
/// This is the size of the code directory structure through the fields
/// introduced in version 0x20400 (executable segment). It is checked against
/// the data available to the blob, not the blob's declared length.
pub const CODE_DIRECTORY_MIN_SIZE: usize = 0x58;

/// Offset of the `version` field.
const VERSION_OFFSET: usize = 0x08;

/// Offset of the `hashType` field.
const HASH_TYPE_OFFSET: usize = 0x25;

/// Hash types in ascending order of preference.
///
/// This mirrors the kernel's ranking of code directories and must not be
/// reordered. The rank of a hash type is its 1-based position in this list.
pub const RANKED_HASH_TYPES: [DigestType; 4] = [
    DigestType::Sha1,
    DigestType::Sha256Truncated,
    DigestType::Sha256,
    DigestType::Sha384,
];

/// Obtain the rank of a hash type.
///
/// Higher is preferred. 0 means the hash type isn't ranked.
pub fn hash_type_rank(hash_type: DigestType) -> u32 {
    RANKED_HASH_TYPES
        .iter()
        .position(|t| *t == hash_type)
        .map(|i| i as u32 + 1)
        .unwrap_or(0)
}

/// A validated code directory blob.
///
/// This is a view over borrowed data. Only the fields needed to rank and
/// digest the code directory are decoded.
#[derive(Clone, Copy)]
pub struct CodeDirectoryBlob<'a> {
    /// All data available to the blob.
    data: &'a [u8],

    /// Validated length of the blob. Never greater than `data.len()`.
    length: usize,

    /// Compatibility version.
    version: u32,

    /// Type of hash.
    hash_type: DigestType,
}

impl<'a> std::fmt::Debug for CodeDirectoryBlob<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeDirectoryBlob")
            .field("length", &self.length)
            .field("version", &format_args!("{:#x}", self.version))
            .field("hash_type", &self.hash_type)
            .finish()
    }
}

impl<'a> Blob<'a> for CodeDirectoryBlob<'a> {
    fn magic() -> u32 {
        u32::from(CodeSigningMagic::CodeDirectory)
    }

    fn from_blob_bytes(data: &'a [u8]) -> Result<Self, AppleCdhashError> {
        if data.len() < CODE_DIRECTORY_MIN_SIZE {
            return Err(AppleCdhashError::CodeDirectoryMalformed(
                "data too small for code directory",
            ));
        }

        let (magic, length) = read_blob_header(data)?;

        if magic != Self::magic() {
            return Err(AppleCdhashError::BadMagic("code directory blob"));
        }

        if length == 0 {
            return Err(AppleCdhashError::CodeDirectoryMalformed(
                "declared length is 0",
            ));
        }
        if length > data.len() {
            return Err(AppleCdhashError::CodeDirectoryMalformed(
                "declared length exceeds available data",
            ));
        }

        let version = data.pread_with(VERSION_OFFSET, scroll::BE)?;
        let hash_type = data.pread_with::<u8>(HASH_TYPE_OFFSET, scroll::BE)?.into();

        Ok(Self {
            data,
            length,
            version,
            hash_type,
        })
    }
}

impl<'a> CodeDirectoryBlob<'a> {
    /// The validated length of the code directory.
    ///
    /// This is the declared length and may be smaller than the data that was
    /// available when validating.
    pub fn length(&self) -> usize {
        self.length
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn hash_type(&self) -> DigestType {
        self.hash_type
    }

    /// The rank of this code directory's hash type.
    ///
    /// See [hash_type_rank].
    pub fn rank(&self) -> u32 {
        hash_type_rank(self.hash_type)
    }

    /// The raw bytes of the code directory, header included.
    pub fn to_blob_bytes(&self) -> &'a [u8] {
        &self.data[..self.length]
    }

    /// Compute the cdhash of this code directory.
    ///
    /// Only SHA-1 and SHA-256 code directories can be digested, even though
    /// other hash types are ranked.
    pub fn cdhash(&self) -> Result<CdHash, AppleCdhashError> {
        // The length is re-read from the blob rather than trusting the value
        // captured during validation.
        let (_, length) = read_blob_header(self.data)?;
        let data = self
            .data
            .get(..length)
            .ok_or(AppleCdhashError::CodeDirectoryMalformed(
                "declared length exceeds available data",
            ))?;

        let algorithm = DigestAlgorithm::try_from(self.hash_type)?;

        Ok(CdHash::compute(algorithm, data))
    }
}

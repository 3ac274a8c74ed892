// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Common embedded signature data structures (superblobs, magic values, etc).
//!
//! The best reference for these formats is Apple's open source headers,
//! notably cs_blobs.h (e.g.
//! <https://opensource.apple.com/source/xnu/xnu-7195.81.3/osfmk/kern/cs_blobs.h.auto.html>).
//!
//! The high-level format of embedded signature data is roughly as follows:
//!
//! * A `SuperBlob` header describes the total length of data and the number of
//!   *blob* sections that follow.
//! * An array of `BlobIndex` describing the type and offset of all *blob* sections
//!   that follow. The *type* here is a *slot* and describes what type of data the
//!   *blob* contains (code directory, entitlements, embedded signature, etc).
//! * N *blob* sections of varying formats and lengths.
//!
//! All integers in these structures are big-endian.
//!
//! Everything in this module operates on borrowed slices of untrusted data.
//! Each reader validates the range it is handed, even when the caller has
//! already validated an enclosing range.

use {
    crate::{
        code_directory::CodeDirectoryBlob,
        code_hash::CdHash,
        error::AppleCdhashError,
    },
    log::{debug, trace},
    scroll::{IOwrite, Pread},
    std::{
        fmt::{Display, Formatter},
        io::Write,
    },
};

/// Size of the magic + length header common to all blobs.
pub const BLOB_HEADER_SIZE: usize = 8;

/// Size of the `SuperBlob` header: magic, length, and index count.
pub const SUPERBLOB_HEADER_SIZE: usize = 12;

/// Size of a single `BlobIndex` entry.
pub const BLOB_INDEX_SIZE: usize = 8;

/// Super blobs with this many index entries or more are rejected.
pub const SUPERBLOB_MAX_COUNT: u32 = 0x10000;

/// Defines header magic for various payloads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CodeSigningMagic {
    /// Code requirement blob.
    Requirement,
    /// Code requirements blob.
    RequirementSet,
    /// CodeDirectory blob.
    CodeDirectory,
    /// Embedded signature.
    ///
    /// This is the magic of the SuperBlob.
    EmbeddedSignature,
    /// Old embedded signature.
    EmbeddedSignatureOld,
    /// Entitlements blob.
    Entitlements,
    /// DER encoded entitlements blob.
    EntitlementsDer,
    /// Multi-arch collection of embedded signatures.
    DetachedSignature,
    /// Generic blob wrapper.
    ///
    /// The CMS signature is stored in this type.
    BlobWrapper,
    /// Unknown magic.
    Unknown(u32),
}

impl From<u32> for CodeSigningMagic {
    fn from(v: u32) -> Self {
        match v {
            0xfade0c00 => Self::Requirement,
            0xfade0c01 => Self::RequirementSet,
            0xfade0c02 => Self::CodeDirectory,
            0xfade0cc0 => Self::EmbeddedSignature,
            0xfade0b02 => Self::EmbeddedSignatureOld,
            0xfade7171 => Self::Entitlements,
            0xfade7172 => Self::EntitlementsDer,
            0xfade0cc1 => Self::DetachedSignature,
            0xfade0b01 => Self::BlobWrapper,
            _ => Self::Unknown(v),
        }
    }
}

impl From<CodeSigningMagic> for u32 {
    fn from(magic: CodeSigningMagic) -> u32 {
        match magic {
            CodeSigningMagic::Requirement => 0xfade0c00,
            CodeSigningMagic::RequirementSet => 0xfade0c01,
            CodeSigningMagic::CodeDirectory => 0xfade0c02,
            CodeSigningMagic::EmbeddedSignature => 0xfade0cc0,
            CodeSigningMagic::EmbeddedSignatureOld => 0xfade0b02,
            CodeSigningMagic::Entitlements => 0xfade7171,
            CodeSigningMagic::EntitlementsDer => 0xfade7172,
            CodeSigningMagic::DetachedSignature => 0xfade0cc1,
            CodeSigningMagic::BlobWrapper => 0xfade0b01,
            CodeSigningMagic::Unknown(v) => v,
        }
    }
}

/// A well-known slot within code signing data.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodeSigningSlot {
    CodeDirectory,
    Info,
    RequirementSet,
    ResourceDir,
    Application,
    Entitlements,
    RepSpecific,
    EntitlementsDer,
    AlternateCodeDirectory0,
    AlternateCodeDirectory1,
    AlternateCodeDirectory2,
    AlternateCodeDirectory3,
    AlternateCodeDirectory4,
    Signature,
    Identification,
    Ticket,
    Unknown(u32),
}

/// First slot value reserved for alternate code directories.
pub const CSSLOT_ALTERNATE_CODEDIRECTORIES: u32 = 0x1000;

/// Exclusive upper bound of the alternate code directory slots.
pub const CSSLOT_ALTERNATE_CODEDIRECTORY_LIMIT: u32 = 0x1005;

impl std::fmt::Debug for CodeSigningSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::CodeDirectory => "CodeDirectory",
            Self::Info => "Info",
            Self::RequirementSet => "RequirementSet",
            Self::ResourceDir => "Resources",
            Self::Application => "Application",
            Self::Entitlements => "Entitlements",
            Self::RepSpecific => "Rep Specific",
            Self::EntitlementsDer => "DER Entitlements",
            Self::AlternateCodeDirectory0 => "CodeDirectory Alternate #0",
            Self::AlternateCodeDirectory1 => "CodeDirectory Alternate #1",
            Self::AlternateCodeDirectory2 => "CodeDirectory Alternate #2",
            Self::AlternateCodeDirectory3 => "CodeDirectory Alternate #3",
            Self::AlternateCodeDirectory4 => "CodeDirectory Alternate #4",
            Self::Signature => "CMS Signature",
            Self::Identification => "Identification",
            Self::Ticket => "Ticket",
            Self::Unknown(_) => "Unknown",
        };

        f.write_fmt(format_args!("{} ({})", name, u32::from(*self)))
    }
}

impl From<u32> for CodeSigningSlot {
    fn from(v: u32) -> Self {
        match v {
            0 => Self::CodeDirectory,
            1 => Self::Info,
            2 => Self::RequirementSet,
            3 => Self::ResourceDir,
            4 => Self::Application,
            5 => Self::Entitlements,
            6 => Self::RepSpecific,
            7 => Self::EntitlementsDer,
            0x1000 => Self::AlternateCodeDirectory0,
            0x1001 => Self::AlternateCodeDirectory1,
            0x1002 => Self::AlternateCodeDirectory2,
            0x1003 => Self::AlternateCodeDirectory3,
            0x1004 => Self::AlternateCodeDirectory4,
            0x10000 => Self::Signature,
            0x10001 => Self::Identification,
            0x10002 => Self::Ticket,
            _ => Self::Unknown(v),
        }
    }
}

impl From<CodeSigningSlot> for u32 {
    fn from(v: CodeSigningSlot) -> Self {
        match v {
            CodeSigningSlot::CodeDirectory => 0,
            CodeSigningSlot::Info => 1,
            CodeSigningSlot::RequirementSet => 2,
            CodeSigningSlot::ResourceDir => 3,
            CodeSigningSlot::Application => 4,
            CodeSigningSlot::Entitlements => 5,
            CodeSigningSlot::RepSpecific => 6,
            CodeSigningSlot::EntitlementsDer => 7,
            CodeSigningSlot::AlternateCodeDirectory0 => 0x1000,
            CodeSigningSlot::AlternateCodeDirectory1 => 0x1001,
            CodeSigningSlot::AlternateCodeDirectory2 => 0x1002,
            CodeSigningSlot::AlternateCodeDirectory3 => 0x1003,
            CodeSigningSlot::AlternateCodeDirectory4 => 0x1004,
            CodeSigningSlot::Signature => 0x10000,
            CodeSigningSlot::Identification => 0x10001,
            CodeSigningSlot::Ticket => 0x10002,
            CodeSigningSlot::Unknown(v) => v,
        }
    }
}

impl CodeSigningSlot {
    /// Whether this slot holds a code directory.
    ///
    /// This is the primary code directory slot or one of the alternate
    /// code directory slots.
    pub fn is_code_directory(&self) -> bool {
        let v = u32::from(*self);

        v == u32::from(Self::CodeDirectory)
            || (CSSLOT_ALTERNATE_CODEDIRECTORIES..CSSLOT_ALTERNATE_CODEDIRECTORY_LIMIT).contains(&v)
    }
}

/// Represents a digest type encountered in code signature data structures.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DigestType {
    None,
    Sha1,
    Sha256,
    Sha256Truncated,
    Sha384,
    Sha512,
    Unknown(u8),
}

impl From<u8> for DigestType {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::None,
            1 => Self::Sha1,
            2 => Self::Sha256,
            3 => Self::Sha256Truncated,
            4 => Self::Sha384,
            5 => Self::Sha512,
            _ => Self::Unknown(v),
        }
    }
}

impl From<DigestType> for u8 {
    fn from(v: DigestType) -> u8 {
        match v {
            DigestType::None => 0,
            DigestType::Sha1 => 1,
            DigestType::Sha256 => 2,
            DigestType::Sha256Truncated => 3,
            DigestType::Sha384 => 4,
            DigestType::Sha512 => 5,
            DigestType::Unknown(v) => v,
        }
    }
}

impl Display for DigestType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DigestType::None => f.write_str("none"),
            DigestType::Sha1 => f.write_str("sha1"),
            DigestType::Sha256 => f.write_str("sha256"),
            DigestType::Sha256Truncated => f.write_str("sha256-truncated"),
            DigestType::Sha384 => f.write_str("sha384"),
            DigestType::Sha512 => f.write_str("sha512"),
            DigestType::Unknown(v) => f.write_fmt(format_args!("unknown: {}", v)),
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy)]
struct BlobIndex {
    /// Corresponds to a [CodeSigningSlot] variant.
    typ: u32,
    offset: u32,
}

impl std::fmt::Debug for BlobIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("BlobIndex")
            .field("type", &CodeSigningSlot::from(self.typ))
            .field("offset", &self.offset)
            .finish()
    }
}

/// Read the header from a Blob.
///
/// Blobs begin with a u32 magic and u32 length, inclusive.
pub(crate) fn read_blob_header(data: &[u8]) -> Result<(u32, usize), scroll::Error> {
    let magic = data.pread_with(0, scroll::BE)?;
    let length = data.pread_with::<u32>(4, scroll::BE)?;

    Ok((magic, length as usize))
}

/// Provides common features for a blob type we know how to read.
pub trait Blob<'a>
where
    Self: Sized,
{
    /// The header magic that identifies this format.
    fn magic() -> u32;

    /// Attempt to construct an instance by validating a bytes slice.
    ///
    /// The slice begins with the 8 byte blob header denoting the magic
    /// and length. The slice length is the amount of data available to
    /// the blob, which may exceed its declared length.
    fn from_blob_bytes(data: &'a [u8]) -> Result<Self, AppleCdhashError>;
}

/// Create the binary content for a SuperBlob.
pub fn create_superblob<'a>(
    magic: CodeSigningMagic,
    blobs: impl Iterator<Item = &'a (CodeSigningSlot, Vec<u8>)>,
) -> Result<Vec<u8>, AppleCdhashError> {
    // Makes offset calculation easier.
    let blobs = blobs.collect::<Vec<_>>();

    let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
    let mut blob_data = Vec::new();
    let mut total_length = (SUPERBLOB_HEADER_SIZE + BLOB_INDEX_SIZE * blobs.len()) as u32;

    let mut indices = Vec::with_capacity(blobs.len());

    for (slot, blob) in blobs {
        blob_data.push(blob);

        indices.push(BlobIndex {
            typ: u32::from(*slot),
            offset: total_length,
        });

        total_length += blob.len() as u32;
    }

    cursor.iowrite_with(u32::from(magic), scroll::BE)?;
    cursor.iowrite_with(total_length, scroll::BE)?;
    cursor.iowrite_with(indices.len() as u32, scroll::BE)?;
    for index in indices {
        cursor.iowrite_with(index.typ, scroll::BE)?;
        cursor.iowrite_with(index.offset, scroll::BE)?;
    }

    for data in blob_data {
        cursor.write_all(data)?;
    }

    Ok(cursor.into_inner())
}

/// Represents a single blob as defined by a SuperBlob index entry.
///
/// The blob data is unvalidated. It spans from the blob's start offset to
/// the end of the super blob.
#[derive(Clone)]
pub struct BlobEntry<'a> {
    /// Our blob index within the `SuperBlob`.
    pub index: usize,

    /// The slot type.
    pub slot: CodeSigningSlot,

    /// Our start offset within the `SuperBlob`.
    ///
    /// First byte is start of our magic.
    pub offset: usize,

    /// Data from our start offset to the end of the `SuperBlob`.
    pub data: &'a [u8],
}

impl<'a> std::fmt::Debug for BlobEntry<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("BlobEntry")
            .field("index", &self.index)
            .field("slot", &self.slot)
            .field("offset", &self.offset)
            .field("magic", &self.magic())
            .finish()
    }
}

impl<'a> BlobEntry<'a> {
    /// The magic value appearing at the beginning of the blob, if there is room for one.
    pub fn magic(&self) -> Option<CodeSigningMagic> {
        self.data
            .pread_with::<u32>(0, scroll::BE)
            .ok()
            .map(CodeSigningMagic::from)
    }
}

/// A validated code directory found in a super blob.
#[derive(Debug)]
pub struct CodeDirectoryCandidate<'a> {
    /// The index entry the code directory came from.
    pub entry: BlobEntry<'a>,

    /// The validated code directory.
    pub code_directory: CodeDirectoryBlob<'a>,
}

impl<'a> CodeDirectoryCandidate<'a> {
    pub fn rank(&self) -> u32 {
        self.code_directory.rank()
    }
}

/// Represents Apple's embedded code signature super blob.
///
/// Instances are validated views over borrowed data. Blob index entries
/// are decoded lazily.
pub struct EmbeddedSignature<'a> {
    /// Raw data of this super blob, bounded by its declared length.
    data: &'a [u8],

    /// Declared length of this super blob. Always `data.len()`.
    length: usize,

    /// Number of blobs in this super blob.
    count: u32,
}

impl<'a> std::fmt::Debug for EmbeddedSignature<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("SuperBlob")
            .field("length", &self.length)
            .field("count", &self.count)
            .finish()
    }
}

impl<'a> Blob<'a> for EmbeddedSignature<'a> {
    fn magic() -> u32 {
        u32::from(CodeSigningMagic::EmbeddedSignature)
    }

    fn from_blob_bytes(data: &'a [u8]) -> Result<Self, AppleCdhashError> {
        if data.len() < SUPERBLOB_HEADER_SIZE {
            return Err(AppleCdhashError::SuperblobMalformed(
                "data too small for super blob header",
            ));
        }

        let offset = &mut 0;

        let magic = data.gread_with::<u32>(offset, scroll::BE)?;
        if magic != Self::magic() {
            return Err(AppleCdhashError::BadMagic("embedded signature super blob"));
        }

        let length = data.gread_with::<u32>(offset, scroll::BE)? as usize;

        // Nothing past the declared length belongs to this super blob.
        let data = data
            .get(..length)
            .ok_or(AppleCdhashError::SuperblobMalformed(
                "declared length exceeds available data",
            ))?;

        let count = data
            .pread_with::<u32>(*offset, scroll::BE)
            .map_err(|_| AppleCdhashError::SuperblobMalformed("declared length too small"))?;
        if count >= SUPERBLOB_MAX_COUNT {
            return Err(AppleCdhashError::SuperblobMalformed(
                "too many blob index entries",
            ));
        }

        // The BlobIndex array immediately follows the header.
        let index_end = SUPERBLOB_HEADER_SIZE + BLOB_INDEX_SIZE * count as usize;
        if index_end > data.len() {
            return Err(AppleCdhashError::SuperblobMalformed(
                "blob index exceeds declared length",
            ));
        }

        Ok(Self {
            data,
            length,
            count,
        })
    }
}

impl<'a> EmbeddedSignature<'a> {
    /// Attempt to parse an embedded signature super blob from data.
    ///
    /// The argument to this function is likely the subset of the
    /// `__LINKEDIT` Mach-O section that the `LC_CODE_SIGNATURE` load instructions
    /// points it.
    pub fn from_bytes(data: &'a [u8]) -> Result<Self, AppleCdhashError> {
        Self::from_blob_bytes(data)
    }

    /// The declared length of the super blob.
    pub fn length(&self) -> usize {
        self.length
    }

    /// The number of blob index entries.
    pub fn count(&self) -> u32 {
        self.count
    }

    fn blob_index(&self, index: usize) -> Result<BlobIndex, AppleCdhashError> {
        let offset = SUPERBLOB_HEADER_SIZE + BLOB_INDEX_SIZE * index;

        Ok(BlobIndex {
            typ: self.data.pread_with(offset, scroll::BE)?,
            offset: self.data.pread_with(offset + 4, scroll::BE)?,
        })
    }

    /// Iterate over blob index entries.
    ///
    /// An entry whose offset lies beyond the declared length of the super
    /// blob is an error.
    pub fn blobs(&self) -> impl Iterator<Item = Result<BlobEntry<'a>, AppleCdhashError>> + '_ {
        (0..self.count as usize).map(move |i| {
            let index = self.blob_index(i)?;
            let offset = index.offset as usize;

            let data = self
                .data
                .get(offset..self.length)
                .ok_or(AppleCdhashError::SuperblobMalformed(
                    "blob offset beyond end of super blob",
                ))?;

            Ok(BlobEntry {
                index: i,
                slot: index.typ.into(),
                offset,
                data,
            })
        })
    }

    /// Iterate over code directories in this super blob.
    ///
    /// Entries in code directory slots must hold a valid code directory:
    /// one malformed code directory invalidates the entire super blob.
    pub fn code_directory_candidates(
        &self,
    ) -> impl Iterator<Item = Result<CodeDirectoryCandidate<'a>, AppleCdhashError>> + '_ {
        self.blobs().filter_map(|entry| match entry {
            Ok(entry) if entry.slot.is_code_directory() => Some(
                CodeDirectoryBlob::from_blob_bytes(entry.data).map(|code_directory| {
                    CodeDirectoryCandidate {
                        entry,
                        code_directory,
                    }
                }),
            ),
            Ok(_) => None,
            Err(e) => Some(Err(e)),
        })
    }

    /// Obtain all code directories in this super blob.
    pub fn code_directories(&self) -> Result<Vec<CodeDirectoryCandidate<'a>>, AppleCdhashError> {
        self.code_directory_candidates().collect()
    }

    /// Find the code directory the operating system would anchor trust on.
    ///
    /// This is the code directory with the highest [CodeDirectoryBlob::rank].
    /// On ties, the entry appearing first in the index wins. Code directories
    /// with an unranked hash type are never selected.
    pub fn select_best_code_directory(
        &self,
    ) -> Result<CodeDirectoryCandidate<'a>, AppleCdhashError> {
        let mut best: Option<CodeDirectoryCandidate<'a>> = None;

        for candidate in self.code_directory_candidates() {
            let candidate = candidate?;
            let rank = candidate.rank();

            trace!(
                "code directory candidate: slot {:?}, offset {}, hash type {}, rank {}",
                candidate.entry.slot,
                candidate.entry.offset,
                candidate.code_directory.hash_type(),
                rank
            );

            if rank > best.as_ref().map(|best| best.rank()).unwrap_or(0) {
                best = Some(candidate);
            }
        }

        let best = best.ok_or(AppleCdhashError::CodeDirectoryNotFound)?;
        debug!(
            "selected code directory in slot {:?} ({})",
            best.entry.slot,
            best.code_directory.hash_type()
        );

        Ok(best)
    }

    /// Compute the cdhash of the best code directory.
    pub fn cdhash(&self) -> Result<CdHash, AppleCdhashError> {
        self.select_best_code_directory()?.code_directory.cdhash()
    }
}

/// Compute the cdhash from the outermost blob of code signature data.
///
/// The blob must be an embedded signature super blob or a bare code
/// directory. Blobs nested in a super blob are not dispatched through here.
pub fn cdhash_from_blob(data: &[u8]) -> Result<CdHash, AppleCdhashError> {
    if data.len() < BLOB_HEADER_SIZE {
        return Err(AppleCdhashError::BlobMalformed("data too small for blob header"));
    }

    let (magic, length) = read_blob_header(data)?;

    if length < BLOB_HEADER_SIZE {
        return Err(AppleCdhashError::BlobMalformed(
            "declared length smaller than blob header",
        ));
    }

    let data = data.get(..length).ok_or(AppleCdhashError::BlobMalformed(
        "declared length exceeds available data",
    ))?;

    match CodeSigningMagic::from(magic) {
        CodeSigningMagic::EmbeddedSignature => EmbeddedSignature::from_blob_bytes(data)?.cdhash(),
        CodeSigningMagic::CodeDirectory => CodeDirectoryBlob::from_blob_bytes(data)?.cdhash(),
        _ => Err(AppleCdhashError::BadMagic("code signature blob")),
    }
}

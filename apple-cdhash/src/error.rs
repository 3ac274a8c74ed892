// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {crate::embedded_signature::DigestType, thiserror::Error};

/// Coarse classification of why a cdhash could not be computed.
///
/// None of this is surfaced through [crate::compute_cdhash], which only
/// reports success or failure.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FailureCategory {
    /// Input is not a recognized 64-bit Mach-O.
    FormatMismatch,
    /// A size, offset, count, or magic check failed.
    Structural,
    /// The selected code directory uses a hash type we cannot digest.
    UnsupportedScheme,
    /// No code signature or no usable code directory.
    NotFound,
    /// Failure outside of parsing (I/O, command line arguments).
    Environment,
}

/// Unified error type for cdhash computation.
#[derive(Debug, Error)]
pub enum AppleCdhashError {
    #[error("unknown command")]
    CliUnknownCommand,

    #[error("bad argument")]
    CliBadArgument,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("data is not a recognized 64-bit Mach-O binary")]
    UnrecognizedFormat,

    #[error("malformed Mach-O header: {0}")]
    MalformedHeader(&'static str),

    #[error("binary does not have code signature data")]
    BinaryNoCodeSignature,

    #[error("code signature data is outside the bounds of the binary")]
    SignatureOutOfBounds,

    #[error("bad header magic in {0}")]
    BadMagic(&'static str),

    #[error("blob data is malformed: {0}")]
    BlobMalformed(&'static str),

    #[error("SuperBlob data is malformed: {0}")]
    SuperblobMalformed(&'static str),

    #[error("code directory is malformed: {0}")]
    CodeDirectoryMalformed(&'static str),

    #[error("no usable code directory in signature data")]
    CodeDirectoryNotFound,

    #[error("unsupported code directory hash type: {0}")]
    UnsupportedHashType(DigestType),

    #[error("data structure parse error: {0}")]
    Scroll(#[from] scroll::Error),
}

impl AppleCdhashError {
    /// Obtain the [FailureCategory] this error belongs to.
    pub fn category(&self) -> FailureCategory {
        match self {
            Self::UnrecognizedFormat => FailureCategory::FormatMismatch,
            Self::MalformedHeader(_)
            | Self::SignatureOutOfBounds
            | Self::BadMagic(_)
            | Self::BlobMalformed(_)
            | Self::SuperblobMalformed(_)
            | Self::CodeDirectoryMalformed(_)
            | Self::Scroll(_) => FailureCategory::Structural,
            Self::UnsupportedHashType(_) => FailureCategory::UnsupportedScheme,
            Self::BinaryNoCodeSignature | Self::CodeDirectoryNotFound => FailureCategory::NotFound,
            Self::CliUnknownCommand | Self::CliBadArgument | Self::Io(_) => {
                FailureCategory::Environment
            }
        }
    }
}

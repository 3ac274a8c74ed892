// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Code directory hashes (cdhash) of Apple Mach-O binaries.
//!
//! A signed Mach-O binary carries its code signature in the `__LINKEDIT`
//! segment, pointed at by an `LC_CODE_SIGNATURE` load command. The signature
//! is a *SuperBlob* containing one or more *code directories* along with
//! requirements, entitlements, and a CMS signature. The digest of the code
//! directory the kernel would select is the *cdhash*: the 20 byte identity
//! of the binary used by the kernel and by trust caches.
//!
//! This crate computes that value from untrusted bytes without loading,
//! mapping, or verifying anything. Every size, offset, and count read from
//! the input is checked against the data actually available before it is
//! used.
//!
//! # Selecting a Code Directory
//!
//! Binaries may carry a primary code directory plus up to five alternates.
//! Each is ranked by its hash type: SHA-1 < SHA-256 truncated < SHA-256 <
//! SHA-384. The highest ranked code directory wins, with ties going to the
//! first one encountered. Code directories with any other hash type are
//! never selected.
//!
//! Only SHA-1 and SHA-256 code directories can be digested. If the winning
//! code directory uses another hash type, computation fails rather than
//! falling back to a lower ranked one.
//!
//! # Getting Started
//!
//! [compute_cdhash] takes the full bytes of a binary and writes the cdhash
//! into a caller-provided buffer, reporting only success or failure.
//! [try_compute_cdhash] does the same but returns an [AppleCdhashError]
//! describing the failure.
//!
//! Lower-level access is available through [MachOImage], [EmbeddedSignature],
//! and [CodeDirectoryBlob].
//!
//! Only thin 64-bit little-endian Mach-O binaries are supported. Universal
//! (fat) binaries must be split by the caller.

mod cdhash;
pub use cdhash::*;
mod code_directory;
pub use code_directory::*;
mod code_hash;
pub use code_hash::*;
pub mod embedded_signature;
pub use embedded_signature::*;
mod error;
pub use error::*;
mod macho;
pub use macho::*;

#[cfg(test)]
mod testutil;

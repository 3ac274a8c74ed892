// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Top-level cdhash computation for Mach-O binaries.

use {
    crate::{
        code_hash::{CdHash, CS_CDHASH_LEN},
        error::AppleCdhashError,
        macho::MachOImage,
    },
    log::debug,
};

/// Compute the cdhash of a 64-bit Mach-O binary.
///
/// This resolves the `LC_CODE_SIGNATURE` data, selects the code directory
/// the kernel would prefer, and digests it.
pub fn try_compute_cdhash(data: &[u8]) -> Result<CdHash, AppleCdhashError> {
    MachOImage::parse(data)?.cdhash()
}

/// Compute the cdhash of a 64-bit Mach-O binary into a caller-provided buffer.
///
/// Returns whether the cdhash was computed. `cdhash` is only written on
/// success. Use [try_compute_cdhash] to learn why computation failed.
pub fn compute_cdhash(file: &[u8], cdhash: &mut [u8; CS_CDHASH_LEN]) -> bool {
    match try_compute_cdhash(file) {
        Ok(value) => {
            cdhash.copy_from_slice(value.as_bytes());
            true
        }
        Err(e) => {
            debug!("unable to compute cdhash: {}", e);
            false
        }
    }
}

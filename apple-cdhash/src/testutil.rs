// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Builders for synthetic signature data and Mach-O binaries used by tests.

use {
    crate::embedded_signature::{create_superblob, CodeSigningMagic, CodeSigningSlot, DigestType},
    goblin::mach::{
        header::{MH_MAGIC_64, SIZEOF_HEADER_64},
        load_command::LC_CODE_SIGNATURE,
    },
    scroll::IOwrite,
    std::io::Write,
};

pub const LC_UUID: u32 = goblin::mach::load_command::LC_UUID;

/// Offset where the signature data is placed by [macho_image].
pub const SIGNATURE_OFFSET: usize = 0x1000;

/// Size of the fixed fields of a version 0x20400 code directory.
const CODE_DIRECTORY_HEADER_SIZE: usize = 88;

fn hash_size(hash_type: DigestType) -> usize {
    match hash_type {
        DigestType::Sha1 | DigestType::Sha256Truncated => 20,
        DigestType::Sha384 => 48,
        DigestType::Sha512 => 64,
        _ => 32,
    }
}

/// Build a version 0x20400 code directory blob.
///
/// Code slot hashes are filler bytes; nothing verifies them.
pub fn code_directory_blob(hash_type: DigestType, ident: &str, n_code_slots: usize) -> Vec<u8> {
    let hash_size = hash_size(hash_type);
    let ident_offset = CODE_DIRECTORY_HEADER_SIZE;
    let hash_offset = ident_offset + ident.len() + 1;
    let length = hash_offset + hash_size * n_code_slots;

    let mut cursor = std::io::Cursor::new(Vec::<u8>::with_capacity(length));

    cursor
        .iowrite_with(u32::from(CodeSigningMagic::CodeDirectory), scroll::BE)
        .unwrap();
    cursor.iowrite_with(length as u32, scroll::BE).unwrap();
    // version
    cursor.iowrite_with(0x20400u32, scroll::BE).unwrap();
    // flags (adhoc)
    cursor.iowrite_with(0x2u32, scroll::BE).unwrap();
    cursor.iowrite_with(hash_offset as u32, scroll::BE).unwrap();
    cursor.iowrite_with(ident_offset as u32, scroll::BE).unwrap();
    // nSpecialSlots
    cursor.iowrite_with(0u32, scroll::BE).unwrap();
    cursor.iowrite_with(n_code_slots as u32, scroll::BE).unwrap();
    // codeLimit
    cursor.iowrite_with(0x1000u32, scroll::BE).unwrap();
    cursor.iowrite_with(hash_size as u8, scroll::BE).unwrap();
    cursor.iowrite_with(u8::from(hash_type), scroll::BE).unwrap();
    // platform
    cursor.iowrite_with(0u8, scroll::BE).unwrap();
    // pageSize (log2)
    cursor.iowrite_with(12u8, scroll::BE).unwrap();
    // spare2, scatterOffset, teamOffset, spare3
    for _ in 0..4 {
        cursor.iowrite_with(0u32, scroll::BE).unwrap();
    }
    // codeLimit64, execSegBase, execSegLimit, execSegFlags
    for _ in 0..4 {
        cursor.iowrite_with(0u64, scroll::BE).unwrap();
    }
    assert_eq!(cursor.position() as usize, CODE_DIRECTORY_HEADER_SIZE);

    cursor.write_all(ident.as_bytes()).unwrap();
    cursor.write_all(b"\0").unwrap();

    for i in 0..n_code_slots {
        cursor
            .write_all(&vec![(i + 1) as u8; hash_size])
            .unwrap();
    }

    let data = cursor.into_inner();
    assert_eq!(data.len(), length);

    data
}

/// Build a generic blob wrapper around a payload.
pub fn blob_wrapper(payload: &[u8]) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::<u8>::new());

    cursor
        .iowrite_with(u32::from(CodeSigningMagic::BlobWrapper), scroll::BE)
        .unwrap();
    cursor
        .iowrite_with((8 + payload.len()) as u32, scroll::BE)
        .unwrap();
    cursor.write_all(payload).unwrap();

    cursor.into_inner()
}

/// Build an embedded signature super blob holding blobs in the given order.
pub fn signature_superblob(blobs: &[(CodeSigningSlot, Vec<u8>)]) -> Vec<u8> {
    create_superblob(CodeSigningMagic::EmbeddedSignature, blobs.iter()).unwrap()
}

/// Build a 64-bit Mach-O with the given load commands.
///
/// Each command is a `(cmd, payload)` pair; `cmdsize` covers the 8 byte load
/// command header plus the payload. Data after the header is zero filled
/// through [SIGNATURE_OFFSET], after which `signature` is appended.
pub fn macho_image_with_commands(commands: &[(u32, Vec<u8>)], signature: &[u8]) -> Vec<u8> {
    let sizeofcmds = commands
        .iter()
        .map(|(_, payload)| 8 + payload.len())
        .sum::<usize>();

    let mut cursor = std::io::Cursor::new(Vec::<u8>::new());

    cursor.iowrite_with(MH_MAGIC_64, scroll::LE).unwrap();
    // CPU_TYPE_ARM64
    cursor.iowrite_with(0x0100_000cu32, scroll::LE).unwrap();
    // cpusubtype
    cursor.iowrite_with(0u32, scroll::LE).unwrap();
    // MH_EXECUTE
    cursor.iowrite_with(2u32, scroll::LE).unwrap();
    cursor
        .iowrite_with(commands.len() as u32, scroll::LE)
        .unwrap();
    cursor.iowrite_with(sizeofcmds as u32, scroll::LE).unwrap();
    // flags, reserved
    cursor.iowrite_with(0u32, scroll::LE).unwrap();
    cursor.iowrite_with(0u32, scroll::LE).unwrap();
    assert_eq!(cursor.position() as usize, SIZEOF_HEADER_64);

    for (cmd, payload) in commands {
        cursor.iowrite_with(*cmd, scroll::LE).unwrap();
        cursor
            .iowrite_with((8 + payload.len()) as u32, scroll::LE)
            .unwrap();
        cursor.write_all(payload).unwrap();
    }

    let mut data = cursor.into_inner();
    data.resize(SIGNATURE_OFFSET, 0);
    data.extend_from_slice(signature);

    data
}

/// Build a 64-bit Mach-O with an `LC_UUID` and, optionally, a code signature.
pub fn macho_image(signature: Option<&[u8]>) -> Vec<u8> {
    let mut commands = vec![(LC_UUID, vec![0x42; 16])];

    if let Some(signature) = signature {
        let mut payload = Vec::with_capacity(8);
        payload.extend_from_slice(&(SIGNATURE_OFFSET as u32).to_le_bytes());
        payload.extend_from_slice(&(signature.len() as u32).to_le_bytes());

        commands.push((LC_CODE_SIGNATURE, payload));
    }

    macho_image_with_commands(&commands, signature.unwrap_or(&[]))
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Mach-O primitives related to code signing

Code signing data is embedded within the named `__LINKEDIT` segment of
the Mach-O binary. An `LC_CODE_SIGNATURE` load command in the Mach-O header
will point you at this data. See [MachOImage::code_signature_data] for
this logic.

Only thin 64-bit little-endian Mach-O images are recognized. The header
and load command table are walked directly over the input slice; nothing
is trusted until it has been checked against the slice bounds.
*/

use {
    crate::{code_hash::CdHash, embedded_signature::cdhash_from_blob, error::AppleCdhashError},
    goblin::mach::{
        header::{Header64, MH_MAGIC_64, SIZEOF_HEADER_64},
        load_command::{
            LinkeditDataCommand, LoadCommandHeader, LC_CODE_SIGNATURE,
            SIZEOF_LINKEDIT_DATA_COMMAND, SIZEOF_LOAD_COMMAND,
        },
    },
    scroll::Pread,
};

/// Files smaller than this are never considered Mach-O binaries.
pub const MACHO_MIN_SIZE: usize = 0x1000;

/// Load commands must be smaller than this.
pub const MAX_LOAD_COMMAND_SIZE: u32 = 0x8000_0000;

/// Whether data looks like a 64-bit Mach-O binary.
///
/// This is a cheap check of the size and header magic. It does not validate
/// anything else.
pub fn macho_identify(data: &[u8]) -> bool {
    data.len() >= MACHO_MIN_SIZE && matches!(data.pread_with::<u32>(0, scroll::LE), Ok(MH_MAGIC_64))
}

/// A single load command in the load command table.
#[derive(Clone, Copy, Debug)]
pub struct LoadCommand<'a> {
    /// Offset of the load command within the binary.
    pub offset: usize,

    /// The `LC_*` type of the load command.
    pub cmd: u32,

    /// Size of the load command, header included.
    pub cmdsize: u32,

    /// Raw data of the load command, header included.
    pub data: &'a [u8],
}

/// Iterator over load commands in a Mach-O binary.
///
/// Each load command is checked against the bounds of the load command
/// table. Iteration stops after the first error.
pub struct LoadCommands<'a> {
    /// The load command table.
    table: &'a [u8],

    /// Offset of `table` within the binary.
    table_offset: usize,

    /// Offset of the next load command within `table`.
    position: usize,
}

impl<'a> LoadCommands<'a> {
    fn read_next(&self) -> Result<LoadCommand<'a>, AppleCdhashError> {
        let header = self
            .table
            .pread_with::<LoadCommandHeader>(self.position, scroll::LE)
            .map_err(|_| AppleCdhashError::MalformedHeader("truncated load command"))?;

        if header.cmdsize >= MAX_LOAD_COMMAND_SIZE {
            return Err(AppleCdhashError::MalformedHeader("load command too large"));
        }
        if (header.cmdsize as usize) < SIZEOF_LOAD_COMMAND {
            return Err(AppleCdhashError::MalformedHeader("load command too small"));
        }

        let end = self.position + header.cmdsize as usize;
        let data = self
            .table
            .get(self.position..end)
            .ok_or(AppleCdhashError::MalformedHeader(
                "load command exceeds load command table",
            ))?;

        Ok(LoadCommand {
            offset: self.table_offset + self.position,
            cmd: header.cmd,
            cmdsize: header.cmdsize,
            data,
        })
    }
}

impl<'a> Iterator for LoadCommands<'a> {
    type Item = Result<LoadCommand<'a>, AppleCdhashError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.table.len() {
            return None;
        }

        match self.read_next() {
            Ok(command) => {
                self.position += command.cmdsize as usize;
                Some(Ok(command))
            }
            Err(e) => {
                self.position = self.table.len();
                Some(Err(e))
            }
        }
    }
}

/// A validated 64-bit Mach-O binary.
pub struct MachOImage<'a> {
    data: &'a [u8],
    header: Header64,
}

impl<'a> std::fmt::Debug for MachOImage<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MachOImage")
            .field("size", &self.data.len())
            .field("ncmds", &self.header.ncmds)
            .field("sizeofcmds", &self.header.sizeofcmds)
            .finish()
    }
}

impl<'a> MachOImage<'a> {
    /// Identify and validate a Mach-O binary.
    ///
    /// This does NOT validate anything beyond the header and the load command
    /// table. It is not enough to be sure the Mach-O is safe to load.
    pub fn parse(data: &'a [u8]) -> Result<Self, AppleCdhashError> {
        if !macho_identify(data) {
            return Err(AppleCdhashError::UnrecognizedFormat);
        }

        let header = data
            .pread_with::<Header64>(0, scroll::LE)
            .map_err(|_| AppleCdhashError::MalformedHeader("truncated header"))?;

        if header.sizeofcmds as usize > data.len() {
            return Err(AppleCdhashError::MalformedHeader(
                "load commands larger than file",
            ));
        }

        let image = Self { data, header };

        // Walk every load command so each is bounds checked up front.
        for command in image.load_commands()? {
            command?;
        }

        Ok(image)
    }

    pub fn header(&self) -> &Header64 {
        &self.header
    }

    /// The raw data of the binary.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Obtain an iterator over load commands.
    ///
    /// `ncmds` from the header is not consulted: the table is walked until
    /// `sizeofcmds` bytes are consumed.
    pub fn load_commands(&self) -> Result<LoadCommands<'a>, AppleCdhashError> {
        let table_end = SIZEOF_HEADER_64 + self.header.sizeofcmds as usize;

        let table = self
            .data
            .get(SIZEOF_HEADER_64..table_end)
            .ok_or(AppleCdhashError::MalformedHeader(
                "load command table exceeds file",
            ))?;

        Ok(LoadCommands {
            table,
            table_offset: SIZEOF_HEADER_64,
            position: 0,
        })
    }

    /// Find the first load command of a given type.
    pub fn find_load_command(&self, cmd: u32) -> Result<Option<LoadCommand<'a>>, AppleCdhashError> {
        for command in self.load_commands()? {
            let command = command?;

            if command.cmd == cmd {
                return Ok(Some(command));
            }
        }

        Ok(None)
    }

    /// Resolve the load command for the code signature.
    pub fn code_signature_load_command(
        &self,
    ) -> Result<Option<LinkeditDataCommand>, AppleCdhashError> {
        if let Some(command) = self.find_load_command(LC_CODE_SIGNATURE)? {
            if command.data.len() < SIZEOF_LINKEDIT_DATA_COMMAND {
                return Err(AppleCdhashError::MalformedHeader(
                    "code signature load command too small",
                ));
            }

            Ok(Some(
                command
                    .data
                    .pread_with::<LinkeditDataCommand>(0, scroll::LE)?,
            ))
        } else {
            Ok(None)
        }
    }

    /// Obtain the raw code signature data referenced by `LC_CODE_SIGNATURE`.
    ///
    /// The referenced range must be non-empty, must not start at the
    /// beginning of the file, and must end within the file.
    pub fn code_signature_data(&self) -> Result<&'a [u8], AppleCdhashError> {
        let command = self
            .code_signature_load_command()?
            .ok_or(AppleCdhashError::BinaryNoCodeSignature)?;

        let start = command.dataoff as usize;
        let end = start
            .checked_add(command.datasize as usize)
            .ok_or(AppleCdhashError::SignatureOutOfBounds)?;

        if !(0 < start && start < end && end <= self.data.len()) {
            return Err(AppleCdhashError::SignatureOutOfBounds);
        }

        self.data
            .get(start..end)
            .ok_or(AppleCdhashError::SignatureOutOfBounds)
    }

    /// Compute the cdhash of this binary.
    pub fn cdhash(&self) -> Result<CdHash, AppleCdhashError> {
        cdhash_from_blob(self.code_signature_data()?)
    }
}

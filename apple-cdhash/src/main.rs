// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    apple_cdhash::{
        try_compute_cdhash, AppleCdhashError, Blob, CodeDirectoryBlob, CodeSigningMagic,
        EmbeddedSignature, MachOImage,
    },
    clap::{Arg, ArgMatches, Command},
    log::LevelFilter,
    scroll::Pread,
};

const COMPUTE_CDHASH_ABOUT: &str = "\
Compute the code directory hash (cdhash) of Mach-O binaries.

The cdhash is the digest of the code directory the operating system
selects from the embedded code signature. It is the identity of the
binary as far as the kernel and trust caches are concerned.

Each path must be a thin 64-bit Mach-O binary. When multiple paths are
given, each output line contains the cdhash followed by the path.
";

const PRINT_CODE_DIRECTORIES_ABOUT: &str = "\
Print information about code directories in a Mach-O binary.

Every code directory in the embedded signature is printed along with its
hash type and rank. The cdhash is printed for code directories whose hash
type can be digested. The slot of the code directory that would be
selected is printed last.
";

fn command_compute_cdhash(args: &ArgMatches) -> Result<(), AppleCdhashError> {
    let paths = args
        .values_of("path")
        .ok_or(AppleCdhashError::CliBadArgument)?
        .collect::<Vec<_>>();

    for path in &paths {
        let data = std::fs::read(path)?;
        let cdhash = try_compute_cdhash(&data)?;

        if paths.len() > 1 {
            println!("{}  {}", cdhash, path);
        } else {
            println!("{}", cdhash);
        }
    }

    Ok(())
}

fn print_code_directory(cd: &CodeDirectoryBlob) {
    println!("  length: {}", cd.length());
    println!("  version: {:#x}", cd.version());
    println!("  hash type: {}", cd.hash_type());
    println!("  rank: {}", cd.rank());
    match cd.cdhash() {
        Ok(cdhash) => println!("  cdhash: {}", cdhash),
        Err(e) => println!("  cdhash: ({})", e),
    }
}

fn command_print_code_directories(args: &ArgMatches) -> Result<(), AppleCdhashError> {
    let path = args
        .value_of("path")
        .ok_or(AppleCdhashError::CliBadArgument)?;

    let data = std::fs::read(path)?;
    let macho = MachOImage::parse(&data)?;
    let signature_data = macho.code_signature_data()?;

    let magic = signature_data.pread_with::<u32>(0, scroll::BE)?;

    match CodeSigningMagic::from(magic) {
        CodeSigningMagic::EmbeddedSignature => {
            let signature = EmbeddedSignature::from_bytes(signature_data)?;

            for candidate in signature.code_directories()? {
                println!("index {}", candidate.entry.index);
                println!("  slot: {:?}", candidate.entry.slot);
                println!("  offset: {}", candidate.entry.offset);
                print_code_directory(&candidate.code_directory);
            }

            match signature.select_best_code_directory() {
                Ok(best) => println!("selected: {:?}", best.entry.slot),
                Err(e) => println!("selected: ({})", e),
            }
        }
        CodeSigningMagic::CodeDirectory => {
            let cd = CodeDirectoryBlob::from_blob_bytes(signature_data)?;

            println!("bare code directory");
            print_code_directory(&cd);
        }
        _ => {
            return Err(AppleCdhashError::BadMagic("code signature blob"));
        }
    }

    Ok(())
}

fn main_impl() -> Result<(), AppleCdhashError> {
    let app = Command::new("Apple code directory hashes in pure Rust")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Gregory Szorc <gregory.szorc@gmail.com>")
        .about("Compute the cdhash of signed Apple Mach-O binaries")
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .multiple_occurrences(true)
                .help("Increase logging verbosity. Can be specified multiple times."),
        );

    let app = app.subcommand(
        Command::new("compute-cdhash")
            .about("Compute the cdhash of Mach-O binaries")
            .long_about(COMPUTE_CDHASH_ABOUT)
            .arg(
                Arg::new("path")
                    .required(true)
                    .multiple_values(true)
                    .help("path to Mach-O binary to examine"),
            ),
    );

    let app = app.subcommand(
        Command::new("print-code-directories")
            .about("Print information about code directories in a Mach-O binary")
            .long_about(PRINT_CODE_DIRECTORIES_ABOUT)
            .arg(
                Arg::new("path")
                    .required(true)
                    .help("path to Mach-O binary to examine"),
            ),
    );

    let matches = app.get_matches();

    let log_level = match matches.occurrences_of("verbose") {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_level.as_str()),
    );

    // Disable log context except at higher log levels.
    if log_level <= LevelFilter::Info {
        builder
            .format_timestamp(None)
            .format_level(false)
            .format_target(false);
    }

    builder.init();

    match matches.subcommand() {
        Some(("compute-cdhash", args)) => command_compute_cdhash(args),
        Some(("print-code-directories", args)) => command_print_code_directories(args),
        _ => Err(AppleCdhashError::CliUnknownCommand),
    }
}

fn main() {
    let exit_code = match main_impl() {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("Error: {}", err);
            1
        }
    };

    std::process::exit(exit_code)
}

// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Host front end for NuWriter pack files.
//!
//! Works on image files standing in for the boot device, so packs can be
//! checked and laid out before they reach a board.
//!
//! ```bash
//! nuwriter verify firmware.pack
//! nuwriter program firmware.pack sd.img --size 16777216
//! nuwriter program firmware.pack nand.img --device nand --bad-block 3
//! nuwriter readback nand.img dump.bin --device nand
//! nuwriter info sd.img --source sd0
//! ```

mod device;
mod error;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use nuwriter::boot_info::{BootInfo, ImageType};
use nuwriter::header::{self, BootSource};
use nuwriter::pack::PackFile;
use nuwriter::program::{self, ProgressClient};

use device::{FileSink, Image, MemBlock, MemNand};
use error::ToolError;

#[derive(Parser, Debug)]
#[command(name = "nuwriter", version)]
#[command(about = "Verify NuWriter packs and lay them out on device images")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check a pack file and list its images
    Verify {
        pack: PathBuf,
    },

    /// Program a pack into a device image
    Program {
        pack: PathBuf,
        image: PathBuf,
        #[command(flatten)]
        device: DeviceArgs,
    },

    /// Copy a device image out, skipping bad NAND blocks
    Readback {
        image: PathBuf,
        output: PathBuf,
        #[command(flatten)]
        device: DeviceArgs,
    },

    /// Show the boot headers of a device image
    Info {
        image: PathBuf,
        /// Boot source the image stands in for
        #[arg(long, value_enum, default_value_t = Source::Sd0)]
        source: Source,
        #[command(flatten)]
        device: DeviceArgs,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum DeviceKind {
    /// SD, eMMC or SPI NOR
    Block,
    /// SPI NAND or raw NAND
    Nand,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Source {
    QspiNor,
    QspiNand,
    Sd0,
    Sd1,
    Nand,
    Usbd,
}

impl From<Source> for BootSource {
    fn from(source: Source) -> BootSource {
        match source {
            Source::QspiNor => BootSource::QspiNor,
            Source::QspiNand => BootSource::QspiNand,
            Source::Sd0 => BootSource::SdEmmc0,
            Source::Sd1 => BootSource::SdEmmc1,
            Source::Nand => BootSource::RawNand,
            Source::Usbd => BootSource::Usbd,
        }
    }
}

#[derive(Args, Debug)]
struct DeviceArgs {
    #[arg(long, value_enum, default_value_t = DeviceKind::Block)]
    device: DeviceKind,

    #[arg(long, default_value_t = 512)]
    sector_size: usize,

    #[arg(long, default_value_t = 2048)]
    page_size: usize,

    #[arg(long, default_value_t = 64)]
    pages_per_block: usize,

    /// Device size in bytes. Defaults to the size of the image file
    #[arg(long)]
    size: Option<usize>,

    /// NAND block to treat as bad, may be repeated
    #[arg(long = "bad-block")]
    bad_blocks: Vec<usize>,
}

impl DeviceArgs {
    /// Load `path` as a device. A missing file or a file shorter than
    /// `--size` reads as erased flash.
    fn open(&self, path: &Path) -> Result<Image, ToolError> {
        let mut data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && self.size.is_some() => {
                Vec::new()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ToolError::UnknownSize(path.to_path_buf()))
            }
            Err(e) => return Err(ToolError::io(path)(e)),
        };
        if let Some(size) = self.size {
            data.resize(size, 0xFF);
        }

        match self.device {
            DeviceKind::Block => Ok(Image::Block(MemBlock::new(self.sector_size, data)?)),
            DeviceKind::Nand => Ok(Image::Nand(MemNand::new(
                self.page_size,
                self.pages_per_block,
                self.bad_blocks.clone(),
                data,
            )?)),
        }
    }
}

/// Prints progress as the library reports it.
struct Console;

impl ProgressClient for Console {
    fn progress(&self, index: usize, percent: u8) {
        println!("  image {}: {:>3}%", index, percent);
    }

    fn bad_block(&self, block: usize) {
        println!("  {} skipping bad block {}", "warning:".yellow().bold(), block);
    }
}

fn read_pack(path: &Path) -> Result<Vec<u8>, ToolError> {
    std::fs::read(path).map_err(ToolError::io(path))
}

fn print_boot_info(info: &BootInfo) {
    println!(
        "    version {} entry {:#010x} length {}",
        info.version, info.entry_point, info.length
    );
    for (i, image) in info.listed_images().iter().enumerate() {
        let kind = match image.kind() {
            Ok(Some(kind)) => kind.name(),
            Ok(None) => "unused",
            Err(_) => "invalid",
        };
        println!(
            "    image {}: {:<14} offset {:#010x} load {:#010x} size {}",
            i, kind, image.offset, image.load_address, image.size
        );
    }
}

fn verify(path: &Path) -> Result<(), ToolError> {
    let bytes = read_pack(path)?;
    let pack = PackFile::verify(&bytes)?;
    println!(
        "{} {} images, {} bytes",
        "valid pack:".green().bold(),
        pack.image_count(),
        bytes.len()
    );
    for child in pack.children() {
        let kind = ImageType::from_raw(child.image_type)
            .ok()
            .flatten()
            .map_or("raw", |kind| kind.name());
        println!(
            "  image {}: {:<14} at {:#010x}, {} bytes (file offset {:#x})",
            child.index,
            kind,
            child.flash_address,
            child.len(),
            child.offset
        );
    }
    match pack.boot_info() {
        Ok(info) => {
            println!("  boot info in image 0:");
            print_boot_info(&info);
        }
        Err(e) => println!(
            "  {} image 0 has no valid boot info: {}",
            "warning:".yellow().bold(),
            e
        ),
    }
    Ok(())
}

fn program(pack_path: &Path, image_path: &Path, args: &DeviceArgs) -> Result<(), ToolError> {
    let bytes = read_pack(pack_path)?;
    let pack = PackFile::verify(&bytes)?;
    let image = args.open(image_path)?;
    let storage = image.storage();
    let mut scratch = vec![0; storage.unit_size()];

    println!(
        "Programming {} images into {} ({} bytes)",
        pack.image_count(),
        image_path.display(),
        storage.capacity()
    );
    program::program(&pack, storage, &mut scratch, &Console)?;
    image.save(image_path)?;
    println!("{}", "done".green().bold());
    Ok(())
}

fn readback(image_path: &Path, output: &Path, args: &DeviceArgs) -> Result<(), ToolError> {
    let image = args.open(image_path)?;
    let storage = image.storage();
    let mut scratch = vec![0; storage.unit_size()];
    let mut sink = FileSink::create(output)?;

    let copied = program::readback(storage, &mut scratch, &mut sink, &Console)?;
    sink.finish(output)?;
    println!("Read back {} bytes into {}", copied, output.display());
    Ok(())
}

fn info(image_path: &Path, source: Source, args: &DeviceArgs) -> Result<(), ToolError> {
    let image = args.open(image_path)?;
    let storage = image.storage();
    let mut scratch = vec![0; storage.unit_size()];
    let source = BootSource::from(source);

    for (copy, name) in header::read_headers(source, storage, &mut scratch)?
        .iter()
        .zip(["header 0", "header 1"])
    {
        match &copy.info {
            Ok(info) => {
                println!("{} (unit {}): {}", name, copy.slot, "valid".green());
                print_boot_info(info);
            }
            Err(e) => println!("{} (unit {}): {}", name, copy.slot, e.to_string().red()),
        }
    }

    let selected = header::read_boot_info(source, storage, &mut scratch)?;
    println!(
        "boots version {}, image 0 at {:#x}",
        selected.version,
        selected.image0_offset()
    );
    Ok(())
}

fn run(cli: Cli) -> Result<(), ToolError> {
    match cli.command {
        Command::Verify { pack } => verify(&pack),
        Command::Program {
            pack,
            image,
            device,
        } => program(&pack, &image, &device),
        Command::Readback {
            image,
            output,
            device,
        } => readback(&image, &output, &device),
        Command::Info {
            image,
            source,
            device,
        } => info(&image, source, &device),
    }
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use nuwriter::pack::{self, PackImage};
    use nuwriter::storage::Storage;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_repeated_bad_blocks() {
        let cli = Cli::parse_from([
            "nuwriter",
            "readback",
            "nand.img",
            "out.bin",
            "--device",
            "nand",
            "--bad-block",
            "3",
            "--bad-block",
            "9",
        ]);
        match cli.command {
            Command::Readback { device, .. } => {
                assert_eq!(device.device, DeviceKind::Nand);
                assert_eq!(device.bad_blocks, vec![3, 9]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn programs_into_memory_image() {
        let data = vec![0x5a; 700];
        let images = [PackImage {
            flash_address: 0x400,
            image_type: 4,
            data: &data,
        }];
        let mut bytes = vec![0; pack::packed_len(&images)];
        pack::encode(&images, &mut bytes).unwrap();
        let pack = PackFile::verify(&bytes).unwrap();

        let image = Image::Block(MemBlock::new(512, vec![0; 4096]).unwrap());
        let mut scratch = vec![0; 512];
        program::program(&pack, image.storage(), &mut scratch, &Console).unwrap();

        let out = image.into_bytes();
        assert!(out[..0x400].iter().all(|&b| b == 0));
        assert!(out[0x400..0x400 + 700].iter().all(|&b| b == 0x5a));
        assert!(out[0x400 + 700..0x800].iter().all(|&b| b == 0xFF));
        assert!(out[0x800..].iter().all(|&b| b == 0));
    }

    #[test]
    fn rejects_odd_geometry() {
        assert!(matches!(
            MemNand::new(2048, 64, Vec::new(), vec![0; 1000]),
            Err(ToolError::Geometry { size: 1000, .. })
        ));
        let image = Image::Nand(MemNand::new(64, 4, vec![1], vec![0; 1024]).unwrap());
        assert!(matches!(image.storage(), Storage::Nand(_)));
    }
}

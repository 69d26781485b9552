use anyhow::{ensure, Context, Result};
use clap::Parser;
use clap_num::maybe_hex;
use log::{debug, info};
use ntfsrd_core::{open_source, ByteSource, OffsetSource};
use ntfsrd_recovery::{
    infer_geometry, BootBracket, DirectorySink, GeometryReport, ScanEvidence, ScanOptions,
    Scanner,
};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "ntfsrd")]
#[command(about = "Find NTFS metadata on a damaged disk and recover files by name", long_about = None)]
struct Cli {
    /// Device or disk image to scan
    device: PathBuf,

    /// Names of files to extract
    files: Vec<String>,

    /// Dump every record found
    #[arg(short, long)]
    verbose: bool,

    /// Directory extracted files are written to
    #[arg(short = 'd', long = "savedir", default_value = "./")]
    save_dir: PathBuf,

    /// Volume start offset
    #[arg(short = 'o', long = "offset", value_parser = maybe_hex::<u64>)]
    disk_start: Option<u64>,

    /// Volume length, defaults to the rest of the device
    #[arg(short = 'l', long = "length", value_parser = maybe_hex::<u64>)]
    disk_size: Option<u64>,

    /// Cluster size in bytes
    #[arg(short = 'c', long = "clustersize", value_parser = maybe_hex::<u32>)]
    cluster_size: Option<u32>,

    /// Examine only the record at this offset (with -a: start scanning here)
    #[arg(short = 'f', long = "fileoffset", value_parser = maybe_hex::<u64>)]
    file_offset: Option<u64>,

    /// Scan everything from the -f offset on
    #[arg(short = 'a', long = "all")]
    scan_all: bool,

    /// Known offset of an $MFT entry
    #[arg(short = 'm', long = "mftoffset", value_parser = maybe_hex::<u64>)]
    mft_offset: Option<u64>,

    /// Known boot sector offset (repeatable)
    #[arg(short = 'b', long = "bootoffset", value_parser = maybe_hex::<u64>)]
    boot_offsets: Vec<u64>,

    /// Write a JSON report of the scan to this file
    #[arg(long)]
    report: Option<PathBuf>,
}

impl Cli {
    fn scan_options(&self) -> ScanOptions {
        let options = ScanOptions {
            cluster_size: self.cluster_size,
            requested_names: self.files.iter().cloned().collect(),
            verbose: self.verbose,
            seed_mft_offset: self.mft_offset,
            seed_boot_offsets: self.boot_offsets.clone(),
            ..ScanOptions::default()
        };
        match self.file_offset {
            Some(offset) if self.scan_all => ScanOptions {
                start_offset: offset,
                ..options
            },
            Some(offset) => options.single_record(offset),
            None => options,
        }
    }
}

#[derive(Serialize)]
struct Report<'a> {
    device: &'a Path,
    disk_start: u64,
    options: &'a ScanOptions,
    evidence: &'a ScanEvidence,
    geometry: Option<&'a GeometryReport>,
    error: Option<String>,
}

fn open_volume(cli: &Cli) -> Result<Box<dyn ByteSource>> {
    let source = open_source(&cli.device)
        .with_context(|| format!("Failed to open {}", cli.device.display()))?;
    if cli.disk_start.is_none() && cli.disk_size.is_none() {
        return Ok(source);
    }

    let start = cli.disk_start.unwrap_or(0);
    let length = cli
        .disk_size
        .unwrap_or_else(|| source.size().saturating_sub(start));
    debug!("volume window {:#x}+{:#x}", start, length);
    let window = OffsetSource::new(source, start, length).context("Invalid volume window")?;
    Ok(Box::new(window))
}

fn print_geometry(report: &GeometryReport) {
    match &report.bracket {
        BootBracket::Bracketed {
            first_boot,
            second_boot,
            size_mismatch,
        } => {
            println!("volume: {:#x} .. {:#x}", first_boot, second_boot);
            if let Some(span) = size_mismatch {
                println!("boot sectors {:#x} apart, not matching the sector count", span);
            }
        }
        BootBracket::Underdetermined { reason } => println!("no volume bounds: {}", reason),
    }
    for candidate in &report.candidates {
        println!(
            "possible diskstart: {:#x}  clus={:#x}",
            candidate.disk_start, candidate.cluster_size
        );
    }
}

fn write_report(path: &Path, report: &Report) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create report {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), report)?;
    info!("report written to {}", path.display());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    if !cli.files.is_empty() {
        ensure!(
            cli.save_dir.is_dir(),
            "Save directory {} does not exist",
            cli.save_dir.display()
        );
    }

    let source = open_volume(&cli)?;
    let options = cli.scan_options();
    let mut scanner =
        Scanner::new(source, options).with_sinks(Box::new(DirectorySink::new(&cli.save_dir)));
    scanner.run()?;

    let evidence = scanner.evidence();
    println!("{}", evidence);

    let geometry = infer_geometry(evidence);
    if let Ok(report) = &geometry {
        print_geometry(report);
    }

    if let Some(path) = &cli.report {
        let report = Report {
            device: &cli.device,
            disk_start: cli.disk_start.unwrap_or(0),
            options: scanner.options(),
            evidence,
            geometry: geometry.as_ref().ok(),
            error: geometry.as_ref().err().map(|e| e.to_string()),
        };
        write_report(path, &report)?;
    }

    geometry?;
    Ok(())
}

//! Thin demo CLI: drives the session/parser core over a scripted
//! [`FixtureChannel`] instead of a real serial port (`ByteChannel` is the
//! only transport collaborator the core consumes — wiring up an actual
//! FTDI/BLE adapter is out of scope here). Subcommand shape follows a
//! standard `clap`-derive CLI.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use divecomputer_core::channel::FixtureChannel;
use divecomputer_core::context::Context;
use divecomputer_core::dispatch::{self, FamilyTag};
use divecomputer_core::event::RecordingSink;
use divecomputer_core::firmware;
use divecomputer_core::parser::{Field, FieldValue, Parser as _};
use divecomputer_core::sample::Sample;

#[derive(Parser)]
#[command(name = "dc-cli")]
#[command(about = "Download and decode dive logs from a scripted transport")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Family {
    HwOstcFrog,
    SuuntoD9,
    SuuntoD9tx,
    SuuntoDx,
    UwatecAladin,
    ZeagleN2ition3,
}

impl From<Family> for FamilyTag {
    fn from(f: Family) -> Self {
        match f {
            Family::HwOstcFrog => FamilyTag::HwOstcFrog,
            Family::SuuntoD9 => FamilyTag::SuuntoD9,
            Family::SuuntoD9tx => FamilyTag::SuuntoD9tx,
            Family::SuuntoDx => FamilyTag::SuuntoDx,
            Family::UwatecAladin => FamilyTag::UwatecAladin,
            Family::ZeagleN2ition3 => FamilyTag::ZeagleN2ition3,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Download dives from a scripted reply fixture and emit them as JSON.
    Download {
        /// Device family to drive.
        #[arg(long, value_enum)]
        family: Family,

        /// Path to a file of raw bytes the device would have replied with.
        #[arg(long)]
        fixture: PathBuf,

        /// Output JSON path.
        #[arg(short, long, default_value = "dives.json")]
        output: PathBuf,
    },

    /// Decrypt and verify an OSTC3 firmware hex-record image.
    FirmwareVerify {
        /// Path to the vendor hex-record firmware file.
        #[arg(long)]
        image: PathBuf,
    },
}

#[derive(Serialize)]
struct DiveSummary {
    dive_time_s: Option<u32>,
    max_depth_m: Option<f64>,
    sample_count: usize,
    fingerprint: Vec<u8>,
}

fn summarize(blob: divecomputer_core::sample::DiveBlob, tag: FamilyTag) -> Result<DiveSummary> {
    let fingerprint = blob.fingerprint().to_vec();
    let mut parser = dispatch::open_parser(tag, 0, 2026)?;
    parser.set_data(blob.bytes)?;

    let dive_time_s = parser.get_field(Field::DiveTime).ok().and_then(|v| match v {
        FieldValue::Seconds(s) => Some(s),
        _ => None,
    });
    let max_depth_m = parser.get_field(Field::MaxDepth).ok().and_then(|v| match v {
        FieldValue::Depth(d) => Some(d),
        _ => None,
    });

    let mut sample_count = 0;
    parser.samples_foreach(&mut |s: Sample<'_>| {
        sample_count += 1;
        let _ = s;
        true
    })?;

    Ok(DiveSummary {
        dive_time_s,
        max_depth_m,
        sample_count,
        fingerprint,
    })
}

fn run_download(family: Family, fixture: PathBuf, output: PathBuf) -> Result<()> {
    let tag: FamilyTag = family.into();
    let reply_bytes = fs::read(&fixture).with_context(|| format!("reading fixture {fixture:?}"))?;

    let mut channel = FixtureChannel::new();
    channel.push_reply(&reply_bytes);

    let mut session = dispatch::open_session(tag, channel, Context::new())
        .with_context(|| "opening session for the requested family")?;

    let mut sink = RecordingSink::default();
    let mut summaries = Vec::new();
    let mut err = None;
    session.foreach(&mut sink, &mut |blob| {
        match summarize(blob, tag) {
            Ok(summary) => summaries.push(summary),
            Err(e) => {
                err = Some(e);
                return false;
            }
        }
        true
    })?;
    if let Some(e) = err {
        return Err(e);
    }

    let json = serde_json::to_string_pretty(&summaries)?;
    fs::write(&output, json).with_context(|| format!("writing {output:?}"))?;
    println!("wrote {} dive(s) to {}", summaries.len(), output.display());
    Ok(())
}

fn run_firmware_verify(image: PathBuf) -> Result<()> {
    let bytes = fs::read(&image).with_context(|| format!("reading firmware image {image:?}"))?;
    let plaintext = firmware::decrypt_hex_image(&bytes)?;
    println!("firmware image verified: {} bytes of plaintext", plaintext.len());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Download { family, fixture, output } => run_download(family, fixture, output),
        Commands::FirmwareVerify { image } => run_firmware_verify(image),
    }
}

//! LANTERN command-line driver.
//!
//! The visual channel is stood in for by a packet stream container:
//! `send` renders a file into packets exactly as a screen would display
//! them, `receive` replays a (possibly mangled) stream into the decoder
//! and persists the verified reconstruction.

mod config;
mod progress;
mod stream;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use lantern_core::{ChannelHint, Decoder, ParityMap, Receive, SessionError, SymbolSchedule};
use lantern_files::{save_to_dir, StagedFile};

use config::Config;
use progress::{format_bytes, ReceiveProgress};

/// LANTERN - one-way file transfer over fountain-coded barcodes
#[derive(Parser)]
#[command(name = "lantern")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode a file into a packet stream
    Send {
        /// File to send
        file: PathBuf,

        /// Output packet stream path
        #[arg(short, long, default_value = "lantern.pkts")]
        output: PathBuf,

        /// Payload bytes per packet
        #[arg(short, long)]
        block_size: Option<u16>,

        /// Systematic sweeps to emit
        #[arg(long)]
        rounds: Option<u32>,

        /// Extra fountain symbols appended after the sweeps
        #[arg(long)]
        fountain: Option<u32>,

        /// Drop every Nth frame to simulate loss (0 disables)
        #[arg(long, default_value_t = 0)]
        drop_every: u32,

        /// Shuffle the emitted frames to simulate reordering
        #[arg(long)]
        shuffle: bool,

        /// Seed for the shuffle
        #[arg(long, default_value_t = 7)]
        seed: u64,

        /// Channel mode hint (mono, rgb, stacked)
        #[arg(long, default_value = "mono")]
        mode: String,
    },

    /// Decode a packet stream back into a file
    Receive {
        /// Captured packet stream
        stream: PathBuf,

        /// Directory for the reconstructed file
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Show code parameters for a file without streaming it
    Info {
        /// File to inspect
        file: PathBuf,

        /// Payload bytes per packet
        #[arg(short, long)]
        block_size: Option<u16>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Send {
            file,
            output,
            block_size,
            rounds,
            fountain,
            drop_every,
            shuffle,
            seed,
            mode,
        } => run_send(
            &config,
            &file,
            &output,
            block_size,
            rounds,
            fountain,
            drop_every,
            shuffle,
            seed,
            &mode,
        ),
        Commands::Receive { stream, output } => run_receive(&stream, &output),
        Commands::Info { file, block_size } => run_info(&config, &file, block_size),
    }
}

fn parse_mode(mode: &str) -> anyhow::Result<ChannelHint> {
    match mode {
        "mono" => Ok(ChannelHint::Mono),
        "rgb" => Ok(ChannelHint::Rgb),
        "stacked" => Ok(ChannelHint::Stacked),
        other => bail!("unknown channel mode {other:?} (expected mono, rgb, or stacked)"),
    }
}

#[allow(clippy::too_many_arguments)]
fn run_send(
    config: &Config,
    file: &Path,
    output: &Path,
    block_size: Option<u16>,
    rounds: Option<u32>,
    fountain: Option<u32>,
    drop_every: u32,
    shuffle: bool,
    seed: u64,
    mode: &str,
) -> anyhow::Result<()> {
    let block_size = block_size.unwrap_or(config.transfer.block_size);
    let rounds = rounds.unwrap_or(config.transfer.rounds).max(1);
    let fountain = fountain.unwrap_or(config.transfer.fountain);
    let hint = parse_mode(mode)?;

    let staged = StagedFile::from_path(file)
        .with_context(|| format!("staging {}", file.display()))?;
    let encoder = staged.encoder(block_size, hint)?;

    let mut packets = Vec::new();
    let mut schedule = SymbolSchedule::new(encoder.block_count());
    let mut data_frames: u64 = 0;
    let target = u64::from(rounds) * u64::from(encoder.block_count());
    while data_frames < target {
        let id = schedule.next_id();
        if id != 0 {
            data_frames += 1;
        }
        packets.push(encoder.emit(id));
    }
    for i in 0..fountain {
        packets.push(encoder.emit(encoder.block_count() + 1 + i));
    }

    let frames = packets.len();
    let packets = stream::impair(packets, drop_every, shuffle, seed);
    let stream_bytes: usize = packets.iter().map(Vec::len).sum();
    stream::write_stream(output, &packets)
        .with_context(|| format!("writing {}", output.display()))?;

    println!(
        "session {:08x}: {} -> {}",
        encoder.session_id(),
        staged.filename,
        output.display()
    );
    println!(
        "  {} in {} source + {} parity blocks of {} bytes",
        format_bytes(staged.len() as u64),
        encoder.source_count(),
        encoder.parity_count(),
        encoder.block_size()
    );
    println!(
        "  {} frames emitted ({} after impairment, {})",
        frames,
        packets.len(),
        format_bytes(stream_bytes as u64)
    );
    Ok(())
}

fn run_receive(stream_path: &Path, output: &Path) -> anyhow::Result<()> {
    let packets = stream::read_stream(stream_path)
        .with_context(|| format!("reading {}", stream_path.display()))?;

    let mut decoder = Decoder::new();
    let mut bar: Option<ReceiveProgress> = None;

    for packet in &packets {
        if decoder.receive(packet) == Receive::NewSession {
            decoder.reset();
            decoder.receive(packet);
        }

        if let Some(meta) = decoder.metadata() {
            let total = u64::from(meta.file_size);
            let bar = bar
                .get_or_insert_with(|| ReceiveProgress::new(total, &meta.filename));
            bar.update((decoder.progress() * total as f64) as u64);
        }
        if decoder.is_complete() {
            break;
        }
    }

    let stats = decoder.stats();
    match decoder.verified_reconstruct() {
        Ok(bytes) => {
            let meta = decoder
                .metadata()
                .cloned()
                .context("metadata missing after completion")?;
            if let Some(bar) = &bar {
                bar.finish_with_message("Transfer verified".to_string());
            }
            let path = save_to_dir(output, &meta.filename, &bytes)
                .with_context(|| format!("saving into {}", output.display()))?;

            println!("received {} ({})", path.display(), format_bytes(bytes.len() as u64));
            println!("  sha256 {}", hex::encode(meta.digest));
            println!(
                "  {} unique symbols, {} duplicates, {} rejected",
                decoder.unique_symbol_count(),
                stats.duplicates,
                stats.rejected
            );
            Ok(())
        }
        Err(SessionError::VerifyMismatch) => {
            if let Some(bar) = &bar {
                bar.abandon();
            }
            bail!("digest mismatch: the reconstruction is corrupt, retry the session");
        }
        Err(err) => {
            if let Some(bar) = &bar {
                bar.abandon();
            }
            bail!(
                "stream exhausted at {:.1}% ({} unique symbols, {} rejected): {err}",
                decoder.progress() * 100.0,
                decoder.unique_symbol_count(),
                stats.rejected
            );
        }
    }
}

fn run_info(config: &Config, file: &Path, block_size: Option<u16>) -> anyhow::Result<()> {
    let block_size = block_size.unwrap_or(config.transfer.block_size);
    let size = fs::metadata(file)
        .with_context(|| format!("inspecting {}", file.display()))?
        .len();
    if size > u64::from(u32::MAX) {
        bail!(
            "{} is {} which exceeds the transfer limit",
            file.display(),
            format_bytes(size)
        );
    }

    let source_count = (size.div_ceil(u64::from(block_size)) as u32).max(1);
    let map = ParityMap::build(source_count);
    let block_count = source_count + map.parity_count();

    println!("{}: {}", file.display(), format_bytes(size));
    println!("  block size      {block_size} bytes");
    println!("  source blocks   {source_count}");
    println!(
        "  parity blocks   {} ({:.2}% overhead)",
        map.parity_count(),
        f64::from(map.parity_count()) / f64::from(source_count) * 100.0
    );
    println!("  symbols/sweep   {block_count}");
    let frame_len = u64::from(block_size) + lantern_core::PACKET_HEADER_SIZE as u64;
    println!(
        "  stream bytes    {} per sweep",
        format_bytes(u64::from(block_count) * frame_len)
    );
    Ok(())
}

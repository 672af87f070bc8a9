//! apflash CLI - Command-line tool for flashing autopilot flight controllers.
//!
//! ## Features
//!
//! - Flash firmware container files
//! - Query board identity (bootloader revision, serial number, chip)
//! - Serial port discovery with interactive selection
//! - Environment variable support

use anyhow::{Context, Result, bail};
use apflash::{
    BoardInfo, Connector, FirmwareImage, Flasher, NativePort, SerialConnector, StageStatus,
    board_name, device,
};
use clap::{Parser, Subcommand};
use console::style;
use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// apflash - A cross-platform tool for flashing autopilot flight controllers.
///
/// Environment variables:
///   APFLASH_PORT              - Default serial port
///   APFLASH_BAUD              - Default baud rate (default: 115200)
///   APFLASH_NON_INTERACTIVE   - Non-interactive mode (disable prompts)
#[derive(Parser)]
#[command(name = "apflash")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Serial port to use (auto-detected if not specified).
    #[arg(short, long, global = true, env = "APFLASH_PORT")]
    port: Option<String>,

    /// Baud rate for the bootloader link.
    #[arg(
        short,
        long,
        global = true,
        default_value = "115200",
        env = "APFLASH_BAUD"
    )]
    baud: u32,

    /// Verbose output level (-v, -vv, -vvv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Non-interactive mode (fail instead of prompting).
    #[arg(long, global = true, env = "APFLASH_NON_INTERACTIVE")]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// List detected serial ports.
    Ports,

    /// Query and print the connected board's identity.
    Info,

    /// Flash a firmware container file.
    Flash {
        /// Path to the firmware file.
        firmware: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level)).init();

    match &cli.command {
        Commands::Ports => cmd_ports(),
        Commands::Info => cmd_info(&cli),
        Commands::Flash { firmware } => cmd_flash(&cli, firmware),
    }
}

/// Resolve the serial port to use, prompting if allowed and necessary.
fn select_port(cli: &Cli) -> Result<String> {
    if let Some(port) = &cli.port {
        return Ok(port.clone());
    }

    let ports = device::detect_ports();
    if ports.is_empty() {
        bail!("no serial ports found; specify one with --port");
    }
    if ports.len() == 1 || cli.non_interactive {
        let port = device::auto_detect_port()?;
        return Ok(port.name);
    }

    let items = device::format_port_list(&ports);
    let choice = dialoguer::Select::new()
        .with_prompt("Select a serial port")
        .items(&items)
        .default(0)
        .interact()
        .context("port selection cancelled")?;
    Ok(ports[choice].name.clone())
}

/// Open the selected port and wrap it in a flasher.
fn open_flasher(cli: &Cli) -> Result<Flasher<NativePort>> {
    let port_name = select_port(cli)?;
    if !cli.quiet {
        eprintln!(
            "{} Using port {} @ {} baud",
            style("→").cyan(),
            port_name,
            cli.baud
        );
    }

    let mut connector = SerialConnector {
        baud_rate: cli.baud,
        timeout: Duration::from_secs(2),
    };
    let port = connector
        .connect(&port_name)
        .with_context(|| format!("failed to open {port_name}"))?;
    Ok(Flasher::new(port))
}

/// Ports command implementation.
fn cmd_ports() -> Result<()> {
    let ports = device::detect_ports();
    if ports.is_empty() {
        eprintln!("No serial ports found.");
        return Ok(());
    }

    for line in device::format_port_list(&ports) {
        println!("{line}");
    }
    Ok(())
}

/// Info command implementation.
fn cmd_info(cli: &Cli) -> Result<()> {
    let mut flasher = open_flasher(cli)?;
    let info = flasher.board_info().context("board query failed")?;
    print_board_info(&info);
    Ok(())
}

fn print_board_info(info: &BoardInfo) {
    let board = board_name(info.board_id)
        .map(|name| format!("{} (id {})", name, info.board_id))
        .unwrap_or_else(|| format!("unknown (id {})", info.board_id));

    println!("Board:               {board}");
    println!("Board revision:      {}", info.board_revision);
    println!("Bootloader revision: {}", info.bootloader_revision);
    println!("Flash size:          {} bytes", info.flash_size);
    println!("Serial number:       {}", info.serial_number);
    println!("Chip:                {}", info.chip_description);
}

/// Flash command implementation.
fn cmd_flash(cli: &Cli, firmware: &Path) -> Result<()> {
    if !cli.quiet {
        eprintln!(
            "{} Loading firmware {}",
            style("→").cyan(),
            firmware.display()
        );
    }

    let image = FirmwareImage::from_file(firmware)
        .with_context(|| format!("failed to load firmware {}", firmware.display()))?;
    debug!(
        "firmware: board id {}, {} bytes declared, {} bytes decoded",
        image.board_id,
        image.image_size,
        image.image.len()
    );

    if !cli.quiet {
        let board = board_name(image.board_id).unwrap_or("unknown board");
        eprintln!(
            "{} Image for {} (id {}), {} bytes",
            style("→").cyan(),
            board,
            image.board_id,
            image.image_size
        );
    }

    let mut flasher = open_flasher(cli)?;

    let pb = if cli.quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(100);
        #[allow(clippy::unwrap_used)] // Static template string
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
                .unwrap()
                .progress_chars("#>-"),
        );
        pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        pb
    };

    let mut upload = flasher.upload(&image);
    let mut erase_seen = StageStatus::NotStarted;
    let mut verify_seen = StageStatus::NotStarted;

    loop {
        let snapshot = match upload.step() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => break,
            Err(err) => {
                pb.abandon();
                return Err(err).context("upload failed");
            },
        };

        if snapshot.erase != erase_seen {
            erase_seen = snapshot.erase;
            match erase_seen {
                StageStatus::InProgress => pb.set_message("erasing program flash"),
                StageStatus::Completed => pb.set_message("programming"),
                StageStatus::NotStarted => {},
            }
        }
        if let Some(pct) = snapshot.program_percent {
            pb.set_position(u64::from(pct));
        }
        if snapshot.verify != verify_seen {
            verify_seen = snapshot.verify;
            if verify_seen == StageStatus::InProgress {
                pb.set_message("verifying flash checksum");
            }
        }
    }

    pb.finish_with_message("verified");

    if !cli.quiet {
        eprintln!(
            "\n{} Firmware flashed and verified; device is rebooting",
            style("✓").green().bold()
        );
    }

    Ok(())
}

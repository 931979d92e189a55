use std::fs::File;
use std::fs::OpenOptions;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use feecore::status::{JobResult, ModuleStatus};
use feecore::{Engine, EngineObserver};

mod config_file;
mod file_flash;
mod logger;

use file_flash::FileFlash;
use logger::Logger;

#[derive(Debug, Clone, clap::Subcommand)]
enum Command {
    /// Run the startup scan and print the recovered block/cluster state.
    Init,
    /// Read a block's payload and print it as hex.
    Read {
        block_number: u16,
        #[clap(default_value_t = 0)]
        offset: u32,
        length: usize,
    },
    /// Write a block's payload, given as a hex string.
    Write { block_number: u16, hex_data: String },
    /// Invalidate a block.
    Invalidate { block_number: u16 },
    /// Pre-allocate an immediate block's reserved-area slot.
    EraseImmediate { block_number: u16 },
    /// Print the module's current status and job result.
    Status,
}

#[derive(Debug, Parser)]
#[clap(name = "feecore-cli", about = "development harness for the feecore EEPROM-emulation engine")]
struct Args {
    /// Path to the flash image file (created, blank, if missing).
    #[clap(short, long, parse(from_os_str), value_name = "IMAGE")]
    image: PathBuf,

    /// Path to the TOML block/cluster catalog.
    #[clap(short, long, parse(from_os_str), value_name = "CONFIG")]
    config: PathBuf,

    /// Total size in bytes of the flash image.
    #[clap(short, long, value_name = "BYTES")]
    size: u32,

    /// Set verbosity of the output (can be used multiple times).
    #[clap(short, long, parse(from_occurrences))]
    verbose: u32,

    /// Log file for both the CLI's own messages and the engine's `log`
    /// facade output.
    #[clap(short, long, parse(from_os_str), value_name = "FILE")]
    log_file: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

/// Records the outcome of the one request this invocation issues, so
/// `main` can report it after the engine finishes.
#[derive(Default)]
struct CliObserver {
    ended: bool,
    errored: bool,
}

impl EngineObserver for CliObserver {
    fn job_end(&mut self)
    {
        self.ended = true;
    }

    fn job_error(&mut self)
    {
        self.errored = true;
    }
}

fn open_log_file(path: &Option<PathBuf>) -> Option<File>
{
    path.as_ref().and_then(|path| match OpenOptions::new().create(true).append(true).open(path) {
        Ok(f) => Some(f),
        Err(e) => {
            eprintln!("error: {}: {}", path.display(), e);
            None
        }
    })
}

fn parse_hex(s: &str) -> Result<Vec<u8>>
{
    let s = s.trim();
    if s.len() % 2 != 0 {
        bail!("hex payload must have an even number of digits");
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).with_context(|| format!("invalid hex byte {:?}", &s[i..i + 2])))
        .collect()
}

fn main() -> Result<()>
{
    let args = Args::parse();

    env_logger::Builder::new().filter_level(log::LevelFilter::Info).parse_default_env().init();

    let log_file = open_log_file(&args.log_file);
    let mut logger = Logger::new(args.verbose, log_file);

    let config = config_file::load(&args.config)?;
    config.validate().context("config failed geometry validation")?;
    logger.log(1, &format!("loaded {} blocks across {} cluster groups", config.blocks.len(), config.groups.len()));

    let mut flash = FileFlash::open(&args.image, args.size).with_context(|| format!("opening flash image {}", args.image.display()))?;
    let mut engine = Engine::new(config, CliObserver::default())?;

    engine.init();
    feecore::testing::pump(&mut engine, &mut flash);
    if engine.job_result() != JobResult::Ok {
        bail!("startup scan failed: {:?}", engine.job_result());
    }
    logger.log(2, "startup scan complete");

    run_command(&mut engine, &mut flash, &args.command, &mut logger)?;

    report(&engine);
    Ok(())
}

fn run_command(engine: &mut Engine<CliObserver>, flash: &mut FileFlash, command: &Command, logger: &mut Logger) -> Result<()>
{
    match command {
        Command::Init => {}
        Command::Read { block_number, offset, length } => {
            let mut buf = vec![0u8; *length];
            if !engine.read(*block_number, *offset, &mut buf) {
                bail!("read rejected: block {} is not idle-addressable", block_number);
            }
            feecore::testing::pump(engine, flash);
            if engine.job_result() == JobResult::Ok {
                println!("{}", buf.iter().map(|b| format!("{:02x}", b)).collect::<String>());
            }
        }
        Command::Write { block_number, hex_data } => {
            let data = parse_hex(hex_data)?;
            if !engine.write(*block_number, &data) {
                bail!("write rejected: block {} not found or length mismatch", block_number);
            }
            feecore::testing::pump(engine, flash);
            logger.log(2, "write complete");
        }
        Command::Invalidate { block_number } => {
            if !engine.invalidate_block(*block_number) {
                bail!("invalidate rejected: module must be idle");
            }
            feecore::testing::pump(engine, flash);
        }
        Command::EraseImmediate { block_number } => {
            if !engine.erase_immediate_block(*block_number) {
                bail!("erase-immediate rejected: block {} is not an immediate block", block_number);
            }
            feecore::testing::pump(engine, flash);
        }
        Command::Status => {}
    }

    Ok(())
}

fn report(engine: &Engine<CliObserver>)
{
    eprintln!("status: {:?}, job result: {:?}", engine.status(), engine.job_result());
    match engine.status() {
        ModuleStatus::Idle => {}
        other => eprintln!("warning: engine left in non-idle state {:?}", other),
    }
}

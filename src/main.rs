//! UIO Register Access CLI.
//!
//! The command-line front end for the register engine. It loads the
//! configuration (paths, address split, node table), discovers and maps every
//! endpoint, performs one register operation, and exits.
//!
//! # Usage
//!
//! Registers are given either by node name from the configuration's node
//! table or as a numeric logical address:
//!
//! ```text
//! uio-axi --config uio.toml read PL_MEM.ARM.CPU_LOAD
//! uio-axi --config uio.toml write 0x01000004 0xdeadbeef
//! uio-axi --config uio.toml read-block 0x01000000 16 --fixed
//! ```

use clap::{Parser, Subcommand};
use std::process;

extern crate uio_axi;

use uio_axi::config::parse_hex_u32;
use uio_axi::node::NodeTree;
use uio_axi::uio::DeviceState;
use uio_axi::{BlockMode, Config, NodeTable, RegisterEngine, RegisterValue, UioError};

/// Command-line arguments for the UIO register tool.
#[derive(Parser, Debug)]
#[command(author, version, about = "Direct AXI register access via Linux UIO")]
struct Args {
    /// Configuration file; kernel defaults are used when omitted.
    #[arg(short, long)]
    config: Option<String>,

    /// Enable debug logging (overridden by RUST_LOG).
    #[arg(short, long)]
    verbose: bool,

    /// Print access statistics on exit.
    #[arg(long)]
    stats: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the endpoint devices and their mapping state.
    Discover {
        #[arg(long)]
        json: bool,
    },
    /// Read one register.
    Read {
        reg: String,
        #[arg(long, default_value = "0xffffffff")]
        mask: String,
    },
    /// Write one register.
    Write { reg: String, value: String },
    /// Read a block of words.
    ReadBlock {
        reg: String,
        count: usize,
        /// Re-read the same address (FIFO access).
        #[arg(long)]
        fixed: bool,
    },
    /// Write a block of words.
    WriteBlock {
        reg: String,
        #[arg(required = true)]
        values: Vec<String>,
        #[arg(long)]
        fixed: bool,
    },
    /// Read-modify-write: (value & AND) | OR.
    RmwBits {
        reg: String,
        and_term: String,
        or_term: String,
    },
    /// Read-modify-write: value + ADDEND.
    RmwSum {
        reg: String,
        #[arg(allow_hyphen_values = true)]
        addend: i32,
    },
}

/// Main entry point for the UIO register tool.
///
/// # Behavior
///
/// 1. **Configuration**: Parses arguments and loads the TOML configuration.
/// 2. **Initialization**: Discovers and maps every endpoint node.
/// 3. **Operation**: Runs the requested register command and prints the result.
/// 4. **Teardown**: Optionally prints statistics; dropping the engine unmaps
///    every device and restores the SIGBUS handler.
fn main() {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match &args.config {
        Some(path) => Config::load(path),
        None => Ok(Config::default()),
    };
    let config = config.unwrap_or_else(|e| {
        eprintln!("[!] {}", e);
        process::exit(1);
    });
    let nodes = NodeTable::from_config(&config).unwrap_or_else(|e| {
        eprintln!("[!] {}", e);
        process::exit(1);
    });

    let op = Op::resolve(&nodes, args.command).unwrap_or_else(|e| {
        eprintln!("[!] {}", e);
        process::exit(1);
    });

    let engine = RegisterEngine::from_nodes(&config, &nodes).unwrap_or_else(|e| {
        eprintln!("[!] {}", e);
        process::exit(2);
    });

    let outcome = op.run(&engine);
    if args.stats {
        engine.stats().print();
    }
    if let Err(e) = outcome {
        eprintln!("[!] {}", e);
        drop(engine);
        process::exit(2);
    }
}

/// A command with its registers and values already parsed.
#[derive(Debug, PartialEq, Eq)]
enum Op {
    Discover { json: bool },
    Read { addr: u32, mask: u32 },
    Write { addr: u32, value: u32 },
    ReadBlock { addr: u32, count: usize, mode: BlockMode },
    WriteBlock { addr: u32, values: Vec<u32>, mode: BlockMode },
    RmwBits { addr: u32, and_term: u32, or_term: u32 },
    RmwSum { addr: u32, addend: i32 },
}

impl Op {
    /// Parses register names and numbers; fails before any device is touched.
    fn resolve(nodes: &NodeTable, command: Command) -> Result<Self, UioError> {
        Ok(match command {
            Command::Discover { json } => Op::Discover { json },
            Command::Read { reg, mask } => Op::Read {
                addr: register(nodes, &reg)?,
                mask: number(&mask)?,
            },
            Command::Write { reg, value } => Op::Write {
                addr: register(nodes, &reg)?,
                value: number(&value)?,
            },
            Command::ReadBlock { reg, count, fixed } => Op::ReadBlock {
                addr: register(nodes, &reg)?,
                count,
                mode: block_mode(fixed),
            },
            Command::WriteBlock { reg, values, fixed } => Op::WriteBlock {
                addr: register(nodes, &reg)?,
                values: values
                    .iter()
                    .map(|v| number(v))
                    .collect::<Result<Vec<_>, _>>()?,
                mode: block_mode(fixed),
            },
            Command::RmwBits {
                reg,
                and_term,
                or_term,
            } => Op::RmwBits {
                addr: register(nodes, &reg)?,
                and_term: number(&and_term)?,
                or_term: number(&or_term)?,
            },
            Command::RmwSum { reg, addend } => Op::RmwSum {
                addr: register(nodes, &reg)?,
                addend,
            },
        })
    }

    fn run(self, engine: &RegisterEngine) -> Result<(), UioError> {
        match self {
            Op::Discover { json } => {
                discover(engine, json);
                Ok(())
            }
            Op::Read { addr, mask } => {
                let value = engine.read(addr, mask)?;
                if value.mask == RegisterValue::NO_MASK {
                    println!("{:#010x}", value.raw);
                } else {
                    println!("{:#x} (raw {:#010x})", value.value(), value.raw);
                }
                Ok(())
            }
            Op::Write { addr, value } => engine.write(addr, value),
            Op::ReadBlock { addr, count, mode } => {
                for (i, value) in engine.read_block(addr, count, mode)?.iter().enumerate() {
                    println!("[{:4}] {:#010x}", i, value);
                }
                Ok(())
            }
            Op::WriteBlock { addr, values, mode } => engine.write_block(addr, &values, mode),
            Op::RmwBits {
                addr,
                and_term,
                or_term,
            } => {
                println!("{:#010x}", engine.rmw_bits(addr, and_term, or_term)?);
                Ok(())
            }
            Op::RmwSum { addr, addend } => {
                println!("{:#010x}", engine.rmw_sum(addr, addend)?);
                Ok(())
            }
        }
    }
}

fn discover(engine: &RegisterEngine, json: bool) {
    if json {
        let devices: Vec<serde_json::Value> = engine
            .devices()
            .map(|d| {
                serde_json::json!({
                    "index": d.index,
                    "node": d.hw_name,
                    "uio": d.uio_name,
                    "base_addr": format!("{:#x}", d.base_addr),
                    "size_words": d.size_words,
                    "state": d.state(),
                })
            })
            .collect();
        match serde_json::to_string_pretty(&devices) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("[!] {}", e),
        }
        return;
    }

    println!("UIO Devices");
    println!("--------------------");
    for d in engine.devices() {
        let state = match d.state() {
            DeviceState::Mapped => "mapped",
            DeviceState::Unmapped => "UNMAPPED",
            DeviceState::TornDown => "released",
        };
        println!(
            "  [{:3}] {:<24} {:<8} @ {:#010x} ({:#x} words) {}",
            d.index, d.hw_name, d.uio_name, d.base_addr, d.size_words, state
        );
    }
    println!("--------------------");
}

fn block_mode(fixed: bool) -> BlockMode {
    if fixed {
        BlockMode::Fixed
    } else {
        BlockMode::Incremental
    }
}

/// Resolves a register given by node name or numeric address.
fn register(nodes: &NodeTable, reg: &str) -> Result<u32, UioError> {
    if let Some(info) = nodes.lookup(reg) {
        return Ok(info.address);
    }
    number(reg).map_err(|_| UioError::Config(format!("unknown register '{}'", reg)))
}

/// Parses `0x`-prefixed hex or plain decimal.
fn number(text: &str) -> Result<u32, UioError> {
    let parsed = if text.starts_with("0x") || text.starts_with("0X") {
        parse_hex_u32(text)
    } else {
        text.parse::<u32>().ok()
    };
    parsed.ok_or_else(|| UioError::Config(format!("invalid number '{}'", text)))
}

//! micrort CLI: device configs, cross-compilation, and session checks.

mod commands;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use micrort_compile::LibType;

#[derive(Parser)]
#[command(name = "micrort", version, about = "Micro-device runtime sessions")]
struct Cli {
    /// Increase log verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect registered device families
    Device {
        #[command(subcommand)]
        action: DeviceAction,
    },
    /// Work with device configuration files
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Cross-compile a C source into a relocatable object
    Compile {
        /// Device configuration file (.toml or .json)
        #[arg(long)]
        config: PathBuf,
        /// Library type to build
        #[arg(long, value_enum, default_value_t = LibTypeArg::Operator)]
        lib_type: LibTypeArg,
        /// C source file
        #[arg(long)]
        src: PathBuf,
        /// Output object file
        #[arg(long)]
        out: PathBuf,
        /// Extra compiler flag (repeatable)
        #[arg(long = "flag", allow_hyphen_values = true)]
        flags: Vec<String>,
    },
    /// Exercise a device session
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
}

#[derive(Subcommand)]
enum DeviceAction {
    /// List registered device ids
    List,
    /// Print the default configuration for a device
    Config {
        /// Device id (e.g., host, arm.stm32f746xx)
        id: String,
        /// OpenOCD server address
        #[arg(long)]
        server_addr: Option<String>,
        /// OpenOCD server port
        #[arg(long)]
        server_port: Option<u16>,
        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Toml)]
        format: Format,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate a device configuration file
    Validate {
        /// Configuration file (.toml or .json)
        file: PathBuf,
        /// Report issues as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    /// Open a session, enter and exit it, then close it
    Check {
        /// Device configuration file (.toml or .json)
        #[arg(long)]
        config: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum LibTypeArg {
    Runtime,
    Operator,
}

impl From<LibTypeArg> for LibType {
    fn from(arg: LibTypeArg) -> Self {
        match arg {
            LibTypeArg::Runtime => LibType::Runtime,
            LibTypeArg::Operator => LibType::Operator,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, ValueEnum)]
pub enum Format {
    Toml,
    Json,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Device { action } => match action {
            DeviceAction::List => commands::device::list(),
            DeviceAction::Config {
                id,
                server_addr,
                server_port,
                format,
            } => commands::device::config(&id, server_addr, server_port, format),
        },

        Commands::Config { action } => match action {
            ConfigAction::Validate { file, json } => commands::config::validate(&file, json),
        },

        Commands::Compile {
            config,
            lib_type,
            src,
            out,
            flags,
        } => commands::compile::run(&config, lib_type.into(), &src, &out, &flags),

        Commands::Session { action } => match action {
            SessionAction::Check { config } => commands::session::check(&config),
        },
    }
}

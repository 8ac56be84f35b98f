//! Command-line interface for signstream
//!
//! Provides argument parsing using clap derive macros.

use crate::config::{Config, ResetMode};
use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

/// Real-time sign language recognition over WebSocket
#[derive(Parser, Debug)]
#[command(
    name = "signstream",
    version,
    about = "Real-time sign language recognition over WebSocket"
)]
pub struct Cli {
    /// Subcommand to execute (default: serve)
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Verbose logging (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Address to bind (default: 0.0.0.0)
    #[arg(long, global = true, value_name = "HOST")]
    pub host: Option<String>,

    /// Port to listen on (default: 8765)
    #[arg(long, short = 'p', global = true, value_name = "PORT")]
    pub port: Option<u16>,

    /// Minimum top-class probability to emit a word (0.0 to 1.0)
    #[arg(long, short = 't', global = true, value_name = "P")]
    pub threshold: Option<f32>,

    /// Emit every classified window, even if it repeats the previous result
    #[arg(long, global = true)]
    pub no_debounce: bool,

    /// What to do with a window after classification
    #[arg(long, global = true, value_name = "MODE")]
    pub reset: Option<ResetArg>,

    /// Entries dropped per classification with --reset sliding
    #[arg(long, global = true, value_name = "N")]
    pub stride: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the WebSocket server (default)
    Serve,

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Print the class vocabulary, one word per line
    Classes,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
    /// Load and validate the configuration
    Validate,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetArg {
    Full,
    Sliding,
}

impl From<ResetArg> for ResetMode {
    fn from(arg: ResetArg) -> Self {
        match arg {
            ResetArg::Full => ResetMode::Full,
            ResetArg::Sliding => ResetMode::Sliding,
        }
    }
}

impl Cli {
    /// Apply command-line overrides on top of file and environment settings.
    pub fn apply_overrides(&self, mut config: Config) -> Config {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(threshold) = self.threshold {
            config.pipeline.threshold = threshold;
        }
        if self.no_debounce {
            config.pipeline.debounce = false;
        }
        if let Some(reset) = self.reset {
            config.pipeline.reset = reset.into();
        }
        if let Some(stride) = self.stride {
            config.pipeline.stride = stride;
        }
        config
    }

    /// Log filter directive for the verbosity flags.
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "warn";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

//! Logging arguments and subscriber setup.

use clap::Args;
use eyre::Result;
use tracing_subscriber::EnvFilter;

/// Logging configuration.
#[derive(Debug, Args, Clone, Default)]
#[command(next_help_heading = "Logging")]
pub(crate) struct LogArgs {
    /// Silence all output except errors.
    #[arg(short, long, global = true)]
    pub(crate) quiet: bool,

    /// Verbose mode (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub(crate) verbosity: u8,

    /// Log filter directive (e.g., "tinytorrent_peer=debug").
    #[arg(long = "log.filter", value_name = "DIRECTIVE", global = true)]
    pub(crate) filter: Option<String>,

    /// Use JSON format for log output.
    #[arg(long = "log.json", global = true)]
    pub(crate) json: bool,
}

impl LogArgs {
    /// Filter precedence: `--quiet`, then `RUST_LOG` or the verbosity level,
    /// then `--log.filter` directives on top.
    fn env_filter(&self) -> Result<EnvFilter> {
        if self.quiet {
            return Ok(EnvFilter::new("error"));
        }

        let base_level = match self.verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        let mut filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(base_level));

        if let Some(custom) = &self.filter {
            for directive in custom.split(',').filter(|d| !d.trim().is_empty()) {
                filter = filter.add_directive(directive.trim().parse()?);
            }
        }
        Ok(filter)
    }
}

/// Install the global subscriber.
pub(crate) fn init_logging(args: &LogArgs) -> Result<()> {
    let filter = args.env_filter()?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if args.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    }
    .map_err(|e| eyre::eyre!(e))
}

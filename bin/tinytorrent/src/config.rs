//! Peer configuration file handling.

use std::{fs, path::Path};

use clap::Args;
use eyre::{Result, WrapErr};
use tinytorrent_peer::PeerConfig;

/// Command line overrides for [`PeerConfig`].
#[derive(Debug, Args, Clone, Default)]
#[command(next_help_heading = "Peer")]
pub(crate) struct PeerArgs {
    /// Maximum chunk size in bytes used when publishing.
    #[arg(long = "peer.max-chunk-size", value_name = "BYTES")]
    pub(crate) max_chunk_size: Option<usize>,

    /// Maximum outstanding remote requests while downloading.
    #[arg(long = "peer.max-concurrent-requests", value_name = "N")]
    pub(crate) max_concurrent_requests: Option<usize>,

    /// Timeout for each remote request, in milliseconds.
    #[arg(long = "peer.request-timeout", value_name = "MS")]
    pub(crate) request_timeout_ms: Option<u64>,

    /// Tracker polls before giving up on missing chunks.
    #[arg(long = "peer.tracker-polls", value_name = "N")]
    pub(crate) tracker_polls: Option<u32>,

    /// Delay between tracker polls, in milliseconds.
    #[arg(long = "peer.retry-delay", value_name = "MS")]
    pub(crate) retry_delay_ms: Option<u64>,

    /// Only register with the tracker once the download is complete.
    #[arg(long = "peer.no-partial-announce")]
    pub(crate) no_partial_announce: bool,
}

/// Load the configuration from `path`, writing the defaults there if it doesn't exist.
pub(crate) fn load_or_create(path: &Path) -> Result<PeerConfig> {
    if path.exists() {
        let content = fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read config: {}", path.display()))?;
        toml::from_str(&content)
            .wrap_err_with(|| format!("failed to parse config: {}", path.display()))
    } else {
        let config = PeerConfig::default();
        save(&config, path)?;
        Ok(config)
    }
}

/// Save the configuration to `path`.
pub(crate) fn save(config: &PeerConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    fs::write(path, content)?;
    Ok(())
}

/// Apply command line overrides on top of a loaded configuration.
pub(crate) fn apply_args(config: &mut PeerConfig, args: &PeerArgs) {
    if let Some(size) = args.max_chunk_size {
        config.max_chunk_size = size;
    }
    if let Some(n) = args.max_concurrent_requests {
        config.max_concurrent_requests = n;
    }
    if let Some(ms) = args.request_timeout_ms {
        config.request_timeout_ms = ms;
    }
    if let Some(n) = args.tracker_polls {
        config.tracker_polls = n;
    }
    if let Some(ms) = args.retry_delay_ms {
        config.retry_delay_ms = ms;
    }
    if args.no_partial_announce {
        config.announce_partial = false;
    }
}

/// Resolve the effective configuration: file (if any), then overrides.
pub(crate) fn resolve(path: Option<&Path>, args: &PeerArgs) -> Result<PeerConfig> {
    let mut config = match path {
        Some(path) => load_or_create(path)?,
        None => PeerConfig::default(),
    };
    apply_args(&mut config, args);
    config.validate()?;
    Ok(config)
}

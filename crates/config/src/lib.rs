use clap::{ArgAction, CommandFactory, Parser};
use domain::{EngineConfig, DEFAULT_MAX_CONNECTIONS, DEFAULT_TORRENT_PORT};
use dotenv::{dotenv, from_path};
use std::path::PathBuf;
use thiserror::Error;

pub const DEFAULT_HTTP_PORT: u16 = 8080;

pub const DEFAULT_BLOCKLIST_URL: &str = "http://john.bitsurge.net/public/biglist.p2p.gz";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no torrent given; pass a magnet link, a .torrent path or an URL")]
    MissingTorrent,

    #[error("failed to load .env file from path {path}: {reason}")]
    EnvFile { path: String, reason: String },
}

/// Command line flags, each with an environment variable fallback.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "peerflix",
    version,
    about = "Stream a video from a torrent over local HTTP while it downloads"
)]
pub struct Cli {
    /// Magnet link, path to a .torrent file, or HTTP(S) URL of one
    #[arg(env = "PEERFLIX_TORRENT")]
    pub torrent: Option<String>,

    /// Port the HTTP server listens on (0 picks a free port)
    #[arg(long, env = "PEERFLIX_PORT", default_value_t = DEFAULT_HTTP_PORT)]
    pub port: u16,

    /// Port to listen on for incoming peer connections
    #[arg(long = "torrent-port", env = "PEERFLIX_TORRENT_PORT", default_value_t = DEFAULT_TORRENT_PORT)]
    pub torrent_port: u16,

    /// Keep uploading to peers
    #[arg(
        long,
        env = "PEERFLIX_SEED",
        default_value_t = false,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        action = ArgAction::Set
    )]
    pub seed: bool,

    /// Allow plain TCP peer connections
    #[arg(
        long,
        env = "PEERFLIX_TCP",
        default_value_t = true,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        action = ArgAction::Set
    )]
    pub tcp: bool,

    /// Maximum number of peer connections
    #[arg(long, env = "PEERFLIX_CONN", default_value_t = DEFAULT_MAX_CONNECTIONS)]
    pub conn: usize,

    /// Player to launch once enough is buffered: vlc, mpv or mplayer
    #[arg(long, env = "PEERFLIX_PLAYER", default_value = "")]
    pub player: String,

    /// Scratch directory for downloaded pieces
    #[arg(long = "data-dir", env = "PEERFLIX_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Gzipped P2P blocklist source; empty disables the blocklist
    #[arg(long = "blocklist-url", env = "PEERFLIX_BLOCKLIST_URL", default_value = DEFAULT_BLOCKLIST_URL)]
    pub blocklist_url: String,
}

/// Everything a client session needs, resolved from flags and environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub torrent: String,
    pub http_port: u16,
    pub engine: EngineConfig,
    pub player: Option<String>,
}

impl ClientConfig {
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let torrent = cli
            .torrent
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::MissingTorrent)?;

        let engine = EngineConfig {
            upload_enabled: cli.seed,
            allow_tcp: cli.tcp,
            listen_port: cli.torrent_port,
            max_connections: cli.conn,
            data_dir: cli.data_dir.unwrap_or_else(std::env::temp_dir),
            blocklist_url: non_empty(cli.blocklist_url),
        };

        Ok(Self {
            torrent,
            http_port: cli.port,
            engine,
            player: non_empty(cli.player),
        })
    }

    /// Loads `.env`, then parses the process arguments.
    pub fn load(env_path: Option<&str>) -> Result<Self, ConfigError> {
        load_env(env_path)?;
        Self::from_cli(Cli::parse())
    }
}

/// Load a specified `.env` file, or the one in the working directory if present.
pub fn load_env(env_path: Option<&str>) -> Result<(), ConfigError> {
    match env_path {
        Some(path) => from_path(path)
            .map(|_| ())
            .map_err(|e| ConfigError::EnvFile {
                path: path.to_string(),
                reason: e.to_string(),
            }),
        None => {
            dotenv().ok();
            Ok(())
        }
    }
}

/// Prints the command line help to stdout.
pub fn print_usage() {
    let _ = Cli::command().print_help();
    println!();
}

fn non_empty(value: String) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> ClientConfig {
        let cli = Cli::try_parse_from(std::iter::once("peerflix").chain(args.iter().copied()))
            .unwrap();
        ClientConfig::from_cli(cli).unwrap()
    }

    #[test]
    fn defaults() {
        let config = parse(&["movie.torrent", "--blocklist-url="]);
        assert_eq!(config.torrent, "movie.torrent");
        assert_eq!(config.http_port, DEFAULT_HTTP_PORT);
        assert_eq!(config.engine.listen_port, DEFAULT_TORRENT_PORT);
        assert_eq!(config.engine.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert!(!config.engine.upload_enabled);
        assert!(config.engine.allow_tcp);
        assert_eq!(config.player, None);
        assert_eq!(config.engine.blocklist_url, None);
    }

    #[test]
    fn overrides() {
        let config = parse(&[
            "--port=0",
            "--torrent-port",
            "6881",
            "--seed",
            "--tcp=false",
            "--conn",
            "50",
            "--player",
            "mpv",
            "--data-dir",
            "/tmp/peerflix-test",
            "magnet:?xt=urn:btih:abc",
        ]);
        assert_eq!(config.http_port, 0);
        assert_eq!(config.engine.listen_port, 6881);
        assert!(config.engine.upload_enabled);
        assert!(!config.engine.allow_tcp);
        assert_eq!(config.engine.max_connections, 50);
        assert_eq!(config.player.as_deref(), Some("mpv"));
        assert_eq!(config.engine.data_dir, PathBuf::from("/tmp/peerflix-test"));
        assert_eq!(config.torrent, "magnet:?xt=urn:btih:abc");
        if std::env::var_os("PEERFLIX_BLOCKLIST_URL").is_none() {
            assert_eq!(
                config.engine.blocklist_url.as_deref(),
                Some(DEFAULT_BLOCKLIST_URL)
            );
        }
    }

    #[test]
    fn bare_bool_flag_does_not_swallow_the_torrent() {
        let config = parse(&["--seed", "movie.torrent"]);
        assert!(config.engine.upload_enabled);
        assert_eq!(config.torrent, "movie.torrent");
    }

    #[test]
    fn missing_torrent_is_an_error() {
        let cli = Cli::try_parse_from(["peerflix", "--port", "9000"]).unwrap();
        // The environment may provide one; only assert when it does not.
        if std::env::var_os("PEERFLIX_TORRENT").is_none() {
            assert!(matches!(
                ClientConfig::from_cli(cli),
                Err(ConfigError::MissingTorrent)
            ));
        }
    }

    #[test]
    fn missing_env_file_is_reported() {
        assert!(matches!(
            load_env(Some("/definitely/not/here/.env")),
            Err(ConfigError::EnvFile { .. })
        ));
    }
}

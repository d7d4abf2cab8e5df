use std::fmt;
use std::process::ExitStatus;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Video players that take the stream URL as their last argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Player {
    Vlc,
    Mpv,
    MPlayer,
}

impl Player {
    pub const ALL: [Player; 3] = [Player::Vlc, Player::Mpv, Player::MPlayer];

    /// Case-insensitive lookup by display name.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|player| player.name().eq_ignore_ascii_case(name))
    }

    pub fn name(self) -> &'static str {
        match self {
            Player::Vlc => "VLC",
            Player::Mpv => "MPV",
            Player::MPlayer => "MPlayer",
        }
    }

    fn program(self) -> &'static str {
        match self {
            Player::Vlc => "vlc",
            Player::Mpv => "mpv",
            Player::MPlayer => "mplayer",
        }
    }

    /// Program and arguments that open `url`; macOS goes through `open -a`.
    pub fn command_line(self, url: &str, macos: bool) -> Vec<String> {
        let mut command = Vec::with_capacity(4);
        if macos {
            command.push("open".to_string());
            command.push("-a".to_string());
        }
        command.push(self.program().to_string());
        command.push(url.to_string());
        command
    }

    /// Starts the player without waiting for it to exit.
    pub fn open(self, url: &str) -> std::io::Result<JoinHandle<Option<ExitStatus>>> {
        launch(&self.command_line(url, cfg!(target_os = "macos")))
    }

    pub fn supported_names() -> String {
        Self::ALL.map(Player::name).join(", ")
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Spawns `command` and reaps it in the background. The handle resolves to
/// the exit status once the process ends.
fn launch(command: &[String]) -> std::io::Result<JoinHandle<Option<ExitStatus>>> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"))?;
    let mut child = Command::new(program).args(args).spawn()?;
    let program = program.clone();
    Ok(tokio::spawn(async move {
        match child.wait().await {
            Ok(status) => {
                debug!(%program, %status, "player exited");
                Some(status)
            }
            Err(e) => {
                warn!("Lost track of {}: {}", program, e);
                None
            }
        }
    }))
}

/// Opens `url` in the named player, logging instead of failing.
pub fn open_player(name: &str, url: &str) {
    let Some(player) = Player::from_name(name) else {
        warn!(
            "Player '{}' is not supported. Currently supported players are: {}",
            name,
            Player::supported_names()
        );
        return;
    };

    info!("🎬 Playing in {}: {}", player, url);
    if let Err(e) = player.open(url) {
        warn!("Error opening {}: {}", player, e);
    }
}

use domain::TorrentStats;
use std::fmt::Write;

pub const CLEAR_SCREEN: &str = "\x1b[H\x1b[2J";

/// Formats a byte count with binary units.
pub fn format_bytes(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = KIB * 1024.0;
    const GIB: f64 = MIB * 1024.0;
    let value = bytes as f64;
    if value >= GIB {
        format!("{:.2} GiB", value / GIB)
    } else if value >= MIB {
        format!("{:.2} MiB", value / MIB)
    } else if value >= KIB {
        format!("{:.2} KiB", value / KIB)
    } else {
        format!("{bytes} B")
    }
}

/// Terminal progress view, called once per second. Speeds are the
/// difference to the previous call.
pub struct Renderer {
    stream_url: String,
    seed: bool,
    last_completed: u64,
    last_uploaded: u64,
}

impl Renderer {
    pub fn new(stream_url: String, seed: bool) -> Self {
        Self {
            stream_url,
            seed,
            last_completed: 0,
            last_uploaded: 0,
        }
    }

    /// The next frame, or `None` while metadata is still unresolved.
    pub fn frame(&mut self, stats: &TorrentStats, ready: bool) -> Option<String> {
        let name = stats.name.as_ref()?;

        let download_speed = stats.bytes_completed.saturating_sub(self.last_completed);
        let upload_speed = stats.bytes_uploaded.saturating_sub(self.last_uploaded);
        self.last_completed = stats.bytes_completed;
        self.last_uploaded = stats.bytes_uploaded;

        let mut out = String::new();
        out.push_str(CLEAR_SCREEN);
        let _ = writeln!(out, "{name}");
        let _ = writeln!(out, "{}", "=".repeat(name.chars().count()));
        if ready {
            let _ = writeln!(out, "Stream: \t{}", self.stream_url);
        }
        if stats.bytes_completed > 0 {
            let _ = writeln!(
                out,
                "Progress: \t{} / {}  {:.2}%",
                format_bytes(stats.bytes_completed),
                format_bytes(stats.total_length),
                stats.percentage()
            );
        }
        if stats.bytes_completed < stats.total_length {
            let _ = writeln!(out, "Download speed: {}/s", format_bytes(download_speed));
        }
        if self.seed {
            let _ = writeln!(out, "Upload speed: \t{}/s", format_bytes(upload_speed));
        }
        let _ = writeln!(out, "Connections: \t{}", stats.active_peers);
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(completed: u64) -> TorrentStats {
        TorrentStats {
            name: Some("Movie".into()),
            total_length: 2048,
            bytes_completed: completed,
            bytes_uploaded: 0,
            active_peers: 3,
        }
    }

    #[test]
    fn formats_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.50 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MiB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GiB");
    }

    #[test]
    fn nothing_before_metadata() {
        let mut renderer = Renderer::new("http://localhost:8080/".into(), false);
        assert!(renderer.frame(&TorrentStats::default(), false).is_none());
    }

    #[test]
    fn frame_shows_progress_and_speed() {
        let mut renderer = Renderer::new("http://localhost:8080/".into(), false);
        renderer.frame(&stats(512), false).unwrap();
        let frame = renderer.frame(&stats(1024), true).unwrap();

        assert!(frame.starts_with(CLEAR_SCREEN));
        assert!(frame.contains("Movie\n=====\n"));
        assert!(frame.contains("Stream: \thttp://localhost:8080/"));
        assert!(frame.contains("Progress: \t1.00 KiB / 2.00 KiB  50.00%"));
        assert!(frame.contains("Download speed: 512 B/s"));
        assert!(frame.contains("Connections: \t3"));
        assert!(!frame.contains("Upload speed"));
    }

    #[test]
    fn complete_download_hides_speed() {
        let mut renderer = Renderer::new("http://localhost:8080/".into(), true);
        let frame = renderer.frame(&stats(2048), true).unwrap();
        assert!(!frame.contains("Download speed"));
        assert!(frame.contains("Upload speed: \t0 B/s"));
    }
}

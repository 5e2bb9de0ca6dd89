use std::path::PathBuf;

use clap::Parser;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "loop-cli", version = VERSION)]
pub struct Args {
    /// Audio file to open and start playing (WAV/FLAC/MP3/AAC/ALAC/AIFF/Vorbis)
    pub path: Option<PathBuf>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// Longest source accepted, in seconds
    #[arg(long, default_value_t = 2.0)]
    pub max_duration_secs: f32,

    /// Initial output level (0.0 - 1.0)
    #[arg(long, default_value_t = 1.0)]
    pub level: f32,

    /// Play the file once and exit instead of looping it
    #[arg(long)]
    pub once: bool,

    /// Position refresh interval in milliseconds (0 disables the refresh)
    #[arg(long, default_value_t = 250)]
    pub tick_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["loop-cli"]).unwrap();
        assert!(args.path.is_none());
        assert!(!args.list_devices);
        assert!(args.device.is_none());
        assert_eq!(args.max_duration_secs, 2.0);
        assert_eq!(args.level, 1.0);
        assert!(!args.once);
        assert_eq!(args.tick_ms, 250);
    }

    #[test]
    fn parses_path_and_flags() {
        let args = Args::try_parse_from([
            "loop-cli",
            "kick.wav",
            "--device",
            "USB",
            "--level",
            "0.25",
            "--once",
            "--tick-ms",
            "0",
        ])
        .unwrap();
        assert_eq!(args.path, Some(PathBuf::from("kick.wav")));
        assert_eq!(args.device.as_deref(), Some("USB"));
        assert_eq!(args.level, 0.25);
        assert!(args.once);
        assert_eq!(args.tick_ms, 0);
    }

    #[test]
    fn rejects_non_numeric_level() {
        assert!(Args::try_parse_from(["loop-cli", "--level", "loud"]).is_err());
    }
}

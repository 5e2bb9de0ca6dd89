use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, ensure};
use loop_player::EngineConfig;

use crate::cli::Args;

/// Validated runtime settings for one `loop-cli` session.
#[derive(Clone, Debug)]
pub struct LoopCliConfig {
    pub path: Option<PathBuf>,
    pub device: Option<String>,
    pub engine: EngineConfig,
    pub level: f32,
    /// Loop the buffer (`LoopPlayer`) rather than play it once (`FileSource`).
    pub looping: bool,
    /// Position refresh period; `None` disables the refresh.
    pub tick: Option<Duration>,
}

impl LoopCliConfig {
    pub fn from_args(args: &Args) -> Result<Self> {
        ensure!(
            args.level.is_finite() && (0.0..=1.0).contains(&args.level),
            "--level must be between 0.0 and 1.0, got {}",
            args.level
        );
        let engine = EngineConfig {
            max_duration_secs: args.max_duration_secs,
            ..EngineConfig::default()
        };
        engine.validate()?;

        Ok(Self {
            path: args.path.clone(),
            device: normalize_device_name(args.device.clone()),
            engine,
            level: args.level,
            looping: !args.once,
            tick: (args.tick_ms > 0).then(|| Duration::from_millis(args.tick_ms)),
        })
    }
}

fn normalize_device_name(device: Option<String>) -> Option<String> {
    device.and_then(|name| {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(argv: &[&str]) -> Result<LoopCliConfig> {
        let mut full = vec!["loop-cli"];
        full.extend_from_slice(argv);
        LoopCliConfig::from_args(&Args::try_parse_from(full).unwrap())
    }

    #[test]
    fn defaults_loop_with_quarter_second_tick() {
        let cfg = parse(&[]).unwrap();
        assert!(cfg.looping);
        assert_eq!(cfg.tick, Some(Duration::from_millis(250)));
        assert_eq!(cfg.engine.max_duration(), Duration::from_secs(2));
    }

    #[test]
    fn once_disables_looping_and_zero_tick_disables_refresh() {
        let cfg = parse(&["--once", "--tick-ms", "0"]).unwrap();
        assert!(!cfg.looping);
        assert!(cfg.tick.is_none());
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(parse(&["--level", "1.5"]).is_err());
        assert!(parse(&["--max-duration-secs", "0"]).is_err());
    }

    #[test]
    fn normalize_device_name_trims_and_drops_empty() {
        assert_eq!(normalize_device_name(None), None);
        assert_eq!(normalize_device_name(Some("  ".to_string())), None);
        assert_eq!(
            normalize_device_name(Some("  USB DAC ".to_string())),
            Some("USB DAC".to_string())
        );
    }
}

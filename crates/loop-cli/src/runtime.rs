//! `loop-cli` runtime.
//!
//! Wires decode, the transport controller and the CPAL output together, then runs one
//! control loop selecting over:
//! - console lines read from stdin on a helper thread
//! - Ctrl-C
//! - transport events from the audio thread
//! - a position refresh tick

use std::io::{BufRead, Write};
use std::path::Path;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, select};
use loop_player::decode::{self, SourceInfo};
use loop_player::device::{self, OutputPreference};
use loop_player::playback;
use loop_player::{EngineConfig, FileSource, LoopPlayer, TransportController, TransportEvent};
use loop_player_types::TransportState;

use crate::config::LoopCliConfig;
use crate::console::{self, ConsoleCommand};

/// List output devices and print them to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    device::list_devices(&host)
}

/// Open the optional startup file, start the output stream and run the control loop
/// until `quit`, Ctrl-C, or (with `--once`) the end of the file.
pub fn run(config: LoopCliConfig) -> Result<()> {
    let level = loop_player::LevelControl::new(config.level);
    let (controller, engine) = TransportController::new(&config.engine, level)?;
    let mut session = Session::new(controller, &config);

    let mut pref = OutputPreference::default();
    if let Some(path) = config.path.as_deref() {
        pref = session.open(path)?;
    }

    let host = cpal::default_host();
    let output = playback::start_output(&host, config.device.as_deref(), pref, engine, &config.engine)?;
    tracing::info!(
        device = %output.device,
        rate_hz = output.sample_rate,
        channels = output.channels,
        "output started"
    );
    session.output_rate = Some(output.sample_rate);

    if config.path.is_some() {
        session.controller.play()?;
    }
    println!("{}", console::HELP);

    let lines = spawn_stdin_reader();
    let (quit_tx, quit_rx) = crossbeam_channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = quit_tx.try_send(());
    })
    .context("install Ctrl-C handler")?;

    let ticker = match config.tick {
        Some(period) => crossbeam_channel::tick(period),
        None => crossbeam_channel::never(),
    };
    let events = session.controller.events().clone();
    let no_lines = crossbeam_channel::never::<String>();
    let mut stdin_open = true;

    loop {
        let line_rx: &Receiver<String> = if stdin_open { &lines } else { &no_lines };
        select! {
            recv(quit_rx) -> _ => {
                tracing::info!("interrupted");
                break;
            }
            recv(line_rx) -> line => match line {
                Ok(line) => {
                    if session.handle_line(&line) == Flow::Quit {
                        break;
                    }
                }
                Err(_) => {
                    tracing::debug!("stdin closed");
                    stdin_open = false;
                }
            },
            recv(events) -> event => {
                if let Ok(event) = event {
                    if session.on_event(event) == Flow::Quit {
                        break;
                    }
                }
            }
            recv(ticker) -> _ => session.refresh(),
        }
    }

    if let Err(e) = session.controller.stop() {
        tracing::debug!(error = %e, "stop on shutdown");
    }
    drop(output);
    session.controller.collect_garbage();
    println!();
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Control-thread state for one run.
struct Session {
    controller: TransportController,
    engine: EngineConfig,
    looping: bool,
    output_rate: Option<u32>,
    last_label: String,
    /// Details of the file behind the active source.
    source_info: Option<SourceInfo>,
}

impl Session {
    fn new(controller: TransportController, config: &LoopCliConfig) -> Self {
        Self {
            controller,
            engine: config.engine.clone(),
            looping: config.looping,
            output_rate: None,
            last_label: String::new(),
            source_info: None,
        }
    }

    /// Decode `path` and hand it to the transport. Returns what the source would like
    /// from the output device.
    fn open(&mut self, path: &Path) -> Result<OutputPreference> {
        let decoded = decode::decode_file(path, self.engine.max_duration())
            .with_context(|| format!("open {}", path.display()))?;
        let buffer = decoded.buffer;
        let info = decoded.info;
        tracing::info!(
            path = %path.display(),
            codec = info.codec.as_deref().unwrap_or("unknown"),
            bit_depth = ?info.bit_depth,
            container = info.container.as_deref().unwrap_or("unknown"),
            duration_ms = ?info.duration_ms,
            "source file"
        );
        let pref = OutputPreference {
            sample_rate: Some(buffer.sample_rate()),
            channels: u16::try_from(buffer.channel_count()).ok(),
        };
        if let Some(rate) = self.output_rate.filter(|r| *r != buffer.sample_rate()) {
            tracing::warn!(
                source_rate_hz = buffer.sample_rate(),
                output_rate_hz = rate,
                "source rate differs from the running output; playback pitch will shift"
            );
        }

        let level = self.controller.level_control();
        if self.looping {
            let player = LoopPlayer::from_config(&self.engine, level).with_buffer(buffer)?;
            self.controller.open_source(player)?;
        } else {
            self.controller
                .open_source(FileSource::new(buffer, level).looping(false))?;
        }
        self.source_info = Some(info);
        Ok(pref)
    }

    fn handle_line(&mut self, line: &str) -> Flow {
        match console::parse_line(line) {
            Ok(Some(cmd)) => match self.handle(cmd) {
                Ok(flow) => flow,
                Err(e) => {
                    tracing::warn!("{e:#}");
                    Flow::Continue
                }
            },
            Ok(None) => Flow::Continue,
            Err(e) => {
                println!("{e}");
                Flow::Continue
            }
        }
    }

    fn handle(&mut self, cmd: ConsoleCommand) -> Result<Flow> {
        match cmd {
            ConsoleCommand::Open(path) => {
                self.open(&path)?;
            }
            ConsoleCommand::Play => self.controller.play()?,
            ConsoleCommand::Pause => self.controller.pause()?,
            ConsoleCommand::Stop => self.controller.stop()?,
            ConsoleCommand::Clear => {
                self.controller.clear()?;
                self.source_info = None;
            }
            ConsoleCommand::Level(level) => self.controller.set_level(level),
            ConsoleCommand::Status => {
                println!("{}", self.status_json()?);
            }
            ConsoleCommand::Help => println!("{}", console::HELP),
            ConsoleCommand::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    /// Transport snapshot plus details of the loaded file.
    fn status_json(&self) -> Result<String> {
        let mut value = serde_json::to_value(self.controller.snapshot())?;
        if let (Some(info), Some(obj)) = (&self.source_info, value.as_object_mut()) {
            obj.insert(
                "source".to_string(),
                serde_json::json!({
                    "codec": info.codec,
                    "bit_depth": info.bit_depth,
                    "container": info.container,
                    "duration_ms": info.duration_ms,
                }),
            );
        }
        Ok(serde_json::to_string_pretty(&value)?)
    }

    fn on_event(&mut self, event: TransportEvent) -> Flow {
        match event {
            TransportEvent::StateChanged { from, to } => {
                tracing::info!(%from, %to, "transport");
                println!("{to} {}", console::controls_hint(to));
                // A one-shot file that ran out ends the session.
                if !self.looping && from == TransportState::Playing && to == TransportState::Stopped {
                    return Flow::Quit;
                }
            }
            TransportEvent::SourceInstalled {
                frames,
                sample_rate,
                channels,
                looping,
            } => {
                tracing::info!(frames, rate_hz = sample_rate, channels, looping, "source installed");
            }
            TransportEvent::SourceCleared => {
                tracing::info!("source unloaded");
                println!("cleared");
            }
        }
        Flow::Continue
    }

    /// Redraw the position label when it changed.
    fn refresh(&mut self) {
        self.controller.collect_garbage();
        let status = self.controller.snapshot();
        if status.state != TransportState::Playing {
            return;
        }
        let label = console::position_label(&status);
        if label != self.last_label {
            print!("\r{label}   ");
            let _ = std::io::stdout().flush();
            self.last_label = label;
        }
    }
}

fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = crossbeam_channel::unbounded();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use loop_player::{LevelControl, OutputBlock, TransportEngine};
    use std::path::PathBuf;

    fn session(looping: bool) -> (Session, TransportEngine) {
        let engine_cfg = EngineConfig::default();
        let (controller, engine) =
            TransportController::new(&engine_cfg, LevelControl::new(1.0)).unwrap();
        let config = LoopCliConfig {
            path: None,
            device: None,
            engine: engine_cfg,
            level: 1.0,
            looping,
            tick: None,
        };
        (Session::new(controller, &config), engine)
    }

    fn write_wav(dir: &Path, frames: usize) -> PathBuf {
        let path = dir.join("loop.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..frames {
            writer.write_sample(8_192i16).unwrap();
        }
        writer.finalize().unwrap();
        path
    }

    fn render(engine: &mut TransportEngine, frames: usize) -> Vec<f32> {
        let mut data = vec![0.0f32; frames * 2];
        engine.produce_block(&mut OutputBlock::new(&mut data, 2));
        data
    }

    #[test]
    fn open_then_play_reaches_the_engine() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), 4_000);
        let (mut session, mut engine) = session(true);

        let pref = session.open(&path).unwrap();
        assert_eq!(pref.sample_rate, Some(8_000));
        assert_eq!(pref.channels, Some(1));

        assert_eq!(session.handle_line("play"), Flow::Continue);
        let out = render(&mut engine, 4);
        assert!(out.iter().all(|&s| (s - 0.25).abs() < 1e-3));
        let status = session.controller.snapshot();
        assert_eq!(status.state, TransportState::Playing);
        assert!(status.looping);
        assert_eq!(status.length_frames, 4_000);
    }

    #[test]
    fn over_long_file_is_rejected_and_session_continues() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), 24_000);
        let (mut session, _engine) = session(true);

        assert!(session.open(&path).is_err());
        let line = format!("open {}", path.display());
        assert_eq!(session.handle_line(&line), Flow::Continue);
        assert!(!session.controller.snapshot().has_source);
    }

    #[test]
    fn level_and_quit_commands() {
        let (mut session, _engine) = session(true);
        assert_eq!(session.handle_line("level 0.3"), Flow::Continue);
        assert_eq!(session.controller.snapshot().level, 0.3);
        assert_eq!(session.handle_line("bogus"), Flow::Continue);
        assert_eq!(session.handle_line("quit"), Flow::Quit);
    }

    #[test]
    fn one_shot_session_ends_when_the_file_finishes() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), 8);
        let (mut session, mut engine) = session(false);
        session.open(&path).unwrap();
        session.controller.play().unwrap();
        render(&mut engine, 64);

        let flows: Vec<Flow> = session
            .controller
            .drain_events()
            .into_iter()
            .map(|e| session.on_event(e))
            .collect();
        assert_eq!(flows.last(), Some(&Flow::Quit));
    }

    #[test]
    fn clear_command_unloads_and_play_stays_silent() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), 4_000);
        let (mut session, mut engine) = session(true);
        session.open(&path).unwrap();
        session.handle_line("play");
        render(&mut engine, 4);

        assert_eq!(session.handle_line("clear"), Flow::Continue);
        assert!(session.source_info.is_none());
        session.handle_line("play");
        let out = render(&mut engine, 4);
        assert!(out.iter().all(|&s| s == 0.0));

        let status = session.controller.snapshot();
        assert!(!status.has_source);
        assert_eq!(status.state, TransportState::Stopped);
        let events = session.controller.drain_events();
        assert!(events.contains(&TransportEvent::SourceCleared));
        assert_eq!(session.on_event(TransportEvent::SourceCleared), Flow::Continue);
    }

    #[test]
    fn status_json_includes_file_details() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), 4_000);
        let (mut session, _engine) = session(true);
        session.open(&path).unwrap();

        let json: serde_json::Value = serde_json::from_str(&session.status_json().unwrap()).unwrap();
        assert_eq!(json["state"], "stopped");
        assert_eq!(json["source"]["codec"], "PCM_S16");
        assert_eq!(json["source"]["bit_depth"], 16);
        assert_eq!(json["source"]["container"], "wav");
        assert_eq!(json["source"]["duration_ms"], 500);
    }

    #[test]
    fn looping_session_keeps_running_after_stop() {
        let (mut session, _engine) = session(true);
        let flow = session.on_event(TransportEvent::StateChanged {
            from: TransportState::Playing,
            to: TransportState::Stopped,
        });
        assert_eq!(flow, Flow::Continue);
    }
}

//! Play/pause/stop transport over a swappable [`AudioSource`].
//!
//! The transport is split in two halves created together by [`TransportController::new`]:
//!
//! - [`TransportController`] lives on the control thread. It validates sources, queues
//!   intents (open/play/pause/stop), owns the level and reads status snapshots.
//! - [`TransportEngine`] is moved into the audio callback. It owns the state machine and
//!   the active source, applies queued intents and source signals at the top of each
//!   block, renders, and publishes status.
//!
//! Control → audio traffic goes through a bounded command channel; audio → control
//! traffic goes through a bounded event channel plus a "retired sources" channel, so a
//! replaced source is freed on the control thread, never in the callback.
//!
//! ## State machine
//!
//! | State    | Entry action             | Leaves on                                   |
//! |----------|--------------------------|---------------------------------------------|
//! | Stopped  | rewind source to frame 0 | play → Starting                             |
//! | Starting | start source             | source started → Playing                    |
//! | Playing  |                          | pause → Pausing, stop → Stopping, finished → Stopped |
//! | Pausing  | halt source              | source stopped → Paused                     |
//! | Paused   |                          | play → Starting, stop → Stopped             |
//! | Stopping | halt source              | source stopped → Stopped                    |
//!
//! Clearing stops the transport the same way and then unloads the source, leaving the
//! engine idle and silent until another source is opened.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};
use loop_player_types::{PlaybackStatus, TransportState};

use crate::buffer::OutputBlock;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::gain::LevelControl;
use crate::source::AudioSource;
use crate::status::{SharedStatus, SourceFacts};

/// Notification the source wrapper raises for the state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceSignal {
    /// The source began producing audio.
    Started,
    /// The source was halted before its end.
    Stopped,
    /// A non-looping source rendered its last frame.
    Finished,
}

/// Event pushed from the audio thread to the control thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    StateChanged {
        from: TransportState,
        to: TransportState,
    },
    SourceInstalled {
        frames: u64,
        sample_rate: u32,
        channels: u32,
        looping: bool,
    },
    /// The active source was unloaded.
    SourceCleared,
}

enum Command {
    Install(Box<dyn AudioSource>),
    Clear,
    Play,
    Pause,
    Stop,
}

/// Active source plus the running flag the transport toggles.
struct TransportSource {
    slot: Option<Box<dyn AudioSource>>,
    playing: bool,
    pending: Option<SourceSignal>,
}

impl TransportSource {
    fn new() -> Self {
        Self {
            slot: None,
            playing: false,
            pending: None,
        }
    }

    fn start(&mut self) {
        if self.slot.is_some() {
            self.playing = true;
            self.pending = Some(SourceSignal::Started);
        }
    }

    fn halt(&mut self) {
        self.playing = false;
        self.pending = Some(SourceSignal::Stopped);
    }

    fn rewind(&mut self) {
        self.playing = false;
        if let Some(src) = self.slot.as_mut() {
            src.set_position(0);
        }
    }

    fn render(&mut self, out: &mut OutputBlock<'_>) {
        if !self.playing {
            out.clear();
            return;
        }
        let Some(src) = self.slot.as_mut() else {
            out.clear();
            return;
        };
        src.produce_block(out);
        if src.has_finished() {
            self.playing = false;
            self.pending = Some(SourceSignal::Finished);
        }
    }

    fn facts(&self) -> Option<SourceFacts> {
        self.slot.as_ref().map(|src| SourceFacts {
            position_frames: src.position() as u64,
            length_frames: src.total_frames() as u64,
            sample_rate: src.sample_rate(),
            channels: src.channel_count() as u32,
            looping: src.is_looping(),
        })
    }
}

/// Audio-thread half of the transport.
///
/// Every method is real-time safe: no locks, no allocation, no logging.
pub struct TransportEngine {
    state: TransportState,
    source: TransportSource,
    commands: Receiver<Command>,
    events: Sender<TransportEvent>,
    retired: Sender<Box<dyn AudioSource>>,
    status: Arc<SharedStatus>,
    prepared: Option<(usize, u32)>,
}

impl TransportEngine {
    pub fn state(&self) -> TransportState {
        self.state
    }

    /// Forwarded to the active source and remembered for sources installed later.
    pub fn prepare(&mut self, samples_per_block: usize, sample_rate: u32) {
        self.prepared = Some((samples_per_block, sample_rate));
        if let Some(src) = self.source.slot.as_mut() {
            src.prepare(samples_per_block, sample_rate);
        }
    }

    pub fn release(&mut self) {
        self.prepared = None;
        if let Some(src) = self.source.slot.as_mut() {
            src.release();
        }
    }

    /// Apply queued intents, render the active source when playing, then apply whatever
    /// the source reported while rendering.
    ///
    /// Without a source, or outside `Playing`, the active region is cleared.
    pub fn produce_block(&mut self, out: &mut OutputBlock<'_>) {
        loop {
            match self.commands.try_recv() {
                Ok(cmd) => self.apply(cmd),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }

        if self.state == TransportState::Playing {
            self.source.render(out);
        } else {
            out.clear();
        }
        self.settle();
        self.status.publish(self.state, self.source.facts());
    }

    /// Move to `new_state`, running its entry action.
    ///
    /// Re-entering the current state does nothing.
    pub fn change_state(&mut self, new_state: TransportState) {
        if self.state == new_state {
            return;
        }
        let from = self.state;
        self.state = new_state;

        match new_state {
            TransportState::Stopped => self.source.rewind(),
            TransportState::Starting => self.source.start(),
            TransportState::Playing | TransportState::Paused => {}
            TransportState::Pausing | TransportState::Stopping => self.source.halt(),
        }

        self.emit(TransportEvent::StateChanged {
            from,
            to: new_state,
        });
    }

    fn apply(&mut self, cmd: Command) {
        match cmd {
            Command::Play => {
                if self.state.can_play() && self.source.slot.is_some() {
                    self.change_state(TransportState::Starting);
                }
            }
            Command::Pause => {
                if self.state == TransportState::Playing {
                    self.change_state(TransportState::Pausing);
                }
            }
            Command::Stop => self.stop(),
            Command::Install(src) => self.install(src),
            Command::Clear => self.clear(),
        }
        self.settle();
    }

    fn stop(&mut self) {
        match self.state {
            TransportState::Stopped | TransportState::Stopping => {}
            TransportState::Paused => self.change_state(TransportState::Stopped),
            _ => self.change_state(TransportState::Stopping),
        }
    }

    fn install(&mut self, mut src: Box<dyn AudioSource>) {
        self.stop();
        self.settle();

        if let Some((block, rate)) = self.prepared {
            src.prepare(block, rate);
        }
        src.set_position(0);
        let installed = TransportEvent::SourceInstalled {
            frames: src.total_frames() as u64,
            sample_rate: src.sample_rate(),
            channels: src.channel_count() as u32,
            looping: src.is_looping(),
        };

        self.source.playing = false;
        self.source.pending = None;
        if let Some(old) = self.source.slot.replace(src) {
            self.retire(old);
        }
        self.emit(installed);
    }

    fn clear(&mut self) {
        self.stop();
        self.settle();

        self.source.playing = false;
        self.source.pending = None;
        if let Some(old) = self.source.slot.take() {
            self.retire(old);
            self.emit(TransportEvent::SourceCleared);
        }
    }

    /// Hand a replaced source back to the control thread for freeing.
    ///
    /// At most `command_capacity` sources are retired between two collections (one per
    /// queued command), which is the capacity of the retire queue.
    fn retire(&self, old: Box<dyn AudioSource>) {
        let sent = self.retired.try_send(old);
        debug_assert!(
            !matches!(sent, Err(TrySendError::Full(_))),
            "retire queue overflow; source freed on the audio thread"
        );
    }

    /// Drain source signals raised by entry actions or rendering.
    fn settle(&mut self) {
        while let Some(signal) = self.source.pending.take() {
            self.on_signal(signal);
        }
    }

    fn on_signal(&mut self, signal: SourceSignal) {
        use TransportState as S;

        let halted = matches!(signal, SourceSignal::Stopped | SourceSignal::Finished);
        let next = match self.state {
            S::Starting if signal == SourceSignal::Started => Some(S::Playing),
            // A user pause racing the natural end wins: the transport pauses.
            S::Pausing if halted => Some(S::Paused),
            S::Stopping | S::Playing if halted => Some(S::Stopped),
            _ => None,
        };
        if let Some(next) = next {
            self.change_state(next);
        }
    }

    fn emit(&self, event: TransportEvent) {
        if self.events.try_send(event).is_err() {
            self.status.record_dropped_event();
        }
    }
}

/// Control-thread half of the transport.
pub struct TransportController {
    commands: Sender<Command>,
    events: Receiver<TransportEvent>,
    retired: Receiver<Box<dyn AudioSource>>,
    status: Arc<SharedStatus>,
    level: LevelControl,
    max_duration: Duration,
    opened: bool,
}

impl TransportController {
    /// Create both halves. Move the [`TransportEngine`] into the audio callback.
    pub fn new(config: &EngineConfig, level: LevelControl) -> Result<(Self, TransportEngine)> {
        config.validate()?;
        let (cmd_tx, cmd_rx) = crossbeam_channel::bounded(config.command_capacity);
        let (event_tx, event_rx) = crossbeam_channel::bounded(config.event_capacity);
        let (retired_tx, retired_rx) = crossbeam_channel::bounded(config.command_capacity);
        let status = Arc::new(SharedStatus::default());

        let engine = TransportEngine {
            state: TransportState::Stopped,
            source: TransportSource::new(),
            commands: cmd_rx,
            events: event_tx,
            retired: retired_tx,
            status: status.clone(),
            prepared: None,
        };
        let controller = Self {
            commands: cmd_tx,
            events: event_rx,
            retired: retired_rx,
            status,
            level,
            max_duration: config.max_duration(),
            opened: false,
        };
        Ok((controller, engine))
    }

    /// Validate `source` and queue it to replace the active one.
    ///
    /// The engine stops any playback in flight before swapping. A source that fails
    /// validation is dropped here and the active source and transport state are untouched.
    pub fn open_source<S>(&mut self, source: S) -> Result<()>
    where
        S: AudioSource + 'static,
    {
        self.collect_garbage();
        if let Err(e) = source.validate(self.max_duration) {
            tracing::warn!(error = %e, "source rejected");
            return Err(e);
        }
        let frames = source.total_frames();
        let rate_hz = source.sample_rate();
        let channels = source.channel_count();
        self.send(Command::Install(Box::new(source)))?;
        self.opened = true;
        tracing::info!(frames, rate_hz, channels, "source queued");
        Ok(())
    }

    /// Stop playback and unload the active source. Later `play` calls are ignored until
    /// another source is opened.
    pub fn clear(&mut self) -> Result<()> {
        self.collect_garbage();
        self.send(Command::Clear)?;
        self.opened = false;
        tracing::info!("source cleared");
        Ok(())
    }

    /// Start or resume playback. Ignored when nothing is open or the transport cannot
    /// play from its current state.
    pub fn play(&self) -> Result<()> {
        self.collect_garbage();
        if !self.opened {
            tracing::debug!(reason = %EngineError::NoSourceLoaded, "play ignored");
            return Ok(());
        }
        self.send(Command::Play)
    }

    pub fn pause(&self) -> Result<()> {
        self.collect_garbage();
        self.send(Command::Pause)
    }

    pub fn stop(&self) -> Result<()> {
        self.collect_garbage();
        self.send(Command::Stop)
    }

    pub fn set_level(&self, level: f32) {
        self.level.set(level);
    }

    pub fn level_control(&self) -> LevelControl {
        self.level.clone()
    }

    pub fn state(&self) -> TransportState {
        self.status.state()
    }

    pub fn snapshot(&self) -> PlaybackStatus {
        self.status.snapshot(self.level.get())
    }

    /// Receiver for transport events; clone it to select on it from another loop.
    pub fn events(&self) -> &Receiver<TransportEvent> {
        &self.events
    }

    /// Events delivered since the last call.
    pub fn drain_events(&self) -> Vec<TransportEvent> {
        self.events.try_iter().collect()
    }

    /// Free sources the engine has replaced. Returns how many were dropped.
    pub fn collect_garbage(&self) -> usize {
        self.retired.try_iter().map(drop).count()
    }

    fn send(&self, cmd: Command) -> Result<()> {
        match self.commands.try_send(cmd) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                tracing::warn!("transport command queue full");
                Err(EngineError::Busy)
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::warn!("transport engine dropped");
                Err(EngineError::Busy)
            }
        }
    }
}

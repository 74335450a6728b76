//! Playback state machine.
//!
//! `Player` owns everything the render loop touches: the playlist, the
//! active step and its render state, the time source and the last published
//! status. It has no threads of its own; the executor serializes control
//! calls and ticks through a single lock.

use std::sync::Arc;

use lumina_core::config::{ClockMode, Config};
use lumina_core::{
    Command, CommandSink, Error, PlayerStatus, Playlist, Position, Result, StatusPatch,
    StatusPublisher, Step, SyncMessage, SyncState,
};
use tracing::{debug, info, trace, warn};

use crate::clock::TimeSource;
use crate::render::RenderState;

/// Playback state of the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerState {
    #[default]
    Idle,
    Playing,
    Paused,
}

#[derive(Debug)]
struct Active {
    index: usize,
    step: Arc<Step>,
    render: RenderState,
    stalled: bool,
    ended: bool,
}

pub struct Player {
    config: Config,
    playlist: Playlist,
    state: PlayerState,
    active: Option<Active>,
    clock: Box<dyn TimeSource>,
    status: PlayerStatus,
    sink: Arc<dyn CommandSink>,
    publisher: Arc<dyn StatusPublisher>,
    /// Elapsed value carried by the last status update.
    elapsed_published: u64,
    closed: bool,
}

impl Player {
    pub fn new(
        config: Config,
        playlist: Playlist,
        clock: Box<dyn TimeSource>,
        sink: Arc<dyn CommandSink>,
        publisher: Arc<dyn StatusPublisher>,
    ) -> Self {
        Self {
            config,
            playlist,
            state: PlayerState::Idle,
            active: None,
            clock,
            status: PlayerStatus::default(),
            sink,
            publisher,
            elapsed_published: 0,
            closed: false,
        }
    }

    /// Start the step at `index` from the beginning.
    pub fn play(&mut self, index: usize) -> Result<()> {
        self.ensure_open()?;

        let step = self
            .playlist
            .get(index)
            .cloned()
            .ok_or(Error::InvalidIndex {
                index,
                len: self.playlist.len(),
            })?;
        if !step.is_ready() {
            return Err(Error::StepNotReady {
                id: step.id.clone(),
                status: step.status,
            });
        }

        self.send_baseline();
        self.clock.restart();

        info!("Playing step {} {:?} (index {index})", step.id, step.title);
        let render = RenderState::new(&self.config.render, &self.config.detector, step.palette);
        let patch = StatusPatch::step_started(index, &step);
        self.active = Some(Active {
            index,
            step,
            render,
            stalled: false,
            ended: false,
        });
        self.set_state(PlayerState::Playing);
        self.elapsed_published = 0;
        self.publish(patch);
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.state != PlayerState::Playing {
            debug!("Pause ignored in state {:?}", self.state);
            return Ok(());
        }

        self.clock.hold();
        self.set_state(PlayerState::Paused);
        self.send_baseline();
        if let Some(active) = self.active.as_mut() {
            active.render.invalidate();
        }

        let elapsed_ms = self.elapsed_ms();
        self.elapsed_published = elapsed_ms;
        self.publish(
            StatusPatch::new()
                .with_playing(false)
                .with_elapsed_ms(elapsed_ms),
        );
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.active.is_none() || self.state != PlayerState::Paused {
            debug!("Resume ignored in state {:?}", self.state);
            return Ok(());
        }

        self.clock.release();
        self.set_state(PlayerState::Playing);
        self.publish(StatusPatch::new().with_playing(true));
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.send_baseline();
        self.clock.hold();

        let changed = self.active.take().is_some() || self.state != PlayerState::Idle;
        self.set_state(PlayerState::Idle);
        if changed {
            info!("Playback stopped");
            self.publish(StatusPatch::stopped());
        }
        Ok(())
    }

    /// Play the step after the active one, wrapping at the end. With nothing
    /// active the first step plays.
    pub fn next(&mut self) -> Result<()> {
        self.ensure_open()?;
        let current = self.active.as_ref().map(|a| a.index);
        let Some(index) = self.playlist.next_index(current) else {
            debug!("Next ignored: playlist is empty");
            return Ok(());
        };
        self.play(index)
    }

    /// Apply a time report from the clock master.
    pub fn sync(&mut self, message: &SyncMessage) -> Result<()> {
        self.ensure_open()?;
        if self.config.clock.mode != ClockMode::ClockMaster {
            debug!("Sync ignored: executor runs on its internal clock");
            return Ok(());
        }
        let is_active = self
            .active
            .as_ref()
            .is_some_and(|a| a.step.id == message.step_id);
        if !is_active {
            debug!("Sync for inactive step {} ignored", message.step_id);
            return Ok(());
        }

        trace!(
            "Sync {} at {} ({:?})",
            message.step_id,
            message.position(),
            message.playback_state
        );
        match message.playback_state {
            SyncState::Playing => {
                self.resume()?;
                self.clock.sync(message.position());
                if let Some(active) = self.active.as_mut() {
                    active.ended = false;
                }
                Ok(())
            }
            SyncState::Paused | SyncState::Idle => {
                self.clock.sync(message.position());
                self.pause()
            }
            SyncState::Ended => {
                self.clock.sync(message.position());
                if self.config.clock.auto_advance {
                    info!("Step {} ended, advancing", message.step_id);
                    return self.next();
                }
                if let Some(active) = self.active.as_mut() {
                    if !active.ended {
                        info!("Step {} ended", active.step.id);
                        active.ended = true;
                    }
                }
                Ok(())
            }
        }
    }

    /// Send a named effect through the same remember-then-broadcast path.
    pub fn trigger_effect(&mut self, name: &str, args: &[String]) -> Result<()> {
        self.ensure_open()?;
        let command = Command::effect(name, args.iter().cloned())?;
        info!("Triggering effect {command}");
        self.sink.send(&command);
        Ok(())
    }

    /// Replace the playlist. If the active step is gone, moved or no longer
    /// ready, playback stops.
    pub fn set_playlist(&mut self, playlist: Playlist) -> Result<()> {
        self.ensure_open()?;
        info!(
            "Playlist updated: {} steps, {} ready",
            playlist.len(),
            playlist.ready_count()
        );

        let kept = self.active.as_ref().map(|a| {
            playlist
                .get(a.index)
                .filter(|s| s.id == a.step.id && s.is_ready())
                .cloned()
        });
        self.playlist = playlist;

        match kept {
            Some(Some(step)) => {
                if let Some(active) = self.active.as_mut() {
                    active.step = step;
                }
                Ok(())
            }
            Some(None) => {
                warn!("Active step was removed or moved, stopping playback");
                self.stop()
            }
            None => Ok(()),
        }
    }

    /// Insert or replace a single step by id. Returns its index.
    pub fn upsert_step(&mut self, step: Step) -> Result<usize> {
        let mut playlist = self.playlist.clone();
        let index = playlist.upsert(step);
        self.set_playlist(playlist)?;
        Ok(index)
    }

    /// One render loop iteration.
    pub fn tick(&mut self) -> Result<()> {
        if self.closed || self.state != PlayerState::Playing {
            return Ok(());
        }

        let elapsed_ms = self.elapsed_ms();
        let stalled = self.clock.is_stalled();
        let Some(active) = self.active.as_mut() else {
            return Ok(());
        };

        if stalled != active.stalled {
            if stalled {
                warn!(
                    "No sync for step {}, holding actuators neutral",
                    active.step.id
                );
            } else {
                info!("Sync for step {} resumed", active.step.id);
            }
            active.stalled = stalled;
        }

        let duration_ms = active.step.duration_ms;
        let frame = if stalled || active.ended {
            active.render.neutral(elapsed_ms)
        } else {
            let energy = active.step.energy_at(elapsed_ms);
            let frame = active.render.tick(energy, elapsed_ms);
            if frame.peak {
                debug!("Peak at {elapsed_ms} ms -> {:?}", active.render.contour());
            }
            frame
        };

        for command in frame.commands() {
            trace!("Sending {command}");
            self.sink.send(command);
        }

        if !stalled
            && elapsed_ms.abs_diff(self.elapsed_published)
                >= self.config.status.elapsed_interval_ms()
        {
            self.elapsed_published = elapsed_ms;
            self.publish(StatusPatch::new().with_elapsed_ms(elapsed_ms));
        }

        if self.config.clock.auto_advance
            && self.config.clock.mode == ClockMode::Internal
            && duration_ms > 0
            && elapsed_ms >= duration_ms
        {
            info!("Step finished after {}", Position::from_millis(elapsed_ms));
            if let Err(e) = self.next() {
                warn!("Auto-advance failed: {e}");
                self.stop()?;
            }
        }

        Ok(())
    }

    /// Zero the actuators and refuse further control calls.
    pub fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.send_baseline();
        if self.active.take().is_some() || self.state != PlayerState::Idle {
            self.publish(StatusPatch::stopped());
        }
        self.set_state(PlayerState::Idle);
        self.closed = true;
        info!("Player closed");
    }

    pub const fn state(&self) -> PlayerState {
        self.state
    }

    pub const fn status(&self) -> &PlayerStatus {
        &self.status
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active.as_ref().map(|a| a.index)
    }

    pub const fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    pub const fn config(&self) -> &Config {
        &self.config
    }

    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Current position in the active step.
    pub fn elapsed(&self) -> Position {
        Position::from_millis(self.elapsed_ms())
    }

    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.clock.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    const fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::ExecutorClosed)
        } else {
            Ok(())
        }
    }

    fn send_baseline(&self) {
        for command in [Command::Vu(0), Command::ContourOff] {
            self.sink.send(&command);
        }
    }

    fn publish(&mut self, patch: StatusPatch) {
        self.status.apply(&patch);
        self.publisher.publish(patch);
    }

    fn set_state(&mut self, new_state: PlayerState) {
        let old_state = self.state;
        self.state = new_state;
        if old_state != new_state {
            debug!("State changed: {:?} -> {:?}", old_state, new_state);
        }
    }
}

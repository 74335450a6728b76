//! Threaded show executor.
//!
//! A dedicated render thread ticks the shared [`Player`] at a fixed rate.
//! Control calls lock the same player, so transitions never interleave with
//! a tick. Shutdown is explicit and leaves the actuators dark.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use lumina_core::{
    CommandSink, Config, Error, PlayerStatus, Playlist, Result, StatusPublisher, Step,
    SyncMessage,
};
use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::clock::{self, TimeSource};
use crate::player::{Player, PlayerState};

/// Messages for the render thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopCommand {
    /// Tick now instead of waiting for the next deadline.
    Kick,
    /// Zero the actuators and exit.
    Shutdown,
}

/// Owns the render thread and the player it drives.
pub struct Executor {
    player: Arc<Mutex<Player>>,
    command_tx: Sender<LoopCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Executor {
    /// Create an executor with the time source selected by `config.clock`.
    pub fn new(
        config: Config,
        playlist: Playlist,
        sink: Arc<dyn CommandSink>,
        publisher: Arc<dyn StatusPublisher>,
    ) -> Result<Self> {
        let clock = clock::for_config(&config.clock);
        Self::with_clock(config, playlist, clock, sink, publisher)
    }

    /// Create an executor driven by the given time source.
    pub fn with_clock(
        config: Config,
        playlist: Playlist,
        clock: Box<dyn TimeSource>,
        sink: Arc<dyn CommandSink>,
        publisher: Arc<dyn StatusPublisher>,
    ) -> Result<Self> {
        let (command_tx, command_rx) = unbounded();
        let interval = config.render.tick_interval();
        let player = Arc::new(Mutex::new(Player::new(
            config, playlist, clock, sink, publisher,
        )));

        let worker_player = player.clone();
        let handle = std::thread::Builder::new()
            .name("render-loop".to_string())
            .spawn(move || {
                let worker = RenderWorker {
                    command_rx,
                    player: worker_player,
                    interval,
                };
                worker.run();
            })
            .map_err(|e| Error::Internal(format!("Failed to spawn render thread: {e}")))?;

        Ok(Self {
            player,
            command_tx,
            worker: Mutex::new(Some(handle)),
        })
    }

    pub fn play(&self, index: usize) -> Result<()> {
        self.player.lock().play(index)?;
        self.kick();
        Ok(())
    }

    pub fn pause(&self) -> Result<()> {
        self.player.lock().pause()
    }

    pub fn resume(&self) -> Result<()> {
        self.player.lock().resume()?;
        self.kick();
        Ok(())
    }

    pub fn stop(&self) -> Result<()> {
        self.player.lock().stop()
    }

    pub fn next(&self) -> Result<()> {
        self.player.lock().next()?;
        self.kick();
        Ok(())
    }

    /// Apply a clock-master time report. Ignored unless it targets the
    /// active step.
    pub fn sync(&self, message: &SyncMessage) -> Result<()> {
        self.player.lock().sync(message)
    }

    pub fn trigger_effect(&self, name: &str, args: &[String]) -> Result<()> {
        self.player.lock().trigger_effect(name, args)
    }

    pub fn set_playlist(&self, playlist: Playlist) -> Result<()> {
        self.player.lock().set_playlist(playlist)
    }

    pub fn upsert_step(&self, step: Step) -> Result<usize> {
        self.player.lock().upsert_step(step)
    }

    /// Snapshot of the last published status.
    pub fn status(&self) -> PlayerStatus {
        self.player.lock().status().clone()
    }

    pub fn state(&self) -> PlayerState {
        self.player.lock().state()
    }

    pub fn playlist(&self) -> Playlist {
        self.player.lock().playlist().clone()
    }

    /// Stop the render thread, zero the actuators and wait for the thread to
    /// exit. Control calls fail with [`Error::ExecutorClosed`] afterwards.
    pub fn shutdown(&self) -> Result<()> {
        let Some(handle) = self.worker.lock().take() else {
            return Ok(());
        };
        // The worker may already be gone; it closes the player either way
        let _ = self.command_tx.send(LoopCommand::Shutdown);
        handle
            .join()
            .map_err(|_| Error::Internal("Render thread panicked".into()))?;
        // Covers a worker that exited without reaching its own cleanup
        self.player.lock().shutdown();
        Ok(())
    }

    fn kick(&self) {
        let _ = self.command_tx.send(LoopCommand::Kick);
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!("Executor shutdown failed: {e}");
        }
    }
}

/// Render thread state.
struct RenderWorker {
    command_rx: Receiver<LoopCommand>,
    player: Arc<Mutex<Player>>,
    interval: Duration,
}

impl RenderWorker {
    fn run(self) {
        info!(
            "Render loop started ({} ms per tick)",
            self.interval.as_millis()
        );
        let mut deadline = Instant::now() + self.interval;

        loop {
            let timeout = deadline.saturating_duration_since(Instant::now());
            match self.command_rx.recv_timeout(timeout) {
                Ok(LoopCommand::Kick) => self.tick(),
                Ok(LoopCommand::Shutdown) => {
                    info!("Render loop shutting down");
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {
                    self.tick();
                    deadline += self.interval;
                    let now = Instant::now();
                    if deadline < now {
                        // Overran: drop the missed ticks rather than bursting
                        debug!("Render loop behind by {:?}", now - deadline);
                        deadline = now + self.interval;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("Command channel closed, shutting down");
                    break;
                }
            }
        }

        self.player.lock().shutdown();
    }

    fn tick(&self) {
        match catch_unwind(AssertUnwindSafe(|| self.player.lock().tick())) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Render tick failed: {e}"),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!("Render tick panicked: {message}");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::testing::{RecordingPublisher, RecordingSink};
    use lumina_core::{Command, CommandKind};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn executor(steps: Vec<Step>) -> (Executor, ManualClock, Arc<RecordingSink>) {
        let clock = ManualClock::new();
        let sink = Arc::new(RecordingSink::default());
        let executor = Executor::with_clock(
            Config::default(),
            Playlist::from_steps(steps),
            Box::new(clock.clone()),
            sink.clone(),
            Arc::new(RecordingPublisher::default()),
        )
        .unwrap();
        (executor, clock, sink)
    }

    fn loud(id: &str) -> Step {
        Step::ready(id, id, vec![0.9; 500], 20)
    }

    #[test]
    fn test_render_thread_ticks() {
        let (executor, clock, sink) = executor(vec![loud("a"), loud("b")]);
        executor.play(0).unwrap();
        clock.set_millis(100);
        std::thread::sleep(Duration::from_millis(100));

        assert!(sink.sent().iter().any(|c| matches!(c, Command::Vu(l) if *l > 0)));
        assert_eq!(executor.state(), PlayerState::Playing);
        assert_eq!(executor.status().active_index, 0);
        executor.shutdown().unwrap();
    }

    #[test]
    fn test_stop_then_shutdown_leaves_actuators_dark() {
        let (executor, _clock, sink) = executor(vec![loud("a"), loud("b")]);
        executor.play(0).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        executor.stop().unwrap();
        assert!(!executor.status().is_playing);

        executor.shutdown().unwrap();
        let lines = sink.lines();
        let tail = &lines[lines.len() - 2..];
        assert_eq!(tail, ["VU:0", "CT:OFF"]);

        // No emission after shutdown completes
        let count = sink.sent().len();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(sink.sent().len(), count);
    }

    #[test]
    fn test_control_after_shutdown_fails() {
        let (executor, _clock, _sink) = executor(vec![loud("a")]);
        executor.shutdown().unwrap();
        executor.shutdown().unwrap();
        assert!(matches!(executor.play(0), Err(Error::ExecutorClosed)));
        assert!(matches!(executor.pause(), Err(Error::ExecutorClosed)));
    }

    /// Sink whose driver panics on the next `panics` broadcasts.
    #[derive(Default)]
    struct PanickingSink {
        inner: RecordingSink,
        panics: AtomicUsize,
    }

    impl CommandSink for PanickingSink {
        fn broadcast(&self, command: &Command) {
            let armed = self
                .panics
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if armed {
                panic!("actuator driver crashed");
            }
            self.inner.broadcast(command);
        }

        fn remember_last(&self, kind: CommandKind, command: &Command) {
            self.inner.remember_last(kind, command);
        }
    }

    #[test]
    fn test_panicking_tick_keeps_loop_running() {
        let clock = ManualClock::new();
        let sink = Arc::new(PanickingSink::default());
        let executor = Executor::with_clock(
            Config::default(),
            Playlist::from_steps(vec![loud("a")]),
            Box::new(clock.clone()),
            sink.clone(),
            Arc::new(RecordingPublisher::default()),
        )
        .unwrap();

        executor.play(0).unwrap();
        let before = sink.inner.sent().len();
        sink.panics.store(1, Ordering::SeqCst);
        for i in 1..=20 {
            clock.set_millis(i * 50);
            std::thread::sleep(Duration::from_millis(20));
        }

        assert_eq!(sink.panics.load(Ordering::SeqCst), 0);
        // Contour resends keep flowing after the panic
        assert!(sink.inner.sent().len() > before);
        assert_eq!(executor.state(), PlayerState::Playing);
        executor.stop().unwrap();
        executor.shutdown().unwrap();
    }

    #[test]
    fn test_rejected_play_surfaces_error() {
        let (executor, _clock, sink) = executor(vec![loud("a")]);
        let err = executor.play(3).unwrap_err();
        assert!(err.is_user_facing());
        assert!(sink.sent().is_empty());
        assert_eq!(executor.state(), PlayerState::Idle);
    }
}

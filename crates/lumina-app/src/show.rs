//! Wiring of executor, actuators and status observers.

use std::sync::Arc;

use lumina_core::{CommandSink, Config, Error, Playlist, Result, StatusPublisher};
use lumina_devices::{resolve_addr, DeviceHub};
use lumina_engine::Executor;
use lumina_status::{StatusEvent, StatusHub};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::control::{ControlCommand, HELP};

/// What the control loop should do after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Done,
    Text(String),
    Quit,
}

/// A running show.
pub struct Show {
    config: Config,
    executor: Executor,
    devices: Arc<DeviceHub>,
    status: Arc<StatusHub>,
}

impl Show {
    /// Bind the actuator transport, load the playlist and start the render
    /// loop.
    pub fn start(config: Config) -> Result<Self> {
        let devices = Arc::new(DeviceHub::from_config(&config.devices)?);
        Self::with_devices(config, devices)
    }

    pub fn with_devices(config: Config, devices: Arc<DeviceHub>) -> Result<Self> {
        let playlist = load_playlist(&config)?;
        let status = Arc::new(StatusHub::new());

        let sink: Arc<dyn CommandSink> = devices.clone();
        let publisher: Arc<dyn StatusPublisher> = status.clone();
        let executor = Executor::new(config.clone(), playlist, sink, publisher)?;

        info!(
            "Show ready: {:?} clock, {} actuators",
            config.clock.mode,
            devices.len()
        );
        Ok(Self {
            config,
            executor,
            devices,
            status,
        })
    }

    pub fn execute(&self, command: ControlCommand) -> Result<Reply> {
        debug!("Control command {command:?}");
        match command {
            ControlCommand::Play(index) => self.executor.play(index)?,
            ControlCommand::Pause => self.executor.pause()?,
            ControlCommand::Resume => self.executor.resume()?,
            ControlCommand::Stop => self.executor.stop()?,
            ControlCommand::Next => self.executor.next()?,
            ControlCommand::Sync(message) => self.executor.sync(&message)?,
            ControlCommand::Effect { name, args } => self.executor.trigger_effect(&name, &args)?,
            ControlCommand::Connect { id, addr } => {
                let addr = resolve_addr(&addr)?;
                self.devices.connect(&id, None, addr);
            }
            ControlCommand::Disconnect(id) => {
                if !self.devices.disconnect(&id) {
                    return Err(Error::Device(format!("No actuator named {id}")));
                }
            }
            ControlCommand::Devices => {
                return Ok(Reply::Text(serde_json::to_string_pretty(
                    &self.devices.actuators(),
                )?));
            }
            ControlCommand::Status => {
                return Ok(Reply::Text(serde_json::to_string_pretty(
                    &self.status.snapshot(),
                )?));
            }
            ControlCommand::Reload => {
                let playlist = load_playlist(&self.config)?;
                let summary = format!(
                    "{} steps, {} ready",
                    playlist.len(),
                    playlist.ready_count()
                );
                self.executor.set_playlist(playlist)?;
                return Ok(Reply::Text(summary));
            }
            ControlCommand::Help => return Ok(Reply::Text(HELP.to_string())),
            ControlCommand::Quit => return Ok(Reply::Quit),
        }
        Ok(Reply::Done)
    }

    /// Log status events as they are published.
    pub fn spawn_status_observer(&self) -> JoinHandle<()> {
        let (snapshot, mut rx) = self.status.subscribe_with_snapshot();
        tokio::spawn(async move {
            if let Ok(json) = StatusEvent::Snapshot(snapshot).to_json() {
                debug!("status {json}");
            }
            loop {
                match rx.recv().await {
                    Ok(patch) => {
                        let transition = patch.is_playing.is_some() || patch.active_index.is_some();
                        match StatusEvent::Status(patch).to_json() {
                            Ok(json) if transition => info!("status {json}"),
                            Ok(json) => debug!("status {json}"),
                            Err(e) => warn!("Cannot encode status: {e}"),
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Status observer lagged, {skipped} updates skipped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    pub fn status(&self) -> &StatusHub {
        &self.status
    }

    pub fn devices(&self) -> &DeviceHub {
        &self.devices
    }

    /// Stop the render loop and leave every actuator dark.
    pub fn shutdown(&self) -> Result<()> {
        self.executor.shutdown()
    }
}

fn load_playlist(config: &Config) -> Result<Playlist> {
    let Some(path) = &config.playlist else {
        return Ok(Playlist::new());
    };
    let playlist = Playlist::load(path)
        .map_err(|e| Error::Config(format!("Cannot load playlist {}: {e}", path.display())))?;
    info!(
        "Loaded playlist {} ({} steps, {} ready)",
        path.display(),
        playlist.len(),
        playlist.ready_count()
    );
    Ok(playlist)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use lumina_devices::UdpTransport;
    use std::time::Duration;

    fn show_with_playlist(name: &str, json: &str) -> (Show, std::path::PathBuf) {
        let dir = std::env::temp_dir().join(format!("lumina-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("playlist.json");
        std::fs::write(&path, json).unwrap();

        let config = Config {
            playlist: Some(path.clone()),
            ..Config::default()
        };
        let transport = UdpTransport::bind("127.0.0.1:0", Duration::from_millis(20)).unwrap();
        let devices = Arc::new(DeviceHub::new(Arc::new(transport), 3));
        (Show::with_devices(config, devices).unwrap(), dir)
    }

    const PLAYLIST: &str = r#"{"steps":[
        {"id":"a","title":"Opening","status":"ready","energyEnvelope":[0.2,0.9,0.4],"energyFrameMs":20},
        {"id":"b","title":"Talk","type":"presentation"}
    ]}"#;

    #[test]
    fn test_play_and_reject() {
        let (show, dir) = show_with_playlist("play", PLAYLIST);

        assert_eq!(show.execute(ControlCommand::Play(0)).unwrap(), Reply::Done);
        assert!(show.status().status().is_playing);

        let err = show.execute(ControlCommand::Play(1)).unwrap_err();
        assert!(matches!(err, Error::StepNotReady { .. }));
        assert_eq!(show.status().status().active_index, 0);

        show.execute(ControlCommand::Stop).unwrap();
        assert!(!show.status().status().is_playing);

        show.shutdown().unwrap();
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_device_commands() {
        let (show, dir) = show_with_playlist("devices", PLAYLIST);

        show.execute(ControlCommand::Connect {
            id: "right".into(),
            addr: "127.0.0.1:7777".into(),
        })
        .unwrap();
        let Reply::Text(json) = show.execute(ControlCommand::Devices).unwrap() else {
            panic!("devices should print a listing");
        };
        assert!(json.contains("\"right\""));

        show.execute(ControlCommand::Disconnect("right".into())).unwrap();
        assert!(show.execute(ControlCommand::Disconnect("right".into())).is_err());
        assert!(show.devices().is_empty());

        show.shutdown().unwrap();
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_reload_and_quit() {
        let (show, dir) = show_with_playlist("reload", PLAYLIST);
        assert_eq!(
            show.execute(ControlCommand::Reload).unwrap(),
            Reply::Text("2 steps, 1 ready".into())
        );
        assert_eq!(show.execute(ControlCommand::Quit).unwrap(), Reply::Quit);

        show.shutdown().unwrap();
        assert!(matches!(
            show.execute(ControlCommand::Pause),
            Err(Error::ExecutorClosed)
        ));
        std::fs::remove_dir_all(dir).unwrap();
    }
}

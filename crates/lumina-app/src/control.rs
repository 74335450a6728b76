//! Line-based operator commands.

use std::str::FromStr;

use lumina_core::{Error, Result, SyncMessage, SyncState};

pub const HELP: &str = "\
commands:
  play <index>                                  start a step
  pause | resume | stop | next
  sync <stepId> <seconds> <duration> <state>    clock-master report (playing|paused|ended|idle)
  fx <NAME>[:<ARG>...]                          trigger an effect
  connect <id> <addr>                           register an actuator
  disconnect <id>
  devices | status | reload | help | quit";

/// One operator command.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    Play(usize),
    Pause,
    Resume,
    Stop,
    Next,
    Sync(SyncMessage),
    Effect { name: String, args: Vec<String> },
    Connect { id: String, addr: String },
    Disconnect(String),
    Devices,
    Status,
    Reload,
    Help,
    Quit,
}

fn usage(text: &str) -> Error {
    Error::Protocol(format!("usage: {text}"))
}

impl FromStr for ControlCommand {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((head, rest)) = words.split_first() else {
            return Err(Error::Protocol("empty command".into()));
        };

        let command = match (head.to_ascii_lowercase().as_str(), rest) {
            ("play", [index]) => Self::Play(
                index
                    .parse()
                    .map_err(|_| Error::Protocol(format!("not a step index: {index}")))?,
            ),
            ("play", _) => return Err(usage("play <index>")),
            ("pause", []) => Self::Pause,
            ("resume", []) => Self::Resume,
            ("stop", []) => Self::Stop,
            ("next", []) => Self::Next,
            ("sync", [step_id, seconds, duration, state]) => {
                let seconds: f64 = seconds
                    .parse()
                    .map_err(|_| Error::Protocol(format!("not a time: {seconds}")))?;
                let duration: f64 = duration
                    .parse()
                    .map_err(|_| Error::Protocol(format!("not a duration: {duration}")))?;
                let state: SyncState = state.parse()?;
                Self::Sync(SyncMessage::new(*step_id, seconds, duration, state))
            }
            ("sync", _) => return Err(usage("sync <stepId> <seconds> <duration> <state>")),
            ("fx", [effect]) => {
                let mut parts = effect.split(':').map(str::to_string);
                let name = parts.next().unwrap_or_default();
                Self::Effect {
                    name,
                    args: parts.collect(),
                }
            }
            ("fx", _) => return Err(usage("fx <NAME>[:<ARG>...]")),
            ("connect", [id, addr]) => Self::Connect {
                id: (*id).to_string(),
                addr: (*addr).to_string(),
            },
            ("connect", _) => return Err(usage("connect <id> <addr>")),
            ("disconnect", [id]) => Self::Disconnect((*id).to_string()),
            ("disconnect", _) => return Err(usage("disconnect <id>")),
            ("devices", []) => Self::Devices,
            ("status", []) => Self::Status,
            ("reload", []) => Self::Reload,
            ("help" | "?", []) => Self::Help,
            ("quit" | "exit", []) => Self::Quit,
            (other, _) => {
                return Err(Error::Protocol(format!(
                    "unknown command {other:?} (try \"help\")"
                )))
            }
        };
        Ok(command)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_transport_commands() {
        assert_eq!("play 2".parse::<ControlCommand>().unwrap(), ControlCommand::Play(2));
        assert_eq!("  PAUSE ".parse::<ControlCommand>().unwrap(), ControlCommand::Pause);
        assert_eq!("next".parse::<ControlCommand>().unwrap(), ControlCommand::Next);
        assert_eq!("quit".parse::<ControlCommand>().unwrap(), ControlCommand::Quit);
    }

    #[test]
    fn test_parse_sync() {
        let command: ControlCommand = "sync s1 12.5 180 playing".parse().unwrap();
        assert_eq!(
            command,
            ControlCommand::Sync(SyncMessage::new("s1", 12.5, 180.0, SyncState::Playing))
        );
        assert!("sync s1 12.5 180 rewinding".parse::<ControlCommand>().is_err());
        assert!("sync s1 soon 180 playing".parse::<ControlCommand>().is_err());
    }

    #[test]
    fn test_parse_effect() {
        assert_eq!(
            "fx DRAW:EYES:ON".parse::<ControlCommand>().unwrap(),
            ControlCommand::Effect {
                name: "DRAW".into(),
                args: vec!["EYES".into(), "ON".into()]
            }
        );
        assert_eq!(
            "fx STAR".parse::<ControlCommand>().unwrap(),
            ControlCommand::Effect {
                name: "STAR".into(),
                args: vec![]
            }
        );
    }

    #[test]
    fn test_parse_devices() {
        assert_eq!(
            "connect right 192.168.0.41".parse::<ControlCommand>().unwrap(),
            ControlCommand::Connect {
                id: "right".into(),
                addr: "192.168.0.41".into()
            }
        );
        assert_eq!(
            "disconnect right".parse::<ControlCommand>().unwrap(),
            ControlCommand::Disconnect("right".into())
        );
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        for line in ["", "play", "play -1", "play one", "pause now", "fx", "dance"] {
            assert!(line.parse::<ControlCommand>().is_err(), "{line:?} should not parse");
        }
    }
}

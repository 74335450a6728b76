//! Device commands and their line-oriented wire format.
//!
//! ```text
//! VU:<level>             set meter level
//! CT:SOLID:<hue 0..255>  set contour to a solid color
//! CT:OFF                 disable contour
//! FX:<NAME>[:<ARG>...]   trigger a named effect
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Which last-known slot a command occupies on the device side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CommandKind {
    Contour,
    Vu,
    Effect,
}

impl CommandKind {
    /// Replay order for a freshly connected actuator.
    pub const ALL: [Self; 3] = [Self::Contour, Self::Vu, Self::Effect];
}

/// A single instruction for the actuators.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Command {
    /// Set the meter level.
    Vu(u16),
    /// Set the contour to a solid hue.
    ContourSolid(u8),
    /// Disable the contour.
    ContourOff,
    /// Trigger a named firmware effect.
    EffectTrigger { name: String, args: Vec<String> },
}

impl Command {
    /// Build an effect trigger, rejecting names and arguments that would
    /// break the line framing.
    pub fn effect<I, S>(name: impl Into<String>, args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        let args: Vec<String> = args.into_iter().map(Into::into).collect();

        for part in std::iter::once(&name).chain(args.iter()) {
            if part.is_empty() || part.contains(':') || part.chars().any(char::is_whitespace) {
                return Err(Error::Protocol(format!("invalid effect token: {part:?}")));
            }
        }

        Ok(Self::EffectTrigger { name, args })
    }

    pub const fn kind(&self) -> CommandKind {
        match self {
            Self::Vu(_) => CommandKind::Vu,
            Self::ContourSolid(_) | Self::ContourOff => CommandKind::Contour,
            Self::EffectTrigger { .. } => CommandKind::Effect,
        }
    }

    /// Serialize to a single wire line (no terminator).
    pub fn to_line(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vu(level) => write!(f, "VU:{level}"),
            Self::ContourSolid(hue) => write!(f, "CT:SOLID:{hue}"),
            Self::ContourOff => f.write_str("CT:OFF"),
            Self::EffectTrigger { name, args } => {
                write!(f, "FX:{name}")?;
                for arg in args {
                    write!(f, ":{arg}")?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for Command {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let line = s.trim();
        let mut parts = line.split(':');

        match (parts.next(), parts.next()) {
            (Some("VU"), Some(level)) if parts.next().is_none() => level
                .parse::<u16>()
                .map(Self::Vu)
                .map_err(|e| Error::Protocol(format!("bad VU level in {line:?}: {e}"))),
            (Some("CT"), Some("OFF")) if parts.next().is_none() => Ok(Self::ContourOff),
            (Some("CT"), Some("SOLID")) => match (parts.next(), parts.next()) {
                (Some(hue), None) => hue
                    .parse::<u8>()
                    .map(Self::ContourSolid)
                    .map_err(|e| Error::Protocol(format!("bad contour hue in {line:?}: {e}"))),
                _ => Err(Error::Protocol(format!("malformed contour command: {line:?}"))),
            },
            (Some("FX"), Some(name)) => Self::effect(name, parts),
            _ => Err(Error::Protocol(format!("unknown command: {line:?}"))),
        }
    }
}

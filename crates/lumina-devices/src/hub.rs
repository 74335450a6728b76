//! Actuator registry with last-known command replay.

use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use lumina_core::config::DeviceConfig;
use lumina_core::{Command, CommandKind, CommandSink, Error, Result};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::transport::{Transport, UdpTransport};

/// Port actuator firmware listens on when none is given.
pub const DEFAULT_PORT: u16 = 7777;

/// Parse `host:port`, a bare IP (default port) or a resolvable host name.
pub fn resolve_addr(addr: &str) -> Result<SocketAddr> {
    let addr = addr.trim();
    if addr.is_empty() {
        return Err(Error::Device("Empty actuator address".into()));
    }
    if let Ok(socket) = addr.parse::<SocketAddr>() {
        return Ok(socket);
    }
    if let Ok(ip) = addr.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }
    let with_port = if addr.contains(':') {
        addr.to_string()
    } else {
        format!("{addr}:{DEFAULT_PORT}")
    };
    with_port
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| Error::Device(format!("Cannot resolve actuator address {addr:?}")))
}

/// Point-in-time view of a registered actuator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActuatorInfo {
    pub id: String,
    pub name: String,
    pub addr: SocketAddr,
    pub online: bool,
    /// Consecutive failed sends.
    pub failures: u32,
    pub last_sent_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct Actuator {
    name: String,
    addr: SocketAddr,
    online: bool,
    failures: u32,
    last_sent_at: Option<DateTime<Utc>>,
}

/// Fan-out of device commands to every connected actuator.
///
/// Each target is sent to independently: a failing or slow actuator costs at
/// most one send timeout and never stops delivery to the rest.
pub struct DeviceHub {
    transport: Arc<dyn Transport>,
    actuators: DashMap<String, Actuator>,
    last_known: Mutex<BTreeMap<CommandKind, Command>>,
    offline_after: u32,
}

impl DeviceHub {
    pub fn new(transport: Arc<dyn Transport>, offline_after: u32) -> Self {
        Self {
            transport,
            actuators: DashMap::new(),
            last_known: Mutex::new(BTreeMap::new()),
            offline_after: offline_after.max(1),
        }
    }

    /// Bind the UDP transport and register the configured actuators.
    pub fn from_config(config: &DeviceConfig) -> Result<Self> {
        let transport = UdpTransport::bind(&config.bind, config.send_timeout())?;
        let hub = Self::new(Arc::new(transport), config.offline_after);
        for actuator in &config.actuators {
            let addr = resolve_addr(&actuator.addr)?;
            hub.connect(&actuator.id, actuator.name.clone(), addr);
        }
        Ok(hub)
    }

    /// Register (or re-register) an actuator and bring it up to date by
    /// replaying the last contour, VU and effect commands.
    pub fn connect(&self, id: &str, name: Option<String>, addr: SocketAddr) {
        let mut actuator = Actuator {
            name: name.unwrap_or_else(|| id.to_string()),
            addr,
            online: true,
            failures: 0,
            last_sent_at: None,
        };

        // Held until the actuator is registered: a concurrent send either
        // lands in the replay or reaches the actuator through broadcast.
        let last_known = self.last_known.lock();
        let replay: Vec<&Command> = CommandKind::ALL
            .iter()
            .filter_map(|kind| last_known.get(kind))
            .collect();
        for command in &replay {
            self.deliver(id, &mut actuator, command);
        }
        let replayed = replay.len();
        self.actuators.insert(id.to_string(), actuator);
        drop(last_known);

        info!(
            "Actuator {id} connected at {addr} ({replayed} commands replayed, {} connected)",
            self.actuators.len()
        );
    }

    /// Remove an actuator. Returns whether it was registered.
    pub fn disconnect(&self, id: &str) -> bool {
        let removed = self.actuators.remove(id).is_some();
        if removed {
            info!(
                "Actuator {id} disconnected ({} connected)",
                self.actuators.len()
            );
        }
        removed
    }

    /// Snapshot of all actuators, ordered by id.
    pub fn actuators(&self) -> Vec<ActuatorInfo> {
        let mut list: Vec<ActuatorInfo> = self
            .actuators
            .iter()
            .map(|entry| {
                let a = entry.value();
                ActuatorInfo {
                    id: entry.key().clone(),
                    name: a.name.clone(),
                    addr: a.addr,
                    online: a.online,
                    failures: a.failures,
                    last_sent_at: a.last_sent_at,
                }
            })
            .collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    /// Last command of `kind` sent through the hub.
    pub fn last_known(&self, kind: CommandKind) -> Option<Command> {
        self.last_known.lock().get(&kind).cloned()
    }

    pub fn len(&self) -> usize {
        self.actuators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actuators.is_empty()
    }

    fn deliver(&self, id: &str, actuator: &mut Actuator, command: &Command) {
        let line = command.to_line();
        match self.transport.send_to(actuator.addr, line.as_bytes()) {
            Ok(()) => {
                if !actuator.online {
                    info!("Actuator {id} is back online");
                }
                actuator.online = true;
                actuator.failures = 0;
                actuator.last_sent_at = Some(Utc::now());
            }
            Err(e) => {
                actuator.failures = actuator.failures.saturating_add(1);
                warn!("Send {line} to {id} ({}) failed: {e}", actuator.addr);
                if actuator.online && actuator.failures >= self.offline_after {
                    actuator.online = false;
                    warn!(
                        "Actuator {id} marked offline after {} failed sends",
                        actuator.failures
                    );
                }
            }
        }
    }
}

impl CommandSink for DeviceHub {
    fn broadcast(&self, command: &Command) {
        for mut entry in self.actuators.iter_mut() {
            let (id, actuator) = entry.pair_mut();
            self.deliver(id, actuator, command);
        }
    }

    fn remember_last(&self, kind: CommandKind, command: &Command) {
        debug!("Last {kind:?} command is now {command}");
        self.last_known.lock().insert(kind, command.clone());
    }
}

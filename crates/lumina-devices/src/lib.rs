//! # lumina-devices
//!
//! Delivery of device commands to the show's actuators.
//!
//! Actuators are stateless: they keep no memory of earlier commands and
//! never acknowledge. The hub therefore remembers the last command of each
//! kind and replays it whenever an actuator (re)connects.

pub mod hub;
pub mod transport;

pub use hub::{resolve_addr, ActuatorInfo, DeviceHub, DEFAULT_PORT};
pub use transport::{Transport, UdpTransport};

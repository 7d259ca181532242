pub mod clock;
pub mod connection;
pub mod engine;
pub mod hub;
pub mod rest;

pub use clock::SessionClock;
pub use connection::{ConnectionMachine, ConnectionState};
pub use engine::{EngineCommand, SessionEngine};
pub use hub::EventHub;
pub use rest::{RestMonitor, RestMonitorConfig};

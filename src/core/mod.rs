//! Core functionality for the Genial T31 bridge
//! Frame decoding, the connection session, and the supervisor that keeps it alive.

pub mod bluetooth;
pub mod codec;
pub mod sensor;
pub mod session;
pub mod supervisor;

// Re-export commonly used types
pub use codec::Reading;
pub use sensor::{Sensor, SensorKind};
pub use session::Session;
pub use supervisor::{DeviceSnapshot, Supervisor, SupervisorCommand};

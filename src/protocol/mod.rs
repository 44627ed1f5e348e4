//! Transmitter wire protocol: envelope reassembly and payload decoding.

pub mod packet;
pub mod reading;
pub mod sensor;
pub mod serial;


pub use packet::{reassemble, DevicePacket, Progress, Reassembler};
pub use reading::DeviceReading;
pub use sensor::{SensorPayload, SensorReading, SensorStatus};
pub use serial::SerialNumber;

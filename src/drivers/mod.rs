//! Actuator drivers and the Linux bus back-ends they run on.

pub mod fan;
pub mod relay;
pub mod spidev;
pub mod sysfs;

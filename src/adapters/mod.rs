//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter        | Implements         | Connects to                  |
//! |----------------|--------------------|------------------------------|
//! | `hardware`     | SensorPort         | sensor MCU, SPI thermocouple |
//! |                | ActuatorPort       | relays and fan PWM           |
//! | `simulated`    | SensorPort         | in-memory thermal model      |
//! |                | ActuatorPort       |                              |
//! | `serial_link`  | SensorPort         | `get_temp` / `get_weight`    |
//! | `transport`    | Transport          | UART via `serialport`        |
//! | `time`         | Ticker             | `std::thread::sleep`         |

pub mod hardware;
pub mod serial_link;
pub mod simulated;
pub mod time;
pub mod transport;

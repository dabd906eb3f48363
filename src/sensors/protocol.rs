//! Line protocol spoken by the sensor microcontroller.
//!
//! ```text
//!   host ──▶ "get_temp\n"     mcu ──▶ "TEMP:123.5\r\n"
//!   host ──▶ "get_weight\n"   mcu ──▶ "KG:71.20\r\n"
//! ```

use crate::error::SensorError;

/// Temperature request.
pub const TEMP_REQUEST: &[u8] = b"get_temp\n";
/// Weight request.
pub const WEIGHT_REQUEST: &[u8] = b"get_weight\n";
/// Label of a temperature reply.
pub const TEMP_LABEL: &str = "TEMP";
/// Label of a weight reply.
pub const WEIGHT_LABEL: &str = "KG";

/// Longest reply line accepted before it is treated as garbage.
pub const MAX_REPLY_LEN: usize = 64;

/// Parse one reply line of the form `<LABEL>:<value>`.
///
/// Surrounding whitespace (including the `\r\n` terminator) is ignored.
/// Anything else (wrong label, extra fields, non-numeric or non-finite
/// values) is `Malformed`.
pub fn parse_reply(line: &str, label: &str) -> Result<f32, SensorError> {
    let line = line.trim();
    if line.len() > MAX_REPLY_LEN {
        return Err(SensorError::Malformed);
    }
    let mut parts = line.split(':');
    let (Some(head), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(SensorError::Malformed);
    };
    if head.trim() != label {
        return Err(SensorError::Malformed);
    }
    let value: f32 = value.trim().parse().map_err(|_| SensorError::Malformed)?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SensorError::Malformed)
    }
}

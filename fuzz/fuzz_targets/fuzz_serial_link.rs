//! Fuzz target: `SerialSensorLink::query`
//!
//! Plays arbitrary bytes back as the MCU's reply, in small chunks, and
//! asserts that the link never panics and only returns finite values.
//!
//! cargo fuzz run fuzz_serial_link

#![no_main]

use std::time::Duration;

use bakhoor::adapters::serial_link::SerialSensorLink;
use bakhoor::adapters::transport::Transport;
use bakhoor::sensors::protocol::{TEMP_LABEL, TEMP_REQUEST};
use libfuzzer_sys::fuzz_target;

struct Replay<'a> {
    reply: &'a [u8],
    requested: bool,
}

impl Transport for Replay<'_> {
    type Error = ();

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ()> {
        if !self.requested {
            return Ok(0);
        }
        // First byte of the remaining input picks the chunk size.
        let chunk = usize::from(self.reply.first().copied().unwrap_or(0) % 7) + 1;
        let n = chunk.min(buf.len()).min(self.reply.len());
        buf[..n].copy_from_slice(&self.reply[..n]);
        self.reply = &self.reply[n..];
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, ()> {
        self.requested = true;
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), ()> {
        Ok(())
    }
}

fuzz_target!(|data: &[u8]| {
    let transport = Replay {
        reply: data,
        requested: false,
    };
    let mut link = SerialSensorLink::new(transport, Duration::ZERO);
    if let Ok(value) = link.query(TEMP_REQUEST, TEMP_LABEL) {
        assert!(value.is_finite());
    }
});

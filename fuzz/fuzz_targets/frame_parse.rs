//! Fuzz target for Frame::parse and Inbound::from_frame
//!
//! Arbitrary bytes are interpreted as UTF-8 (lossily) and parsed as a frame,
//! then classified. Finds:
//! - Parser panics on deeply nested or oversized JSON
//! - Frames accepted without a string `type`
//! - Classification panics on unexpected field shapes
//!
//! The fuzzer should NEVER panic. All invalid inputs should return an error.

#![no_main]

use libfuzzer_sys::fuzz_target;
use vex_proto::{Frame, Inbound};

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);

    if let Ok(frame) = Frame::parse(&text) {
        // Invariant: a parsed frame always has a type
        assert!(frame.get("type").is_some_and(serde_json::Value::is_string));

        let _ = Inbound::from_frame(&frame);
        let _ = frame.transmission_id();

        // Re-serializing a parsed frame parses again
        assert!(Frame::parse(&frame.to_string()).is_ok());
    }
});

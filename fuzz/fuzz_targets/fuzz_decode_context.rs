#![no_main]
use libfuzzer_sys::fuzz_target;
use prewarm_ipc::{EnvMode, LaunchContext, LaunchResult};
use std::io::Cursor;

fuzz_target!(|data: &[u8]| {
    // Expectation: never panic, never allocate from a bogus length prefix.
    let _ = LaunchContext::decode(&mut Cursor::new(data), EnvMode::Full);
    let _ = LaunchContext::decode(&mut Cursor::new(data), EnvMode::Filtered);
    let _ = LaunchResult::read_from(&mut Cursor::new(data));
});

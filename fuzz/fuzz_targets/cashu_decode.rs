#![no_main]

use libfuzzer_sys::fuzz_target;
use strongbox_cashu::decode;

fuzz_target!(|data: &[u8]| {
    // decode must return Ok or Err for any input, never panic.
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = decode(s);

        // Prefixed input reaches the base64 and JSON layers
        let _ = decode(&format!("cashuA{}", s));
    }
});

#![no_main]

use bailiff_envelope::{Envelope, WrappedKeys};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(env) = Envelope::from_json(data) {
        let _ = env.validate();
        let _ = env.summary();
        if let Ok(column) = env.wrapped_keys.to_column() {
            let _ = WrappedKeys::from_column(&column);
        }
    }
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = WrappedKeys::from_column(s);
    }
});

#![no_main]

use libfuzzer_sys::fuzz_target;
use tack_core::PinEmoji;

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    if let Ok(emoji) = PinEmoji::parse(&raw) {
        let rendered = emoji.to_string();
        assert!(!rendered.trim().is_empty());
        let reparsed = PinEmoji::parse(&rendered).expect("canonical form must parse");
        assert_eq!(reparsed, emoji);
    }
});

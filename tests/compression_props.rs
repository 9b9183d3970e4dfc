//! Property tests for the compression pipeline.

use aip::compress::DedupPass;
use aip::{CompressionLevel, Message, TextCompressor, TextPass};
use proptest::prelude::*;

fn messages() -> impl Strategy<Value = Vec<Message>> {
    proptest::collection::vec(
        ("(system|user|assistant)", "\\PC{0,200}")
            .prop_map(|(role, text)| Message::text(role, text)),
        0..6,
    )
}

proptest! {
    #[test]
    fn level_zero_is_identity(messages in messages()) {
        let compressor = TextCompressor::new(CompressionLevel::Off);
        prop_assert_eq!(compressor.compress_messages(&messages), messages);
        prop_assert_eq!(compressor.savings().calls, 0);
    }

    #[test]
    fn short_texts_are_never_deduplicated(lines in proptest::collection::vec("[^\n]{0,150}", 1..20)) {
        let text = lines.join("\n");
        prop_assert_eq!(DedupPass::default().apply(&text), text.as_str());
    }

    #[test]
    fn light_output_has_no_blank_runs(text in "[a-z \t\n`]{0,300}") {
        let compressor = TextCompressor::new(CompressionLevel::Light);
        let out = compressor.compress_text(&text);
        prop_assert!(!out.contains("\n\n\n"));
        prop_assert!(out.chars().count() <= text.chars().count());
    }
}

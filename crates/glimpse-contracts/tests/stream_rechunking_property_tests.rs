//! Property tests for stream reassembly: the decoded answer must not depend on
//! how the transport split the bytes, and malformed frames must contribute
//! nothing.

use std::convert::Infallible;

use glimpse_contracts::stream::{accumulate, DecoderConfig, FragmentStream, LineBuffer};
use proptest::prelude::*;
use serde_json::json;

/// Fragments including multi-byte characters, quotes and escaped newlines.
fn fragment_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z0-9 ,.]{0,12}",
        Just("caf\u{e9} \u{1F5BC}".to_string()),
        Just("line\nbreak".to_string()),
        Just("\"quoted\"".to_string()),
    ]
}

fn render_stream(fragments: &[String], crlf: bool) -> Vec<u8> {
    let newline = if crlf { "\r\n" } else { "\n" };
    let mut raw = String::new();
    raw.push_str(": ping");
    raw.push_str(newline);
    for fragment in fragments {
        let frame = json!({ "event": "message", "answer": fragment, "task_id": "t" });
        raw.push_str(&format!("data: {frame}{newline}{newline}"));
    }
    raw.push_str(&format!("data: {}{newline}", json!({ "event": "message_end" })));
    raw.into_bytes()
}

fn decode_chunks(raw: &[u8], cuts: &[usize]) -> String {
    let mut boundaries: Vec<usize> = cuts.iter().map(|cut| cut % (raw.len() + 1)).collect();
    boundaries.sort_unstable();
    boundaries.dedup();

    let mut buffer = LineBuffer::new();
    let mut lines = Vec::new();
    let mut start = 0;
    for end in boundaries.into_iter().chain(std::iter::once(raw.len())) {
        buffer.push(&raw[start..end], &mut lines);
        start = end;
    }
    lines.extend(buffer.finish());

    let stream = FragmentStream::new(
        lines.into_iter().map(Ok::<_, Infallible>),
        DecoderConfig::default(),
    );
    match accumulate(stream) {
        Ok(answer) => answer.text,
        Err(never) => match never {},
    }
}

proptest! {
    #[test]
    fn prop_reassembly_is_stable_under_rechunking(
        fragments in prop::collection::vec(fragment_strategy(), 0..20),
        cuts in prop::collection::vec(any::<usize>(), 0..40),
        crlf in any::<bool>(),
    ) {
        let raw = render_stream(&fragments, crlf);
        let expected: String = fragments.concat();

        prop_assert_eq!(decode_chunks(&raw, &[]), expected.clone());
        prop_assert_eq!(decode_chunks(&raw, &cuts), expected);
    }

    #[test]
    fn prop_malformed_frame_contributes_nothing(
        fragments in prop::collection::vec(fragment_strategy(), 1..20),
        position in any::<prop::sample::Index>(),
        junk in "[a-z{\\[\":]{1,16}",
    ) {
        let clean = render_stream(&fragments, false);
        let mut lines: Vec<String> = String::from_utf8_lossy(&clean)
            .lines()
            .map(str::to_string)
            .collect();
        let at = position.index(lines.len() + 1);
        lines.insert(at, format!("data: {{{junk}"));

        let stream = FragmentStream::new(
            lines.into_iter().map(Ok::<_, Infallible>),
            DecoderConfig::default(),
        );
        let text = match accumulate(stream) {
            Ok(answer) => answer.text,
            Err(never) => match never {},
        };
        prop_assert_eq!(text, decode_chunks(&clean, &[]));
    }
}

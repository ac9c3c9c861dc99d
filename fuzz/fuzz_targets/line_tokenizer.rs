#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use logscope_analysis::{FormatSet, LevelClassifier, LineTokenizer};
use logscope_core::config::FormatRule;

fuzz_target!(|data: &[u8]| {
    let Ok(classifier) = LevelClassifier::with_defaults() else {
        return;
    };
    let Ok(formats) = FormatSet::compile(&FormatRule::builtin(), &classifier.known_tokens(), true)
    else {
        return;
    };

    // 줄바꿈 단위로 잘라 임의 바이트(비 UTF-8 포함)를 그대로 공급
    let lines: Vec<&[u8]> = data.split(|b| *b == b'\n').collect();
    let total = lines.len() as u64;

    let mut consumed = 0u64;
    for entry in LineTokenizer::new("fuzz", Arc::new(formats), 16).tokenize(lines) {
        assert!(entry.line_count >= 1);
        assert!(entry.line_count <= 16);
        consumed += u64::from(entry.line_count);
    }
    // 모든 라인은 정확히 하나의 엔트리에 속해야 함
    assert_eq!(consumed, total);
});

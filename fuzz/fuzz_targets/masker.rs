#![no_main]

use libfuzzer_sys::fuzz_target;
use logscope_analysis::Masker;

fuzz_target!(|data: &[u8]| {
    let Ok(masker) = Masker::new() else {
        return;
    };
    let text = String::from_utf8_lossy(data);
    let template = masker.template(&text);
    // 같은 입력은 항상 같은 템플릿
    assert_eq!(masker.template(&text), template);
    let _ = masker.template(&template);
});

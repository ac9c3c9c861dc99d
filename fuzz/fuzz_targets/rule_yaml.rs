#![no_main]

use libfuzzer_sys::fuzz_target;
use logscope_analysis::rule::RuleLoader;

fuzz_target!(|data: &[u8]| {
    // YAML 파서는 &str을 받으므로 UTF-8 변환 필요
    if let Ok(yaml_str) = std::str::from_utf8(data) {
        if let Ok(rules) = RuleLoader::parse_yaml(yaml_str, "fuzz-input.yml") {
            // 파싱된 규칙은 항상 검증을 통과한 상태여야 함
            for rule in &rules {
                assert!(rule.validate().is_ok());
            }
        }
    }
});

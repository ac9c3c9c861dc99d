#![no_main]

use std::collections::BTreeMap;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use logscope_analysis::rule::matcher::RuleMatcher;
use logscope_analysis::rule::types::{
    AlertRule, ConditionModifier, PatternCondition, RuleCondition, RuleStatus,
};
use logscope_core::types::{Level, LogEntry};

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    level: Option<FuzzLevel>,
    modifier: FuzzModifier,
    pattern: String,
    /// 매칭 대상 엔트리 원문
    raw_text: String,
    entry_level: FuzzLevel,
}

#[derive(Arbitrary, Debug, Clone, Copy)]
enum FuzzLevel {
    Error,
    Warning,
    Info,
    Debug,
    Unknown,
}

#[derive(Arbitrary, Debug)]
enum FuzzModifier {
    Exact,
    Contains,
    StartsWith,
    EndsWith,
    Regex,
}

impl From<FuzzLevel> for Level {
    fn from(level: FuzzLevel) -> Self {
        match level {
            FuzzLevel::Error => Level::Error,
            FuzzLevel::Warning => Level::Warning,
            FuzzLevel::Info => Level::Info,
            FuzzLevel::Debug => Level::Debug,
            FuzzLevel::Unknown => Level::Unknown,
        }
    }
}

impl FuzzModifier {
    fn to_condition_modifier(&self) -> ConditionModifier {
        match self {
            FuzzModifier::Exact => ConditionModifier::Exact,
            FuzzModifier::Contains => ConditionModifier::Contains,
            FuzzModifier::StartsWith => ConditionModifier::StartsWith,
            FuzzModifier::EndsWith => ConditionModifier::EndsWith,
            FuzzModifier::Regex => ConditionModifier::Regex,
        }
    }
}

fuzz_target!(|input: FuzzInput| {
    let rule = AlertRule {
        id: "fuzz_rule".to_owned(),
        title: "Fuzz Rule".to_owned(),
        description: String::new(),
        status: RuleStatus::Enabled,
        condition: RuleCondition {
            level: input.level.map(Level::from),
            pattern: Some(PatternCondition {
                modifier: input.modifier.to_condition_modifier(),
                value: input.pattern,
            }),
            source: None,
        },
        threshold_count: 1,
        window_secs: 60,
        cooldown_secs: 0,
    };

    let mut matcher = RuleMatcher::new();

    // compile_rule이 실패해도 크래시는 안 됨
    if matcher.compile_rule(&rule).is_err() {
        return;
    }

    let entry = LogEntry {
        source_id: "fuzz".to_owned(),
        sequence_number: 1,
        line_number: 1,
        line_count: 1,
        timestamp: None,
        level: input.entry_level.into(),
        level_token: None,
        format: None,
        message: input.raw_text.clone(),
        raw_text: input.raw_text,
        extracted_fields: BTreeMap::new(),
    };

    let matched = matcher.matches(&rule, &entry);
    if let Some(level) = rule.condition.level {
        // 레벨 조건이 다르면 절대 매칭되지 않음
        if level != entry.level {
            assert!(!matched);
        }
    }
});

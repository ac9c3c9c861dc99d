//! 알림 규칙 엔진 -- 슬라이딩 창 기반 임계값 평가
//!
//! YAML로 정의된 [`AlertRule`]을 엔트리 스트림에 대해 평가하고
//! 임계값에 도달하면 [`AlertEvent`]를 생성합니다.
//!
//! # 규칙별 상태 기계
//! ```text
//! Idle --match--> Armed --count >= threshold--> (발화) --> CoolingDown --until 경과--> Idle
//! ```
//! 쿨다운 중 매칭된 엔트리는 창에 넣지 않습니다.
//!
//! # 시각
//! 모든 시간 계산은 벽시계가 아니라 엔트리의 이벤트 시각을 사용합니다.
//! 따라서 같은 입력을 재생하면 같은 이벤트(같은 ID 포함)가 만들어집니다.
//!
//! # 아키텍처
//! - [`RuleSet`]: 검증과 정규식 컴파일이 끝난 불변 규칙 집합 (run 간 공유)
//! - [`AlertEvaluator`]: 소스 하나의 규칙별 상태
//! - [`loader`]: YAML 문서 파싱과 검증
//! - [`matcher`]: 조건 매칭 로직 (contains, regex 등)
//! - [`types`]: 규칙 데이터 구조 정의

pub mod loader;
pub mod matcher;
pub mod types;

pub use loader::RuleLoader;
pub use matcher::RuleMatcher;
pub use types::{AlertRule, ConditionModifier, PatternCondition, RuleCondition, RuleStatus};

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use logscope_core::metrics as m;
use logscope_core::types::{AlertEvent, EntryId, LogEntry};

use crate::error::AnalysisError;

/// 검증과 컴파일이 끝난 규칙 집합
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<AlertRule>,
    matcher: RuleMatcher,
}

impl RuleSet {
    /// 규칙을 검증하고 정규식을 컴파일합니다.
    pub fn new(rules: Vec<AlertRule>) -> Result<Self, AnalysisError> {
        RuleLoader::check_unique(&rules)?;
        let mut matcher = RuleMatcher::new();
        for rule in &rules {
            rule.validate()?;
            matcher.compile_rule(rule)?;
        }
        info!(
            count = rules.len(),
            enabled = rules.iter().filter(|r| r.is_enabled()).count(),
            "alert rules compiled"
        );
        Ok(Self { rules, matcher })
    }

    /// 등록된 규칙 수
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[AlertRule] {
        &self.rules
    }

    /// 규칙 조건이 엔트리에 매칭되는지 평가합니다.
    pub fn matches(&self, rule: &AlertRule, entry: &LogEntry) -> bool {
        self.matcher.matches(rule, entry)
    }

    /// 규칙이 소스에 적용되는지 여부 (`condition.source` 범위)
    pub fn applies_to(&self, rule: &AlertRule, source_id: &str) -> bool {
        self.matcher.applies_to(rule, source_id)
    }
}

/// 규칙 하나의 상태
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RulePhase {
    /// 창에 매칭 엔트리가 없음
    #[default]
    Idle,
    /// 임계값 미만의 매칭 엔트리가 창에 있음
    Armed,
    /// 발화 후 재발화 금지 기간
    CoolingDown { until: DateTime<Utc> },
}

#[derive(Debug, Default)]
struct RuleState {
    /// 활성 상태이고 이 소스가 범위 안인지
    active: bool,
    phase: RulePhase,
    window: VecDeque<(DateTime<Utc>, EntryId)>,
}

/// 소스 하나의 알림 평가기
///
/// 소스 안에서 `sequence_number` 순서로 엔트리가 들어온다고 가정합니다.
/// `condition.source` 범위 밖의 규칙은 이 소스에서 평가하지 않습니다.
pub struct AlertEvaluator {
    source_id: String,
    rules: Arc<RuleSet>,
    states: Vec<RuleState>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl AlertEvaluator {
    pub fn new(source_id: impl Into<String>, rules: Arc<RuleSet>) -> Self {
        let source_id = source_id.into();
        let states = rules
            .rules()
            .iter()
            .map(|rule| RuleState {
                active: rule.is_enabled() && rules.applies_to(rule, &source_id),
                ..RuleState::default()
            })
            .collect();
        Self {
            source_id,
            rules,
            states,
            last_timestamp: None,
        }
    }

    /// 규칙의 현재 상태를 조회합니다.
    pub fn phase(&self, rule_id: &str) -> Option<RulePhase> {
        self.rules
            .rules()
            .iter()
            .position(|r| r.id == rule_id)
            .map(|i| self.states[i].phase)
    }

    /// 엔트리 하나를 모든 활성 규칙에 대해 평가하고 발화한 이벤트를 반환합니다.
    ///
    /// 타임스탬프가 없는 엔트리는 직전에 본 타임스탬프를 이벤트 시각으로 사용하며,
    /// 아직 본 타임스탬프가 없으면 평가하지 않습니다.
    pub fn evaluate(&mut self, entry: &LogEntry) -> Vec<AlertEvent> {
        let now = match entry.timestamp {
            Some(ts) => {
                self.last_timestamp = Some(ts);
                ts
            }
            None => match self.last_timestamp {
                Some(ts) => ts,
                None => return Vec::new(),
            },
        };

        let mut events = Vec::new();
        for (rule, state) in self.rules.rules().iter().zip(self.states.iter_mut()) {
            if !state.active {
                continue;
            }

            if let RulePhase::CoolingDown { until } = state.phase
                && now >= until
            {
                state.phase = RulePhase::Idle;
            }

            let window = secs_delta(rule.window_secs);
            while state
                .window
                .front()
                .is_some_and(|(t, _)| now - *t > window)
            {
                state.window.pop_front();
            }
            if state.window.is_empty() && state.phase == RulePhase::Armed {
                state.phase = RulePhase::Idle;
            }

            if matches!(state.phase, RulePhase::CoolingDown { .. })
                || !self.rules.matches(rule, entry)
            {
                continue;
            }

            state.window.push_back((now, entry.id()));
            state.phase = RulePhase::Armed;

            if state.window.len() as u64 >= rule.threshold_count {
                let matched_entry_ids: Vec<EntryId> =
                    state.window.drain(..).map(|(_, id)| id).collect();
                state.phase = if rule.cooldown_secs > 0 {
                    RulePhase::CoolingDown {
                        until: now
                            .checked_add_signed(secs_delta(rule.cooldown_secs))
                            .unwrap_or(DateTime::<Utc>::MAX_UTC),
                    }
                } else {
                    RulePhase::Idle
                };

                let event = AlertEvent {
                    id: event_id(&rule.id, &self.source_id, entry.sequence_number),
                    rule_id: rule.id.clone(),
                    rule_title: rule.title.clone(),
                    source_id: self.source_id.clone(),
                    triggered_at: now,
                    matched_entry_ids,
                };
                debug!(
                    rule_id = %rule.id,
                    source = %self.source_id,
                    matches = event.matched_entry_ids.len(),
                    "alert rule triggered"
                );
                metrics::counter!(m::ALERTS_FIRED_TOTAL).increment(1);
                events.push(event);
            }
        }
        events
    }
}

/// 규칙, 소스, 발화 엔트리에서 결정적인 이벤트 ID를 만듭니다.
pub fn event_id(rule_id: &str, source_id: &str, sequence_number: u64) -> Uuid {
    let name = format!("{rule_id}:{source_id}:{sequence_number}");
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
}

fn secs_delta(secs: u64) -> TimeDelta {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::TimeZone;
    use logscope_core::types::Level;

    use super::*;

    const BASE: i64 = 1_705_312_800;

    fn rule(id: &str, threshold: u64, window: u64, cooldown: u64) -> AlertRule {
        AlertRule {
            id: id.to_owned(),
            title: format!("{id} title"),
            description: String::new(),
            status: RuleStatus::Enabled,
            condition: RuleCondition {
                level: Some(Level::Error),
                pattern: Some(PatternCondition {
                    modifier: ConditionModifier::Contains,
                    value: "db timeout".to_owned(),
                }),
                source: None,
            },
            threshold_count: threshold,
            window_secs: window,
            cooldown_secs: cooldown,
        }
    }

    fn entry(seq: u64, secs: Option<i64>, level: Level, raw: &str) -> LogEntry {
        LogEntry {
            source_id: "app.log".to_owned(),
            sequence_number: seq,
            line_number: seq,
            line_count: 1,
            timestamp: secs.map(|s| Utc.timestamp_opt(BASE + s, 0).unwrap()),
            level,
            level_token: None,
            format: Some("iso8601_level".to_owned()),
            message: raw.to_owned(),
            raw_text: raw.to_owned(),
            extracted_fields: BTreeMap::new(),
        }
    }

    fn hit(seq: u64, secs: i64) -> LogEntry {
        entry(seq, Some(secs), Level::Error, "db timeout")
    }

    fn evaluator(rules: Vec<AlertRule>) -> AlertEvaluator {
        AlertEvaluator::new("app.log", Arc::new(RuleSet::new(rules).unwrap()))
    }

    #[test]
    fn threshold_window_and_cooldown() {
        let mut ev = evaluator(vec![rule("db", 3, 60, 300)]);
        assert!(ev.evaluate(&hit(1, 0)).is_empty());
        assert_eq!(ev.phase("db"), Some(RulePhase::Armed));
        assert!(ev.evaluate(&hit(2, 20)).is_empty());

        let events = ev.evaluate(&hit(3, 40));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].matched_entry_ids.len(), 3);
        assert_eq!(events[0].triggered_at, Utc.timestamp_opt(BASE + 40, 0).unwrap());
        assert!(matches!(ev.phase("db"), Some(RulePhase::CoolingDown { .. })));

        // 쿨다운 중
        assert!(ev.evaluate(&hit(4, 50)).is_empty());

        // 발화 후 301초 뒤 같은 패턴
        assert!(ev.evaluate(&hit(5, 341)).is_empty());
        assert!(ev.evaluate(&hit(6, 342)).is_empty());
        let again = ev.evaluate(&hit(7, 343));
        assert_eq!(again.len(), 1);
        let seqs: Vec<u64> = again[0]
            .matched_entry_ids
            .iter()
            .map(|id| id.sequence_number)
            .collect();
        assert_eq!(seqs, vec![5, 6, 7]);
    }

    #[test]
    fn entries_outside_window_expire() {
        let mut ev = evaluator(vec![rule("db", 3, 60, 0)]);
        ev.evaluate(&hit(1, 0));
        ev.evaluate(&hit(2, 30));
        assert!(ev.evaluate(&hit(3, 61)).is_empty());
        assert_eq!(ev.evaluate(&hit(4, 62)).len(), 1);
    }

    #[test]
    fn non_matching_entries_are_ignored() {
        let mut ev = evaluator(vec![rule("db", 2, 60, 0)]);
        ev.evaluate(&hit(1, 0));
        assert!(ev.evaluate(&entry(2, Some(1), Level::Warning, "db timeout")).is_empty());
        assert!(ev.evaluate(&entry(3, Some(2), Level::Error, "disk full")).is_empty());
        assert_eq!(ev.evaluate(&hit(4, 3)).len(), 1);
    }

    #[test]
    fn untimestamped_entry_uses_last_seen_time() {
        let mut ev = evaluator(vec![rule("db", 2, 60, 0)]);
        assert!(ev.evaluate(&entry(1, None, Level::Error, "db timeout")).is_empty());
        assert_eq!(ev.phase("db"), Some(RulePhase::Idle));
        ev.evaluate(&hit(2, 10));
        let events = ev.evaluate(&entry(3, None, Level::Error, "db timeout"));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].triggered_at, Utc.timestamp_opt(BASE + 10, 0).unwrap());
    }

    #[test]
    fn disabled_rules_never_fire() {
        let mut r = rule("db", 1, 60, 0);
        r.status = RuleStatus::Disabled;
        let mut ev = evaluator(vec![r]);
        assert!(ev.evaluate(&hit(1, 0)).is_empty());
    }

    #[test]
    fn scoped_rule_fires_only_for_matching_sources() {
        let mut scoped = rule("db_scoped", 1, 60, 0);
        scoped.condition.source = Some("db-*.log".to_owned());
        let rules = Arc::new(RuleSet::new(vec![scoped, rule("global", 1, 60, 0)]).unwrap());

        let mut app = AlertEvaluator::new("app.log", Arc::clone(&rules));
        let fired: Vec<String> = app.evaluate(&hit(1, 0)).into_iter().map(|e| e.rule_id).collect();
        assert_eq!(fired, vec!["global"]);

        let mut db = AlertEvaluator::new("db-primary.log", rules);
        let fired: Vec<String> = db.evaluate(&hit(1, 0)).into_iter().map(|e| e.rule_id).collect();
        assert_eq!(fired, vec!["db_scoped", "global"]);
    }

    #[test]
    fn replay_produces_identical_events() {
        let input: Vec<LogEntry> = (1..=6).map(|i| hit(i, i as i64 * 5)).collect();
        let run = || {
            let mut ev = evaluator(vec![rule("db", 2, 60, 10)]);
            input.iter().flat_map(|e| ev.evaluate(e)).collect::<Vec<_>>()
        };
        let a = run();
        let b = run();
        assert!(!a.is_empty());
        assert_eq!(a, b);
    }

    #[test]
    fn event_id_is_deterministic() {
        assert_eq!(event_id("r", "s", 1), event_id("r", "s", 1));
        assert_ne!(event_id("r", "s", 1), event_id("r", "s", 2));
        assert_eq!(event_id("r", "s", 1).get_version_num(), 5);
    }

    #[test]
    fn rule_set_rejects_bad_regex() {
        let mut r = rule("bad", 1, 60, 0);
        r.condition.pattern = Some(PatternCondition {
            modifier: ConditionModifier::Regex,
            value: "(".to_owned(),
        });
        assert!(RuleSet::new(vec![r]).is_err());
    }

    #[test]
    fn rule_set_rejects_duplicate_ids() {
        assert!(RuleSet::new(vec![rule("a", 1, 1, 0), rule("a", 1, 1, 0)]).is_err());
    }
}

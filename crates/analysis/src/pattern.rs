//! 패턴 탐지기 -- 가변 토큰 마스킹과 템플릿 그룹화
//!
//! [`Masker`]는 고정된 정규식 집합으로 가변 토큰(타임스탬프, UUID, IP, 따옴표 문자열,
//! 숫자, 16진수)을 placeholder로 치환합니다. 마스킹은 이전에 본 템플릿에 의존하지 않습니다.
//!
//! [`PatternDetector`]는 run 하나가 소유하는 템플릿 arena입니다.
//! 엔트리는 [`TemplateId`] 인덱스로 템플릿을 참조합니다.
//!
//! # 그룹 키
//! 템플릿은 마스킹된 문자열만이 아니라 `(레벨, 마스킹된 문자열)` 쌍으로 묶입니다.
//! 같은 문자열이라도 분류된 레벨이 다르면(예: 레벨 동의어 표가 바뀐 경우, 형식과
//! 매칭되지 않은 `UNKNOWN` 라인) 별도 템플릿이 되어, 레벨별 상위 목록과 비율이
//! 다른 레벨의 발생 횟수와 섞이지 않습니다.
//!
//! [`recurring_templates`]는 소스별 결과를 모아 둘 이상의 소스에 나타난 템플릿을 찾습니다.

use std::collections::{BTreeMap, HashMap};

use regex::Regex;

use logscope_core::metrics as m;
use logscope_core::types::{Level, LogEntry, PatternTemplate, TemplateId};

use crate::error::AnalysisError;
use crate::report::{RecurringTemplate, SourceReport, TemplateOccurrence};

/// 보고서에 남길 교차 소스 반복 템플릿 최대 수
pub const RECURRING_TEMPLATE_LIMIT: usize = 20;

/// 마스킹 규칙 (적용 순서대로)
///
/// 숫자 규칙은 16진수 규칙보다 먼저 적용되어 순수 숫자는 항상 `<NUM>`이 됩니다.
const MASK_RULES: &[(&str, &str)] = &[
    (
        r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:[.,]\d+)?(?:Z|[+-]\d{2}:?\d{2})?",
        "<TS>",
    ),
    (r"\d{2}/\d{2}/\d{4} \d{2}:\d{2}:\d{2}", "<TS>"),
    (
        r"\b[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}\b",
        "<UUID>",
    ),
    (r"\b\d{1,3}(?:\.\d{1,3}){3}(?::\d{1,5})?\b", "<IP>"),
    (r#""[^"]*"|'[^']*'"#, "<STR>"),
    (r"\b\d+(?:\.\d+)?\b", "<NUM>"),
    (r"\b0[xX][0-9a-fA-F]+\b|\b[0-9a-fA-F]{8,}\b", "<HEX>"),
];

/// 가변 토큰 마스커
#[derive(Debug, Clone)]
pub struct Masker {
    rules: Vec<(Regex, &'static str)>,
}

impl Masker {
    /// 내장 마스킹 규칙을 컴파일합니다.
    pub fn new() -> Result<Self, AnalysisError> {
        let mut rules = Vec::with_capacity(MASK_RULES.len());
        for (pattern, placeholder) in MASK_RULES {
            rules.push((Regex::new(pattern)?, *placeholder));
        }
        Ok(Self { rules })
    }

    /// 텍스트를 템플릿 문자열로 정규화합니다.
    pub fn template(&self, text: &str) -> String {
        let mut out = text.to_owned();
        for (regex, placeholder) in &self.rules {
            if regex.is_match(&out) {
                out = regex.replace_all(&out, *placeholder).into_owned();
            }
        }
        out.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

/// 템플릿 arena
///
/// 한 run이 배타적으로 소유합니다. 여러 run 사이에서 공유하지 않습니다.
#[derive(Debug)]
pub struct PatternDetector {
    masker: Masker,
    example_cap: usize,
    templates: Vec<PatternTemplate>,
    index: HashMap<(Level, String), TemplateId>,
    /// 레벨별 엔트리 수 (상위 템플릿 비율 계산용)
    level_totals: HashMap<Level, u64>,
}

impl PatternDetector {
    /// 새 탐지기를 생성합니다.
    pub fn new(masker: Masker, example_cap: usize) -> Self {
        Self {
            masker,
            example_cap: example_cap.max(1),
            templates: Vec::new(),
            index: HashMap::new(),
            level_totals: HashMap::new(),
        }
    }

    /// 엔트리 하나를 템플릿에 배정하고 그 ID를 반환합니다.
    pub fn observe(&mut self, entry: &LogEntry) -> TemplateId {
        let key = self.masker.template(&entry.raw_text);
        *self.level_totals.entry(entry.level).or_insert(0) += 1;

        let id = match self.index.get(&(entry.level, key.clone())) {
            Some(id) => *id,
            None => {
                let id = TemplateId(self.templates.len());
                self.templates.push(PatternTemplate {
                    id,
                    template_string: key.clone(),
                    occurrence_count: 0,
                    example_entry_ids: Vec::with_capacity(self.example_cap),
                    level: entry.level,
                });
                self.index.insert((entry.level, key), id);
                metrics::counter!(m::TEMPLATES_CREATED_TOTAL).increment(1);
                id
            }
        };

        let template = &mut self.templates[id.0];
        template.occurrence_count += 1;
        if template.example_entry_ids.len() < self.example_cap {
            template.example_entry_ids.push(entry.id());
        }
        id
    }

    /// 템플릿 수
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// 템플릿이 없는지 여부
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// ID로 템플릿을 조회합니다.
    pub fn get(&self, id: TemplateId) -> Option<&PatternTemplate> {
        self.templates.get(id.0)
    }

    /// 최초 관측 순서의 템플릿 목록
    pub fn templates(&self) -> &[PatternTemplate] {
        &self.templates
    }

    /// 주어진 레벨의 엔트리 수
    pub fn level_total(&self, level: Level) -> u64 {
        self.level_totals.get(&level).copied().unwrap_or(0)
    }

    /// 발생 횟수 내림차순, 동률은 최초 관측 순서로 정렬된 목록
    pub fn ranked(&self) -> Vec<&PatternTemplate> {
        let mut ranked: Vec<&PatternTemplate> = self.templates.iter().collect();
        // sort_by는 안정 정렬이므로 동률은 arena 순서(최초 관측 순)를 유지합니다.
        ranked.sort_by(|a, b| b.occurrence_count.cmp(&a.occurrence_count));
        ranked
    }

    /// 주어진 레벨의 상위 `n`개 템플릿
    pub fn top(&self, level: Level, n: usize) -> Vec<&PatternTemplate> {
        self.ranked()
            .into_iter()
            .filter(|t| t.level == level)
            .take(n)
            .collect()
    }

    /// arena를 소비하여 순위 목록을 반환합니다.
    pub fn into_ranked(self) -> Vec<PatternTemplate> {
        let mut templates = self.templates;
        templates.sort_by(|a, b| b.occurrence_count.cmp(&a.occurrence_count));
        templates
    }
}

/// 둘 이상의 소스에 나타난 템플릿을 찾습니다.
///
/// 같은 그룹 키(레벨, 템플릿 문자열)면 같은 템플릿으로 봅니다. 소스 수, 총 발생 횟수
/// 내림차순으로 정렬하고 동률은 템플릿 문자열순이며, 앞에서 `limit`개만 남깁니다.
pub fn recurring_templates(sources: &[SourceReport], limit: usize) -> Vec<RecurringTemplate> {
    let mut groups: BTreeMap<(Level, &str), Vec<TemplateOccurrence>> = BTreeMap::new();
    for source in sources {
        for template in &source.templates {
            groups
                .entry((template.level, template.template_string.as_str()))
                .or_default()
                .push(TemplateOccurrence {
                    source_id: source.source_id.clone(),
                    template_id: template.id,
                    count: template.occurrence_count,
                });
        }
    }

    let mut recurring: Vec<RecurringTemplate> = groups
        .into_iter()
        .filter(|(_, occurrences)| occurrences.len() > 1)
        .map(|((level, template_string), sources)| RecurringTemplate {
            template_string: template_string.to_owned(),
            level,
            occurrence_count: sources.iter().map(|o| o.count).sum(),
            sources,
        })
        .collect();
    recurring.sort_by(|a, b| {
        b.sources
            .len()
            .cmp(&a.sources.len())
            .then_with(|| b.occurrence_count.cmp(&a.occurrence_count))
            .then_with(|| a.template_string.cmp(&b.template_string))
    });
    recurring.truncate(limit);
    recurring
}

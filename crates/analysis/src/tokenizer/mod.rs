//! 라인 토크나이저 -- 원시 라인을 구조화된 [`LogEntry`]로 변환
//!
//! [`LineTokenizer`]는 라인을 하나씩 받아 처리하며 입력 전체를 기다리지 않습니다.
//! 한 엔트리는 다음 엔트리가 시작되거나 입력이 끝날 때 완성됩니다.
//!
//! # 처리 규칙
//! - 설정된 형식 중 처음 매칭된 형식이 새 엔트리를 시작합니다.
//! - 매칭되지 않는 라인은 직전 엔트리가 형식과 매칭된 엔트리이면 연속 라인으로 병합됩니다
//!   (스택 트레이스 등). 병합 라인 수는 `max_entry_lines`로 제한됩니다.
//! - 그 외 매칭되지 않는 라인은 `UNKNOWN` 레벨의 독립 엔트리가 됩니다. 버려지는 라인은 없습니다.
//! - `max_line_length` 바이트를 넘는 라인은 잘린 뒤 처리되며 [`LineTokenizer::truncated_lines`]로 집계됩니다.
//!
//! # 사용 예시
//! ```ignore
//! let tokenizer = LineTokenizer::new("app.log", formats, 500);
//! for entry in tokenizer.tokenize(lines) {
//!     println!("{}", entry.raw_text);
//! }
//! ```

pub mod format;

pub use format::{CompiledFormat, FormatSet, LineMatch, parse_timestamp};

use std::collections::BTreeMap;
use std::sync::Arc;

use logscope_core::types::{Level, LogEntry};

use format::collapse_whitespace;

/// 라인 토크나이저
///
/// 소스 하나에 대해 하나씩 생성되며 상태(보류 중인 엔트리, 라인 번호)를 소유합니다.
pub struct LineTokenizer {
    source_id: String,
    formats: Arc<FormatSet>,
    max_entry_lines: usize,
    max_line_length: usize,
    /// 잘린 라인 수
    truncated: u64,
    /// 마지막으로 읽은 라인 번호
    line_number: u64,
    /// 다음에 부여할 시퀀스 번호
    next_sequence: u64,
    /// 아직 완성되지 않은 엔트리
    pending: Option<LogEntry>,
}

impl LineTokenizer {
    /// 새 토크나이저를 생성합니다.
    pub fn new(source_id: impl Into<String>, formats: Arc<FormatSet>, max_entry_lines: usize) -> Self {
        Self {
            source_id: source_id.into(),
            formats,
            max_entry_lines: max_entry_lines.max(1),
            max_line_length: usize::MAX,
            truncated: 0,
            line_number: 0,
            next_sequence: 1,
            pending: None,
        }
    }

    /// 라인 길이 상한(바이트, 줄바꿈 제외)을 설정합니다.
    pub fn with_max_line_length(mut self, max: usize) -> Self {
        self.max_line_length = max.max(1);
        self
    }

    /// 상한을 넘어 잘린 라인 수
    pub fn truncated_lines(&self) -> u64 {
        self.truncated
    }

    /// 소스 식별자
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// 지금까지 읽은 라인 수
    pub fn lines_read(&self) -> u64 {
        self.line_number
    }

    /// 완성되지 않은 엔트리가 있는지 여부
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// 라인 하나를 처리합니다. 이 라인으로 인해 완성된 엔트리가 있으면 반환합니다.
    ///
    /// 끝의 `\n`, `\r\n`은 제거되며 잘못된 UTF-8은 손실 변환됩니다.
    pub fn push_line(&mut self, raw: &[u8]) -> Option<LogEntry> {
        self.line_number += 1;
        let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        let raw = if raw.len() > self.max_line_length {
            self.truncated += 1;
            &raw[..self.max_line_length]
        } else {
            raw
        };
        let decoded = String::from_utf8_lossy(raw);
        let line = decoded.trim_end_matches(['\n', '\r']);

        if let Some(matched) = self.formats.match_line(line) {
            let entry = self.start_entry(line, Some(matched));
            return self.pending.replace(entry);
        }

        if let Some(pending) = self.pending.as_mut()
            && pending.is_parsed()
            && (pending.line_count as usize) < self.max_entry_lines
        {
            pending.raw_text.push('\n');
            pending.raw_text.push_str(line);
            pending.line_count += 1;
            return None;
        }

        let entry = self.start_entry(line, None);
        self.pending.replace(entry)
    }

    /// 보류 중인 엔트리를 완성하여 반환합니다 (입력 종료 또는 유휴 flush).
    pub fn flush(&mut self) -> Option<LogEntry> {
        self.pending.take()
    }

    /// 라인 시퀀스를 지연 처리하는 iterator로 변환합니다.
    pub fn tokenize<I>(self, lines: I) -> Tokenize<I::IntoIter>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        Tokenize {
            tokenizer: self,
            lines: lines.into_iter(),
            finished: false,
        }
    }

    fn start_entry(&mut self, line: &str, matched: Option<LineMatch>) -> LogEntry {
        let sequence_number = self.next_sequence;
        self.next_sequence += 1;

        let (timestamp, level_token, format, message, extracted_fields) = match matched {
            Some(m) => (
                m.timestamp,
                m.level_token,
                Some(m.format),
                m.message,
                m.fields.into_iter().collect::<BTreeMap<_, _>>(),
            ),
            None => (None, None, None, collapse_whitespace(line), BTreeMap::new()),
        };

        LogEntry {
            source_id: self.source_id.clone(),
            sequence_number,
            line_number: self.line_number,
            line_count: 1,
            timestamp,
            level: Level::Unknown,
            level_token,
            format,
            message,
            raw_text: line.to_owned(),
            extracted_fields,
        }
    }
}

/// [`LineTokenizer::tokenize`]가 반환하는 지연 iterator
pub struct Tokenize<I> {
    tokenizer: LineTokenizer,
    lines: I,
    finished: bool,
}

impl<I> Iterator for Tokenize<I>
where
    I: Iterator,
    I::Item: AsRef<[u8]>,
{
    type Item = LogEntry;

    fn next(&mut self) -> Option<LogEntry> {
        if self.finished {
            return None;
        }
        for line in self.lines.by_ref() {
            if let Some(entry) = self.tokenizer.push_line(line.as_ref()) {
                return Some(entry);
            }
        }
        self.finished = true;
        self.tokenizer.flush()
    }
}

//! Output formatting abstraction for text vs JSON rendering
//!
//! All subcommand output flows through [`OutputWriter`] which handles format switching.
//! This keeps format-specific logic out of command handlers entirely.
//!
//! Reports are rendered once with [`OutputWriter::render`]. Streaming output
//! (`logscope tail`) emits one record per event with [`OutputWriter::emit`]:
//! a single text line or a single compact JSON line.

use std::io::Write;

use serde::Serialize;

use crate::cli::OutputFormat;
use crate::error::CliError;

/// Abstraction for writing CLI output in different formats.
///
/// Subcommand handlers call `writer.render(&payload)` where `payload`
/// implements both `Serialize` (for JSON) and `Render` (for text).
pub struct OutputWriter {
    format: OutputFormat,
}

impl OutputWriter {
    /// Create a new output writer with the specified format.
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Selected output format.
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Render a payload to stdout.
    pub fn render<T: Render + Serialize>(&self, payload: &T) -> Result<(), CliError> {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        self.render_to(&mut handle, payload)
    }

    /// Render a payload to an arbitrary writer.
    ///
    /// For `Text` format, delegates to `Render::render_text()`.
    /// For `Json` format, serialises via `serde_json` (pretty-printed).
    pub fn render_to<T: Render + Serialize>(
        &self,
        w: &mut dyn Write,
        payload: &T,
    ) -> Result<(), CliError> {
        match self.format {
            OutputFormat::Text => {
                payload.render_text(w)?;
            }
            OutputFormat::Json => {
                serde_json::to_writer_pretty(&mut *w, payload)?;
                writeln!(w)?;
            }
        }
        Ok(())
    }

    /// Emit one streaming record to stdout and flush it immediately.
    pub fn emit<T: RenderLine + Serialize>(&self, record: &T) -> Result<(), CliError> {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        self.emit_to(&mut handle, record)?;
        handle.flush()?;
        Ok(())
    }

    /// Emit one streaming record to an arbitrary writer.
    pub fn emit_to<T: RenderLine + Serialize>(
        &self,
        w: &mut dyn Write,
        record: &T,
    ) -> Result<(), CliError> {
        match self.format {
            OutputFormat::Text => writeln!(w, "{}", record.render_line())?,
            OutputFormat::Json => {
                serde_json::to_writer(&mut *w, record)?;
                writeln!(w)?;
            }
        }
        Ok(())
    }
}

/// Trait for human-readable text rendering.
///
/// Implemented by every CLI output payload alongside `serde::Serialize`.
pub trait Render {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()>;
}

/// Single-line text form of a streaming record.
pub trait RenderLine {
    fn render_line(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct TestPayload {
        field1: String,
        field2: u32,
    }

    impl Render for TestPayload {
        fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
            writeln!(w, "Field1: {}", self.field1)?;
            writeln!(w, "Field2: {}", self.field2)?;
            Ok(())
        }
    }

    impl RenderLine for TestPayload {
        fn render_line(&self) -> String {
            format!("{}={}", self.field1, self.field2)
        }
    }

    fn payload() -> TestPayload {
        TestPayload {
            field1: "test value".to_owned(),
            field2: 42,
        }
    }

    #[test]
    fn test_render_to_text_format() {
        let writer = OutputWriter::new(OutputFormat::Text);
        let mut buffer = Vec::new();
        writer
            .render_to(&mut buffer, &payload())
            .expect("text rendering should succeed");

        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains("Field1: test value"));
        assert!(output.contains("Field2: 42"));
    }

    #[test]
    fn test_render_to_json_is_pretty() {
        let writer = OutputWriter::new(OutputFormat::Json);
        let mut buffer = Vec::new();
        writer
            .render_to(&mut buffer, &payload())
            .expect("json rendering should succeed");

        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains("\n  "), "pretty JSON should be indented");
        let parsed: serde_json::Value = serde_json::from_str(&output).expect("should parse JSON");
        assert_eq!(parsed["field1"].as_str(), Some("test value"));
        assert_eq!(parsed["field2"].as_u64(), Some(42));
    }

    #[test]
    fn test_emit_to_text_is_one_line() {
        let writer = OutputWriter::new(OutputFormat::Text);
        let mut buffer = Vec::new();
        writer.emit_to(&mut buffer, &payload()).expect("emit should succeed");
        assert_eq!(String::from_utf8(buffer).unwrap(), "test value=42\n");
    }

    #[test]
    fn test_emit_to_json_is_compact_line() {
        let writer = OutputWriter::new(OutputFormat::Json);
        let mut buffer = Vec::new();
        writer.emit_to(&mut buffer, &payload()).expect("emit should succeed");
        let output = String::from_utf8(buffer).unwrap();
        assert_eq!(output.lines().count(), 1);
        assert_eq!(output, "{\"field1\":\"test value\",\"field2\":42}\n");
    }

    #[test]
    fn test_render_text_unicode_content() {
        let writer = OutputWriter::new(OutputFormat::Text);
        let payload = TestPayload {
            field1: "한글 🦀".to_owned(),
            field2: 0,
        };
        let mut buffer = Vec::new();
        writer.render_to(&mut buffer, &payload).unwrap();
        assert!(String::from_utf8(buffer).unwrap().contains("한글 🦀"));
    }
}

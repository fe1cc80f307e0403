//! Message templating.
//!
//! Templates are literal text interleaved with `{field}` placeholders. `\{`
//! and `\}` are escaped braces and render as the brace itself. The scanner is
//! deliberately small: nested braces are not supported, a `}` always closes
//! the nearest preceding `{`, and malformed input degrades to literal text
//! instead of failing.

use courier_proto::{EventSink, Record, SessionEvent};
use tracing::debug;

/// A parsed piece of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Field(String),
}

/// A message template, parsed once and rendered per record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Parses a template. Never fails.
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let segments = parse(&source);
        Self { source, segments }
    }

    /// Returns the raw template text.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Returns true if the template renders to nothing.
    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    /// Field names referenced by the template, in order of appearance.
    pub fn placeholders(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Field(name) => Some(name.as_str()),
                Segment::Text(_) => None,
            })
            .collect()
    }

    /// Renders the template for `record`.
    ///
    /// Missing fields render as nothing and are reported to `sink` as
    /// [`SessionEvent::FieldMissing`].
    pub fn render(&self, record: &Record, sink: &dyn EventSink) -> String {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Field(name) => match record.field(name) {
                    Some(value) => {
                        debug!(field = %name, record = %record.id(), "Substituting template field");
                        out.push_str(value);
                    }
                    None => sink.emit(&SessionEvent::FieldMissing {
                        record: record.id(),
                        field: name.clone(),
                    }),
                },
            }
        }
        out
    }
}

impl From<&str> for Template {
    fn from(source: &str) -> Self {
        Self::new(source)
    }
}

impl From<String> for Template {
    fn from(source: String) -> Self {
        Self::new(source)
    }
}

/// Renders `template` for `record` without keeping the parsed form.
pub fn render(record: &Record, template: &str, sink: &dyn EventSink) -> String {
    Template::new(template).render(record, sink)
}

fn parse(source: &str) -> Vec<Segment> {
    // Without any brace there is nothing to substitute, escapes included.
    if !source.contains('{') {
        return vec![Segment::Text(source.to_string())];
    }

    let mut segments = Vec::new();
    let mut text = String::new();
    let mut open: Option<String> = None;
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.peek() {
                Some(&brace @ ('{' | '}')) => {
                    chars.next();
                    push_char(&mut open, &mut text, brace);
                }
                _ => push_char(&mut open, &mut text, '\\'),
            },
            '{' => {
                // A second `{` abandons the open field; its text stays literal.
                if let Some(abandoned) = open.replace(String::new()) {
                    text.push_str(&abandoned);
                }
            }
            '}' => match open.take() {
                Some(name) => {
                    if !text.is_empty() {
                        segments.push(Segment::Text(std::mem::take(&mut text)));
                    }
                    segments.push(Segment::Field(name));
                }
                None => text.push('}'),
            },
            other => push_char(&mut open, &mut text, other),
        }
    }

    if let Some(unterminated) = open {
        text.push_str(&unterminated);
    }
    if !text.is_empty() {
        segments.push(Segment::Text(text));
    }
    segments
}

fn push_char(open: &mut Option<String>, text: &mut String, c: char) {
    match open {
        Some(name) => name.push(c),
        None => text.push(c),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemorySink;
    use courier_proto::RecordId;

    fn alice() -> Record {
        Record::new(
            RecordId::new(11).unwrap(),
            [("name", "Alice"), ("major", "Physics"), (" ", "blank")],
        )
    }

    #[test]
    fn test_no_braces_returns_template_unchanged() {
        let sink = MemorySink::new();
        for template in ["", "Hello there", "odd } brace", r"escaped \} only", r"back\slash"] {
            assert_eq!(render(&alice(), template, &sink), template);
        }
        assert!(sink.is_empty());
    }

    #[test]
    fn test_substitutes_fields() {
        let sink = MemorySink::new();
        let out = render(&alice(), "Hi {name}, how is {major}?", &sink);
        assert_eq!(out, "Hi Alice, how is Physics?");
        assert!(sink.is_empty());
    }

    #[test]
    fn test_missing_field_renders_empty_and_is_reported() {
        let sink = MemorySink::new();
        let out = render(&alice(), "Hi {nickname}!", &sink);
        assert_eq!(out, "Hi !");
        assert_eq!(
            sink.events(),
            vec![SessionEvent::FieldMissing {
                record: RecordId::new(11).unwrap(),
                field: "nickname".to_string(),
            }]
        );
    }

    #[test]
    fn test_escaped_braces_render_literally() {
        let sink = MemorySink::new();
        assert_eq!(render(&alice(), r"\{name\}", &sink), "{name}");
        assert_eq!(
            render(&alice(), r"Use \{name\} for {name}", &sink),
            "Use {name} for Alice"
        );
        assert!(sink.is_empty());
    }

    #[test]
    fn test_unterminated_brace_is_literal() {
        let sink = MemorySink::new();
        assert_eq!(render(&alice(), "Hi {name", &sink), "Hi name");
        assert_eq!(render(&alice(), "{", &sink), "");
        assert!(sink.is_empty());
    }

    #[test]
    fn test_stray_closing_brace_is_literal() {
        let sink = MemorySink::new();
        assert_eq!(render(&alice(), "a}b {name}", &sink), "a}b Alice");
    }

    #[test]
    fn test_closing_brace_closes_nearest_open() {
        let sink = MemorySink::new();
        // The first `{` is abandoned; `major` is the field.
        assert_eq!(render(&alice(), "x{name{major}y", &sink), "xnamePhysicsy");
    }

    #[test]
    fn test_empty_and_whitespace_field_names() {
        let sink = MemorySink::new();
        assert_eq!(render(&alice(), "[{}]", &sink), "[]");
        assert_eq!(render(&alice(), "[{ }]", &sink), "[blank]");
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_backslash_not_before_brace_is_kept() {
        let sink = MemorySink::new();
        assert_eq!(render(&alice(), r"C:\dir {name}", &sink), r"C:\dir Alice");
    }

    #[test]
    fn test_placeholders() {
        let template = Template::new(r"{name} \{skip\} {major} {name");
        assert_eq!(template.placeholders(), vec!["name", "major"]);
    }

    #[test]
    fn test_render_never_panics_on_awkward_input() {
        let sink = MemorySink::new();
        for template in [r"\", r"\{", r"{\}", "}}{{", "{{}}", "{é}ü{", "\u{0}{\u{0}}"] {
            let _ = render(&alice(), template, &sink);
        }
    }
}

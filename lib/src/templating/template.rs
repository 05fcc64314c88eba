use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Result;
use crate::util::has_markers;

/// One parsed piece of a template body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(Arc<str>),
    Placeholder(Arc<str>),
    Include(Arc<str>),
}

/// A parsed template.
///
/// Created once by the [`Registry`](crate::templating::Registry) and never
/// mutated afterwards; `segments` already have includes expanded.
#[derive(Debug)]
pub struct Template {
    pub name: Arc<str>,
    /// Path of the file the template was read from, relative to the
    /// templates root, if it came from disk.
    pub source: Option<PathBuf>,
    pub body: Arc<str>,
    pub parent_name: Option<Arc<str>>,
    pub placeholders: BTreeSet<Arc<str>>,
    pub(crate) segments: Vec<Segment>,
}

impl Template {
    /// Parses `body` as a template named `name`.
    ///
    /// The returned template has not had its includes expanded yet; that
    /// happens when the registry is assembled.
    pub fn parse(name: &str, source: Option<&Path>, body: &str) -> Result<Template> {
        let (parent_name, segments) = match has_markers(body) {
            true => Parser::new(name, body).parse()?,
            false if body.is_empty() => (None, vec![]),
            false => (None, vec![Segment::Text(body.into())]),
        };

        let placeholders = placeholders_of(&segments);
        Ok(Template {
            name: name.into(),
            source: source.map(Path::to_path_buf),
            body: body.into(),
            parent_name,
            placeholders,
            segments,
        })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn has_placeholder(&self, name: &str) -> bool {
        self.placeholders.contains(name)
    }

    pub(crate) fn includes(&self) -> impl Iterator<Item = &Arc<str>> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Include(name) => Some(name),
            _ => None,
        })
    }

    pub(crate) fn set_expanded(&mut self, segments: Vec<Segment>) {
        self.placeholders = placeholders_of(&segments);
        self.segments = segments;
    }
}

pub(crate) fn placeholders_of(segments: &[Segment]) -> BTreeSet<Arc<str>> {
    segments.iter()
        .filter_map(|s| match s {
            Segment::Placeholder(name) => Some(name.clone()),
            _ => None,
        })
        .collect()
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.')
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().all(is_name_byte)
        && !name.starts_with('.')
        && !name.ends_with('.')
        && !name.contains("..")
}

struct Parser<'a> {
    name: &'a str,
    input: &'a str,
    pos: usize,
    segments: Vec<Segment>,
    parent: Option<Arc<str>>,
}

impl<'a> Parser<'a> {
    fn new(name: &'a str, input: &'a str) -> Self {
        Parser { name, input, pos: 0, segments: vec![], parent: None }
    }

    fn parse(mut self) -> Result<(Option<Arc<str>>, Vec<Segment>)> {
        let bytes = self.input.as_bytes();
        let mut text_start = 0;
        while let Some(i) = memchr::memchr(b'{', &bytes[self.pos..]) {
            let start = self.pos + i;
            let close = match bytes.get(start + 1) {
                Some(b'{') => "}}",
                Some(b'%') => "%}",
                Some(b'#') => "#}",
                _ => {
                    self.pos = start + 1;
                    continue;
                }
            };

            let inner_start = start + 2;
            let inner_end = match self.input[inner_start..].find(close) {
                Some(j) => inner_start + j,
                None => return err! {
                    format!("unterminated `{}` marker", &self.input[start..inner_start]),
                    "template" => self.name,
                    "offset" => start,
                },
            };

            self.push_text(text_start, start);
            self.pos = inner_end + 2;
            text_start = self.pos;

            let inner = self.input[inner_start..inner_end].trim();
            match close {
                "}}" => self.placeholder(inner, start)?,
                "%}" => {
                    if self.directive(inner, start)? {
                        // Swallow the line break following `extends`.
                        let rest = &self.input[self.pos..];
                        let skip = if rest.starts_with("\r\n") { 2 }
                            else if rest.starts_with('\n') { 1 }
                            else { 0 };

                        self.pos += skip;
                        text_start = self.pos;
                    }
                },
                _ => { /* comment */ }
            }
        }

        self.push_text(text_start, self.input.len());
        Ok((self.parent, self.segments))
    }

    fn push_text(&mut self, start: usize, end: usize) {
        if start < end {
            let text = &self.input[start..end];
            match self.segments.last_mut() {
                Some(Segment::Text(prev)) => *prev = format!("{prev}{text}").into(),
                _ => self.segments.push(Segment::Text(text.into())),
            }
        }
    }

    fn placeholder(&mut self, inner: &str, offset: usize) -> Result<()> {
        if !is_valid_name(inner) {
            return err! {
                "invalid placeholder name",
                "template" => self.name,
                "placeholder" => format!("{{{{{inner}}}}}"),
                "offset" => offset,
            };
        }

        self.segments.push(Segment::Placeholder(inner.into()));
        Ok(())
    }

    /// Handles `{% ... %}`. Returns `true` if the directive was `extends`.
    fn directive(&mut self, inner: &str, offset: usize) -> Result<bool> {
        let (keyword, argument) = inner.split_once(char::is_whitespace)
            .map(|(k, a)| (k, a.trim()))
            .unwrap_or((inner, ""));

        if !matches!(keyword, "extends" | "include") {
            return err! {
                format!("unknown directive `{keyword}`"),
                "template" => self.name,
                "offset" => offset,
            };
        }

        let target = match unquote(argument) {
            Some(target) if !target.is_empty() => target,
            _ => return err! {
                format!("`{keyword}` expects a quoted template name"),
                "template" => self.name,
                "directive" => inner,
                "offset" => offset,
            },
        };

        match keyword {
            "extends" => {
                if self.parent.is_some() {
                    return err! {
                        "template extends more than one parent",
                        "template" => self.name,
                        "offset" => offset,
                    };
                }

                let only_whitespace_before = self.segments.iter().all(|s| match s {
                    Segment::Text(text) => text.trim().is_empty(),
                    _ => false,
                });

                if !only_whitespace_before {
                    return err! {
                        "`extends` must come before any other content",
                        "template" => self.name,
                        "offset" => offset,
                    };
                }

                self.segments.clear();
                self.parent = Some(target.into());
                Ok(true)
            }
            _ => {
                self.segments.push(Segment::Include(target.into()));
                Ok(false)
            }
        }
    }
}

fn unquote(s: &str) -> Option<&str> {
    ['"', '\''].into_iter().find_map(|q| s.strip_prefix(q)?.strip_suffix(q))
}

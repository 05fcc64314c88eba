use crate::error::Result;
use crate::value::{Dict, MetadataFormat, Toml, Yaml};

/// The metadata block syntax a file opened with.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Delimiter {
    /// `+++` fenced TOML.
    Toml,
    /// `---` fenced YAML.
    Yaml,
}

impl Delimiter {
    fn fence(self) -> &'static str {
        match self {
            Delimiter::Toml => "+++",
            Delimiter::Yaml => "---",
        }
    }

    fn detect(line: &str) -> Option<Self> {
        match line.trim_end() {
            "+++" => Some(Delimiter::Toml),
            "---" => Some(Delimiter::Yaml),
            _ => None,
        }
    }
}

/// A renderable file, split into its metadata block and body.
#[derive(Debug, Clone, PartialEq)]
pub struct FrontMatter<'a> {
    pub delimiter: Option<Delimiter>,
    pub metadata: Dict,
    pub body: &'a str,
}

/// Returns the first line of `s` without its terminator, and the rest.
fn split_line(s: &str) -> (&str, &str) {
    match s.find('\n') {
        Some(i) => (s[..i].strip_suffix('\r').unwrap_or(&s[..i]), &s[i + 1..]),
        None => (s, ""),
    }
}

/// Finds the raw metadata block at the start of `input`, if any.
///
/// Returns the delimiter, the raw block and the body following it.
pub fn split(input: &str) -> Result<Option<(Delimiter, &str, &str)>> {
    let input = input.strip_prefix('\u{feff}').unwrap_or(input);
    let (first, block_start) = split_line(input);
    let Some(delimiter) = Delimiter::detect(first) else {
        return Ok(None);
    };

    let mut rest = block_start;
    while !rest.is_empty() {
        let (line, next) = split_line(rest);
        if line.trim_end() == delimiter.fence() {
            let block = &block_start[..block_start.len() - rest.len()];
            return Ok(Some((delimiter, block, next)));
        }

        rest = next;
    }

    err! {
        "front matter block is never closed",
        "expected closing line" => delimiter.fence(),
    }
}

/// Splits `input` and parses its metadata block.
///
/// ```rust
/// use sitebuilder::content::frontmatter::{self, Delimiter};
/// use sitebuilder::value::Value;
///
/// let page = frontmatter::parse("+++\ntitle = \"Hi\"\n+++\nHello").unwrap();
/// assert_eq!(page.delimiter, Some(Delimiter::Toml));
/// assert_eq!(page.metadata.get("title"), Some(&Value::from("Hi")));
/// assert_eq!(page.body, "Hello");
///
/// let plain = frontmatter::parse("Just text").unwrap();
/// assert!(plain.metadata.is_empty());
/// assert_eq!(plain.body, "Just text");
/// ```
pub fn parse(input: &str) -> Result<FrontMatter<'_>> {
    let Some((delimiter, block, body)) = split(input)? else {
        let body = input.strip_prefix('\u{feff}').unwrap_or(input);
        return Ok(FrontMatter { delimiter: None, metadata: Dict::new(), body });
    };

    let metadata = match delimiter {
        Delimiter::Toml => Toml::dict(block)?,
        Delimiter::Yaml => Yaml::dict(block)?,
    };

    Ok(FrontMatter { delimiter: Some(delimiter), metadata, body })
}

//! Markdown to HTML conversion for content bodies.

use pulldown_cmark::{html, Options, Parser};

/// Extensions whose bodies are treated as markdown.
pub const EXTENSIONS: &[&str] = &["md", "markdown"];

pub fn is_markdown(ext: &str) -> bool {
    EXTENSIONS.iter().any(|e| e.eq_ignore_ascii_case(ext))
}

fn options() -> Options {
    // Front matter is split off before we get here; a stray `---` block later
    // in the document is a thematic break, not metadata.
    Options::all()
        .difference(Options::ENABLE_SMART_PUNCTUATION)
        .difference(Options::ENABLE_YAML_STYLE_METADATA_BLOCKS)
        .difference(Options::ENABLE_PLUSES_DELIMITED_METADATA_BLOCKS)
}

/// Renders `input` as HTML.
///
/// ```rust
/// let html = sitebuilder::markdown::to_html("# Hi\n\nHello *world*");
/// assert_eq!(html, "<h1>Hi</h1>\n<p>Hello <em>world</em></p>\n");
/// ```
pub fn to_html(input: &str) -> String {
    let parser = Parser::new_ext(input, options());
    let mut output = String::with_capacity(input.len() + input.len() / 2);
    html::push_html(&mut output, parser);
    output
}

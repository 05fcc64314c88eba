//! Composition of one content item through its template chain.

use std::fmt::Write;
use std::path::PathBuf;
use std::sync::Arc;

use crate::content::ContentItem;
use crate::error::{ErrorKind, ItemError};
use crate::markdown;
use crate::templating::{Registry, ResolvedChain, Segment, CONTENT};
use crate::value;

/// Knobs that change what [`render()`] produces.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// Convert markdown bodies to HTML before composition.
    pub markdown: bool,
}

#[derive(Debug)]
pub struct RenderResult {
    pub target_path: PathBuf,
    pub output: Result<Vec<u8>, ItemError>,
}

impl RenderResult {
    pub fn is_ok(&self) -> bool {
        self.output.is_ok()
    }
}

/// Formats that may be emitted as-is when no template applies.
pub const STANDALONE_FORMATS: &[&str] = &["html", "htm"];

/// Renders `item` through the template it names.
///
/// Starting from the leaf-most template, the accumulated text is placed into
/// each template's `{{ content }}` slot until the root layout is reached;
/// the content body seeds the accumulation. Every other placeholder is looked
/// up in the item's metadata. Inserted text is never scanned for markers.
///
/// Items without a template are emitted verbatim if they are HTML and fail
/// with [`ErrorKind::TemplateMissing`] otherwise. Assets have no body and are
/// never rendered; the builder copies them instead.
///
/// ```rust
/// use sitebuilder::content::ContentItem;
/// use sitebuilder::render::{render, RenderOptions};
/// use sitebuilder::templating::Registry;
///
/// let registry = Registry::from_sources([
///     ("base", "<body>{{ content }}</body>"),
///     ("post", "{% extends \"base\" %}<h1>{{ title }}</h1>{{ content }}"),
/// ]).unwrap();
///
/// let item = ContentItem {
///     source_path: "hello.md".into(),
///     target_path: "hello.html".into(),
///     format: Some("md".into()),
///     metadata: sitebuilder::dict!["title" => "Hi"],
///     body: Some("Hello".into()),
///     template_ref: Some("post".into()),
/// };
///
/// let result = render(&item, &registry, &RenderOptions::default());
/// assert_eq!(result.output.unwrap(), b"<body><h1>Hi</h1>Hello</body>");
/// ```
pub fn render(item: &ContentItem, registry: &Registry, options: &RenderOptions) -> RenderResult {
    RenderResult {
        target_path: item.target_path.clone(),
        output: render_bytes(item, registry, options),
    }
}

fn render_bytes(
    item: &ContentItem,
    registry: &Registry,
    options: &RenderOptions,
) -> Result<Vec<u8>, ItemError> {
    let source = &item.source_path;
    let raw = item.body.as_deref().unwrap_or_default();
    let body = match item.format() {
        Some(ext) if options.markdown && markdown::is_markdown(ext) => markdown::to_html(raw),
        _ => raw.to_string(),
    };

    let Some(name) = item.template_ref.as_deref() else {
        return match item.format() {
            Some(ext) if STANDALONE_FORMATS.contains(&ext) => Ok(body.into_bytes()),
            _ => Err(ItemError::new(source, ErrorKind::TemplateMissing, format_args! {
                "`{}` items need a template and none is named or configured",
                item.format().unwrap_or("extensionless")
            })),
        };
    };

    let chain = registry.resolve(name)
        .map_err(|e| ItemError::new(source, ErrorKind::TemplateNotFound, e))?;

    if !chain.leaf().has_placeholder(CONTENT) {
        let message = format!("template `{name}` has no `{{{{ {CONTENT} }}}}` placeholder for the body");
        return Err(ItemError::new(source, ErrorKind::ContentSlotMissing, message));
    }

    let (output, unresolved) = compose(&chain, item, body);
    if !unresolved.is_empty() {
        let names = unresolved.iter()
            .map(|name| format!("`{name}`"))
            .collect::<Vec<_>>()
            .join(", ");

        let message = format!("no value for {names} in template chain {}", chain_display(&chain));
        return Err(ItemError::new(source, ErrorKind::UnresolvedPlaceholder, message));
    }

    Ok(output.into_bytes())
}

/// Composes `body` through `chain`, returning the output and the names of all
/// placeholders that had no value, in order of first appearance.
fn compose(chain: &ResolvedChain, item: &ContentItem, body: String) -> (String, Vec<Arc<str>>) {
    let mut unresolved: Vec<Arc<str>> = vec![];
    let mut accumulated = body;
    for template in chain.iter().rev() {
        let mut output = String::with_capacity(template.body.len() + accumulated.len());
        for segment in template.segments() {
            match segment {
                Segment::Text(text) => output.push_str(text),
                Segment::Placeholder(name) if &**name == CONTENT => {
                    output.push_str(&accumulated);
                }
                Segment::Placeholder(name) => match value::lookup(&item.metadata, name) {
                    // Writing to a `String` cannot fail.
                    Some(value) => { let _ = write!(output, "{value}"); }
                    None if !unresolved.contains(name) => unresolved.push(name.clone()),
                    None => {},
                },
                // The registry expands includes when it loads templates.
                Segment::Include(_) => {},
            }
        }

        accumulated = output;
    }

    (accumulated, unresolved)
}

fn chain_display(chain: &ResolvedChain) -> String {
    chain.names().collect::<Vec<_>>().join(" <- ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dict;
    use crate::value::Dict;

    fn item(template: Option<&str>, format: &str, body: &str, metadata: Dict) -> ContentItem {
        ContentItem {
            source_path: format!("page.{format}").into(),
            target_path: "page.html".into(),
            format: Some(format.into()),
            metadata,
            body: Some(body.into()),
            template_ref: template.map(Into::into),
        }
    }

    fn output(result: RenderResult) -> String {
        String::from_utf8(result.output.unwrap()).unwrap()
    }

    fn registry() -> Registry {
        Registry::from_sources([
            ("base", "<html><title>{{ title }}</title>{{ content }}</html>"),
            ("post", "{% extends \"base\" %}\n<article>{{ content }}</article>"),
            ("special", "{% extends \"post\" %}<div class=\"{{ kind }}\">{{ content }}</div>"),
        ]).unwrap()
    }

    #[test]
    fn post_extends_base() {
        let page = item(Some("post"), "md", "Hello", dict!["template" => "post", "title" => "T"]);
        let result = render(&page, &registry(), &RenderOptions::default());
        assert_eq!(result.target_path, PathBuf::from("page.html"));
        assert_eq!(output(result), "<html><title>T</title><article>Hello</article></html>");
    }

    #[test]
    fn composition_matches_manual_inlining() {
        let registry = registry();
        let meta = dict!["title" => "T", "kind" => "note"];
        let page = item(Some("special"), "md", "Body", meta.clone());
        let composed = output(render(&page, &registry, &RenderOptions::default()));

        let c = "<div class=\"note\">Body</div>";
        let b = format!("<article>{c}</article>");
        let a = format!("<html><title>T</title>{b}</html>");
        assert_eq!(composed, a);
    }

    #[test]
    fn rendering_is_deterministic() {
        let registry = registry();
        let page = item(Some("special"), "md", "x", dict!["title" => 1, "kind" => 2.5]);
        let first = render(&page, &registry, &RenderOptions::default()).output.unwrap();
        for _ in 0..8 {
            assert_eq!(render(&page, &registry, &RenderOptions::default()).output.unwrap(), first);
        }
    }

    #[test]
    fn substituted_text_is_not_rescanned() {
        let page = item(Some("post"), "md", "{{ title }}", dict!["title" => "{{ evil }}"]);
        let out = output(render(&page, &registry(), &RenderOptions::default()));
        assert_eq!(out, "<html><title>{{ evil }}</title><article>{{ title }}</article></html>");
    }

    #[test]
    fn content_slot_ignores_metadata() {
        let page = item(Some("post"), "md", "real", dict!["title" => "t", "content" => "fake"]);
        let out = output(render(&page, &registry(), &RenderOptions::default()));
        assert!(out.contains("<article>real</article>"));
        assert!(!out.contains("fake"));
    }

    #[test]
    fn nested_metadata_and_scalars() {
        let registry = Registry::from_sources([
            ("card", "{{ author.name }} ({{ count }}, {{ ok }}){{ content }}"),
        ]).unwrap();

        let meta = dict!["author" => dict!["name" => "Ada"], "count" => 3, "ok" => true];
        let page = item(Some("card"), "txt", "!", meta);
        assert_eq!(output(render(&page, &registry, &RenderOptions::default())), "Ada (3, true)!");
    }

    #[test]
    fn unresolved_placeholders_are_collected() {
        let registry = Registry::from_sources([
            ("base", "{{ site }}{{ content }}{{ site }}"),
            ("leaf", "{% extends \"base\" %}{{ title }}{{ content }}{{ date }}{{ title }}"),
        ]).unwrap();

        let page = item(Some("leaf"), "md", "x", Dict::new());
        let error = render(&page, &registry, &RenderOptions::default()).output.unwrap_err();
        assert_eq!(error.kind, ErrorKind::UnresolvedPlaceholder);
        assert_eq!(error.message, "no value for `title`, `date`, `site` in template chain base <- leaf");
    }

    #[test]
    fn missing_and_unknown_templates() {
        let registry = registry();
        let page = item(Some("missing"), "md", "x", Dict::new());
        let error = render(&page, &registry, &RenderOptions::default()).output.unwrap_err();
        assert_eq!(error.kind, ErrorKind::TemplateNotFound);
        assert_eq!(error.message, "template `missing` not found");
        assert_eq!(error.path, PathBuf::from("page.md"));

        let page = item(None, "md", "x", Dict::new());
        let error = render(&page, &registry, &RenderOptions::default()).output.unwrap_err();
        assert_eq!(error.kind, ErrorKind::TemplateMissing);
    }

    #[test]
    fn leaf_without_content_slot_fails() {
        let registry = Registry::from_sources([
            ("nav", "<nav>{{ content }}</nav>"),
            ("banner", "<h1>{{ title }}</h1>"),
            ("wrapped", "{% include \"nav\" %}"),
        ]).unwrap();

        let page = item(Some("banner"), "md", "lost", dict!["title" => "t"]);
        let error = render(&page, &registry, &RenderOptions::default()).output.unwrap_err();
        assert_eq!(error.kind, ErrorKind::ContentSlotMissing);
        assert_eq!(error.message, "template `banner` has no `{{ content }}` placeholder for the body");

        let page = item(Some("wrapped"), "md", "kept", Dict::new());
        assert_eq!(output(render(&page, &registry, &RenderOptions::default())), "<nav>kept</nav>");
    }

    #[test]
    fn html_renders_standalone() {
        let page = item(None, "html", "<p>{{ not_a_marker }}</p>", Dict::new());
        let out = output(render(&page, &Registry::empty(), &RenderOptions::default()));
        assert_eq!(out, "<p>{{ not_a_marker }}</p>");
    }

    #[test]
    fn markdown_is_converted_when_enabled() {
        let page = item(Some("post"), "md", "*hi*", dict!["title" => "t"]);
        let options = RenderOptions { markdown: true };
        let out = output(render(&page, &registry(), &options));
        assert!(out.contains("<article><p><em>hi</em></p>\n</article>"));

        let out = output(render(&page, &registry(), &RenderOptions::default()));
        assert!(out.contains("<article>*hi*</article>"));

        let text = item(Some("post"), "txt", "*hi*", dict!["title" => "t"]);
        assert!(output(render(&text, &registry(), &options)).contains("<article>*hi*</article>"));
    }
}

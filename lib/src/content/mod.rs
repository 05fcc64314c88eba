//! Content discovery: classifying source files and reading their metadata.

pub mod frontmatter;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::config::Config;
use crate::error::{Chainable, ErrorKind, ItemError, Result};
use crate::fstree::{Entry, FsTree};
use crate::value::{Dict, Value};

/// Metadata key naming the template to render an item with.
pub const TEMPLATE_KEY: &str = "template";

/// Metadata key that, when `true`, keeps an item out of the build.
pub const DRAFT_KEY: &str = "draft";

/// One source file destined to become one output file.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentItem {
    /// Location relative to the source root.
    pub source_path: PathBuf,
    /// Location relative to the build root.
    pub target_path: PathBuf,
    /// Lowercased source extension, if any.
    pub format: Option<String>,
    pub metadata: Dict,
    /// The text after the front matter; `None` for assets.
    pub body: Option<String>,
    pub template_ref: Option<Arc<str>>,
}

impl ContentItem {
    /// Assets are copied byte for byte instead of being rendered.
    pub fn is_asset(&self) -> bool {
        self.body.is_none()
    }

    pub fn format(&self) -> Option<&str> {
        self.format.as_deref()
    }
}

/// The outcome of walking a source root.
#[derive(Debug, Default)]
pub struct Content {
    /// Items to build, sorted by source path.
    pub items: Vec<ContentItem>,
    /// Items that could not be loaded.
    pub errors: Vec<ItemError>,
    /// Source paths of items marked as drafts.
    pub drafts: Vec<PathBuf>,
}

enum Loaded {
    Item(ContentItem),
    Draft { source: PathBuf, target: PathBuf },
    Failed { target: PathBuf, error: ItemError },
}

impl Loaded {
    fn source(&self) -> &Path {
        match self {
            Loaded::Item(item) => &item.source_path,
            Loaded::Draft { source, .. } => source,
            Loaded::Failed { error, .. } => &error.path,
        }
    }

    fn target(&self) -> &Path {
        match self {
            Loaded::Item(item) => &item.target_path,
            Loaded::Draft { target, .. } | Loaded::Failed { target, .. } => target,
        }
    }
}

/// Walks `config.source_root` and loads every file in it.
///
/// Per-file problems end up in [`Content::errors`]. The only fatal errors are
/// an unreadable source root and two files that would be written to the same
/// target path; the latter is checked across every file, including drafts and
/// files that failed to load.
pub fn load(config: &Config) -> Result<Content> {
    let root = &config.source_root;
    let tree = FsTree::build(root)
        .chain_with(|| error!("failed to open source root", "source root" => root.display()))?;

    let files: Vec<&Entry> = tree.files().collect();
    let loaded: Vec<Loaded> = files.par_iter()
        .map(|entry| load_entry(config, entry))
        .collect();

    let mut targets: FxHashMap<&Path, &Path> = FxHashMap::default();
    for item in &loaded {
        if let Some(previous) = targets.insert(item.target(), item.source()) {
            return err! {
                "two content items map to the same output",
                "target" => item.target().display(),
                "first source" => previous.display(),
                "second source" => item.source().display(),
            };
        }
    }

    let mut content = Content::default();
    for item in loaded {
        match item {
            Loaded::Item(item) => content.items.push(item),
            Loaded::Draft { source, .. } => content.drafts.push(source),
            Loaded::Failed { error, .. } => content.errors.push(error),
        }
    }

    content.items.sort_by(|a, b| a.source_path.cmp(&b.source_path));
    tracing::debug! {
        items = content.items.len(),
        drafts = content.drafts.len(),
        errors = content.errors.len(),
        "loaded content from {}", root.display()
    };

    Ok(content)
}

fn load_entry(config: &Config, entry: &Entry) -> Loaded {
    let source = entry.to_relative_path_buf();
    let format = entry.file_ext().map(str::to_ascii_lowercase);
    if !config.is_renderable(format.as_deref()) {
        return Loaded::Item(ContentItem {
            target_path: source.clone(),
            source_path: source,
            format,
            metadata: Dict::new(),
            body: None,
            template_ref: None,
        });
    }

    let target = source.with_extension(&config.output_extension);
    let fail = |kind, message: &dyn std::fmt::Display| Loaded::Failed {
        target: target.clone(),
        error: ItemError::new(&source, kind, message),
    };

    let bytes = match fs::read(&entry.path) {
        Ok(bytes) => bytes,
        Err(e) => return fail(ErrorKind::Read, &e),
    };

    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => return fail(ErrorKind::InvalidEncoding, &e.utf8_error()),
    };

    let page = match frontmatter::parse(&text) {
        Ok(page) => page,
        Err(e) => return Loaded::Failed {
            error: ItemError::from_error(&source, ErrorKind::MalformedMetadata, &e),
            target,
        },
    };

    let template_ref = match page.metadata.get(TEMPLATE_KEY) {
        Some(Value::String(name)) => Some(name.clone()),
        Some(other) => {
            let message = format!("`{TEMPLATE_KEY}` must be a string, found {}", other.kind());
            return fail(ErrorKind::MalformedMetadata, &message);
        }
        None => config.default_template.as_deref().map(Arc::from),
    };

    match page.metadata.get(DRAFT_KEY) {
        Some(Value::Bool(true)) => return Loaded::Draft { source, target },
        Some(Value::Bool(false)) | None => {},
        Some(other) => {
            let message = format!("`{DRAFT_KEY}` must be a boolean, found {}", other.kind());
            return fail(ErrorKind::MalformedMetadata, &message);
        }
    }

    let body = page.body.to_string();
    Loaded::Item(ContentItem {
        source_path: source,
        target_path: target,
        format,
        metadata: page.metadata,
        body: Some(body),
        template_ref,
    })
}

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Chainable, Result};
use crate::value::{Format, Toml};

pub const DEFAULT_OUTPUT_EXTENSION: &str = "html";

pub const DEFAULT_RENDERABLE_EXTENSIONS: &[&str] = &["md", "markdown", "html", "htm", "txt"];

/// Everything a build needs to know, passed explicitly to the
/// [`SiteBuilder`](crate::SiteBuilder).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub source_root: PathBuf,
    pub build_root: PathBuf,
    pub templates_root: Option<PathBuf>,
    /// Template applied to renderable items whose metadata names none.
    pub default_template: Option<String>,
    /// Extension given to rendered outputs, without the leading dot.
    pub output_extension: String,
    /// Extensions (lowercase, without the dot) of renderable content.
    pub renderable_extensions: Vec<String>,
    /// Convert markdown bodies to HTML before composition.
    pub markdown: bool,
    /// Consult and maintain the build manifest to skip unchanged items.
    pub incremental: bool,
    /// Size of the render/write worker pool; all cores when `None`.
    pub jobs: Option<usize>,
}

/// The on-disk form of [`Config`].
///
/// ```toml
/// source = "content"
/// build = "public"
/// templates = "templates"
/// default_template = "page"
/// markdown = true
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub source: Option<PathBuf>,
    pub build: Option<PathBuf>,
    pub templates: Option<PathBuf>,
    pub default_template: Option<String>,
    pub output_extension: Option<String>,
    pub renderable_extensions: Option<Vec<String>>,
    pub markdown: Option<bool>,
    pub incremental: Option<bool>,
    pub jobs: Option<usize>,
}

impl Config {
    pub fn new<S: Into<PathBuf>, B: Into<PathBuf>>(source_root: S, build_root: B) -> Self {
        Config {
            source_root: source_root.into(),
            build_root: build_root.into(),
            templates_root: None,
            default_template: None,
            output_extension: DEFAULT_OUTPUT_EXTENSION.into(),
            renderable_extensions: DEFAULT_RENDERABLE_EXTENSIONS.iter()
                .map(|s| s.to_string())
                .collect(),
            markdown: false,
            incremental: true,
            jobs: None,
        }
    }

    /// Reads a TOML settings file. Relative paths in the file are resolved
    /// against the directory containing it; `source` and `build` default to
    /// `source/` and `build/` next to the file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let settings: Settings = Toml::read(path)
            .chain_with(|| error!("failed to load configuration", "path" => path.display()))?;

        let base = path.parent().unwrap_or(Path::new(""));
        let resolve = |p: PathBuf| if p.is_absolute() { p } else { base.join(p) };

        let mut config = Config::new(
            resolve(settings.source.unwrap_or_else(|| "source".into())),
            resolve(settings.build.unwrap_or_else(|| "build".into())),
        );

        config.templates_root = settings.templates.map(resolve);
        config.default_template = settings.default_template;
        if let Some(ext) = settings.output_extension {
            config.output_extension = ext;
        }

        if let Some(exts) = settings.renderable_extensions {
            config.renderable_extensions = exts;
        }

        config.markdown = settings.markdown.unwrap_or(config.markdown);
        config.incremental = settings.incremental.unwrap_or(config.incremental);
        config.jobs = settings.jobs;
        config.validate()?;
        Ok(config)
    }

    pub fn with_templates<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.templates_root = Some(root.into());
        self
    }

    pub fn with_default_template<S: Into<String>>(mut self, name: S) -> Self {
        self.default_template = Some(name.into());
        self
    }

    pub fn with_output_extension<S: Into<String>>(mut self, ext: S) -> Self {
        self.output_extension = ext.into();
        self
    }

    pub fn with_markdown(mut self, enabled: bool) -> Self {
        self.markdown = enabled;
        self
    }

    pub fn with_incremental(mut self, enabled: bool) -> Self {
        self.incremental = enabled;
        self
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = Some(jobs);
        self
    }

    pub fn validate(&self) -> Result<()> {
        let bad_ext = |ext: &str| ext.is_empty() || ext.contains(['.', '/', '\\']);
        if bad_ext(&self.output_extension) {
            return err! {
                "invalid output extension",
                "extension" => &self.output_extension,
                "expected" => "a non-empty extension without dots or separators",
            };
        }

        if let Some(ext) = self.renderable_extensions.iter().find(|e| bad_ext(e)) {
            return err!("invalid renderable extension", "extension" => ext);
        }

        if self.jobs == Some(0) {
            return err!("`jobs` must be at least 1");
        }

        if self.build_root.starts_with(&self.source_root) {
            return err! {
                "build root must not be inside the source root",
                "source root" => self.source_root.display(),
                "build root" => self.build_root.display(),
            };
        }

        Ok(())
    }

    /// Whether files with extension `ext` are rendered rather than copied.
    pub fn is_renderable(&self, ext: Option<&str>) -> bool {
        ext.map_or(false, |ext| {
            self.renderable_extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
        })
    }
}

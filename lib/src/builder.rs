//! The build orchestrator.
//!
//! A build runs through a fixed sequence of stages:
//!
//! ```text
//! Idle -> LoadingTemplates -> LoadingContent -> Rendering -> Writing -> Done
//!                   \               \               \           \
//!                    +---------------+---------------+-----------+-> Failed
//! ```
//!
//! Everything that can fail the build as a whole happens before `Rendering`,
//! so a fatal error never leaves a trace in the build root. From `Rendering`
//! on, failures are per item: each item is rendered and staged by one worker,
//! then moved into place, and the manifest is updated from the collected
//! results by a single thread.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(test)]
use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, Mutex};

use rayon::prelude::*;
use rustc_hash::FxHashSet;

use crate::config::Config;
use crate::content::{self, ContentItem};
use crate::error::{Chainable, ErrorKind, ItemError, Result};
use crate::manifest::{self, BuildManifest, Fingerprint, FingerprintInputs, ManifestEntry};
use crate::render::{render, RenderOptions};
use crate::templating::Registry;
use crate::util::{write_synced, PathExt};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BuildStage {
    Idle,
    LoadingTemplates,
    LoadingContent,
    Rendering,
    Writing,
    Done,
    Failed,
}

/// Requests that a running build stop dispatching items.
///
/// Items already being rendered or written complete; no further items are
/// started and the manifest is left as it was. Cancellation is sticky: a
/// cancelled token cancels every later build of the same builder too.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    #[cfg(test)]
    checks_left: Option<Arc<AtomicUsize>>,
}

impl CancelToken {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        #[cfg(test)]
        if let Some(left) = &self.checks_left {
            if left.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_err() {
                self.cancel();
            }
        }

        self.cancelled.load(Ordering::SeqCst)
    }

    /// A token that cancels itself once it has been checked `checks` times.
    #[cfg(test)]
    fn cancelling_after(checks: usize) -> Self {
        CancelToken {
            checks_left: Some(Arc::new(AtomicUsize::new(checks))),
            ..CancelToken::default()
        }
    }
}

/// The summary of a completed build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Outputs written to the build root.
    pub written: usize,
    /// Items left untouched because they are unchanged since the last build.
    pub skipped: usize,
    /// Items that failed; see `errors`.
    pub failed: usize,
    /// Outputs deleted because their source is gone.
    pub removed: usize,
    /// Items excluded because they are marked as drafts.
    pub drafts: usize,
    /// One error per failed item, sorted by source path.
    pub errors: Vec<ItemError>,
    pub cancelled: bool,
}

impl BuildReport {
    pub fn is_success(&self) -> bool {
        self.failed == 0 && !self.cancelled
    }
}

impl fmt::Display for BuildReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} written, {} skipped, {} failed, {} removed, {} drafts",
            self.written, self.skipped, self.failed, self.removed, self.drafts)?;

        if self.cancelled {
            write!(f, " (cancelled)")?;
        }

        Ok(())
    }
}

/// Builds a site from a [`Config`].
///
/// ```rust,no_run
/// use sitebuilder::{Config, SiteBuilder};
///
/// # fn main() -> sitebuilder::error::Result<()> {
/// let config = Config::new("source", "build").with_default_template("page");
/// let mut builder = SiteBuilder::new(config);
/// builder.add_templates("templates")?;
///
/// let report = builder.build()?;
/// println!("{report}");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SiteBuilder {
    config: Config,
    registry: Option<Registry>,
    cancel: CancelToken,
    stage: Mutex<BuildStage>,
}

enum Outcome {
    Staged(Staged),
    Skipped,
    Failed(ItemError),
    Cancelled,
}

struct Staged {
    source: PathBuf,
    target: PathBuf,
    path: PathBuf,
    fingerprint: Fingerprint,
    output: Fingerprint,
}

/// What every worker needs to process one item.
struct Context<'a> {
    config: &'a Config,
    registry: &'a Registry,
    manifest: &'a BuildManifest,
    staging: &'a Path,
    options: RenderOptions,
    cancel: &'a CancelToken,
}

impl SiteBuilder {
    pub fn new(config: Config) -> Self {
        SiteBuilder {
            config,
            registry: None,
            cancel: CancelToken::default(),
            stage: Mutex::new(BuildStage::Idle),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Loads the templates under `root`, replacing any loaded before.
    ///
    /// Inheritance cycles, duplicate names and malformed templates are
    /// reported here, before any content is looked at.
    pub fn add_templates<P: AsRef<Path>>(&mut self, root: P) -> Result<&mut Self> {
        self.enter(BuildStage::LoadingTemplates);
        match Registry::load(root) {
            Ok(registry) => {
                tracing::info!(templates = registry.len(), "loaded templates");
                self.registry = Some(registry);
                self.enter(BuildStage::Idle);
                Ok(self)
            }
            Err(e) => {
                self.enter(BuildStage::Failed);
                Err(e)
            }
        }
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn stage(&self) -> BuildStage {
        *self.stage.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn enter(&self, stage: BuildStage) {
        let mut current = self.stage.lock().unwrap_or_else(|e| e.into_inner());
        if *current != stage {
            tracing::info!(from = ?*current, to = ?stage, "build stage");
            *current = stage;
        }
    }

    /// Runs a build.
    ///
    /// An `Err` is fatal and means nothing in the build root was changed.
    /// Per-item problems are collected in the returned [`BuildReport`].
    pub fn build(&self) -> Result<BuildReport> {
        let result = self.config.validate().and_then(|_| self.run());
        match &result {
            Ok(report) => {
                self.enter(BuildStage::Done);
                tracing::info!(success = report.is_success(), "build finished: {report}");
            }
            Err(e) => {
                self.enter(BuildStage::Failed);
                tracing::error!("build failed: {}", e.message());
            }
        }

        result
    }

    fn run(&self) -> Result<BuildReport> {
        let config = &self.config;
        let loaded;
        let registry = match (&self.registry, &config.templates_root) {
            (Some(registry), _) => registry,
            (None, Some(root)) => {
                self.enter(BuildStage::LoadingTemplates);
                loaded = Registry::load(root)?;
                &loaded
            }
            (None, None) => {
                loaded = Registry::empty();
                &loaded
            }
        };

        // `jwalk` schedules the walk on rayon's global pool; running it from
        // inside a one-thread build pool would block that thread on itself.
        self.enter(BuildStage::LoadingContent);
        let content = content::load(config)?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.jobs.unwrap_or(0))
            .thread_name(|i| format!("sitebuild-{i}"))
            .build()
            .chain_with(|| error!("failed to start worker pool"))?;

        pool.install(|| self.write(registry, &content))
    }

    fn write(&self, registry: &Registry, content: &content::Content) -> Result<BuildReport> {
        let config = &self.config;
        let build_root = &config.build_root;
        fs::create_dir_all(build_root)
            .chain_with(|| error!("failed to create build root", "path" => build_root.display()))?;

        let staging = tempfile::Builder::new()
            .prefix(".staging")
            .tempdir_in(build_root)
            .chain_with(|| error!("failed to create staging directory", "build root" => build_root.display()))?;

        let previous = BuildManifest::load(build_root);
        let context = Context {
            config,
            registry,
            manifest: &previous,
            staging: staging.path(),
            options: RenderOptions { markdown: config.markdown },
            cancel: &self.cancel,
        };

        self.enter(BuildStage::Rendering);
        let outcomes: Vec<Outcome> = content.items.par_iter()
            .map(|item| context.stage_item(item))
            .collect();

        self.enter(BuildStage::Writing);
        let mut report = BuildReport {
            drafts: content.drafts.len(),
            errors: content.errors.clone(),
            ..BuildReport::default()
        };

        let mut staged = vec![];
        for outcome in outcomes {
            match outcome {
                Outcome::Staged(item) => staged.push(item),
                Outcome::Skipped => report.skipped += 1,
                Outcome::Failed(error) => report.errors.push(error),
                Outcome::Cancelled => report.cancelled = true,
            }
        }

        let finished: Vec<_> = staged.into_par_iter()
            .map(|item| finalize(build_root, item))
            .collect();

        let mut next = previous.clone();
        let mut replaced = vec![];
        for result in finished {
            match result {
                Ok((source, entry)) => {
                    if let Some(old) = previous.get(&source) {
                        if old.target != entry.target {
                            replaced.push(old.target.clone());
                        }
                    }

                    next.insert(&source, entry);
                    report.written += 1;
                }
                Err(error) => report.errors.push(error),
            }
        }

        for error in &report.errors {
            tracing::warn!(source = %error.path.display(), kind = %error.kind, "{}", error.message);
        }

        report.failed = report.errors.len();
        report.errors.sort_by(|a, b| a.path.cmp(&b.path));
        if report.cancelled {
            tracing::warn!("build cancelled; manifest left unchanged");
        } else {
            report.removed = remove_stale(build_root, content, &mut next, replaced);
            if let Err(e) = next.save(build_root) {
                tracing::warn!("{e}");
            }
        }

        if let Err(e) = staging.close() {
            tracing::warn!(build_root = %build_root.display(), "failed to remove staging directory: {e}");
        }

        Ok(report)
    }
}

impl Context<'_> {
    /// Renders or reads `item` and writes the result to the staging
    /// directory, unless it is unchanged since the previous build.
    fn stage_item(&self, item: &ContentItem) -> Outcome {
        if self.cancel.is_cancelled() {
            return Outcome::Cancelled;
        }

        let source = &item.source_path;
        if !item.target_path.is_contained() {
            let message = format!("target `{}` escapes the build root", item.target_path.display());
            return Outcome::Failed(ItemError::new(source, ErrorKind::Stage, message));
        }

        let asset = match item.is_asset() {
            true => match fs::read(self.config.source_root.join(source)) {
                Ok(bytes) => Some(bytes),
                Err(e) => return Outcome::Failed(ItemError::new(source, ErrorKind::Read, e)),
            },
            false => None,
        };

        let chain = item.template_ref.as_deref()
            .and_then(|name| self.registry.resolve(name).ok());

        let fingerprint = manifest::fingerprint(item, FingerprintInputs {
            chain: chain.as_ref(),
            markdown: self.options.markdown,
            asset: asset.as_deref(),
        });

        let build_root = &self.config.build_root;
        if self.config.incremental && self.manifest.is_fresh(build_root, source, &fingerprint) {
            tracing::debug!(source = %source.display(), "unchanged");
            return Outcome::Skipped;
        }

        let bytes = match asset {
            Some(bytes) => bytes,
            None => match render(item, self.registry, &self.options).output {
                Ok(bytes) => bytes,
                Err(error) => return Outcome::Failed(error),
            },
        };

        let path = self.staging.join(&item.target_path);
        if let Err(e) = write_synced(&path, &bytes) {
            return Outcome::Failed(ItemError::from_error(source, ErrorKind::Stage, &e));
        }

        tracing::debug!(source = %source.display(), target = %item.target_path.display(), "staged");
        Outcome::Staged(Staged {
            source: source.clone(),
            target: item.target_path.clone(),
            path,
            fingerprint,
            output: Fingerprint::of_bytes(&bytes),
        })
    }
}

/// Moves a staged output to its final place in `build_root`.
fn finalize(build_root: &Path, item: Staged) -> Result<(PathBuf, ManifestEntry), ItemError> {
    let destination = build_root.join(&item.target);
    let moved = destination.parent()
        .map_or(Ok(()), fs::create_dir_all)
        .and_then(|_| fs::rename(&item.path, &destination));

    if let Err(e) = moved {
        let message = format!("failed to move output to {}: {e}", destination.display());
        return Err(ItemError::new(&item.source, ErrorKind::Finalize, message));
    }

    let entry = ManifestEntry {
        fingerprint: item.fingerprint,
        target: item.target.to_slash(),
        output: item.output,
    };

    Ok((item.source, entry))
}

/// Deletes outputs recorded in `manifest` that no current item produces:
/// those whose source was deleted or turned into a draft, and the previous
/// targets in `replaced` of items whose target moved. Returns the number of
/// files removed.
fn remove_stale(
    build_root: &Path,
    content: &content::Content,
    manifest: &mut BuildManifest,
    replaced: Vec<String>,
) -> usize {
    let sources: FxHashSet<String> = content.items.iter()
        .map(|item| item.source_path.to_slash())
        .chain(content.errors.iter().map(|error| error.path.to_slash()))
        .collect();

    let targets: FxHashSet<String> = content.items.iter()
        .map(|item| item.target_path.to_slash())
        .collect();

    let stale: Vec<String> = manifest.entries()
        .filter(|(source, _)| !sources.contains(*source))
        .map(|(source, _)| source.to_string())
        .collect();

    let mut doomed = BTreeSet::new();
    for source in stale {
        if let Some(entry) = manifest.remove(&source) {
            doomed.insert(entry.target);
        }
    }

    doomed.extend(replaced);
    doomed.into_iter()
        .filter(|target| !targets.contains(target))
        .filter(|target| remove_output(build_root, target))
        .count()
}

fn remove_output(build_root: &Path, target: &str) -> bool {
    let relative = Path::new(target);
    if !relative.is_contained() {
        tracing::warn!(output = target, "refusing to remove a path outside the build root");
        return false;
    }

    match fs::remove_file(build_root.join(relative)) {
        Ok(()) => {
            tracing::debug!(output = target, "removed stale output");
            true
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => {
            tracing::warn!(output = target, "failed to remove stale output: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::fs;
    use std::path::{Path, PathBuf};

    use super::*;

    struct Site {
        dir: tempfile::TempDir,
    }

    impl Site {
        fn new() -> Self {
            let site = Site { dir: tempfile::tempdir().unwrap() };
            fs::create_dir_all(site.source()).unwrap();
            fs::create_dir_all(site.templates()).unwrap();
            site.template("base.html", "<html>{{ content }}</html>");
            site.template("post.html", "{% extends \"base\" %}\n<article>{{ content }}</article>");
            site
        }

        fn source(&self) -> PathBuf { self.dir.path().join("source") }
        fn templates(&self) -> PathBuf { self.dir.path().join("templates") }
        fn build_root(&self) -> PathBuf { self.dir.path().join("build") }

        fn file(&self, path: &str, contents: impl AsRef<[u8]>) {
            let path = self.source().join(path);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        }

        fn template(&self, path: &str, contents: &str) {
            fs::write(self.templates().join(path), contents).unwrap();
        }

        fn config(&self) -> Config {
            Config::new(self.source(), self.build_root()).with_templates(self.templates())
        }

        fn build(&self) -> Result<BuildReport> {
            SiteBuilder::new(self.config()).build()
        }

        fn output(&self, path: &str) -> Option<String> {
            fs::read_to_string(self.build_root().join(path)).ok()
        }

        /// Every file under the build root, hidden ones included.
        fn snapshot(&self) -> BTreeMap<PathBuf, Vec<u8>> {
            fn walk(dir: &Path, into: &mut BTreeMap<PathBuf, Vec<u8>>) {
                let Ok(entries) = fs::read_dir(dir) else { return };
                for entry in entries {
                    let path = entry.unwrap().path();
                    if path.is_dir() {
                        walk(&path, into);
                    } else {
                        into.insert(path.clone(), fs::read(&path).unwrap());
                    }
                }
            }

            let mut files = BTreeMap::new();
            walk(&self.build_root(), &mut files);
            files
        }
    }

    static_assertions::assert_impl_all!(SiteBuilder: Send, Sync);
    static_assertions::assert_impl_all!(CancelToken: Send, Sync);

    #[test]
    fn renders_through_inherited_templates() {
        let site = Site::new();
        site.file("page.md", "---\ntemplate: post\n---\nHello");

        let mut builder = SiteBuilder::new(Config::new(site.source(), site.build_root()));
        builder.add_templates(site.templates()).unwrap();
        let report = builder.build().unwrap();

        assert!(report.is_success());
        assert_eq!(report.written, 1);
        assert_eq!(builder.stage(), BuildStage::Done);
        assert_eq!(site.output("page.html").unwrap(), "<html><article>Hello</article></html>");
    }

    #[test]
    fn second_build_skips_everything() {
        let site = Site::new();
        site.file("page.md", "---\ntemplate: post\n---\nHello");
        site.file("blog/entry.md", "+++\ntemplate = \"base\"\n+++\nEntry");
        site.file("logo.png", [0x89, b'P', b'N', b'G', 0, 0xff]);

        let first = site.build().unwrap();
        assert_eq!((first.written, first.skipped), (3, 0));
        let before = site.snapshot();

        let second = site.build().unwrap();
        assert_eq!((second.written, second.skipped, second.failed), (0, 3, 0));
        assert_eq!(site.snapshot(), before);
    }

    #[test]
    fn changes_are_rebuilt() {
        let site = Site::new();
        site.file("page.md", "---\ntemplate: post\n---\nHello");
        site.file("other.md", "---\ntemplate: base\n---\nOther");
        site.build().unwrap();

        site.template("post.html", "{% extends \"base\" %}<main>{{ content }}</main>");
        let report = site.build().unwrap();
        assert_eq!((report.written, report.skipped), (1, 1));
        assert_eq!(site.output("page.html").unwrap(), "<html><main>Hello</main></html>");

        fs::write(site.build_root().join("other.html"), "tampered").unwrap();
        let report = site.build().unwrap();
        assert_eq!((report.written, report.skipped), (1, 1));
        assert_eq!(site.output("other.html").unwrap(), "<html>Other</html>");
    }

    #[test]
    fn full_builds_ignore_the_manifest() {
        let site = Site::new();
        site.file("page.md", "---\ntemplate: post\n---\nHello");
        site.build().unwrap();

        let config = site.config().with_incremental(false).with_jobs(1);
        let report = SiteBuilder::new(config).build().unwrap();
        assert_eq!((report.written, report.skipped), (1, 0));
    }

    #[test]
    fn assets_are_copied_verbatim() {
        let site = Site::new();
        let bytes: Vec<u8> = (0..=255).collect();
        site.file("img/logo.png", &bytes);

        let report = site.build().unwrap();
        assert_eq!(report.written, 1);
        assert_eq!(fs::read(site.build_root().join("img/logo.png")).unwrap(), bytes);
    }

    #[test]
    fn collisions_abort_without_touching_the_build() {
        let site = Site::new();
        site.file("page.md", "---\ntemplate: post\n---\nHello");
        site.build().unwrap();
        let before = site.snapshot();

        site.file("page.html", "<p>standalone</p>");
        site.file("extra.md", "---\ntemplate: post\n---\nExtra");
        let error = site.build().unwrap_err();
        assert_eq!(error.message(), "two content items map to the same output");
        assert_eq!(site.snapshot(), before);
    }

    #[test]
    fn collisions_abort_a_fresh_build() {
        let site = Site::new();
        site.file("a.md", "---\ntemplate: post\n---\nA");
        site.file("a.txt", "---\ntemplate: post\n---\nA");

        assert!(site.build().is_err());
        assert!(!site.build_root().exists());
    }

    #[test]
    fn template_cycles_abort() {
        let site = Site::new();
        site.template("a.html", "{% extends \"b\" %}{{ content }}");
        site.template("b.html", "{% extends \"a\" %}{{ content }}");
        site.file("page.md", "---\ntemplate: post\n---\nHello");

        let mut builder = SiteBuilder::new(Config::new(site.source(), site.build_root()));
        let error = builder.add_templates(site.templates()).unwrap_err();
        let rendered = error.to_string();
        assert!(rendered.contains("template inheritance cycle"));
        assert!(rendered.contains("a -> b") || rendered.contains("b -> a"));
        assert_eq!(builder.stage(), BuildStage::Failed);

        assert!(site.build().is_err());
        assert!(!site.build_root().exists());
    }

    #[test]
    fn missing_templates_fail_only_their_item() {
        let site = Site::new();
        site.file("good.md", "---\ntemplate: post\n---\nGood");
        site.file("bad.md", "---\ntemplate: missing\n---\nBad");
        site.file("bare.md", "no template at all");

        let report = site.build().unwrap();
        assert!(!report.is_success());
        assert_eq!((report.written, report.failed), (1, 2));
        assert_eq!(report.errors[0].path, Path::new("bad.md"));
        assert_eq!(report.errors[0].kind, ErrorKind::TemplateNotFound);
        assert_eq!(report.errors[1].path, Path::new("bare.md"));
        assert_eq!(report.errors[1].kind, ErrorKind::TemplateMissing);
        assert!(site.output("bad.html").is_none());
        assert!(site.output("bare.html").is_none());
        assert!(site.output("good.html").is_some());
    }

    #[test]
    fn failed_items_keep_their_previous_output() {
        let site = Site::new();
        site.file("page.md", "---\ntemplate: post\n---\nHello");
        site.build().unwrap();

        site.file("page.md", "---\ntemplate: post\n---\nChanged");
        site.template("post.html", "{% extends \"base\" %}{{ title }}{{ content }}");
        let report = site.build().unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.errors[0].kind, ErrorKind::UnresolvedPlaceholder);
        assert_eq!(site.output("page.html").unwrap(), "<html><article>Hello</article></html>");

        let manifest = BuildManifest::load(&site.build_root());
        assert!(manifest.get(Path::new("page.md")).is_some());
    }

    #[test]
    fn default_template_and_standalone_html() {
        let site = Site::new();
        site.file("index.html", "<p>as is</p>");
        site.file("notes.txt", "plain");

        let config = site.config().with_default_template("base");
        let report = SiteBuilder::new(config).build().unwrap();
        assert!(report.is_success());
        assert_eq!(site.output("notes.html").unwrap(), "<html>plain</html>");
        assert_eq!(site.output("index.html").unwrap(), "<html><p>as is</p></html>");

        let site = Site::new();
        site.file("index.html", "<p>{{ as is }}</p>");
        site.build().unwrap();
        assert_eq!(site.output("index.html").unwrap(), "<p>{{ as is }}</p>");
    }

    #[test]
    fn drafts_are_excluded_and_removed() {
        let site = Site::new();
        site.file("page.md", "---\ntemplate: post\n---\nHello");
        site.build().unwrap();
        assert!(site.output("page.html").is_some());

        site.file("page.md", "---\ntemplate: post\ndraft: true\n---\nHello");
        let report = site.build().unwrap();
        assert_eq!((report.drafts, report.removed, report.written), (1, 1, 0));
        assert!(site.output("page.html").is_none());
    }

    #[test]
    fn deleted_sources_are_removed_from_the_build() {
        let site = Site::new();
        site.file("keep.md", "---\ntemplate: post\n---\nKeep");
        site.file("gone.md", "---\ntemplate: post\n---\nGone");
        site.build().unwrap();
        fs::write(site.build_root().join("unrelated.txt"), "mine").unwrap();

        fs::remove_file(site.source().join("gone.md")).unwrap();
        let report = site.build().unwrap();
        assert_eq!((report.removed, report.skipped), (1, 1));
        assert!(site.output("gone.html").is_none());
        assert_eq!(site.output("unrelated.txt").unwrap(), "mine");

        let manifest = BuildManifest::load(&site.build_root());
        assert_eq!(manifest.len(), 1);
    }

    #[test]
    fn replaced_sources_keep_their_shared_target() {
        let site = Site::new();
        site.file("page.md", "---\ntemplate: post\n---\nHello");
        site.build().unwrap();

        fs::remove_file(site.source().join("page.md")).unwrap();
        site.file("page.html", "<p>now static</p>");
        let report = site.build().unwrap();
        assert_eq!((report.written, report.removed), (1, 0));
        assert_eq!(site.output("page.html").unwrap(), "<p>now static</p>");
    }

    #[test]
    fn cancelled_builds_dispatch_nothing() {
        let site = Site::new();
        site.file("page.md", "---\ntemplate: post\n---\nHello");

        let builder = SiteBuilder::new(site.config());
        builder.cancel_token().cancel();
        let report = builder.build().unwrap();

        assert!(report.cancelled);
        assert!(!report.is_success());
        assert_eq!(report.written, 0);
        assert!(site.output("page.html").is_none());
        assert!(!BuildManifest::path(&site.build_root()).exists());
    }

    #[test]
    fn cancelling_mid_build_finishes_in_flight_items() {
        let site = Site::new();
        site.file("a.md", "---\ntemplate: post\n---\nA");
        site.file("b.md", "---\ntemplate: post\n---\nB");
        site.file("c.md", "---\ntemplate: post\n---\nC");

        let mut builder = SiteBuilder::new(site.config().with_jobs(1));
        builder.cancel = CancelToken::cancelling_after(1);
        let report = builder.build().unwrap();

        assert!(report.cancelled);
        assert_eq!((report.written, report.failed), (1, 0));
        let outputs = ["a.html", "b.html", "c.html"].iter()
            .filter(|path| site.output(path).is_some())
            .count();

        assert_eq!(outputs, 1);
        assert!(!BuildManifest::path(&site.build_root()).exists());

        let report = site.build().unwrap();
        assert_eq!((report.written, report.skipped), (3, 0));
        assert!(BuildManifest::path(&site.build_root()).exists());
    }

    #[test]
    fn single_job_builds() {
        let site = Site::new();
        site.file("a.html", "<p>a</p>");
        site.file("b.md", "---\ntemplate: post\n---\nB");

        let report = SiteBuilder::new(site.config().with_jobs(1)).build().unwrap();
        assert!(report.is_success());
        assert_eq!(report.written, 2);
        assert_eq!(site.output("b.html").unwrap(), "<html><article>B</article></html>");
    }

    #[test]
    fn included_template_changes_are_rebuilt() {
        let site = Site::new();
        site.template("nav.html", "<nav>OLD</nav>");
        site.template("page.html", "{% include \"nav\" %}{{ content }}");
        site.file("index.md", "---\ntemplate: page\n---\nHi");
        site.build().unwrap();
        assert_eq!(site.output("index.html").unwrap(), "<nav>OLD</nav>Hi");

        site.template("nav.html", "<nav>NEW</nav>");
        let report = site.build().unwrap();
        assert_eq!((report.written, report.skipped), (1, 0));
        assert_eq!(site.output("index.html").unwrap(), "<nav>NEW</nav>Hi");
    }

    #[test]
    fn staging_is_cleaned_up() {
        let site = Site::new();
        site.file("page.md", "---\ntemplate: post\n---\nHello");
        site.build().unwrap();

        let leftovers: Vec<_> = fs::read_dir(site.build_root()).unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(".staging"))
            .collect();

        assert!(leftovers.is_empty());
    }

    #[test]
    fn report_display() {
        let report = BuildReport { written: 2, skipped: 1, cancelled: true, ..Default::default() };
        assert_eq!(report.to_string(), "2 written, 1 skipped, 0 failed, 0 removed, 0 drafts (cancelled)");
    }
}

//! The record of a previous build, used to skip unchanged items.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::content::ContentItem;
use crate::error::{Chainable, Result};
use crate::templating::{ResolvedChain, Segment};
use crate::util::{atomic_write, PathExt};

/// File name of the manifest, placed directly in the build root.
pub const FILE_NAME: &str = ".sitebuilder-manifest.json";

/// Bumped whenever the fingerprint inputs or the file layout change.
pub const VERSION: u32 = 1;

/// A `blake3` digest, stored as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl From<blake3::Hash> for Fingerprint {
    fn from(hash: blake3::Hash) -> Self {
        Fingerprint(hash.to_hex().to_string())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Fingerprint {
    pub fn of_bytes(bytes: &[u8]) -> Self {
        blake3::hash(bytes).into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestEntry {
    /// Digest of everything that went into rendering the item.
    pub fingerprint: Fingerprint,
    /// Output path relative to the build root, `/`-separated.
    pub target: String,
    /// Digest of the bytes written to `target`.
    pub output: Fingerprint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildManifest {
    version: u32,
    entries: BTreeMap<String, ManifestEntry>,
}

impl Default for BuildManifest {
    fn default() -> Self {
        BuildManifest { version: VERSION, entries: BTreeMap::new() }
    }
}

/// Everything besides the item itself that affects its output.
#[derive(Debug, Copy, Clone)]
pub struct FingerprintInputs<'a> {
    pub chain: Option<&'a ResolvedChain>,
    pub markdown: bool,
    /// The raw file contents, for assets.
    pub asset: Option<&'a [u8]>,
}

impl BuildManifest {
    pub fn path(build_root: &Path) -> PathBuf {
        build_root.join(FILE_NAME)
    }

    /// Reads the manifest in `build_root`.
    ///
    /// A missing manifest yields an empty one. So does an unreadable or
    /// malformed one, after a warning: the consequence is a full rebuild,
    /// never a failed build.
    pub fn load(build_root: &Path) -> Self {
        let path = Self::path(build_root);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no build manifest; building everything");
                return Self::default();
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "ignoring unreadable build manifest: {e}");
                return Self::default();
            }
        };

        match serde_json::from_slice::<BuildManifest>(&bytes) {
            Ok(manifest) if manifest.version == VERSION => manifest,
            Ok(manifest) => {
                tracing::warn! {
                    path = %path.display(),
                    found = manifest.version,
                    expected = VERSION,
                    "ignoring build manifest with a different version"
                };

                Self::default()
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "ignoring malformed build manifest: {e}");
                Self::default()
            }
        }
    }

    /// Atomically replaces the manifest in `build_root` with `self`.
    pub fn save(&self, build_root: &Path) -> Result<()> {
        let path = Self::path(build_root);
        let json = serde_json::to_vec_pretty(self)
            .chain_with(|| error!("failed to serialize build manifest"))?;

        atomic_write(&path, &json)
            .chain_with(|| error!("failed to save build manifest", "path" => path.display()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, source: &Path) -> Option<&ManifestEntry> {
        self.entries.get(&source.to_slash())
    }

    pub fn insert(&mut self, source: &Path, entry: ManifestEntry) {
        self.entries.insert(source.to_slash(), entry);
    }

    pub fn remove(&mut self, source: &str) -> Option<ManifestEntry> {
        self.entries.remove(source)
    }

    /// Entries keyed by `/`-separated source path, in sorted order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &ManifestEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Whether `source` can be left alone: its fingerprint is unchanged and
    /// the output in `build_root` still holds exactly what was written.
    pub fn is_fresh(&self, build_root: &Path, source: &Path, fingerprint: &Fingerprint) -> bool {
        let Some(entry) = self.get(source) else {
            return false;
        };

        if &entry.fingerprint != fingerprint {
            return false;
        }

        let target = Path::new(&entry.target);
        if !target.is_contained() {
            return false;
        }

        match fs::read(build_root.join(target)) {
            Ok(bytes) => Fingerprint::of_bytes(&bytes) == entry.output,
            Err(_) => false,
        }
    }
}

/// Feeds a length-prefixed field into `hasher` so that adjacent fields can't
/// run into each other.
fn field(hasher: &mut blake3::Hasher, bytes: &[u8]) {
    hasher.update(&(bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

/// Computes the fingerprint of `item` as it would be built with `inputs`.
pub fn fingerprint(item: &ContentItem, inputs: FingerprintInputs<'_>) -> Fingerprint {
    let mut hasher = blake3::Hasher::new();
    field(&mut hasher, &VERSION.to_le_bytes());
    field(&mut hasher, item.target_path.to_slash().as_bytes());
    match (&item.body, inputs.asset) {
        (Some(body), _) => {
            field(&mut hasher, b"renderable");
            field(&mut hasher, item.format().unwrap_or_default().as_bytes());
            field(&mut hasher, body.as_bytes());
        }
        (None, asset) => {
            field(&mut hasher, b"asset");
            field(&mut hasher, asset.unwrap_or_default());
        }
    }

    for (key, value) in &item.metadata {
        field(&mut hasher, key.as_bytes());
        field(&mut hasher, value.kind().as_bytes());
        field(&mut hasher, value.to_string().as_bytes());
    }

    field(&mut hasher, item.template_ref.as_deref().unwrap_or_default().as_bytes());
    if let Some(chain) = inputs.chain {
        // Segments have their includes expanded.
        for template in chain.iter() {
            field(&mut hasher, template.name.as_bytes());
            for segment in template.segments() {
                let (tag, text) = match segment {
                    Segment::Text(text) => (b"text", text),
                    Segment::Placeholder(name) => (b"slot", name),
                    Segment::Include(name) => (b"incl", name),
                };

                field(&mut hasher, tag);
                field(&mut hasher, text.as_bytes());
            }
        }
    }

    field(&mut hasher, &[inputs.markdown as u8]);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use super::*;
    use crate::dict;
    use crate::templating::Registry;

    fn page(body: &str) -> ContentItem {
        ContentItem {
            source_path: "blog/a.md".into(),
            target_path: "blog/a.html".into(),
            format: Some("md".into()),
            metadata: dict!["title" => "A"],
            body: Some(body.into()),
            template_ref: Some("post".into()),
        }
    }

    fn inputs(chain: Option<&ResolvedChain>) -> FingerprintInputs<'_> {
        FingerprintInputs { chain, markdown: false, asset: None }
    }

    #[test]
    fn fingerprints_track_included_templates() {
        let one = Registry::from_sources([
            ("nav", "<nav>OLD</nav>"),
            ("post", "{% include \"nav\" %}{{ content }}"),
        ]).unwrap();
        let two = Registry::from_sources([
            ("nav", "<nav>NEW</nav>"),
            ("post", "{% include \"nav\" %}{{ content }}"),
        ]).unwrap();

        let chain_one = one.resolve("post").unwrap();
        let chain_two = two.resolve("post").unwrap();
        assert_ne!(
            fingerprint(&page("x"), inputs(Some(&chain_one))),
            fingerprint(&page("x"), inputs(Some(&chain_two))),
        );
    }

    #[test]
    fn fingerprints_track_every_input() {
        let one = Registry::from_sources([("post", "<p>{{ content }}</p>")]).unwrap();
        let two = Registry::from_sources([("post", "<div>{{ content }}</div>")]).unwrap();
        let chain_one = one.resolve("post").unwrap();
        let chain_two = two.resolve("post").unwrap();

        let base = fingerprint(&page("x"), inputs(Some(&chain_one)));
        assert_eq!(base, fingerprint(&page("x"), inputs(Some(&chain_one))));
        assert_ne!(base, fingerprint(&page("y"), inputs(Some(&chain_one))));
        assert_ne!(base, fingerprint(&page("x"), inputs(Some(&chain_two))));

        let mut retitled = page("x");
        retitled.metadata = dict!["title" => "B"];
        assert_ne!(base, fingerprint(&retitled, inputs(Some(&chain_one))));

        let mut typed = page("x");
        typed.metadata = dict!["title" => 1];
        let mut stringly = page("x");
        stringly.metadata = dict!["title" => "1"];
        assert_ne!(fingerprint(&typed, inputs(None)), fingerprint(&stringly, inputs(None)));

        let markdown = FingerprintInputs { markdown: true, ..inputs(Some(&chain_one)) };
        assert_ne!(base, fingerprint(&page("x"), markdown));
    }

    #[test]
    fn save_load_and_freshness() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("blog")).unwrap();
        fs::write(root.join("blog/a.html"), "<p>x</p>").unwrap();

        let item = page("x");
        let print = fingerprint(&item, inputs(None));
        let mut manifest = BuildManifest::default();
        manifest.insert(&item.source_path, ManifestEntry {
            fingerprint: print.clone(),
            target: "blog/a.html".into(),
            output: Fingerprint::of_bytes(b"<p>x</p>"),
        });

        manifest.save(root).unwrap();
        let loaded = BuildManifest::load(root);
        assert_eq!(loaded, manifest);
        assert!(loaded.is_fresh(root, &item.source_path, &print));

        let other = fingerprint(&page("changed"), inputs(None));
        assert!(!loaded.is_fresh(root, &item.source_path, &other));
        assert!(!loaded.is_fresh(root, Path::new("blog/b.md"), &print));

        fs::write(root.join("blog/a.html"), "<p>tampered</p>").unwrap();
        assert!(!loaded.is_fresh(root, &item.source_path, &print));

        fs::remove_file(root.join("blog/a.html")).unwrap();
        assert!(!loaded.is_fresh(root, &item.source_path, &print));
    }

    #[test]
    fn bad_manifests_mean_a_full_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        assert!(BuildManifest::load(dir.path()).is_empty());

        fs::write(BuildManifest::path(dir.path()), "{ not json").unwrap();
        assert!(BuildManifest::load(dir.path()).is_empty());

        fs::write(BuildManifest::path(dir.path()), r#"{"version": 99, "entries": {}}"#).unwrap();
        let manifest = BuildManifest::load(dir.path());
        assert!(manifest.is_empty());
        assert_eq!(manifest, BuildManifest::default());
    }
}

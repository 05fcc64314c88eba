use std::sync::Arc;
use std::path::{Path, PathBuf};
use std::{fs, fmt};

use rustc_hash::FxHashMap;

use crate::error::Result;

#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct EntryId(pub(crate) usize);

/// A snapshot of a directory tree, in sorted walk order.
///
/// Hidden entries (names starting with `.`) and everything beneath them are
/// never part of the tree.
#[derive(Debug)]
pub struct FsTree {
    entries: Vec<Entry>,
    map: FxHashMap<Arc<Path>, EntryId>,
}

#[derive(Debug)]
pub struct Entry {
    pub id: EntryId,
    pub path: Arc<Path>,
    pub file_name: String,
    pub file_type: fs::FileType,
    pub parent: Option<EntryId>,
    pub children: Vec<EntryId>,
    pub depth: usize,
}

impl FsTree {
    fn new() -> Self {
        Self {
            map: FxHashMap::default(),
            entries: vec![],
        }
    }

    pub fn build<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        match fs::metadata(root) {
            Ok(meta) if meta.is_dir() => {},
            Ok(_) => return err! {
                "root path must point to a directory",
                "path is not a directory" => root.display(),
            },
            Err(e) => return err! {
                "root directory could not be read",
                "root" => root.display(),
                "cause" => e,
            },
        }

        let walker = jwalk::WalkDir::new(root)
            .sort(true)
            .skip_hidden(true)
            .follow_links(true);

        let mut tree = FsTree::new();
        for entry in walker {
            match entry {
                Ok(entry) => tree.insert(entry),
                // The root itself was checked above: this is a dangling link
                // or an unreadable subdirectory, which we leave out.
                Err(e) => tracing::warn!(root = %root.display(), "skipping entry: {e}"),
            }
        }

        if tree.entries.is_empty() {
            return err!("file system walk yielded no root entry", "root" => root.display());
        }

        Ok(tree)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when the tree holds nothing but its root directory.
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    pub fn root(&self) -> &Entry {
        &self[self.root_id()]
    }

    pub fn root_id(&self) -> EntryId {
        EntryId(0)
    }

    /// Looks up an entry by its path relative to the root.
    pub fn get<P: AsRef<Path>>(&self, path: P) -> Option<&Entry> {
        let full_path = self.root().path.join(path.as_ref());
        self.map.get(&*full_path).map(|&id| &self[id])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    /// All regular files, in sorted walk order.
    pub fn files(&self) -> impl Iterator<Item = &Entry> {
        self.iter().filter(|e| e.file_type.is_file())
    }

    fn insert(&mut self, entry: jwalk::DirEntry<((), ())>) {
        let entry = Entry {
            id: EntryId(self.entries.len()),
            path: Arc::from(entry.path().into_boxed_path()),
            file_type: entry.file_type,
            file_name: entry.file_name.to_string_lossy().into_owned(),
            parent: match entry.depth {
                0 => None,
                _ => self.map.get(&entry.parent_path).cloned(),
            },
            children: vec![],
            depth: entry.depth,
        };

        self.map.insert(entry.path.clone(), entry.id);
        if let Some(parent) = entry.parent {
            self.entries[parent.0].children.push(entry.id);
        }

        self.entries.push(entry);
    }
}

impl Entry {
    /// File name without the extension.
    pub fn file_stem(&self) -> &str {
        match self.file_name.rsplit_once('.') {
            Some((left, _)) if !left.is_empty() => left,
            _ => &self.file_name,
        }
    }

    /// The final extension, if any.
    pub fn file_ext(&self) -> Option<&str> {
        match self.file_name.rsplit_once('.') {
            Some((left, right)) if !left.is_empty() => Some(right),
            _ => None,
        }
    }

    /// Path relative to the root of the tree `self` belongs to.
    pub fn relative_path(&self) -> &Path {
        let mut components = self.path.components();
        for _ in 0..(self.path.components().count() - self.depth) {
            components.next();
        }

        components.as_path()
    }

    /// The relative path with `/` separators on every platform.
    pub fn relative_name(&self) -> String {
        self.relative_path()
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn to_relative_path_buf(&self) -> PathBuf {
        self.relative_path().to_path_buf()
    }
}

impl std::ops::Index<EntryId> for FsTree {
    type Output = Entry;

    fn index(&self, index: EntryId) -> &Self::Output {
        &self.entries[index.0]
    }
}

impl fmt::Debug for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

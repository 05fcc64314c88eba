use std::borrow::Cow;
use std::path::{Path, Component};

pub trait PathExt: AsRef<Path> {
    /// The path with its final extension removed.
    fn without_extension(&self) -> Cow<'_, Path>;

    /// The path rendered with `/` separators, whatever the platform.
    fn to_slash(&self) -> String;

    /// Whether the path is relative and made only of normal components, so
    /// that joining it onto a root can never leave that root.
    fn is_contained(&self) -> bool;
}

impl PathExt for Path {
    fn without_extension(&self) -> Cow<'_, Path> {
        match (self.file_stem(), self.extension()) {
            (Some(stem), Some(_)) => self.with_file_name(stem).into(),
            _ => self.into(),
        }
    }

    fn to_slash(&self) -> String {
        self.components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn is_contained(&self) -> bool {
        self.components().next().is_some()
            && self.components().all(|c| matches!(c, Component::Normal(_)))
    }
}

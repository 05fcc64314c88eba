use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::{Chainable, Result};

/// Creates `path`, writes `content` to it and syncs it to disk.
pub fn write_synced(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).chain_with(|| error! {
            "failed to create directory",
            "path" => parent.display(),
        })?;
    }

    let mut file = fs::File::create(path)
        .chain_with(|| error!("failed to create file", "path" => path.display()))?;

    file.write_all(content)
        .chain_with(|| error!("failed to write file", "path" => path.display()))?;

    file.sync_all()
        .chain_with(|| error!("failed to sync file to disk", "path" => path.display()))
}

/// Replaces the file at `path` with `content` such that readers only ever
/// observe the old or the new contents.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    write_synced(&temp_path, content)?;
    fs::rename(&temp_path, path).chain_with(|| error! {
        "failed to rename temporary file",
        "from" => temp_path.display(),
        "to" => path.display(),
    })
}

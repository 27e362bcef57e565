use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;

/// File name of the redb database inside the data directory.
pub const DATABASE_FILE: &str = "vanish.db";

/// Resolve (and create) the directory holding the database.
///
/// Priority:
/// 1. `explicit`, usually from `--data-dir` or `VANISH_DATA_DIR`
/// 2. Platform-specific app data dir (`~/.local/share/vanish/`, etc.)
pub fn resolve_data_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    let path = match explicit {
        Some(dir) => dir.to_owned(),
        None => ProjectDirs::from("", "", "vanish")
            .context("could not determine platform data directory")?
            .data_dir()
            .to_owned(),
    };
    std::fs::create_dir_all(&path)
        .with_context(|| format!("create data dir {}", path.display()))?;
    Ok(path)
}

pub fn database_path(data_dir: &Path) -> PathBuf {
    data_dir.join(DATABASE_FILE)
}

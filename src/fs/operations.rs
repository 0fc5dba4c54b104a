use std::path::{Path, PathBuf};

use anyhow::Result;
use tokio::{fs::File, io::AsyncWriteExt};

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|v| v.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Replaces the contents of `path` with `contents` without ever exposing a
/// partially written file. The data is flushed to a temporary sibling first
/// and only then renamed over the target, so an interrupted write leaves the
/// previous file intact.
pub async fn replace_file_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = temp_sibling(path);

    let mut file = File::create(&tmp).await?;
    file.write_all(contents).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

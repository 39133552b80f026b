//! Writing generated files to disk.

use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::debug;

use erpforge_codegen_lib::GeneratedCode;

/// Write every file under `root`, creating directories as needed.
/// Returns the written paths in order.
pub fn write_all(root: &Path, code: &GeneratedCode) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(code.files.len());
    for file in &code.files {
        let relative = Path::new(&file.path);
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
        {
            bail!("refusing to write outside the output directory: {}", file.path);
        }
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        std::fs::write(&path, &file.content)
            .with_context(|| format!("failed to write {}", path.display()))?;
        debug!("wrote {}", path.display());
        written.push(path);
    }
    Ok(written)
}

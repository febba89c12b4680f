use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use tracing::info;

/// Write every view under `out_dir`, creating parent directories as needed.
/// The view map is the whole contract: nothing else decides paths or
/// touches the filesystem.
pub fn write_views(out_dir: &Path, views: &BTreeMap<String, Value>) -> Result<usize> {
    let pb = ProgressBar::new(views.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} views")?
            .progress_chars("=> "),
    );

    for (relative, value) in views {
        let path = out_dir.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create directory {:?}", parent))?;
        }
        let json = serde_json::to_string_pretty(value)?;
        std::fs::write(&path, json).with_context(|| format!("write view {:?}", path))?;
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!("Wrote {} views to {:?}", views.len(), out_dir);
    Ok(views.len())
}

// ── Tests ──

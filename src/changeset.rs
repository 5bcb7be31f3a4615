//! Change-set selection: which local files a run uploads.

use anyhow::{Context, Result};
use std::path::{Component, Path};
use time::OffsetDateTime;
use walkdir::WalkDir;

use crate::environment::Environment;
use crate::marker::marker_file_name;

/// Configured exclusions plus the marker file of the other environment.
pub fn exclusion_list(base: &[String], env: Environment, marker_extension: &str) -> Vec<String> {
    let mut exclude = base.to_vec();
    exclude.push(marker_file_name(env.other(), marker_extension));
    exclude
}

/// Walk `root` and return the files to publish as `/`-separated paths
/// relative to it, in file-name order.
///
/// A file is skipped when any `exclude` token occurs anywhere in its absolute
/// path (plain substring match, so `.git` also hides `my.github.html`), or when
/// `since` is set and the file was not modified strictly after it.
pub fn collect_files(
    root: &Path,
    since: Option<OffsetDateTime>,
    exclude: &[String],
) -> Result<Vec<String>> {
    let root = std::path::absolute(root)
        .with_context(|| format!("cannot resolve {}", root.display()))?;
    let mut files = Vec::new();

    for entry in WalkDir::new(&root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!("skipping unreadable entry: {err}");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let full_path = entry.path().to_string_lossy();
        if let Some(token) = exclude.iter().find(|t| full_path.contains(t.as_str())) {
            tracing::trace!(path = %full_path, token = %token, "excluded");
            continue;
        }

        if let Some(since) = since {
            let modified = entry
                .metadata()
                .with_context(|| format!("cannot stat {}", entry.path().display()))?
                .modified()
                .with_context(|| format!("no modification time for {}", entry.path().display()))?;
            if OffsetDateTime::from(modified) <= since {
                continue;
            }
        }

        let relative = entry.path().strip_prefix(&root).with_context(|| {
            format!("{} is outside {}", entry.path().display(), root.display())
        })?;
        files.push(to_remote_path(relative));
    }

    Ok(files)
}

fn to_remote_path(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

//! Mirror relative paths onto the remote base directory, one file at a time.

use anyhow::{Context, Result};
use std::path::Path;

use crate::transport::{Transport, TransportError};

/// Upload every file in `files` (relative to `local_root`) below `remote_base`.
///
/// Each file re-enters `remote_base` and walks its parent directories one
/// segment at a time, creating a segment only after entering it failed with
/// [`TransportError::DirectoryNotFound`]. Any other failure aborts the whole
/// run; files after it are not attempted. `on_file` is called as each upload
/// begins. Returns the number of uploaded files.
pub fn publish_files(
    files: &[String],
    local_root: &Path,
    remote_base: &str,
    session: &mut dyn Transport,
    mut on_file: impl FnMut(&str),
) -> Result<usize> {
    let mut uploaded = 0;
    for file in files {
        session
            .change_directory(remote_base)
            .with_context(|| format!("cannot enter remote base directory {remote_base}"))?;
        on_file(file);

        let mut segments: Vec<&str> = file.split('/').filter(|s| !s.is_empty()).collect();
        let Some(remote_name) = segments.pop() else {
            continue;
        };
        for segment in segments {
            enter_or_create(session, segment)
                .with_context(|| format!("cannot prepare remote directory for {file}"))?;
        }

        session
            .upload_file(&local_root.join(file), remote_name)
            .with_context(|| format!("failed to upload {file}"))?;
        uploaded += 1;
    }
    Ok(uploaded)
}

fn enter_or_create(session: &mut dyn Transport, segment: &str) -> Result<(), TransportError> {
    match session.change_directory(segment) {
        Err(err) if err.is_directory_not_found() => {
            tracing::debug!(dir = segment, "creating remote directory");
            session.create_directory(segment)?;
            session.change_directory(segment)
        }
        other => other,
    }
}

//! Publish orchestration: marker handling, change set, upload.

use anyhow::{Context, Result};
use std::path::PathBuf;
use time::OffsetDateTime;

use crate::changeset::{collect_files, exclusion_list};
use crate::config::{Config, MarkerCommit};
use crate::environment::Environment;
use crate::marker::MarkerStore;
use crate::sync::publish_files;
use crate::transport::{Transport, build_session};

/// Options for one publish run
#[derive(Debug, Clone)]
pub struct PublishOptions {
    pub environment: Environment,
    /// Project root; marker files live here too
    pub root: PathBuf,
    pub force: bool,
    /// Only compute the change set. Nothing is fetched, written, or uploaded.
    pub dry_run: bool,
    /// Config file in use; never published even when it lives under `root`
    pub config_file: Option<PathBuf>,
}

/// Result of a publish run
#[derive(Debug)]
pub struct PublishReport {
    pub environment: Environment,
    pub threshold: Option<OffsetDateTime>,
    /// Timestamp written to the marker, if it was written
    pub marker_written: Option<OffsetDateTime>,
    pub files: Vec<String>,
    pub uploaded: usize,
}

/// Main publish workflow, connecting with the configured transport.
pub fn publish(options: &PublishOptions, config: &Config) -> Result<PublishReport> {
    publish_with(options, config, build_session)
}

/// Publish workflow with an explicit session constructor.
///
/// The session is closed exactly once whether or not the upload succeeded.
pub fn publish_with<F>(options: &PublishOptions, config: &Config, connect: F) -> Result<PublishReport>
where
    F: FnOnce(&Config) -> Result<Box<dyn Transport>>,
{
    let env = options.environment;
    let env_config = config.environment(env);
    let store = MarkerStore::new(&options.root, config.marker_extension.as_str());

    if !options.dry_run {
        match &env_config.marker_url {
            Some(base_url) => {
                store.try_fetch_remote(env, base_url);
            }
            None => tracing::debug!("no marker_url for '{env}', using local marker only"),
        }
    }

    let threshold = store.read_last_publish(env, options.force);

    let mut marker_written = None;
    let started = if !options.dry_run && config.marker_commit == MarkerCommit::BeforeUpload {
        let at = store.write_now(env)?;
        marker_written = Some(at);
        at
    } else {
        OffsetDateTime::now_utc()
    };

    let mut exclude = exclusion_list(&config.exclude, env, &config.marker_extension);
    if let Some(config_file) = &options.config_file {
        let absolute = std::path::absolute(config_file)
            .with_context(|| format!("cannot resolve {}", config_file.display()))?;
        exclude.push(absolute.to_string_lossy().into_owned());
    }
    let files = collect_files(&options.root, threshold, &exclude)?;
    tracing::info!(count = files.len(), "change set computed");

    if options.dry_run {
        return Ok(PublishReport {
            environment: env,
            threshold,
            marker_written,
            files,
            uploaded: 0,
        });
    }

    let mut session = connect(config).context("failed to open remote session")?;
    let result = publish_files(
        &files,
        &options.root,
        &env_config.remote_dir,
        session.as_mut(),
        |file| println!("-> {file}"),
    );
    let closed = session.close();

    let uploaded = match result {
        Ok(count) => {
            closed.context("failed to close remote session")?;
            count
        }
        Err(err) => {
            if let Err(close_err) = closed {
                tracing::warn!("closing session after failure also failed: {close_err}");
            }
            return Err(err);
        }
    };

    if config.marker_commit == MarkerCommit::AfterSuccess {
        store.write(env, started)?;
        marker_written = Some(started);
    }

    Ok(PublishReport {
        environment: env,
        threshold,
        marker_written,
        files,
        uploaded,
    })
}

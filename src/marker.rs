//! Publish markers: the per-environment "last publish" timestamp kept next to
//! the site sources as `pubdate_<env>.<ext>`.

use anyhow::{Context, Result, bail};
use chrono::{Local, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use time::OffsetDateTime;

use crate::environment::Environment;

const MARKER_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const LEGACY_MARKER_FORMAT: &str = "%Y-%m-%d";
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Marker file name for an environment, e.g. `pubdate_dev.inf`.
pub fn marker_file_name(env: Environment, extension: &str) -> String {
    format!("pubdate_{}.{}", env.as_str(), extension)
}

/// Render `at` as local wall-clock time, using the offset in force at `at`.
pub fn format_marker(at: OffsetDateTime) -> Result<String> {
    let local = Local
        .timestamp_opt(at.unix_timestamp(), 0)
        .single()
        .with_context(|| format!("timestamp {} out of range", at.unix_timestamp()))?;
    Ok(local.format(MARKER_FORMAT).to_string())
}

/// Parse marker text as local wall-clock time. Date-only markers mean midnight.
///
/// The offset is the one in force on the marker's date, not today's. A time
/// repeated by a DST fall-back resolves to its earlier instant.
pub fn parse_marker(text: &str) -> Result<OffsetDateTime> {
    let text = text.trim();
    let naive = match NaiveDateTime::parse_from_str(text, MARKER_FORMAT) {
        Ok(naive) => naive,
        Err(err) => NaiveDate::parse_from_str(text, LEGACY_MARKER_FORMAT)
            .map_err(|_| err)
            .with_context(|| format!("unrecognized marker content {text:?}"))?
            .and_time(NaiveTime::MIN),
    };
    let local = match Local.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => bail!("local time {text:?} does not exist"),
    };
    OffsetDateTime::from_unix_timestamp(local.timestamp())
        .with_context(|| format!("marker {text:?} out of range"))
}

#[derive(Debug, Clone)]
pub struct MarkerStore {
    dir: PathBuf,
    extension: String,
}

impl MarkerStore {
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
        }
    }

    pub fn file_name(&self, env: Environment) -> String {
        marker_file_name(env, &self.extension)
    }

    pub fn path(&self, env: Environment) -> PathBuf {
        self.dir.join(self.file_name(env))
    }

    /// Best effort: replace the local marker with the published copy.
    /// Returns whether the local file was overwritten.
    pub fn try_fetch_remote(&self, env: Environment, base_url: &str) -> bool {
        match self.fetch_remote(env, base_url) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!("could not fetch remote publish marker: {err:#}");
                false
            }
        }
    }

    /// Any HTTP answer is written verbatim, error pages included; only
    /// transport failures are errors.
    pub fn fetch_remote(&self, env: Environment, base_url: &str) -> Result<()> {
        let url = format!("{}/{}", base_url.trim_end_matches('/'), self.file_name(env));
        let agent = ureq::AgentBuilder::new().timeout(FETCH_TIMEOUT).build();
        let response = match agent.get(&url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(status, response)) => {
                tracing::debug!(%url, status, "remote marker answered with an error status");
                response
            }
            Err(err) => return Err(err).with_context(|| format!("GET {url} failed")),
        };

        let mut body = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut body)
            .with_context(|| format!("failed to read body of {url}"))?;
        let path = self.path(env);
        fs::write(&path, &body).with_context(|| format!("failed to write {}", path.display()))?;
        tracing::debug!(%url, bytes = body.len(), "refreshed local marker");
        Ok(())
    }

    /// Threshold for the change set. `None` means "republish everything".
    pub fn read_last_publish(&self, env: Environment, force: bool) -> Option<OffsetDateTime> {
        if force {
            tracing::warn!("force requested, ignoring publish marker for '{env}'");
            return None;
        }
        let path = self.path(env);
        match read_marker_file(&path) {
            Ok(at) => Some(at),
            Err(err) => {
                tracing::warn!("{err:#}; all files will be published");
                None
            }
        }
    }

    pub fn write(&self, env: Environment, at: OffsetDateTime) -> Result<()> {
        let path = self.path(env);
        fs::write(&path, format_marker(at)?)
            .with_context(|| format!("failed to write {}", path.display()))
    }

    /// Overwrite the marker with the current time and return it.
    pub fn write_now(&self, env: Environment) -> Result<OffsetDateTime> {
        let now = OffsetDateTime::now_utc();
        self.write(env, now)?;
        Ok(now)
    }
}

fn read_marker_file(path: &Path) -> Result<OffsetDateTime> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("cannot read publish marker {}", path.display()))?;
    parse_marker(&text).with_context(|| format!("invalid publish marker {}", path.display()))
}

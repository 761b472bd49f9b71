//! Persisted snapshots and how a run extends them.
//!
//! Every run writes a new artifact named after its start time. The artifact
//! is the latest prior artifact copied byte for byte, followed by the rows
//! accepted in this run, so prior rows are never rewritten or reordered.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local, NaiveDateTime, Utc};
use thiserror::Error;

use crate::record::{
    CSV_HEADER, EnrichedRecord, STARRED_AT_ALIAS, STARRED_AT_COLUMN, parse_timestamp,
};

/// File name prefix of every snapshot artifact.
pub const ARTIFACT_PREFIX: &str = "stargazer_info_";

/// Extension of completed artifacts.
pub const ARTIFACT_EXTENSION: &str = "csv";

/// Extension appended while an artifact is being written.
const PARTIAL_EXTENSION: &str = "partial";

/// Timestamp layout in artifact names.
const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Errors reading or writing snapshot artifacts.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed snapshot {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{}: row {row} has an invalid starred-at value {value:?}", path.display())]
    InvalidTimestamp {
        path: PathBuf,
        row: usize,
        value: String,
    },

    #[error("{}: no \"{STARRED_AT_COLUMN}\" column", path.display())]
    MissingColumn { path: PathBuf },
}

/// Result type alias for snapshot operations.
pub type Result<T> = std::result::Result<T, SnapshotError>;

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> SnapshotError + '_ {
    move |source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn csv_error(path: &Path) -> impl FnOnce(csv::Error) -> SnapshotError + '_ {
    move |source| SnapshotError::Csv {
        path: path.to_path_buf(),
        source,
    }
}

/// Rows of a snapshot, in persisted order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub rows: Vec<EnrichedRecord>,
}

impl Snapshot {
    pub fn new(rows: Vec<EnrichedRecord>) -> Self {
        Self { rows }
    }

    /// Latest starred-at time among the rows.
    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        self.rows.iter().map(|r| r.starred_at).max()
    }

    /// Number of rows.
    pub fn count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// The snapshot a run produces: prior rows, then the new ones.
pub fn merge(prior: Option<&Snapshot>, new: &[EnrichedRecord]) -> Snapshot {
    let mut rows = prior.map(|s| s.rows.clone()).unwrap_or_default();
    rows.extend_from_slice(new);
    Snapshot { rows }
}

/// Snapshot artifacts of one repository.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store for `owner/repo` under `root`, in `{owner}_{repo}`.
    pub fn for_repo(root: impl AsRef<Path>, owner: &str, repo: &str) -> Self {
        Self::new(root.as_ref().join(format!("{owner}_{repo}")))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the most recent completed artifact.
    ///
    /// Recency is creation time where the filesystem records it, modification
    /// time otherwise. Ties go to the greatest file name.
    pub fn latest(&self) -> Result<Option<PathBuf>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&self.dir)(e)),
        };

        let mut best: Option<(SystemTime, String, PathBuf)> = None;
        for entry in entries {
            let entry = entry.map_err(io_error(&self.dir))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_artifact_name(&name) {
                continue;
            }

            let path = entry.path();
            let metadata = entry.metadata().map_err(io_error(&path))?;
            if !metadata.is_file() {
                continue;
            }
            let time = metadata
                .created()
                .or_else(|_| metadata.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);

            let newer = best
                .as_ref()
                .is_none_or(|(t, n, _)| (time, name.as_str()) > (*t, n.as_str()));
            if newer {
                best = Some((time, name, path));
            }
        }

        Ok(best.map(|(_, _, path)| path))
    }

    /// Read an artifact.
    ///
    /// An empty file is an empty snapshot. The starred-at column may use
    /// either header spelling.
    pub fn load(&self, path: &Path) -> Result<Snapshot> {
        let mut reader = csv::Reader::from_path(path).map_err(csv_error(path))?;
        let headers = reader.headers().map_err(csv_error(path))?.clone();
        if headers.is_empty() {
            return Ok(Snapshot::default());
        }

        let column = headers
            .iter()
            .position(|h| h == STARRED_AT_COLUMN || h == STARRED_AT_ALIAS)
            .ok_or_else(|| SnapshotError::MissingColumn {
                path: path.to_path_buf(),
            })?;

        let mut rows = Vec::new();
        for (index, result) in reader.records().enumerate() {
            let record = result.map_err(csv_error(path))?;
            let value = record.get(column).unwrap_or_default();
            if parse_timestamp(value).is_none() {
                return Err(SnapshotError::InvalidTimestamp {
                    path: path.to_path_buf(),
                    row: index + 1,
                    value: value.to_string(),
                });
            }
            rows.push(
                record
                    .deserialize::<EnrichedRecord>(Some(&headers))
                    .map_err(csv_error(path))?,
            );
        }

        Ok(Snapshot { rows })
    }

    /// Load the latest artifact, if there is one.
    pub fn load_latest(&self) -> Result<Option<(PathBuf, Snapshot)>> {
        match self.latest()? {
            Some(path) => {
                let snapshot = self.load(&path)?;
                Ok(Some((path, snapshot)))
            }
            None => Ok(None),
        }
    }

    /// Write the next artifact, stamped with the current local time.
    pub fn write_next(&self, prior: Option<&Path>, new: &[EnrichedRecord]) -> Result<PathBuf> {
        self.write_next_at(prior, new, Local::now().naive_local())
    }

    /// Write the next artifact: `prior` copied verbatim, then `new`.
    ///
    /// The header is written only when the artifact would otherwise be empty.
    /// The file only appears under its final name once fully written; an
    /// existing artifact with the same stamp is never overwritten.
    pub fn write_next_at(
        &self,
        prior: Option<&Path>,
        new: &[EnrichedRecord],
        stamp: NaiveDateTime,
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;

        let target = self.unused_artifact_path(stamp);
        let partial = partial_path(&target);

        match self.assemble(&partial, prior, new) {
            Ok(()) => {
                fs::rename(&partial, &target).map_err(io_error(&target))?;
                tracing::debug!(path = %target.display(), appended = new.len(), "Wrote snapshot");
                Ok(target)
            }
            Err(e) => {
                let _ = fs::remove_file(&partial);
                Err(e)
            }
        }
    }

    fn unused_artifact_path(&self, stamp: NaiveDateTime) -> PathBuf {
        let stem = format!("{ARTIFACT_PREFIX}{}", stamp.format(STAMP_FORMAT));
        let mut path = self.dir.join(format!("{stem}.{ARTIFACT_EXTENSION}"));
        let mut suffix = 1u32;
        while path.exists() || partial_path(&path).exists() {
            path = self.dir.join(format!("{stem}_{suffix}.{ARTIFACT_EXTENSION}"));
            suffix += 1;
        }
        path
    }

    fn assemble(
        &self,
        partial: &Path,
        prior: Option<&Path>,
        new: &[EnrichedRecord],
    ) -> Result<()> {
        match prior {
            Some(prior) => {
                fs::copy(prior, partial).map_err(io_error(prior))?;
            }
            None => {
                File::create(partial).map_err(io_error(partial))?;
            }
        }

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .open(partial)
            .map_err(io_error(partial))?;
        let len = file.metadata().map_err(io_error(partial))?.len();

        if len > 0 && !ends_with_newline(&mut file).map_err(io_error(partial))? {
            file.write_all(b"\n").map_err(io_error(partial))?;
        }

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if len == 0 {
            writer.write_record(CSV_HEADER).map_err(csv_error(partial))?;
        }
        for record in new {
            writer.serialize(record).map_err(csv_error(partial))?;
        }

        let file = writer
            .into_inner()
            .map_err(|e| io_error(partial)(e.into_error()))?;
        file.sync_all().map_err(io_error(partial))?;
        Ok(())
    }
}

fn is_artifact_name(name: &str) -> bool {
    name.starts_with(ARTIFACT_PREFIX)
        && Path::new(name)
            .extension()
            .is_some_and(|ext| ext == ARTIFACT_EXTENSION)
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(".");
    name.push(PARTIAL_EXTENSION);
    PathBuf::from(name)
}

fn ends_with_newline(file: &mut File) -> io::Result<bool> {
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(value: &str) -> DateTime<Utc> {
        parse_timestamp(value).expect("valid timestamp")
    }

    fn row(username: &str, starred_at: &str) -> EnrichedRecord {
        EnrichedRecord {
            username: username.to_string(),
            name: Some(format!("{username} name")),
            location: None,
            company: Some("Acme, Inc.".to_string()),
            email: None,
            twitter: None,
            followers: Some(1),
            starred_at: at(starred_at),
            bio: None,
        }
    }

    fn stamp(second: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_opt(12, 0, second))
            .expect("valid stamp")
    }

    #[test]
    fn empty_snapshot_has_no_watermark() {
        let snapshot = Snapshot::default();
        assert_eq!(snapshot.watermark(), None);
        assert_eq!(snapshot.count(), 0);
    }

    #[test]
    fn watermark_is_maximum_not_last() {
        let snapshot = Snapshot::new(vec![
            row("a", "2023-01-03T00:00:00Z"),
            row("b", "2023-01-02T00:00:00Z"),
        ]);
        assert_eq!(snapshot.watermark(), Some(at("2023-01-03T00:00:00Z")));
    }

    #[test]
    fn merge_appends_after_prior_rows() {
        let prior = Snapshot::new(vec![
            row("a", "2023-01-01T00:00:00Z"),
            row("b", "2023-01-02T00:00:00Z"),
        ]);
        let new = vec![row("c", "2023-01-03T00:00:00Z")];

        let merged = merge(Some(&prior), &new);

        assert_eq!(merged.rows[..2], prior.rows[..]);
        assert_eq!(merged.rows[2], new[0]);
        assert!(merged.watermark() >= prior.watermark());
    }

    #[test]
    fn merge_without_prior_is_new_rows() {
        let new = vec![row("a", "2023-01-01T00:00:00Z")];
        assert_eq!(merge(None, &new).rows, new);
        assert!(merge(None, &[]).is_empty());
    }

    #[test]
    fn latest_on_missing_directory_is_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SnapshotStore::for_repo(dir.path(), "o", "r");
        assert_eq!(store.latest().expect("latest"), None);
        assert!(store.load_latest().expect("load").is_none());
    }

    #[test]
    fn first_write_has_header_and_rows() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SnapshotStore::for_repo(dir.path(), "octo", "repo");
        let rows = vec![row("a", "2023-01-01T00:00:00Z")];

        let path = store.write_next_at(None, &rows, stamp(0)).expect("write");

        assert_eq!(
            path,
            dir.path().join("octo_repo/stargazer_info_20240301_120000.csv")
        );
        let text = fs::read_to_string(&path).expect("read");
        assert!(text.starts_with(
            "Username,Name,Location,Company,Email,Twitter,Followers,Starred at,Bio\n"
        ));
        assert_eq!(store.load(&path).expect("load").rows, rows);
    }

    #[test]
    fn empty_first_run_writes_header_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path());

        let path = store.write_next_at(None, &[], stamp(0)).expect("write");

        assert_eq!(fs::read_to_string(&path).expect("read").lines().count(), 1);
        assert!(store.load(&path).expect("load").is_empty());
    }

    #[test]
    fn next_write_copies_prior_bytes_and_appends() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path());
        let first = store
            .write_next_at(None, &[row("a", "2023-01-01T00:00:00Z")], stamp(0))
            .expect("first");
        let prior_bytes = fs::read(&first).expect("read prior");

        let second = store
            .write_next_at(Some(&first), &[row("b", "2023-01-02T00:00:00Z")], stamp(1))
            .expect("second");

        assert_eq!(fs::read(&first).expect("reread prior"), prior_bytes);
        let second_bytes = fs::read(&second).expect("read second");
        assert!(second_bytes.starts_with(&prior_bytes));

        let loaded = store.load(&second).expect("load");
        let names: Vec<&str> = loaded.rows.iter().map(|r| r.username.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(loaded.watermark(), Some(at("2023-01-02T00:00:00Z")));
    }

    #[test]
    fn prior_without_trailing_newline_is_terminated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path());
        let prior = dir.path().join("stargazer_info_20240101_000000.csv");
        fs::write(
            &prior,
            "Username,Name,Location,Company,Email,Twitter,Followers,Starred at,Bio\n\
             a,,,,,,,2023-01-01T00:00:00Z,",
        )
        .expect("seed");

        let next = store
            .write_next_at(Some(&prior), &[row("b", "2023-01-02T00:00:00Z")], stamp(0))
            .expect("write");

        assert_eq!(store.load(&next).expect("load").count(), 2);
    }

    #[test]
    fn same_stamp_gets_numeric_suffix() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path());

        let first = store.write_next_at(None, &[], stamp(5)).expect("first");
        let second = store.write_next_at(Some(&first), &[], stamp(5)).expect("second");

        assert_ne!(first, second);
        assert_eq!(
            second.file_name().and_then(|n| n.to_str()),
            Some("stargazer_info_20240301_120005_1.csv")
        );
        assert!(first.exists());
    }

    #[test]
    fn latest_picks_most_recent_artifact() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path());
        let older = store.write_next_at(None, &[], stamp(0)).expect("older");
        let newer = store.write_next_at(Some(&older), &[], stamp(1)).expect("newer");

        // Equal mtimes leave the name as the tie breaker where there is no btime.
        let time = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_700_000_000);
        for path in [&older, &newer] {
            File::options()
                .write(true)
                .open(path)
                .and_then(|f| f.set_modified(time))
                .expect("set mtime");
        }

        let latest = store.latest().expect("latest").expect("some artifact");
        assert_eq!(latest, newer);
    }

    #[test]
    fn latest_ignores_partial_and_foreign_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path());
        let done = store.write_next_at(None, &[], stamp(0)).expect("write");
        fs::write(
            dir.path().join("stargazer_info_20990101_000000.csv.partial"),
            "x",
        )
        .expect("partial");
        fs::write(dir.path().join("notes.csv"), "x").expect("foreign");

        assert_eq!(store.latest().expect("latest"), Some(done));
    }

    #[test]
    fn load_accepts_alias_header() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path());
        let path = dir.path().join("stargazer_info_1.csv");
        fs::write(
            &path,
            "Username,Name,Location,Company,Email,Twitter,Followers,Starred-at,Bio\n\
             a,,,,,,,2023-01-01T00:00:00Z,\n",
        )
        .expect("seed");

        let snapshot = store.load(&path).expect("load");
        assert_eq!(snapshot.watermark(), Some(at("2023-01-01T00:00:00Z")));
    }

    #[test]
    fn load_reports_invalid_timestamp_row() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path());
        let path = dir.path().join("stargazer_info_1.csv");
        fs::write(
            &path,
            "Username,Name,Location,Company,Email,Twitter,Followers,Starred at,Bio\n\
             a,,,,,,,2023-01-01T00:00:00Z,\n\
             b,,,,,,,last tuesday,\n",
        )
        .expect("seed");

        let err = store.load(&path).expect_err("bad timestamp");
        assert!(matches!(
            err,
            SnapshotError::InvalidTimestamp { row: 2, ref value, .. } if value == "last tuesday"
        ));
    }

    #[test]
    fn load_requires_starred_at_column() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path());
        let path = dir.path().join("stargazer_info_1.csv");
        fs::write(&path, "Username,Name\na,b\n").expect("seed");

        assert!(matches!(
            store.load(&path),
            Err(SnapshotError::MissingColumn { .. })
        ));
    }
}

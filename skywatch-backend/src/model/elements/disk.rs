//! Durable element tier: one `<norad_id>.tle` file per object holding the
//! name and the two element lines.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use skywatch_common::{ElementSet, NoradId};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

/// Source tag of records read back from disk.
pub const DISK_SOURCE: &str = "disk";

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

pub struct DiskStore {
    dir: PathBuf,
}

impl DiskStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, norad_id: NoradId) -> PathBuf {
        self.dir.join(format!("{}.tle", norad_id))
    }

    pub async fn ensure_dir(&self) -> Result<()> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)
                .await
                .context("Failed to create element cache directory")?;
            info!("Created element cache directory: {:?}", self.dir);
        }
        Ok(())
    }

    /// Replace the record for `set.norad_id`.
    ///
    /// The content goes to a temporary file that is renamed over the target,
    /// so readers see either the previous record or the new one. The file's
    /// modification time is set to `fetched_at`.
    pub async fn save(&self, set: &ElementSet) -> Result<()> {
        self.ensure_dir().await?;

        let target = self.path_for(set.norad_id);
        let tmp = self.dir.join(format!(
            ".{}.tle.{}-{}.tmp",
            set.norad_id,
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        let content = format!("{}\n{}\n{}\n", set.name, set.line1, set.line2);
        let result: Result<()> = async {
            fs::write(&tmp, content)
                .await
                .context("Failed to write temporary element file")?;

            let file = fs::OpenOptions::new().write(true).open(&tmp).await?.into_std().await;
            file.set_modified(SystemTime::from(set.fetched_at))
                .context("Failed to stamp element file")?;
            file.sync_all().context("Failed to flush element file")?;
            drop(file);

            fs::rename(&tmp, &target)
                .await
                .context("Failed to move element file into place")
        }
        .await;

        if result.is_err() {
            let _ = fs::remove_file(&tmp).await;
        }
        result?;

        debug!("Persisted catalog #{} to {:?}", set.norad_id, target);
        Ok(())
    }

    /// Read the record for `norad_id`; `Ok(None)` when no file exists.
    ///
    /// `fetched_at` comes from the file's modification time, so a record is
    /// never presented as fresher than it is.
    pub async fn load(&self, norad_id: NoradId) -> Result<Option<ElementSet>> {
        let path = self.path_for(norad_id);
        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("Failed to open {:?}", path)),
        };

        read_record(norad_id, &path, file).await.map(Some)
    }
}

/// Lines and modification time are both taken from the same open handle; a
/// concurrent `save` renames a new inode into place and leaves this one intact.
async fn read_record(norad_id: NoradId, path: &Path, mut file: fs::File) -> Result<ElementSet> {
    let modified = file
        .metadata()
        .await
        .with_context(|| format!("Failed to stat {:?}", path))?
        .modified()?;

    let mut content = String::new();
    file.read_to_string(&mut content)
        .await
        .with_context(|| format!("Failed to read {:?}", path))?;

    let lines: Vec<&str> = content.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let [name, line1, line2] = lines.as_slice() else {
        anyhow::bail!("{:?} must hold exactly three non-empty lines, found {}", path, lines.len());
    };

    let fetched_at: DateTime<Utc> = modified.into();
    ElementSet::new(norad_id, *name, line1, line2, DISK_SOURCE, fetched_at)
        .with_context(|| format!("Invalid element record in {:?}", path))
}

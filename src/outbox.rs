use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use sentry_ndk_types::protocol::Envelope;
use sentry_ndk_types::random_uuid;
use tempfile::{Builder, NamedTempFile};

use crate::transport::Transport;
use crate::{sentry_debug, Error};

const STAGING_PREFIX: &str = ".outbox-";
const RUN_SUFFIX: &str = ".run";
const LOCK_SUFFIX: &str = ".lock";
const PERSIST_ATTEMPTS: usize = 4;

fn lock_path(run_dir: &Path) -> PathBuf {
    let mut path = run_dir.as_os_str().to_owned();
    path.push(LOCK_SUFFIX);
    PathBuf::from(path)
}

fn open_lock(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
}

#[cfg(unix)]
fn try_lock(file: &File) -> io::Result<bool> {
    use std::os::unix::io::AsRawFd;

    // SAFETY: the descriptor is owned by `file` and stays open for the call.
    let rv = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rv == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    if err.kind() == io::ErrorKind::WouldBlock {
        Ok(false)
    } else {
        Err(err)
    }
}

/// Takes the lock of a run whose owner is gone.
///
/// Without file locks ownership cannot be proven, so no run is ever claimed.
#[cfg(unix)]
fn claim_abandoned(run_dir: &Path) -> Option<File> {
    let lock = open_lock(&lock_path(run_dir)).ok()?;
    match try_lock(&lock) {
        Ok(true) => Some(lock),
        _ => None,
    }
}

#[cfg(not(unix))]
fn claim_abandoned(_run_dir: &Path) -> Option<File> {
    None
}

/// A staging directory owned by one writer for its lifetime.
///
/// The owner holds an exclusive lock on `<run>.run.lock`.  The run and its
/// lock file are removed when the owner is dropped.
#[derive(Debug)]
struct Run {
    dir: PathBuf,
    lock_path: PathBuf,
    _lock: File,
}

impl Run {
    fn create(staging_root: &Path) -> io::Result<Run> {
        let dir = staging_root.join(format!("{}{}", random_uuid(), RUN_SUFFIX));
        let lock_path = lock_path(&dir);
        let lock = open_lock(&lock_path)?;
        #[cfg(unix)]
        {
            if !try_lock(&lock)? {
                return Err(io::Error::new(
                    io::ErrorKind::WouldBlock,
                    "run directory is locked by another writer",
                ));
            }
        }
        fs::create_dir(&dir)?;
        Ok(Run {
            dir,
            lock_path,
            _lock: lock,
        })
    }
}

impl Drop for Run {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_dir_all(&self.dir) {
            sentry_debug!("[OutboxWriter] failed to remove run directory: {}", err);
        }
        fs::remove_file(&self.lock_path).ok();
    }
}

/// Writes envelopes as individual files into the outbox directory.
///
/// Each writer stages its files in a run directory of its own below the
/// staging directory, so writers sharing a staging directory never touch
/// each other's in-flight files.  An envelope is written to a temporary
/// file in the run directory, synced, and then renamed into the outbox
/// under a fresh UUID name.  The rename never replaces an existing file, so
/// readers of the outbox only ever see complete entries and names are never
/// reused.
#[derive(Debug)]
pub struct OutboxWriter {
    outbox_dir: PathBuf,
    staging_dir: PathBuf,
    run: Run,
}

impl OutboxWriter {
    /// Opens a writer.
    ///
    /// Creates both directories, removes runs left behind by writers that
    /// are gone, and claims a new run.  Both directories must be on the same
    /// filesystem.
    pub fn open<O, S>(outbox_dir: O, staging_dir: S) -> Result<OutboxWriter, Error>
    where
        O: Into<PathBuf>,
        S: Into<PathBuf>,
    {
        let outbox_dir = outbox_dir.into();
        let staging_dir = staging_dir.into();
        for dir in [&outbox_dir, &staging_dir] {
            fs::create_dir_all(dir).map_err(|source| Error::CreateDirectory {
                path: dir.clone(),
                source,
            })?;
        }

        let purged = purge_abandoned_runs(&staging_dir);
        if purged > 0 {
            sentry_debug!("[OutboxWriter] removed {} abandoned staging runs", purged);
        }

        let run = Run::create(&staging_dir).map_err(|source| Error::CreateDirectory {
            path: staging_dir.clone(),
            source,
        })?;
        Ok(OutboxWriter {
            outbox_dir,
            staging_dir,
            run,
        })
    }

    /// The directory finished entries land in.
    pub fn outbox_dir(&self) -> &Path {
        &self.outbox_dir
    }

    /// The directory holding the runs of all writers.
    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// The run directory this writer stages its in-flight entries in.
    pub fn run_dir(&self) -> &Path {
        &self.run.dir
    }

    /// Durably writes one envelope and returns the path of the new entry.
    pub fn write(&self, envelope: &Envelope) -> Result<PathBuf, Error> {
        let payload = envelope.to_vec().map_err(Error::Serialize)?;

        let mut file = Builder::new()
            .prefix(STAGING_PREFIX)
            .tempfile_in(&self.run.dir)
            .map_err(Error::Outbox)?;
        file.write_all(&payload).map_err(Error::Outbox)?;
        file.as_file().sync_all().map_err(Error::Outbox)?;

        let path = self.persist(file)?;
        sync_dir(&self.outbox_dir);
        Ok(path)
    }

    fn persist(&self, mut file: NamedTempFile) -> Result<PathBuf, Error> {
        let mut attempts = 0;
        loop {
            let path = self.outbox_dir.join(random_uuid().to_string());
            match file.persist_noclobber(&path) {
                Ok(_) => return Ok(path),
                Err(err)
                    if err.error.kind() == io::ErrorKind::AlreadyExists
                        && attempts + 1 < PERSIST_ATTEMPTS =>
                {
                    attempts += 1;
                    file = err.file;
                }
                Err(err) => return Err(Error::Outbox(err.error)),
            }
        }
    }
}

/// Removes every run below `staging_dir` whose owner is gone.
fn purge_abandoned_runs(staging_dir: &Path) -> usize {
    let Ok(entries) = fs::read_dir(staging_dir) else {
        return 0;
    };
    let mut purged = 0;
    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();
        let is_run = path.is_dir()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.ends_with(RUN_SUFFIX));
        if !is_run {
            continue;
        }
        let Some(_lock) = claim_abandoned(&path) else {
            continue;
        };
        if fs::remove_dir_all(&path).is_ok() {
            purged += 1;
        }
        fs::remove_file(lock_path(&path)).ok();
    }
    purged
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Err(err) = fs::File::open(dir).and_then(|dir| dir.sync_all()) {
        sentry_debug!("[OutboxWriter] failed to sync outbox directory: {}", err);
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}

impl Transport for OutboxWriter {
    fn send_envelope(&self, envelope: Envelope) {
        match self.write(&envelope) {
            Ok(path) => sentry_debug!("[OutboxWriter] wrote {}", path.display()),
            Err(err) => sentry_debug!("[OutboxWriter] dropping envelope: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    use sentry_ndk_types::protocol::{Event, EventKind};

    use super::*;

    fn writer(root: &Path) -> OutboxWriter {
        OutboxWriter::open(root.join("outbox"), root.join(".sentry-native")).unwrap()
    }

    fn entries(dir: &Path) -> Vec<PathBuf> {
        fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect()
    }

    #[test]
    fn test_write_creates_single_entry() {
        let root = tempfile::tempdir().unwrap();
        let writer = writer(root.path());
        let event = Event {
            kind: EventKind::Transaction,
            ..Default::default()
        };

        let path = writer.write(&event.clone().into()).unwrap();
        assert_eq!(entries(writer.outbox_dir()), [path.clone()]);
        assert!(entries(writer.run_dir()).is_empty());

        let stored = Envelope::from_path(&path).unwrap();
        assert_eq!(stored.uuid(), Some(&event.event_id));
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.parse::<sentry_ndk_types::Uuid>().is_ok());
    }

    #[test]
    fn test_names_never_collide() {
        let root = tempfile::tempdir().unwrap();
        let writer = Arc::new(writer(root.path()));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let writer = writer.clone();
                thread::spawn(move || {
                    (0..25)
                        .map(|_| writer.write(&Event::new().into()).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut names = HashSet::new();
        for handle in handles {
            names.extend(handle.join().unwrap());
        }
        assert_eq!(names.len(), 100);
        assert_eq!(entries(writer.outbox_dir()).len(), 100);
    }

    #[test]
    fn test_sibling_writer_keeps_in_flight_entries() {
        let root = tempfile::tempdir().unwrap();
        let staging = root.path().join(".sentry-native");
        let first = OutboxWriter::open(root.path().join("outbox-a"), &staging).unwrap();
        let in_flight = Builder::new()
            .prefix(STAGING_PREFIX)
            .tempfile_in(first.run_dir())
            .unwrap();

        let second = OutboxWriter::open(root.path().join("outbox-b"), &staging).unwrap();
        assert_eq!(second.staging_dir(), first.staging_dir());
        assert_ne!(second.run_dir(), first.run_dir());
        assert!(in_flight.path().exists());

        let path = first.persist(in_flight).unwrap();
        assert_eq!(path.parent(), Some(first.outbox_dir()));
        assert!(entries(second.outbox_dir()).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_open_purges_abandoned_runs() {
        let root = tempfile::tempdir().unwrap();
        let staging = root.path().join(".sentry-native");
        let dead = staging.join(format!("dead{}", RUN_SUFFIX));
        fs::create_dir_all(&dead).unwrap();
        fs::write(dead.join(".outbox-stale"), b"partial").unwrap();
        fs::write(lock_path(&dead), b"").unwrap();
        fs::write(staging.join("keep.db"), b"other").unwrap();

        let live = OutboxWriter::open(root.path().join("outbox"), &staging).unwrap();
        let survivor = OutboxWriter::open(root.path().join("outbox"), &staging).unwrap();

        assert!(!dead.exists());
        assert!(!lock_path(&dead).exists());
        assert!(staging.join("keep.db").exists());
        assert!(live.run_dir().is_dir());
        assert!(survivor.run_dir().is_dir());
    }

    #[test]
    fn test_drop_removes_run() {
        let root = tempfile::tempdir().unwrap();
        let writer = writer(root.path());
        let run_dir = writer.run_dir().to_path_buf();
        writer.write(&Event::new().into()).unwrap();
        drop(writer);

        assert!(!run_dir.exists());
        assert!(!lock_path(&run_dir).exists());
        assert_eq!(entries(&root.path().join("outbox")).len(), 1);
    }

    #[test]
    fn test_open_reports_directory_errors() {
        let root = tempfile::tempdir().unwrap();
        let blocker = root.path().join("file");
        fs::write(&blocker, b"").unwrap();

        match OutboxWriter::open(blocker.join("outbox"), root.path().join("staging")) {
            Err(Error::CreateDirectory { path, .. }) => assert_eq!(path, blocker.join("outbox")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_transport_swallows_errors() {
        let root = tempfile::tempdir().unwrap();
        let writer = writer(root.path());
        fs::remove_dir_all(root.path().join("outbox")).unwrap();
        fs::remove_dir_all(writer.run_dir()).unwrap();

        writer.send_envelope(Event::new().into());
        assert!(writer.write(&Event::new().into()).is_err());
        assert!(!root.path().join("outbox").exists());
    }
}

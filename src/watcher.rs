use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use notify::event::{AccessKind, AccessMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::battery::{SharedBattery, ShutdownSignal};
use crate::error::WatchError;
use crate::reader::StateReader;

pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(1);

enum WatchMsg {
    Changed,
    BackendError(notify::Error),
    Stop,
}

/// Keeps a [`SharedBattery`] in sync with the status file from a background thread.
///
/// The thread sleeps on a channel fed by the `notify` backend and re-reads the
/// file once per wake-up, however many events arrived meanwhile. The watch is
/// placed on the file's directory so the file may be absent or replaced.
pub struct ChangeWatcher {
    path: PathBuf,
    dir: PathBuf,
    backend: Option<RecommendedWatcher>,
    tx: Sender<WatchMsg>,
    done: Receiver<()>,
    worker: Option<JoinHandle<()>>,
    shutdown: ShutdownSignal,
}

impl ChangeWatcher {
    pub fn start(
        reader: StateReader,
        shared: SharedBattery,
        shutdown: ShutdownSignal,
    ) -> Result<Self, WatchError> {
        let path = reader.path().to_path_buf();
        let dir = watch_dir(&path);
        let file_name = path.file_name().map(OsString::from);
        let (tx, rx) = mpsc::channel();

        let event_tx = tx.clone();
        let mut backend = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let msg = match res {
                Ok(event) if is_trigger(&event.kind) && names_file(&event, file_name.as_deref()) => {
                    WatchMsg::Changed
                }
                Ok(_) => return,
                Err(err) => WatchMsg::BackendError(err),
            };
            // The worker is gone once stop() ran; late events are dropped.
            let _ = event_tx.send(msg);
        })
        .map_err(|source| WatchError::Registration { path: path.clone(), source })?;

        backend
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|source| WatchError::Registration { path: dir.clone(), source })?;

        // Forced first read so the first frame has data without waiting for an event.
        refresh(&reader, &shared, &shutdown);

        let (done_tx, done) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("battery-watch".into())
            .spawn({
                let shutdown = shutdown.clone();
                move || {
                    watch_loop(&rx, &reader, &shared, &shutdown);
                    let _ = done_tx.send(());
                }
            })
            .map_err(WatchError::Spawn)?;

        log::info!("Watching {}", path.display());

        Ok(Self {
            path,
            dir,
            backend: Some(backend),
            tx,
            done,
            worker: Some(worker),
            shutdown,
        })
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Wake the worker as if the file had changed.
    #[cfg(test)]
    pub(crate) fn nudge(&self) {
        let _ = self.tx.send(WatchMsg::Changed);
    }

    /// Stop the background thread and release the watch.
    ///
    /// Safe to call repeatedly and while the thread is blocked waiting for an
    /// event. Waits at most `timeout` for the thread to confirm; on timeout the
    /// thread is detached and [`WatchError::ShutdownTimeout`] is returned.
    pub fn stop(&mut self, timeout: Duration) -> Result<(), WatchError> {
        self.shutdown.trigger();

        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        if let Some(mut backend) = self.backend.take() {
            if let Err(e) = backend.unwatch(&self.dir) {
                log::debug!("Unwatch {} failed: {}", self.dir.display(), e);
            }
        }

        let _ = self.tx.send(WatchMsg::Stop);

        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if worker.join().is_err() {
                    log::warn!("Watcher thread panicked");
                }
                log::info!("Stopped watching {}", self.path.display());
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!("Watcher thread did not stop in time, detaching it");
                Err(WatchError::ShutdownTimeout(timeout))
            }
        }
    }
}

impl Drop for ChangeWatcher {
    fn drop(&mut self) {
        if self.is_running() {
            if let Err(e) = self.stop(DEFAULT_STOP_TIMEOUT) {
                log::warn!("{}", e);
            }
        }
    }
}

fn watch_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn names_file(event: &Event, file_name: Option<&std::ffi::OsStr>) -> bool {
    event.paths.iter().any(|p| p.file_name() == file_name)
}

fn is_trigger(kind: &EventKind) -> bool {
    // Read-side access events are skipped: our own reads raise them.
    matches!(
        kind,
        EventKind::Create(_)
            | EventKind::Modify(_)
            | EventKind::Access(AccessKind::Close(AccessMode::Write))
    )
}

fn watch_loop(
    rx: &Receiver<WatchMsg>,
    reader: &StateReader,
    shared: &SharedBattery,
    shutdown: &ShutdownSignal,
) {
    while let Ok(first) = rx.recv() {
        let mut changed = false;
        let mut next = Some(first);
        while let Some(msg) = next {
            match msg {
                WatchMsg::Changed => changed = true,
                WatchMsg::BackendError(e) => {
                    log::warn!("Watch error on {}: {}", reader.path().display(), e);
                }
                WatchMsg::Stop => return,
            }
            next = rx.try_recv().ok();
        }

        if shutdown.is_set() {
            return;
        }
        if changed {
            refresh(reader, shared, shutdown);
        }
    }
}

/// Read, project and publish. A failed read keeps the previous state.
fn refresh(reader: &StateReader, shared: &SharedBattery, shutdown: &ShutdownSignal) {
    let Ok(state) = reader.load() else {
        return;
    };
    if shutdown.is_set() {
        return;
    }
    log::debug!("Battery state: {:?}", state);
    shared.publish(state);
}

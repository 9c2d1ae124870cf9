//! The retrieve loop: poll outstanding export requests, dispatch ready ones to the downloader,
//! and fold download outcomes into [`Results`].
//!
//! Polling is sequential on the calling thread. Download outcomes arrive on a channel and are
//! applied to the aggregator only from this thread, including while it waits between sweeps.

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::archive::Archive;
use crate::download::{DownloadJob, DownloadOutcome, Downloader};
use crate::error::{Error, Result};
use crate::results::Results;
use crate::status::{self, FileManifestEntry, RequestStatus, describe};
use crate::util::{ensure_dir, numbered_filename};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

pub struct Retrieval<'a, A: ?Sized, D: ?Sized> {
    archive: &'a A,
    downloader: &'a D,
    dest: PathBuf,
    overwrite: bool,
    progress: bool,
    poll_interval: Duration,
    poll_error_limit: usize,
}

impl<'a, A, D> Retrieval<'a, A, D>
where
    A: Archive + ?Sized,
    D: Downloader + ?Sized,
{
    pub fn new(archive: &'a A, downloader: &'a D, dest: impl Into<PathBuf>) -> Self {
        Self {
            archive,
            downloader,
            dest: dest.into(),
            overwrite: false,
            progress: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_error_limit: 5,
        }
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Consecutive transport errors tolerated for one request before it is recorded as failed.
    pub fn with_poll_error_limit(mut self, limit: usize) -> Self {
        self.poll_error_limit = limit.max(1);
        self
    }

    /// Polls `request_ids` until each is ready or failed, downloads every ready file, and
    /// returns once all outcomes are in.
    pub fn run(&self, request_ids: &[String]) -> Result<Results> {
        ensure_dir(&self.dest)?;

        let (inbox, outcomes) = channel::unbounded::<DownloadOutcome>();
        let mut results = Results::new();
        let mut outstanding: Vec<String> = request_ids.to_vec();
        let mut poll_errors: HashMap<String, usize> = HashMap::new();
        // Local paths handed out so far; distinct URLs never share one.
        let mut claimed: HashSet<PathBuf> = HashSet::new();

        while !outstanding.is_empty() {
            let mut still_pending = Vec::with_capacity(outstanding.len());

            for request_id in std::mem::take(&mut outstanding) {
                match status::poll(self.archive, &request_id) {
                    Ok(state) => {
                        poll_errors.remove(&request_id);
                        if self.progress {
                            info!("{}", describe(&state));
                        }
                        match state {
                            RequestStatus::Ready { files, size, .. } => {
                                self.dispatch(files, size, &mut results, &mut claimed, &inbox);
                            }
                            RequestStatus::Pending { .. } => still_pending.push(request_id),
                            RequestStatus::Failed { status, error, .. } => {
                                let error = Error::Staging {
                                    request_id: request_id.clone(),
                                    status,
                                    message: error,
                                };
                                warn!(%error, "export request failed");
                                results.mark_failed(&request_id, error.to_string());
                            }
                        }
                    }
                    Err(error) => {
                        let count = poll_errors.entry(request_id.clone()).or_default();
                        *count += 1;
                        if *count >= self.poll_error_limit {
                            warn!(%request_id, %error, "giving up on export request");
                            results.mark_failed(&request_id, error.to_string());
                        } else {
                            warn!(%request_id, %error, "status query failed; will poll again");
                            still_pending.push(request_id);
                        }
                    }
                }
                drain(&outcomes, &mut results);
            }

            outstanding = still_pending;
            if !outstanding.is_empty() {
                self.wait(&outcomes, &mut results);
            }
        }

        drop(inbox);
        while !results.is_complete() {
            match outcomes.recv() {
                Ok(outcome) => apply(outcome, &mut results),
                Err(_) => {
                    // Every sender is gone, so nothing else will arrive.
                    for key in results.expected_keys() {
                        results.mark_failed(&key, "downloader dropped the job");
                    }
                }
            }
        }

        if self.progress {
            info!(
                files = results.len(),
                failed = results.failures().len(),
                "retrieval finished"
            );
        }
        Ok(results)
    }

    fn dispatch(
        &self,
        files: Vec<FileManifestEntry>,
        size: Option<f64>,
        results: &mut Results,
        claimed: &mut HashSet<PathBuf>,
        inbox: &Sender<DownloadOutcome>,
    ) {
        let mut queued = 0usize;
        for entry in files {
            let url = entry.url();
            if results.register([url.clone()]) == 0 {
                continue;
            }

            let mut local_path = self.local_path(&entry.filename);
            if claimed.contains(&local_path) {
                let taken = local_path;
                local_path = unclaimed(&taken, claimed);
                warn!(
                    url = %url,
                    taken = %taken.display(),
                    path = %local_path.display(),
                    "file name already used by another export; saving under a numbered name"
                );
            }
            claimed.insert(local_path.clone());

            if !self.overwrite && local_path.is_file() {
                if self.progress {
                    info!(
                        "Skipping download of file {} as it has already been downloaded",
                        entry.filename
                    );
                }
                results.mark_skipped(&url, local_path);
                continue;
            }

            self.downloader
                .submit(DownloadJob { url, local_path }, inbox.clone());
            queued += 1;
        }

        if self.progress {
            info!(
                "{} URLs found for download. Totalling {}MB",
                queued,
                size.map(|s| s.to_string()).unwrap_or_else(|| "?".to_string())
            );
        }
    }

    fn local_path(&self, filename: &str) -> PathBuf {
        let name = Path::new(filename)
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(filename));
        self.dest.join(name)
    }

    // Sleeps for the poll interval while applying any outcomes that arrive meanwhile.
    fn wait(&self, outcomes: &Receiver<DownloadOutcome>, results: &mut Results) {
        let deadline = Instant::now() + self.poll_interval;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match outcomes.recv_timeout(remaining) {
                Ok(outcome) => apply(outcome, results),
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    std::thread::sleep(remaining);
                    break;
                }
            }
        }
        drain(outcomes, results);
    }
}

// First `name.N.ext` next to `path` not yet claimed in this run. A file left there by an earlier
// run goes through the usual skip-existing check.
fn unclaimed(path: &Path, claimed: &HashSet<PathBuf>) -> PathBuf {
    let mut n = 1usize;
    loop {
        let candidate = numbered_filename(path, n);
        if !claimed.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

fn drain(outcomes: &Receiver<DownloadOutcome>, results: &mut Results) {
    while let Ok(outcome) = outcomes.try_recv() {
        apply(outcome, results);
    }
}

fn apply(outcome: DownloadOutcome, results: &mut Results) {
    match outcome.result {
        Ok(path) => {
            results.mark_downloaded(&outcome.url, path);
        }
        Err(error) => {
            warn!(url = %outcome.url, %error, "download failed");
            results.mark_failed(&outcome.url, error.to_string());
        }
    }
}

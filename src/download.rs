//! Bounded-concurrency file transfers.
//!
//! A [`Downloader`] accepts [`DownloadJob`]s and reports exactly one [`DownloadOutcome`] per job
//! on the inbox handed to [`Downloader::submit`]. [`HttpDownloader`] runs a fixed pool of worker
//! threads, so at most `max_conn` transfers are in flight.

use crossbeam::channel::{self, Receiver, Sender};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use reqwest::StatusCode;
use reqwest::header::RANGE;
use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};
use crate::http::Transport;
use crate::util::backoff;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    pub url: String,
    pub local_path: PathBuf,
}

#[derive(Debug)]
pub struct DownloadOutcome {
    pub url: String,
    pub result: Result<PathBuf>,
}

pub trait Downloader {
    /// Queues `job`; its outcome is eventually sent to `inbox` exactly once.
    fn submit(&self, job: DownloadJob, inbox: Sender<DownloadOutcome>);
}

struct Task {
    job: DownloadJob,
    inbox: Sender<DownloadOutcome>,
}

pub struct HttpDownloader {
    queue: Option<Sender<Task>>,
    workers: Vec<JoinHandle<()>>,
}

impl HttpDownloader {
    pub(crate) fn new(transport: Transport, max_conn: usize, progress: bool) -> Result<Self> {
        let (queue, tasks) = channel::unbounded::<Task>();
        let bars = progress.then(MultiProgress::new);

        let workers = (0..max_conn.max(1))
            .map(|i| {
                let tasks = tasks.clone();
                let transport = transport.clone();
                let bars = bars.clone();
                thread::Builder::new()
                    .name(format!("jsoc-download-{}", i))
                    .spawn(move || worker(tasks, transport, bars))
            })
            .collect::<std::io::Result<Vec<_>>>()?;

        Ok(Self {
            queue: Some(queue),
            workers,
        })
    }
}

impl Downloader for HttpDownloader {
    fn submit(&self, job: DownloadJob, inbox: Sender<DownloadOutcome>) {
        let task = Task { job, inbox };
        let rejected = match &self.queue {
            Some(queue) => queue.send(task).err().map(|e| e.into_inner()),
            None => Some(task),
        };
        if let Some(task) = rejected {
            let url = task.job.url.clone();
            let _ = task.inbox.send(DownloadOutcome {
                result: Err(Error::Transfer {
                    url: url.clone(),
                    message: "downloader is shut down".to_string(),
                }),
                url,
            });
        }
    }
}

impl Drop for HttpDownloader {
    fn drop(&mut self) {
        self.queue.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker(tasks: Receiver<Task>, transport: Transport, bars: Option<MultiProgress>) {
    for Task { job, inbox } in tasks.iter() {
        debug!(url = %job.url, path = %job.local_path.display(), "download started");
        let result = fetch(&transport, &job, bars.as_ref()).map_err(|e| match e {
            Error::Transfer { .. } => e,
            other => Error::Transfer {
                url: job.url.clone(),
                message: other.to_string(),
            },
        });
        // The receiver may be gone if the caller abandoned the retrieval.
        let _ = inbox.send(DownloadOutcome {
            url: job.url,
            result,
        });
    }
}

fn file_bar(bars: Option<&MultiProgress>, job: &DownloadJob) -> Option<ProgressBar> {
    let bars = bars?;
    let pb = bars.add(ProgressBar::new(0));
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.green} {msg} {bytes}/{total_bytes} ({bytes_per_sec}) {wide_bar} {eta}",
    ) {
        pb.set_style(style.progress_chars("=>-"));
    }
    if let Some(name) = job.local_path.file_name() {
        pb.set_message(name.to_string_lossy().into_owned());
    }
    Some(pb)
}

fn fetch(transport: &Transport, job: &DownloadJob, bars: Option<&MultiProgress>) -> Result<PathBuf> {
    let target = &job.local_path;
    let pb = file_bar(bars, job);

    let mut downloaded: u64 = 0;
    let mut mode_append = false;
    let mut range_from: Option<u64> = None;
    let mut tries = 0usize;
    let mut sleep = Duration::ZERO;

    'download_attempt: loop {
        let resp = transport.robust_request(|| {
            let req = transport.http.get(&job.url);
            match range_from {
                Some(from) => req.header(RANGE, format!("bytes={}-", from)),
                None => req,
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Transfer {
                url: job.url.clone(),
                message: format!("HTTP {}", status),
            });
        }
        if range_from.is_some() && status != StatusCode::PARTIAL_CONTENT {
            // Server ignored the range; start over.
            mode_append = false;
            downloaded = 0;
        }
        let total = resp.content_length().map(|len| len + downloaded);
        if let (Some(pb), Some(total)) = (&pb, total) {
            pb.set_length(total);
            pb.set_position(downloaded);
        }

        let mut resp = resp;
        let mut out = OpenOptions::new()
            .create(true)
            .write(true)
            .append(mode_append)
            .truncate(!mode_append)
            .open(target)?;

        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = match resp.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    tries += 1;
                    if tries >= transport.retry_max {
                        return Err(Error::Transfer {
                            url: job.url.clone(),
                            message: format!("download interrupted: {}", e),
                        });
                    }

                    // resume
                    out.flush().ok();
                    downloaded = std::fs::metadata(target)?.len();
                    range_from = Some(downloaded);
                    mode_append = true;
                    sleep = backoff(sleep, transport.sleep_max);
                    thread::sleep(sleep);
                    continue 'download_attempt;
                }
            };

            out.write_all(&buf[..n])?;
            downloaded += n as u64;
            if let Some(pb) = &pb {
                pb.inc(n as u64);
            }
        }

        out.flush()?;

        match total {
            Some(total) if downloaded < total => {}
            _ => {
                if let Some(pb) = &pb {
                    pb.finish_and_clear();
                }
                return Ok(target.clone());
            }
        }

        tries += 1;
        if tries >= transport.retry_max {
            return Err(Error::Transfer {
                url: job.url.clone(),
                message: format!(
                    "downloaded {} byte(s) out of {}",
                    downloaded,
                    total.unwrap_or_default()
                ),
            });
        }
        // resume and retry
        downloaded = std::fs::metadata(target)?.len();
        range_from = Some(downloaded);
        mode_append = true;
        sleep = backoff(sleep, transport.sleep_max);
        thread::sleep(sleep);
    }
}

#![allow(dead_code)]

use crossbeam::channel::Sender;
use jsocapi::{
    Archive, Attr, DownloadJob, DownloadOutcome, Downloader, Error, ExportForm, ExportReply,
    InfoReply, QueryBlock, Result, StatusReply, build_blocks,
};
use serde_json::json;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

/// Archive double that replays scripted replies and records every call.
#[derive(Default)]
pub struct ScriptedArchive {
    submit_replies: RefCell<VecDeque<Result<ExportReply>>>,
    statuses: RefCell<HashMap<String, VecDeque<Result<StatusReply>>>>,
    pub exports: RefCell<Vec<ExportForm>>,
    pub polls: RefCell<Vec<String>>,
}

impl ScriptedArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept(self, request_id: &str) -> Self {
        self.submit_replies.borrow_mut().push_back(Ok(ExportReply {
            status: 2,
            requestid: Some(request_id.to_string()),
            error: None,
        }));
        self
    }

    pub fn refuse(self, status: i64, error: &str) -> Self {
        self.submit_replies.borrow_mut().push_back(Ok(ExportReply {
            status,
            requestid: None,
            error: Some(error.to_string()),
        }));
        self
    }

    pub fn unreachable_submit(self) -> Self {
        self.submit_replies.borrow_mut().push_back(Err(Error::Http {
            status: 503,
            url: "http://archive/jsoc_fetch".into(),
            message: "unavailable".into(),
        }));
        self
    }

    /// Queues status replies for `request_id`; the last one repeats forever.
    pub fn statuses(self, request_id: &str, replies: Vec<StatusReply>) -> Self {
        self.statuses
            .borrow_mut()
            .entry(request_id.to_string())
            .or_default()
            .extend(replies.into_iter().map(Ok));
        self
    }

    pub fn status_error(self, request_id: &str) -> Self {
        self.statuses
            .borrow_mut()
            .entry(request_id.to_string())
            .or_default()
            .push_back(Err(Error::Http {
                status: 502,
                url: "http://archive/jsoc_fetch".into(),
                message: "bad gateway".into(),
            }));
        self
    }

    pub fn polls_of(&self, request_id: &str) -> usize {
        self.polls.borrow().iter().filter(|p| *p == request_id).count()
    }
}

impl Archive for ScriptedArchive {
    fn record_info(&self, _ds: &str, _keys: &str, _rec_info: bool) -> Result<InfoReply> {
        Ok(InfoReply::default())
    }

    fn submit_export(&self, form: &ExportForm) -> Result<ExportReply> {
        self.exports.borrow_mut().push(form.clone());
        self.submit_replies
            .borrow_mut()
            .pop_front()
            .expect("unexpected export submission")
    }

    fn export_status(&self, request_id: &str) -> Result<StatusReply> {
        self.polls.borrow_mut().push(request_id.to_string());
        let mut statuses = self.statuses.borrow_mut();
        let queue = statuses
            .get_mut(request_id)
            .unwrap_or_else(|| panic!("no script for {request_id}"));
        let repeat_last = queue.len() == 1 && matches!(queue.front(), Some(Ok(_)));
        if !repeat_last {
            return queue.pop_front().expect("status script exhausted");
        }
        match queue.front() {
            Some(Ok(reply)) => Ok(reply.clone()),
            _ => unreachable!(),
        }
    }
}

pub fn pending(wait: u64) -> StatusReply {
    serde_json::from_value(json!({"status": 1, "wait": wait})).unwrap()
}

pub fn ready(dir: &str, files: &[&str]) -> StatusReply {
    let data: Vec<_> = files.iter().map(|f| json!({"filename": f})).collect();
    serde_json::from_value(json!({"status": 0, "dir": dir, "size": 1, "data": data})).unwrap()
}

pub fn failed(status: i64, error: &str) -> StatusReply {
    serde_json::from_value(json!({"status": status, "error": error})).unwrap()
}

/// Downloader double: records jobs and reports them finished at once.
#[derive(Default)]
pub struct RecordingDownloader {
    pub jobs: Mutex<Vec<DownloadJob>>,
    pub failing: HashSet<String>,
}

impl RecordingDownloader {
    pub fn failing(urls: &[&str]) -> Self {
        Self {
            jobs: Mutex::default(),
            failing: urls.iter().map(|u| u.to_string()).collect(),
        }
    }

    pub fn urls(&self) -> Vec<String> {
        self.jobs.lock().unwrap().iter().map(|j| j.url.clone()).collect()
    }
}

impl Downloader for RecordingDownloader {
    fn submit(&self, job: DownloadJob, inbox: Sender<DownloadOutcome>) {
        let result = if self.failing.contains(&job.url) {
            Err(Error::Transfer {
                url: job.url.clone(),
                message: "connection reset".into(),
            })
        } else {
            Ok(job.local_path.clone())
        };
        let url = job.url.clone();
        self.jobs.lock().unwrap().push(job);
        inbox.send(DownloadOutcome { url, result }).unwrap();
    }
}

pub fn blocks(series: &[&str]) -> Vec<QueryBlock> {
    let mut query = jsocapi::Query::default();
    for s in series {
        query = query | Attr::series(*s);
    }
    let shared = [
        Attr::time("2012-01-01T00:00:00", "2012-01-01T00:01:00").unwrap(),
        Attr::Notify("someone@example.org".into()),
    ];
    build_blocks(&query, &shared).unwrap()
}

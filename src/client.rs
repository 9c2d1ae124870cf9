use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tracing::info;

use crate::archive::JsocArchive;
use crate::config::load_config;
use crate::download::HttpDownloader;
use crate::error::Result;
use crate::export::{Submission, submit};
use crate::http::Transport;
use crate::lookup::{MetaDict, RecordTable, lookup, lookup_metadata};
use crate::orchestrator::{DEFAULT_POLL_INTERVAL, Retrieval};
use crate::query::{Attr, Query, QueryBlock, build_blocks};
use crate::results::Results;
use crate::status::{RequestStatus, describe, poll};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base JSOC URL, typically `http://jsoc.stanford.edu`.
    pub url: String,
    /// Registered e-mail address used for exports.
    pub notify: Option<String>,
    /// Where retrieved files go unless a call says otherwise.
    pub download_dir: PathBuf,
    /// Whether to verify TLS certificates.
    pub verify: bool,
}

#[derive(Debug, Clone)]
pub struct Client {
    config: ClientConfig,

    download_timeout: Duration,
    progress: bool,

    transport: Transport,
}

/// Records matched by a query, plus what is needed to stage them.
#[derive(Debug, Clone, Default)]
pub struct QueryResponse {
    pub table: RecordTable,
    pub blocks: Vec<QueryBlock>,
    /// Filled in by [`Client::get`].
    pub request_ids: Vec<String>,
}

impl QueryResponse {
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn append(&mut self, table: RecordTable) {
        self.table.append(table);
    }
}

#[derive(Debug, Clone)]
pub struct GetOptions {
    /// Destination directory; defaults to the configured download directory.
    pub path: Option<PathBuf>,
    pub overwrite: bool,
    pub max_conn: usize,
    /// Wait between status sweeps.
    pub sleep: Duration,
}

impl Default for GetOptions {
    fn default() -> Self {
        Self {
            path: None,
            overwrite: false,
            max_conn: 5,
            sleep: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl Client {
    /// Creates a client using environment variables and/or `.jsocrc`.
    ///
    /// This is equivalent to `Client::new(None, None, None)`.
    pub fn from_env() -> Result<Self> {
        Self::new(None, None, None)
    }

    /// Creates a client using (in order of precedence):
    /// - explicit arguments
    /// - environment variables `JSOC_URL` / `JSOC_NOTIFY` / `JSOC_DOWNLOAD_DIR`
    /// - config file from `JSOC_RC` or `.jsocrc`
    pub fn new(
        url: Option<String>,
        notify: Option<String>,
        download_dir: Option<PathBuf>,
    ) -> Result<Self> {
        let config = load_config(url, notify, download_dir)?;
        Self::with_config(config)
    }

    pub fn with_config(config: ClientConfig) -> Result<Self> {
        let transport = Transport::new(Duration::from_secs(60), config.verify)?;
        Ok(Self {
            config,
            download_timeout: Duration::from_secs(3600),
            progress: true,
            transport,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.transport.timeout = timeout;
        self
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    pub fn with_retry_max(mut self, retry_max: usize) -> Self {
        self.transport.retry_max = retry_max.max(1);
        self
    }

    pub fn with_sleep_max(mut self, sleep_max: Duration) -> Self {
        self.transport.sleep_max = sleep_max;
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The archive endpoint this client talks to.
    pub fn archive(&self) -> JsocArchive {
        JsocArchive::new(&self.config.url, self.transport.clone())
    }

    /// A downloader sharing this client's HTTP settings, for driving [`Retrieval`] directly.
    pub fn downloader(&self, max_conn: usize) -> Result<HttpDownloader> {
        let mut transfer = self.transport.clone();
        transfer.timeout = self.download_timeout;
        HttpDownloader::new(transfer, max_conn, self.progress)
    }

    fn blocks(&self, query: &Query, shared: &[Attr]) -> Result<Vec<QueryBlock>> {
        let mut defaults = Vec::with_capacity(shared.len() + 1);
        if let Some(notify) = &self.config.notify {
            defaults.push(Attr::Notify(notify.clone()));
        }
        defaults.extend_from_slice(shared);
        build_blocks(query, &defaults)
    }

    /// Looks up the records `query` matches, without staging anything.
    pub fn query(&self, query: &Query, shared: &[Attr]) -> Result<QueryResponse> {
        let archive = self.archive();
        let blocks = self.blocks(query, shared)?;
        let mut response = QueryResponse::default();
        for block in &blocks {
            response.append(lookup(&archive, block)?);
        }
        response.blocks = blocks;
        Ok(response)
    }

    /// All keywords of every record `query` matches, keyed by record name.
    pub fn get_metadata(&self, query: &Query, shared: &[Attr]) -> Result<MetaDict> {
        let archive = self.archive();
        let mut out = MetaDict::new();
        for block in self.blocks(query, shared)? {
            out.extend(lookup_metadata(&archive, &block)?);
        }
        Ok(out)
    }

    /// Asks the archive to stage every block of `response`.
    pub fn request_data(&self, response: &QueryResponse) -> Submission {
        submit(&self.archive(), &response.blocks)
    }

    /// Current status of each request, logging a status line for each.
    pub fn check_request(&self, request_ids: &[String]) -> Result<Vec<RequestStatus>> {
        let archive = self.archive();
        request_ids
            .iter()
            .map(|id| {
                let status = poll(&archive, id)?;
                info!("{}", describe(&status));
                Ok(status)
            })
            .collect()
    }

    /// Stages the data of `response`, waits for it and downloads it.
    ///
    /// Blocks that could not be staged appear in the returned [`Results`] as failed keys named
    /// `block <index>`.
    pub fn get(&self, response: &mut QueryResponse, opts: &GetOptions) -> Result<Results> {
        let submission = self.request_data(response);
        response.request_ids = submission.request_ids();

        if !response.request_ids.is_empty() {
            thread::sleep(opts.sleep / 2);
        }
        let mut results = self.get_request(&response.request_ids, opts)?;
        for diagnostic in &submission.diagnostics {
            results.mark_failed(
                &format!("block {}", diagnostic.block),
                diagnostic.error.to_string(),
            );
        }
        Ok(results)
    }

    /// Waits for already submitted requests and downloads their files.
    pub fn get_request(&self, request_ids: &[String], opts: &GetOptions) -> Result<Results> {
        let dest = opts
            .path
            .clone()
            .unwrap_or_else(|| self.config.download_dir.clone());

        let downloader = self.downloader(opts.max_conn)?;

        let archive = self.archive();
        Retrieval::new(&archive, &downloader, dest)
            .with_overwrite(opts.overwrite)
            .with_progress(self.progress)
            .with_poll_interval(opts.sleep)
            .with_poll_error_limit(self.transport.retry_max)
            .run(request_ids)
    }
}

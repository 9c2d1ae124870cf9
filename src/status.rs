use crate::archive::{Archive, StatusReply};
use crate::error::Result;
use crate::util::urljoin;

pub const STATUS_READY: i64 = 0;
pub const STATUS_PENDING: i64 = 1;

/// One file of a ready export.
#[derive(Debug, Clone, PartialEq)]
pub struct FileManifestEntry {
    pub filename: String,
    pub remote_dir: String,
}

impl FileManifestEntry {
    pub fn url(&self) -> String {
        urljoin(&self.remote_dir, &self.filename)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestStatus {
    Ready {
        request_id: String,
        files: Vec<FileManifestEntry>,
        /// Total export size as reported by the archive (MB).
        size: Option<f64>,
        dir: String,
        exported_at: Option<String>,
    },
    Pending {
        request_id: String,
        /// Seconds the archive suggests waiting.
        wait: Option<f64>,
    },
    Failed {
        request_id: String,
        status: i64,
        error: String,
    },
}

impl RequestStatus {
    pub fn request_id(&self) -> &str {
        match self {
            RequestStatus::Ready { request_id, .. }
            | RequestStatus::Pending { request_id, .. }
            | RequestStatus::Failed { request_id, .. } => request_id,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, RequestStatus::Ready { .. })
    }
}

/// Classifies a raw status reply. `download_base` prefixes relative export directories.
pub fn classify(request_id: &str, reply: &StatusReply, download_base: &str) -> RequestStatus {
    let request_id = reply
        .requestid
        .clone()
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| request_id.to_string());

    match reply.status {
        STATUS_READY => {
            let dir = urljoin(download_base, reply.dir.as_deref().unwrap_or(""));
            let files = reply
                .data
                .iter()
                .map(|rec| FileManifestEntry {
                    filename: rec.filename.clone(),
                    remote_dir: dir.clone(),
                })
                .collect();
            RequestStatus::Ready {
                request_id,
                files,
                size: reply.size,
                dir,
                exported_at: reply.exptime.clone(),
            }
        }
        STATUS_PENDING => RequestStatus::Pending {
            request_id,
            wait: reply.wait,
        },
        status => RequestStatus::Failed {
            request_id,
            status,
            error: reply.error.clone().unwrap_or_default(),
        },
    }
}

/// Queries and classifies one request. Never retries.
pub fn poll<A: Archive + ?Sized>(archive: &A, request_id: &str) -> Result<RequestStatus> {
    let reply = archive.export_status(request_id)?;
    Ok(classify(request_id, &reply, archive.download_base()))
}

/// Human-readable status line.
pub fn describe(status: &RequestStatus) -> String {
    match status {
        RequestStatus::Ready {
            request_id,
            exported_at,
            ..
        } => format!(
            "Request {} was exported at {} and is ready to download.",
            request_id,
            exported_at.as_deref().unwrap_or("(unknown)")
        ),
        RequestStatus::Pending { request_id, wait } => format!(
            "Request {} is not ready to download; the archive suggests waiting {} seconds.",
            request_id,
            wait.map(|w| w.to_string()).unwrap_or_else(|| "?".to_string())
        ),
        RequestStatus::Failed { status, error, .. } => {
            format!("Request returned status: {} with error: {}", status, error)
        }
    }
}

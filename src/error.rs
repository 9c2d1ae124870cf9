use reqwest::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A query block is missing a required field or carries an unusable value.
    #[error("invalid query: {0}")]
    Validation(String),

    /// The archive rejected a record lookup.
    #[error("record lookup for {ds} failed with status {status}: {message}")]
    Lookup {
        ds: String,
        status: i64,
        message: String,
    },

    /// One block's staging request was refused or never reached the archive.
    #[error("export request for block {block} failed: {message}")]
    Submission { block: usize, message: String },

    /// A polled export request resolved to a failure status.
    #[error("export request {request_id} failed with status {status}: {message}")]
    Staging {
        request_id: String,
        status: i64,
        message: String,
    },

    /// A single file transfer failed.
    #[error("download of {url} failed: {message}")]
    Transfer { url: String, message: String },

    /// The destination directory could not be created.
    #[error("failed to create directory {}: {source}", path.display())]
    FatalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("archive request failed: HTTP {status} for url ({url})\n{message}")]
    Http {
        status: u16,
        url: String,
        message: String,
    },

    #[error("could not connect: {0}")]
    Request(#[from] reqwest::Error),

    #[error("failed to parse archive JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] anyhow::Error),
}

/// Error body returned by `jsoc_fetch` and `jsoc_info` alongside a non-success status.
#[derive(Debug, serde::Deserialize)]
pub(crate) struct ArchiveErrorResponse {
    #[serde(default)]
    pub(crate) status: Option<serde_json::Value>,
    #[serde(default)]
    pub(crate) error: Option<String>,
    // Helioviewer responds with {"error": ..., "errno": ...} or {"message": ...}
    #[serde(default)]
    pub(crate) message: Option<String>,
}

pub(crate) fn format_archive_error(
    status: StatusCode,
    url: &str,
    e: &ArchiveErrorResponse,
) -> Error {
    let message = e
        .error
        .as_deref()
        .or(e.message.as_deref())
        .unwrap_or("")
        .trim();
    let archive_status = e
        .status
        .as_ref()
        .map(|s| s.to_string())
        .unwrap_or_default();

    if status == StatusCode::NOT_FOUND {
        return Error::Http {
            status: status.as_u16(),
            url: url.to_string(),
            message: format!(
                "archive endpoint not found.\n- Check the configured base URL (JSOC_URL or `url:` in .jsocrc); the default is http://jsoc.stanford.edu\n\nServer message: {}",
                message
            ),
        };
    }

    if status == StatusCode::FORBIDDEN {
        return Error::Http {
            status: status.as_u16(),
            url: url.to_string(),
            message: format!(
                "archive refused the request.\n- Exports require a notification address registered at http://jsoc.stanford.edu/ajax/register_email.html\n\nServer message: {}",
                message
            ),
        };
    }

    Error::Http {
        status: status.as_u16(),
        url: url.to_string(),
        message: if archive_status.is_empty() {
            message.to_string()
        } else {
            format!("archive status {}: {}", archive_status, message)
        },
    }
}

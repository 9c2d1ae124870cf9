use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::archive::{Archive, ExportForm};
use crate::error::{Error, Result};
use crate::query::QueryBlock;

// exp_request answers 2 for a freshly queued export; 0 and 1 mean it was already picked up.
const ACCEPTED_STATUS: [i64; 3] = [0, 1, 2];

/// A staging request the archive accepted.
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub request_id: String,
    pub block: QueryBlock,
    pub submitted_at: DateTime<Utc>,
}

/// Why one block produced no request.
#[derive(Debug)]
pub struct SubmissionDiagnostic {
    pub block: usize,
    pub error: Error,
}

/// Outcome of submitting a batch of blocks.
#[derive(Debug, Default)]
pub struct Submission {
    pub requests: Vec<ExportRequest>,
    pub diagnostics: Vec<SubmissionDiagnostic>,
}

impl Submission {
    pub fn request_ids(&self) -> Vec<String> {
        self.requests.iter().map(|r| r.request_id.clone()).collect()
    }
}

pub(crate) fn export_form(block: &QueryBlock) -> Result<ExportForm> {
    let notify = block
        .notify
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| {
            Error::Validation(
                "exports need a registered notification address (Attr::Notify or JSOC_NOTIFY)"
                    .to_string(),
            )
        })?;
    Ok(ExportForm {
        ds: block.recordset()?,
        notify: notify.to_string(),
        protocol: block.export_protocol(),
    })
}

fn submit_one<A: Archive + ?Sized>(archive: &A, index: usize, block: &QueryBlock) -> Result<String> {
    let submission_error = |message: String| Error::Submission {
        block: index,
        message,
    };

    let form = export_form(block).map_err(|e| submission_error(e.to_string()))?;
    let reply = archive
        .submit_export(&form)
        .map_err(|e| submission_error(e.to_string()))?;

    if !ACCEPTED_STATUS.contains(&reply.status) {
        return Err(submission_error(format!(
            "archive returned status {} with error {}",
            reply.status,
            reply.error.as_deref().unwrap_or("(none)")
        )));
    }
    reply
        .requestid
        .filter(|id| !id.is_empty())
        .ok_or_else(|| submission_error("archive reply carried no request id".to_string()))
}

/// Stages every block, collecting ids in submission order; a failing block is recorded and
/// skipped, never aborting the rest of the batch.
pub fn submit<A: Archive + ?Sized>(archive: &A, blocks: &[QueryBlock]) -> Submission {
    let mut out = Submission::default();
    for (index, block) in blocks.iter().enumerate() {
        match submit_one(archive, index, block) {
            Ok(request_id) => {
                info!(%request_id, series = %block.series, "export request submitted");
                out.requests.push(ExportRequest {
                    request_id,
                    block: block.clone(),
                    submitted_at: Utc::now(),
                });
            }
            Err(error) => {
                warn!(block = index, %error, "export request failed");
                out.diagnostics.push(SubmissionDiagnostic {
                    block: index,
                    error,
                });
            }
        }
    }
    out
}

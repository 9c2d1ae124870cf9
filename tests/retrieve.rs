mod common;

use common::{
    RecordingDownloader, ScriptedArchive, blocks, failed, pending, ready,
};
use jsocapi::export::submit;
use jsocapi::{Error, FileFact, Retrieval};
use std::time::Duration;

fn retrieval<'a>(
    archive: &'a ScriptedArchive,
    downloader: &'a RecordingDownloader,
    dest: &std::path::Path,
) -> Retrieval<'a, ScriptedArchive, RecordingDownloader> {
    Retrieval::new(archive, downloader, dest).with_poll_interval(Duration::ZERO)
}

#[test]
fn ready_requests_are_downloaded_as_they_become_ready() {
    let archive = ScriptedArchive::new()
        .accept("R1")
        .accept("R2")
        .statuses("R1", vec![pending(10), ready("/x", &["a.fits"])])
        .statuses("R2", vec![pending(10), pending(5), ready("/y", &["b.fits"])]);
    let downloader = RecordingDownloader::default();
    let dest = tempfile::tempdir().unwrap();

    let submission = submit(&archive, &blocks(&["hmi.M_45s", "hmi.Ic_45s"]));
    assert_eq!(submission.request_ids(), vec!["R1", "R2"]);
    assert!(submission.diagnostics.is_empty());

    let results = retrieval(&archive, &downloader, dest.path())
        .run(&submission.request_ids())
        .unwrap();

    assert_eq!(downloader.urls(), vec!["/x/a.fits", "/y/b.fits"]);
    // Three sweeps: both, both, then only R2. Ready is never re-polled.
    assert_eq!(*archive.polls.borrow(), vec!["R1", "R2", "R1", "R2", "R2"]);
    assert!(results.is_complete());
    assert_eq!(
        results.get("/x/a.fits"),
        Some(&FileFact::Downloaded(dest.path().join("a.fits")))
    );
    assert_eq!(
        results.get("/y/b.fits"),
        Some(&FileFact::Downloaded(dest.path().join("b.fits")))
    );
}

#[test]
fn failed_submission_is_a_diagnostic_and_polling_continues() {
    let archive = ScriptedArchive::new()
        .accept("R1")
        .refuse(4, "Bad recordset")
        .statuses("R1", vec![ready("/x", &["a.fits"])]);
    let downloader = RecordingDownloader::default();
    let dest = tempfile::tempdir().unwrap();

    let submission = submit(&archive, &blocks(&["hmi.M_45s", "nosuch.series"]));
    assert_eq!(submission.request_ids(), vec!["R1"]);
    assert_eq!(submission.diagnostics.len(), 1);
    let diagnostic = &submission.diagnostics[0];
    assert_eq!(diagnostic.block, 1);
    assert!(
        matches!(&diagnostic.error, Error::Submission { block: 1, message } if message.contains("Bad recordset"))
    );

    let results = retrieval(&archive, &downloader, dest.path())
        .run(&submission.request_ids())
        .unwrap();
    assert_eq!(downloader.urls(), vec!["/x/a.fits"]);
    assert!(results.is_complete());
}

#[test]
fn submission_counts_add_up() {
    for refused in 0..4usize {
        let mut archive = ScriptedArchive::new();
        for i in 0..4usize {
            archive = if i < refused {
                archive.unreachable_submit()
            } else {
                archive.accept(&format!("R{i}"))
            };
        }
        let submission = submit(
            &archive,
            &blocks(&["a.one", "b.two", "c.three", "d.four"]),
        );
        assert_eq!(submission.requests.len() + submission.diagnostics.len(), 4);
        assert_eq!(submission.requests.len(), 4 - refused);
        assert_eq!(archive.exports.borrow().len(), 4);
    }
}

#[test]
fn missing_notify_fails_the_block_without_contacting_the_archive() {
    let archive = ScriptedArchive::new();
    let mut blocks = blocks(&["hmi.M_45s"]);
    blocks[0].notify = None;

    let submission = submit(&archive, &blocks);
    assert!(submission.requests.is_empty());
    assert!(matches!(
        submission.diagnostics[0].error,
        Error::Submission { block: 0, .. }
    ));
    assert!(archive.exports.borrow().is_empty());
}

#[test]
fn export_form_carries_recordset_and_protocol() {
    let archive = ScriptedArchive::new().accept("R1");
    submit(&archive, &blocks(&["hmi.M_45s"]));
    let exports = archive.exports.borrow();
    assert_eq!(
        exports[0].ds,
        "hmi.M_45s[2012.01.01_00:00:34_TAI-2012.01.01_00:01:34_TAI]"
    );
    assert_eq!(exports[0].notify, "someone@example.org");
    assert_eq!(exports[0].protocol, "FITS,**NONE**");
}

#[test]
fn existing_files_are_skipped_unless_overwriting() {
    let dest = tempfile::tempdir().unwrap();
    std::fs::write(dest.path().join("a.fits"), b"already here").unwrap();

    let archive = ScriptedArchive::new().statuses("R1", vec![ready("/x", &["a.fits", "b.fits"])]);
    let downloader = RecordingDownloader::default();
    let results = retrieval(&archive, &downloader, dest.path())
        .run(&["R1".to_string()])
        .unwrap();
    assert_eq!(downloader.urls(), vec!["/x/b.fits"]);
    assert_eq!(
        results.get("/x/a.fits"),
        Some(&FileFact::Skipped(dest.path().join("a.fits")))
    );
    assert!(results.is_complete());

    let archive = ScriptedArchive::new().statuses("R1", vec![ready("/x", &["a.fits", "b.fits"])]);
    let downloader = RecordingDownloader::default();
    retrieval(&archive, &downloader, dest.path())
        .with_overwrite(true)
        .run(&["R1".to_string()])
        .unwrap();
    assert_eq!(downloader.urls(), vec!["/x/a.fits", "/x/b.fits"]);
}

#[test]
fn staging_failure_is_recorded_and_others_continue() {
    let archive = ScriptedArchive::new()
        .statuses("R1", vec![failed(4, "export failed")])
        .statuses("R2", vec![pending(1), ready("/y", &["b.fits"])]);
    let downloader = RecordingDownloader::default();
    let dest = tempfile::tempdir().unwrap();

    let results = retrieval(&archive, &downloader, dest.path())
        .run(&["R1".to_string(), "R2".to_string()])
        .unwrap();

    assert_eq!(archive.polls_of("R1"), 1);
    assert_eq!(downloader.urls(), vec!["/y/b.fits"]);
    let failures = results.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "R1");
    assert!(failures[0].1.contains("export failed"));
    assert!(results.is_complete());
}

#[test]
fn transfer_failure_is_contained() {
    let archive =
        ScriptedArchive::new().statuses("R1", vec![ready("/x", &["a.fits", "b.fits", "c.fits"])]);
    let downloader = RecordingDownloader::failing(&["/x/b.fits"]);
    let dest = tempfile::tempdir().unwrap();

    let results = retrieval(&archive, &downloader, dest.path())
        .run(&["R1".to_string()])
        .unwrap();

    assert_eq!(downloader.urls().len(), 3);
    assert!(matches!(results.get("/x/b.fits"), Some(FileFact::Failed(_))));
    assert_eq!(results.paths().len(), 2);
    assert!(results.is_complete());
}

#[test]
fn empty_manifest_completes_immediately() {
    let archive = ScriptedArchive::new().statuses("R1", vec![ready("/x", &[])]);
    let downloader = RecordingDownloader::default();
    let dest = tempfile::tempdir().unwrap();

    let results = retrieval(&archive, &downloader, dest.path())
        .run(&["R1".to_string()])
        .unwrap();
    assert!(results.is_empty());
    assert!(results.is_complete());
    assert!(downloader.urls().is_empty());
}

#[test]
fn same_file_in_two_requests_is_fetched_once() {
    let archive = ScriptedArchive::new()
        .statuses("R1", vec![ready("/x", &["a.fits"])])
        .statuses("R2", vec![ready("/x", &["a.fits"])]);
    let downloader = RecordingDownloader::default();
    let dest = tempfile::tempdir().unwrap();

    let results = retrieval(&archive, &downloader, dest.path())
        .run(&["R1".to_string(), "R2".to_string()])
        .unwrap();
    assert_eq!(downloader.urls(), vec!["/x/a.fits"]);
    assert_eq!(results.len(), 1);
}

#[test]
fn same_name_from_different_dirs_gets_distinct_local_paths() {
    let archive = ScriptedArchive::new()
        .statuses("R1", vec![ready("/x", &["a.fits"])])
        .statuses("R2", vec![ready("/y", &["a.fits"])]);
    let downloader = RecordingDownloader::default();
    let dest = tempfile::tempdir().unwrap();

    let results = retrieval(&archive, &downloader, dest.path())
        .run(&["R1".to_string(), "R2".to_string()])
        .unwrap();

    let jobs = downloader.jobs.lock().unwrap().clone();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].local_path, dest.path().join("a.fits"));
    assert_eq!(jobs[1].local_path, dest.path().join("a.1.fits"));
    assert_eq!(
        results.get("/y/a.fits"),
        Some(&FileFact::Downloaded(dest.path().join("a.1.fits")))
    );
    assert_eq!(results.paths().len(), 2);
}

#[test]
fn numbered_copy_from_an_earlier_run_is_skipped() {
    let dest = tempfile::tempdir().unwrap();
    std::fs::write(dest.path().join("a.fits"), b"x").unwrap();
    std::fs::write(dest.path().join("a.1.fits"), b"y").unwrap();

    let archive = ScriptedArchive::new()
        .statuses("R1", vec![ready("/x", &["a.fits"])])
        .statuses("R2", vec![ready("/y", &["a.fits"])]);
    let downloader = RecordingDownloader::default();
    let results = retrieval(&archive, &downloader, dest.path())
        .run(&["R1".to_string(), "R2".to_string()])
        .unwrap();

    assert!(downloader.urls().is_empty());
    assert_eq!(
        results.get("/x/a.fits"),
        Some(&FileFact::Skipped(dest.path().join("a.fits")))
    );
    assert_eq!(
        results.get("/y/a.fits"),
        Some(&FileFact::Skipped(dest.path().join("a.1.fits")))
    );
}

#[test]
fn transient_status_errors_are_polled_again() {
    let archive = ScriptedArchive::new()
        .status_error("R1")
        .statuses("R1", vec![ready("/x", &["a.fits"])]);
    let downloader = RecordingDownloader::default();
    let dest = tempfile::tempdir().unwrap();

    let results = retrieval(&archive, &downloader, dest.path())
        .run(&["R1".to_string()])
        .unwrap();
    assert_eq!(archive.polls_of("R1"), 2);
    assert_eq!(downloader.urls(), vec!["/x/a.fits"]);
    assert!(results.failures().is_empty());
}

#[test]
fn status_errors_past_the_limit_fail_the_request() {
    let archive = ScriptedArchive::new().status_error("R1");
    let downloader = RecordingDownloader::default();
    let dest = tempfile::tempdir().unwrap();

    let results = retrieval(&archive, &downloader, dest.path())
        .with_poll_error_limit(1)
        .run(&["R1".to_string()])
        .unwrap();
    assert!(matches!(results.get("R1"), Some(FileFact::Failed(_))));
    assert!(results.is_complete());
}

#[test]
fn uncreatable_destination_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("not-a-dir");
    std::fs::write(&file, b"x").unwrap();

    let archive = ScriptedArchive::new();
    let downloader = RecordingDownloader::default();
    let err = retrieval(&archive, &downloader, &file.join("data"))
        .run(&["R1".to_string()])
        .unwrap_err();
    assert!(matches!(err, Error::FatalIo { .. }));
    assert!(archive.polls.borrow().is_empty());
}

#[test]
fn destination_is_created() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("nested").join("out");
    let archive = ScriptedArchive::new().statuses("R1", vec![ready("/x", &["a.fits"])]);
    let downloader = RecordingDownloader::default();

    retrieval(&archive, &downloader, &dest)
        .run(&["R1".to_string()])
        .unwrap();
    assert!(dest.is_dir());
    assert_eq!(downloader.jobs.lock().unwrap()[0].local_path, dest.join("a.fits"));
}

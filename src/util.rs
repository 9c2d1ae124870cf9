use std::path::{Path, PathBuf};
use std::time::Duration;

pub(crate) fn retriable_status(code: u16) -> bool {
    matches!(code, 500 | 502 | 503 | 504 | 429 | 408)
}

pub(crate) fn backoff(current: Duration, max: Duration) -> Duration {
    let next = Duration::from_secs_f64((current.as_secs_f64() * 1.5).max(1.0));
    if next > max { max } else { next }
}

pub(crate) fn guess_filename_from_url(url: &str) -> Option<String> {
    let path = url.split('?').next().unwrap_or(url);
    path.rsplit('/').next().and_then(|s| {
        if s.is_empty() {
            None
        } else {
            Some(s.to_string())
        }
    })
}

pub(crate) fn urljoin(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

/// `name.ext` → `name.<n>.ext` in the same directory.
pub(crate) fn numbered_filename(path: &Path, n: usize) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}.{}.{}", stem, n, ext.to_string_lossy()),
        None => format!("{}.{}", stem, n),
    };
    path.with_file_name(name)
}

/// Picks `name.1.ext`, `name.2.ext`, ... next to `path` until one does not exist.
pub(crate) fn replacement_filename(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }
    let mut n = 1usize;
    loop {
        let candidate = numbered_filename(path, n);
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Creates `dir` and its parents; an existing directory is not an error.
pub(crate) fn ensure_dir(dir: &Path) -> crate::Result<()> {
    match std::fs::create_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && dir.is_dir() => Ok(()),
        Err(source) => Err(crate::Error::FatalIo {
            path: dir.to_path_buf(),
            source,
        }),
    }
}

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::client::ClientConfig;

pub(crate) const DEFAULT_URL: &str = "http://jsoc.stanford.edu";

#[derive(Debug, Default)]
struct RcConfig {
    url: Option<String>,
    notify: Option<String>,
    download_dir: Option<String>,
    verify: Option<bool>,
}

pub(crate) fn load_config(
    url: Option<String>,
    notify: Option<String>,
    download_dir: Option<PathBuf>,
) -> Result<ClientConfig> {
    let mut url = url.or_else(|| std::env::var("JSOC_URL").ok());
    let mut notify = notify.or_else(|| std::env::var("JSOC_NOTIFY").ok());
    let mut download_dir =
        download_dir.or_else(|| std::env::var("JSOC_DOWNLOAD_DIR").ok().map(PathBuf::from));
    let mut verify: Option<bool> = None;

    for rc_path in &rc_candidates() {
        if rc_path.exists() {
            let cfg = read_rc(rc_path).with_context(|| {
                format!("failed to read configuration file {}", rc_path.display())
            })?;

            if url.is_none() {
                url = cfg.url;
            }
            if notify.is_none() {
                notify = cfg.notify;
            }
            if download_dir.is_none() {
                download_dir = cfg.download_dir.map(PathBuf::from);
            }
            verify = cfg.verify;
            break;
        }
    }

    let download_dir = match download_dir {
        Some(dir) => expand_home(&dir),
        None => default_download_dir()
            .context("Missing configuration: download_dir (no home directory; set JSOC_DOWNLOAD_DIR)")?,
    };

    Ok(ClientConfig {
        url: url.unwrap_or_else(|| DEFAULT_URL.to_string()),
        notify: notify.filter(|n| !n.trim().is_empty()),
        download_dir,
        verify: verify.unwrap_or(true),
    })
}

fn read_rc(path: &Path) -> Result<RcConfig> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse_rc(&text))
}

fn parse_rc(text: &str) -> RcConfig {
    let mut cfg = RcConfig::default();

    // Support formatting where `notify:` is on one line and the value is on the next line.
    let mut pending_key: Option<&str> = None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(pk) = pending_key.take() {
            if !line.contains(':') || line.contains("://") {
                assign(&mut cfg, pk, strip_quotes(line));
                continue;
            }
        }

        if let Some((k, v)) = line.split_once(':') {
            let k = k.trim();
            let v = strip_quotes(v.trim());
            if v.is_empty() {
                pending_key = Some(match k {
                    "url" => "url",
                    "notify" => "notify",
                    "download_dir" => "download_dir",
                    _ => continue,
                });
            } else {
                assign(&mut cfg, k, v);
            }
        }
    }

    cfg
}

fn assign(cfg: &mut RcConfig, key: &str, value: &str) {
    match key {
        "url" => cfg.url = Some(value.to_string()),
        "notify" => cfg.notify = Some(value.to_string()),
        "download_dir" => cfg.download_dir = Some(value.to_string()),
        "verify" => cfg.verify = Some(value != "0"),
        _ => {}
    }
}

fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    if (s.starts_with('"') && s.ends_with('"') && s.len() >= 2)
        || (s.starts_with('\'') && s.ends_with('\'') && s.len() >= 2)
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

pub(crate) fn default_download_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join("sunpy").join("data"))
}

fn rc_candidates() -> Vec<PathBuf> {
    // 1) JSOC_RC (explicit)
    // 2) ./.jsocrc
    // 3) ~/.jsocrc
    if let Ok(p) = std::env::var("JSOC_RC") {
        return vec![PathBuf::from(p)];
    }

    let mut v = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        v.push(cwd.join(".jsocrc"));
    }
    if let Some(home) = dirs::home_dir() {
        v.push(home.join(".jsocrc"));
    }
    v
}

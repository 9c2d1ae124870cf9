use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::thread;
use std::time::Duration;
use tracing::debug;

use crate::error::{ArchiveErrorResponse, Error, Result, format_archive_error};
use crate::util::{backoff, retriable_status};

/// Blocking HTTP plumbing shared by the archive, downloader and Helioviewer clients.
#[derive(Debug, Clone)]
pub(crate) struct Transport {
    pub(crate) http: HttpClient,
    pub(crate) timeout: Duration,
    pub(crate) retry_max: usize,
    pub(crate) sleep_max: Duration,
}

impl Transport {
    pub(crate) fn new(timeout: Duration, verify: bool) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("jsocapi-rs/{}", env!("CARGO_PKG_VERSION")))
                .unwrap_or(HeaderValue::from_static("jsocapi-rs")),
        );

        let mut builder = HttpClient::builder()
            .default_headers(default_headers);

        if !verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(Self {
            http: builder.build()?,
            timeout,
            retry_max: 3,
            sleep_max: Duration::from_secs(120),
        })
    }

    pub(crate) fn get_json<Q, T>(&self, url: &str, query: &Q) -> Result<T>
    where
        Q: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(url, "GET");
        let resp = self.robust_request(|| self.http.get(url).query(query))?;
        decode_json(resp, url)
    }

    /// Like [`Transport::get_json`], but sends the request exactly once.
    pub(crate) fn get_json_once<Q, T>(&self, url: &str, query: &Q) -> Result<T>
    where
        Q: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(url, "GET (single attempt)");
        let resp = self.http.get(url).query(query).timeout(self.timeout).send()?;
        decode_json(resp, url)
    }

    pub(crate) fn post_form_json<F, T>(&self, url: &str, form: &F) -> Result<T>
    where
        F: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(url, "POST");
        let resp = self.robust_request(|| self.http.post(url).form(form))?;
        decode_json(resp, url)
    }

    /// Sends the request built by `f`, retrying connection errors and retriable statuses.
    pub(crate) fn robust_request<F>(&self, mut f: F) -> Result<Response>
    where
        F: FnMut() -> RequestBuilder,
    {
        let mut tries = 0usize;
        let mut sleep = Duration::ZERO;
        loop {
            match f().timeout(self.timeout).send() {
                Ok(resp) => {
                    if retriable_status(resp.status().as_u16()) {
                        tries += 1;
                        if tries >= self.retry_max {
                            return Ok(resp);
                        }
                        sleep = backoff(sleep, self.sleep_max);
                        debug!(status = %resp.status(), ?sleep, "retrying");
                        thread::sleep(sleep);
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    tries += 1;
                    if tries >= self.retry_max {
                        return Err(Error::Request(err));
                    }
                    // timeouts / transient connection errors
                    sleep = backoff(sleep, self.sleep_max);
                    debug!(error = %err, ?sleep, "retrying");
                    thread::sleep(sleep);
                }
            }
        }
    }
}

fn decode_json<T: DeserializeOwned>(resp: Response, url: &str) -> Result<T> {
    let status = resp.status();
    let text = resp.text().unwrap_or_default();
    if !status.is_success() {
        if let Ok(err_json) = serde_json::from_str::<ArchiveErrorResponse>(&text) {
            return Err(format_archive_error(status, url, &err_json));
        }
        return Err(Error::Http {
            status: status.as_u16(),
            url: url.to_string(),
            message: text,
        });
    }
    Ok(serde_json::from_str::<T>(&text)?)
}

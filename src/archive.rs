//! Wire types for the JSOC `jsoc_info` / `jsoc_fetch` endpoints and the [`Archive`] seam the
//! retrieval engine talks through.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::Result;
use crate::http::Transport;
use crate::util::urljoin;

const INFO_PATH: &str = "/cgi-bin/ajax/jsoc_info";
const FETCH_PATH: &str = "/cgi-bin/ajax/jsoc_fetch";

/// The operations the retrieval engine needs from the archive.
pub trait Archive {
    /// `rs_list` record lookup; `rec_info` also asks for record names.
    fn record_info(&self, ds: &str, keys: &str, rec_info: bool) -> Result<InfoReply>;

    /// Submits one staging request.
    fn submit_export(&self, form: &ExportForm) -> Result<ExportReply>;

    /// Fetches the raw status of a staging request in a single attempt.
    fn export_status(&self, request_id: &str) -> Result<StatusReply>;

    /// Prefix for the relative directories reported by ready exports.
    fn download_base(&self) -> &str {
        ""
    }
}

/// Parameters of an `exp_request` call.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportForm {
    pub ds: String,
    pub notify: String,
    pub protocol: String,
}

impl ExportForm {
    pub(crate) fn pairs(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("op", "exp_request"),
            ("ds", self.ds.as_str()),
            ("notify", self.notify.as_str()),
            ("protocol", self.protocol.as_str()),
            ("format", "json"),
            ("method", "url"),
            ("requestor", "none"),
            ("process", "n=0|no_op"),
        ]
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportReply {
    #[serde(deserialize_with = "lenient_i64")]
    pub status: i64,
    #[serde(default)]
    pub requestid: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusReply {
    #[serde(deserialize_with = "lenient_i64")]
    pub status: i64,
    #[serde(default)]
    pub requestid: Option<String>,
    #[serde(default)]
    pub exptime: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64_opt")]
    pub wait: Option<f64>,
    #[serde(default)]
    pub dir: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64_opt")]
    pub size: Option<f64>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub data: Vec<ManifestRecord>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ManifestRecord {
    pub filename: String,
    #[serde(default)]
    pub record: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InfoReply {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub status: i64,
    #[serde(default)]
    pub count: Option<i64>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub keywords: Vec<KeywordColumn>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub recinfo: Vec<RecordInfo>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeywordColumn {
    pub name: String,
    #[serde(default)]
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordInfo {
    pub name: String,
}

// JSOC reports numbers as either JSON numbers or numeric strings depending on the endpoint.
fn lenient_i64<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<i64, D::Error> {
    match Value::deserialize(d)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| serde::de::Error::custom("status out of range")),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("non-numeric status {:?}", s))),
        other => Err(serde::de::Error::custom(format!(
            "unexpected status {}",
            other
        ))),
    }
}

fn lenient_f64_opt<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<f64>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn null_as_empty<'de, D, T>(d: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(d)?.unwrap_or_default())
}

/// [`Archive`] over HTTP against a JSOC server.
#[derive(Debug, Clone)]
pub struct JsocArchive {
    base: String,
    transport: Transport,
}

impl JsocArchive {
    pub(crate) fn new(base: &str, transport: Transport) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            transport,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        urljoin(&self.base, path)
    }
}

impl Archive for JsocArchive {
    fn record_info(&self, ds: &str, keys: &str, rec_info: bool) -> Result<InfoReply> {
        let mut query = vec![
            ("op", "rs_list"),
            ("ds", ds),
            ("key", keys),
            ("seg", "**NONE**"),
            ("link", "**NONE**"),
        ];
        if rec_info {
            query.push(("R", "1"));
        }
        self.transport.get_json(&self.endpoint(INFO_PATH), &query)
    }

    fn submit_export(&self, form: &ExportForm) -> Result<ExportReply> {
        self.transport
            .post_form_json(&self.endpoint(FETCH_PATH), &form.pairs())
    }

    fn export_status(&self, request_id: &str) -> Result<StatusReply> {
        let query = [
            ("op", "exp_status"),
            ("requestid", request_id),
            ("format", "json"),
        ];
        // Retry cadence for status queries belongs to the caller.
        self.transport.get_json_once(&self.endpoint(FETCH_PATH), &query)
    }

    fn download_base(&self) -> &str {
        &self.base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_accepts_string_codes() {
        let reply: StatusReply =
            serde_json::from_str(r#"{"status": "0", "requestid": "R1", "size": "12", "data": null}"#)
                .unwrap();
        assert_eq!(reply.status, 0);
        assert_eq!(reply.size, Some(12.0));
        assert!(reply.data.is_empty());
    }

    #[test]
    fn status_with_manifest() {
        let reply: StatusReply = serde_json::from_str(
            r#"{"status": 0, "requestid": "JSOC_1", "dir": "/SUM1/D1/S00000", "size": 3,
                "exptime": "2024-01-01 00:00:00", "wait": 0,
                "data": [{"record": "hmi.M_45s[1]", "filename": "a.fits"}]}"#,
        )
        .unwrap();
        assert_eq!(reply.data.len(), 1);
        assert_eq!(reply.data[0].filename, "a.fits");
        assert_eq!(reply.dir.as_deref(), Some("/SUM1/D1/S00000"));
    }

    #[test]
    fn non_numeric_status_is_rejected() {
        assert!(serde_json::from_str::<ExportReply>(r#"{"status": "ok"}"#).is_err());
    }

    #[test]
    fn export_form_carries_fixed_parameters() {
        let form = ExportForm {
            ds: "hmi.M_45s[$]".into(),
            notify: "n@x".into(),
            protocol: "FITS,**NONE**".into(),
        };
        let pairs = form.pairs();
        assert!(pairs.contains(&("op", "exp_request")));
        assert!(pairs.contains(&("method", "url")));
        assert!(pairs.contains(&("ds", "hmi.M_45s[$]")));
    }
}

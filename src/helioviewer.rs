//! Single-shot client for the Helioviewer.org API: data-source listing, closest-image lookup and
//! JPEG 2000 download.

use chrono::NaiveDateTime;
use reqwest::header::CONTENT_DISPOSITION;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::config::default_download_dir;
use crate::error::{Error, Result};
use crate::http::Transport;
use crate::time::parse_time;
use crate::util::{ensure_dir, guess_filename_from_url, replacement_filename};

pub const DEFAULT_API: &str = "https://api.helioviewer.org/";

/// (observatory, instrument, detector, measurement)
pub type SourceKey = (String, String, Option<String>, Option<String>);

#[derive(Debug, Clone)]
pub enum DataSource {
    Id(i64),
    Named {
        observatory: String,
        instrument: String,
        detector: Option<String>,
        measurement: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct ClosestImage {
    pub date: NaiveDateTime,
    /// Remaining fields of the reply as returned by the API.
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct HelioviewerClient {
    api: String,
    download_dir: Option<PathBuf>,
    transport: Transport,
    sources: HashMap<SourceKey, i64>,
}

impl HelioviewerClient {
    /// A client that has not contacted the API yet; named data sources are unavailable until
    /// [`HelioviewerClient::load_data_sources`] runs.
    pub fn new(api: &str) -> Result<Self> {
        Ok(Self {
            api: api.to_string(),
            download_dir: default_download_dir(),
            transport: Transport::new(Duration::from_secs(60), true)?,
            sources: HashMap::new(),
        })
    }

    /// Creates a client and indexes the available data sources.
    pub fn connect(api: &str) -> Result<Self> {
        let mut client = Self::new(api)?;
        client.load_data_sources()?;
        Ok(client)
    }

    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = Some(dir.into());
        self
    }

    pub fn get_data_sources(&self) -> Result<Value> {
        self.get_json(&[("action", "getDataSources".to_string())])
    }

    pub fn load_data_sources(&mut self) -> Result<()> {
        self.sources = index_sources(&self.get_data_sources()?);
        Ok(())
    }

    pub fn source_id(&self, source: &DataSource) -> Result<i64> {
        match source {
            DataSource::Id(id) => Ok(*id),
            DataSource::Named {
                observatory,
                instrument,
                detector,
                measurement,
            } => {
                let key = (
                    observatory.clone(),
                    instrument.clone(),
                    detector.clone(),
                    measurement.clone(),
                );
                self.sources.get(&key).copied().ok_or_else(|| {
                    Error::Validation(format!("unknown Helioviewer data source {:?}", key))
                })
            }
        }
    }

    /// Finds the image closest to `date` for the given source.
    pub fn get_closest_image(&self, date: NaiveDateTime, source: &DataSource) -> Result<ClosestImage> {
        let mut params = vec![
            ("action", "getClosestImage".to_string()),
            ("date", format_date(date)),
            ("sourceId", self.source_id(source)?.to_string()),
        ];
        if let DataSource::Named {
            observatory,
            instrument,
            detector,
            measurement,
        } = source
        {
            params.push(("observatory", observatory.clone()));
            params.push(("instrument", instrument.clone()));
            if let Some(d) = detector {
                params.push(("detector", d.clone()));
            }
            if let Some(m) = measurement {
                params.push(("measurement", m.clone()));
            }
        }

        let mut fields = match self.get_json(&params)? {
            Value::Object(map) => map,
            other => {
                return Err(Error::Validation(format!(
                    "unexpected getClosestImage reply {}",
                    other
                )));
            }
        };
        let date = fields
            .remove("date")
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or_else(|| Error::Validation("getClosestImage reply has no date".to_string()))?;
        Ok(ClosestImage {
            date: parse_time(&date)?,
            fields,
        })
    }

    /// Downloads the JPEG 2000 image closest to `date` into `directory` (or the default download
    /// directory). An existing file gets a numbered sibling unless `overwrite` is set.
    pub fn download_jp2(
        &self,
        date: NaiveDateTime,
        source: &DataSource,
        directory: Option<&Path>,
        overwrite: bool,
    ) -> Result<PathBuf> {
        let params = vec![
            ("action", "getJP2Image".to_string()),
            ("date", format_date(date)),
            ("sourceId", self.source_id(source)?.to_string()),
        ];

        let directory = directory
            .map(Path::to_path_buf)
            .or_else(|| self.download_dir.clone())
            .ok_or_else(|| Error::Validation("no download directory available".to_string()))?;
        ensure_dir(&directory)?;

        let mut resp = self
            .transport
            .robust_request(|| self.transport.http.get(&self.api).query(&params))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                url: resp.url().to_string(),
                message: resp.text().unwrap_or_default(),
            });
        }

        let name = resp
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(filename_from_disposition)
            .or_else(|| guess_filename_from_url(resp.url().as_str()))
            .unwrap_or_else(|| "helioviewer.jp2".to_string());

        let mut path = directory.join(name);
        if !overwrite {
            path = replacement_filename(&path);
        }
        debug!(path = %path.display(), "writing JPEG 2000 image");
        let mut out = File::create(&path)?;
        resp.copy_to(&mut out)?;
        Ok(path)
    }

    /// Whether the API answers a data-source listing.
    pub fn is_online(&self) -> bool {
        self.get_data_sources().is_ok()
    }

    fn get_json(&self, params: &[(&str, String)]) -> Result<Value> {
        self.transport.get_json(&self.api, params)
    }
}

fn format_date(date: NaiveDateTime) -> String {
    date.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

fn filename_from_disposition(header: &str) -> Option<String> {
    header.split(';').find_map(|part| {
        let (k, v) = part.trim().split_once('=')?;
        if k.trim().eq_ignore_ascii_case("filename") {
            let v = v.trim().trim_matches('"');
            Path::new(v)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
        } else {
            None
        }
    })
}

fn source_id_of(v: &Value) -> Option<i64> {
    match v.get("sourceId")? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn index_sources(sources: &Value) -> HashMap<SourceKey, i64> {
    let mut out = HashMap::new();
    let Some(observatories) = sources.as_object() else {
        return out;
    };

    for (name, observ) in observatories {
        let Some(instruments) = observ.as_object() else {
            continue;
        };
        for (inst, detect) in instruments {
            if name == "TRACE" {
                if let Some(id) = source_id_of(detect) {
                    out.insert((name.clone(), inst.clone(), None, None), id);
                }
                continue;
            }
            let Some(detectors) = detect.as_object() else {
                continue;
            };
            for (wavelength, params) in detectors {
                let nested = matches!(name.as_str(), "Hinode" | "STEREO_A" | "STEREO_B")
                    || matches!(wavelength.as_str(), "C2" | "C3");
                if nested {
                    let Some(waves) = params.as_object() else {
                        continue;
                    };
                    for (wave, adict) in waves {
                        if let Some(id) = source_id_of(adict) {
                            out.insert(
                                (
                                    name.clone(),
                                    inst.clone(),
                                    Some(wavelength.clone()),
                                    Some(wave.clone()),
                                ),
                                id,
                            );
                        }
                    }
                } else if let Some(id) = source_id_of(params) {
                    out.insert(
                        (name.clone(), inst.clone(), None, Some(wavelength.clone())),
                        id,
                    );
                }
            }
        }
    }
    out
}

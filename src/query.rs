//! Query attributes and their expansion into independent export blocks.
//!
//! A [`Query`] is an OR of AND-groups of [`Attr`] values. Each AND-group becomes one
//! [`QueryBlock`], which is the unit the archive stages as a single export request.
//!
//! ```
//! use jsocapi::{Attr, Query};
//!
//! let query = Attr::time("2012/01/01 00:00:00", "2012/01/01 00:00:45").unwrap()
//!     & (Attr::series("aia.lev1_euv_12s") | Attr::series("hmi.M_45s"));
//! let blocks = query.blocks(&[Attr::Notify("someone@example.org".into())]).unwrap();
//! assert_eq!(blocks.len(), 2);
//! ```

use chrono::NaiveDateTime;
use std::ops::{BitAnd, BitOr};

use crate::error::{Error, Result};
use crate::time::{format_tai, parse_time};

pub const DEFAULT_KEYS: &[&str] = &["DATE", "TELESCOP", "INSTRUME", "T_OBS", "WAVELNTH"];

#[derive(Debug, Clone, PartialEq)]
pub enum Attr {
    /// Inclusive UTC time range.
    Time {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
    Series(String),
    /// Wavelengths in Ångström.
    Wavelength(Vec<f64>),
    Segment(String),
    /// Sampling cadence in seconds.
    Sample(u64),
    Keys(Vec<String>),
    /// Registered e-mail address the archive notifies about the export.
    Notify(String),
    Protocol(String),
    Compression(String),
}

impl Attr {
    pub fn time(start: &str, end: &str) -> Result<Self> {
        Ok(Attr::Time {
            start: parse_time(start)?,
            end: parse_time(end)?,
        })
    }

    pub fn series(series: impl Into<String>) -> Self {
        Attr::Series(series.into())
    }

    pub fn wavelength(angstrom: f64) -> Self {
        Attr::Wavelength(vec![angstrom])
    }

    pub fn keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Attr::Keys(keys.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    terms: Vec<Vec<Attr>>,
}

impl Query {
    /// A single AND-group.
    pub fn all<I: IntoIterator<Item = Attr>>(attrs: I) -> Self {
        Query {
            terms: vec![attrs.into_iter().collect()],
        }
    }

    pub fn terms(&self) -> &[Vec<Attr>] {
        &self.terms
    }

    pub fn blocks(&self, shared: &[Attr]) -> Result<Vec<QueryBlock>> {
        build_blocks(self, shared)
    }
}

impl From<Attr> for Query {
    fn from(attr: Attr) -> Self {
        Query::all([attr])
    }
}

impl<T: Into<Query>> BitAnd<T> for Query {
    type Output = Query;

    /// Distributes over the OR-groups of both sides. An empty query is the identity.
    fn bitand(self, rhs: T) -> Query {
        let rhs = rhs.into();
        if self.terms.is_empty() {
            return rhs;
        }
        if rhs.terms.is_empty() {
            return self;
        }
        let mut terms = Vec::with_capacity(self.terms.len() * rhs.terms.len());
        for left in &self.terms {
            for right in &rhs.terms {
                terms.push(left.iter().chain(right).cloned().collect());
            }
        }
        Query { terms }
    }
}

impl<T: Into<Query>> BitOr<T> for Query {
    type Output = Query;

    fn bitor(mut self, rhs: T) -> Query {
        self.terms.extend(rhs.into().terms);
        self
    }
}

impl<T: Into<Query>> BitAnd<T> for Attr {
    type Output = Query;

    fn bitand(self, rhs: T) -> Query {
        Query::from(self) & rhs
    }
}

impl<T: Into<Query>> BitOr<T> for Attr {
    type Output = Query;

    fn bitor(self, rhs: T) -> Query {
        Query::from(self) | rhs
    }
}

/// One fully specified, independently submittable selection.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryBlock {
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub series: String,
    pub wavelength: Vec<f64>,
    pub segment: Option<String>,
    pub sample: Option<u64>,
    pub keys: Option<Vec<String>>,
    pub notify: Option<String>,
    pub protocol: Option<String>,
    pub compression: Option<String>,
}

#[derive(Default)]
struct Draft {
    time: Option<(NaiveDateTime, NaiveDateTime)>,
    series: Option<String>,
    wavelength: Vec<f64>,
    segment: Option<String>,
    sample: Option<u64>,
    keys: Option<Vec<String>>,
    notify: Option<String>,
    protocol: Option<String>,
    compression: Option<String>,
}

impl Draft {
    fn apply(&mut self, attr: &Attr) {
        match attr {
            Attr::Time { start, end } => self.time = Some((*start, *end)),
            Attr::Series(s) => self.series = Some(s.clone()),
            Attr::Wavelength(w) => self.wavelength = w.clone(),
            Attr::Segment(s) => self.segment = Some(s.clone()),
            Attr::Sample(s) => self.sample = Some(*s),
            Attr::Keys(k) => self.keys = Some(k.clone()),
            Attr::Notify(n) => self.notify = Some(n.clone()),
            Attr::Protocol(p) => self.protocol = Some(p.clone()),
            Attr::Compression(c) => self.compression = Some(c.clone()),
        }
    }

    fn finish(self, index: usize) -> Result<QueryBlock> {
        let (start_time, end_time) = self.time.ok_or_else(|| {
            Error::Validation(format!(
                "block {}: both time and series must be specified (missing time)",
                index
            ))
        })?;
        let series = self.series.filter(|s| !s.trim().is_empty()).ok_or_else(|| {
            Error::Validation(format!(
                "block {}: both time and series must be specified (missing series)",
                index
            ))
        })?;
        if end_time < start_time {
            return Err(Error::Validation(format!(
                "block {}: end time {} is before start time {}",
                index, end_time, start_time
            )));
        }

        let block = QueryBlock {
            start_time,
            end_time,
            series,
            wavelength: self.wavelength,
            segment: self.segment,
            sample: self.sample,
            keys: self.keys,
            notify: self.notify,
            protocol: self.protocol,
            compression: self.compression,
        };
        block.check_wavelength()?;
        Ok(block)
    }
}

/// Expands `query` into one block per AND-group; `shared` attributes apply to every block unless
/// the group sets the same attribute itself.
pub fn build_blocks(query: &Query, shared: &[Attr]) -> Result<Vec<QueryBlock>> {
    if query.terms.is_empty() {
        return Err(Error::Validation("empty query".to_string()));
    }
    query
        .terms
        .iter()
        .enumerate()
        .map(|(index, term)| {
            let mut draft = Draft::default();
            shared.iter().chain(term).for_each(|attr| draft.apply(attr));
            draft.finish(index)
        })
        .collect()
}

impl QueryBlock {
    fn check_wavelength(&self) -> Result<()> {
        if !self.wavelength.is_empty() && !self.series.starts_with("aia") {
            return Err(Error::Validation(format!(
                "series {} does not support the wavelength attribute",
                self.series
            )));
        }
        Ok(())
    }

    /// The record-set selector, e.g. `aia.lev1_euv_12s[2012.01.01_00:00:34_TAI-2012.01.01_00:01:19_TAI@12s][304]{image}`.
    pub fn recordset(&self) -> Result<String> {
        self.check_wavelength()?;

        let sample = self.sample.map(|s| format!("@{}s", s)).unwrap_or_default();
        let wavelength = if self.wavelength.is_empty() {
            String::new()
        } else {
            let waves: Vec<String> = self
                .wavelength
                .iter()
                .map(|w| format!("{}", w.round() as i64))
                .collect();
            format!("[{}]", waves.join(","))
        };
        let segment = self
            .segment
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| format!("{{{}}}", s))
            .unwrap_or_default();

        Ok(format!(
            "{}[{}-{}{}]{}{}",
            self.series,
            format_tai(self.start_time)?,
            format_tai(self.end_time)?,
            sample,
            wavelength,
            segment
        ))
    }

    /// Comma-separated keyword list for a record lookup.
    pub fn keys_param(&self) -> String {
        match &self.keys {
            Some(keys) if !keys.is_empty() => keys.join(","),
            _ => DEFAULT_KEYS.join(","),
        }
    }

    /// Export protocol string, e.g. `FITS,compress Rice`.
    pub fn export_protocol(&self) -> String {
        let protocol = self.protocol.as_deref().unwrap_or("FITS");
        match self.compression.as_deref() {
            Some(c) if c.eq_ignore_ascii_case("rice") => format!("{},compress Rice", protocol),
            _ => format!("{},**NONE**", protocol),
        }
    }
}

use serde_json::Value;
use std::collections::BTreeMap;

use crate::archive::{Archive, InfoReply};
use crate::error::{Error, Result};
use crate::query::QueryBlock;

/// Per-record keyword metadata keyed by record name.
pub type MetaDict = BTreeMap<String, BTreeMap<String, Value>>;

/// Keyword values of matching records, one column per keyword.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RecordTable {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|r| r[idx].as_str()).collect())
    }

    /// Stacks `other` below `self`; columns missing on either side are left empty.
    pub fn append(&mut self, other: RecordTable) {
        if self.columns.is_empty() && self.rows.is_empty() {
            *self = other;
            return;
        }
        for col in &other.columns {
            if !self.columns.contains(col) {
                self.columns.push(col.clone());
                for row in &mut self.rows {
                    row.push(String::new());
                }
            }
        }
        for row in other.rows {
            let mut out = vec![String::new(); self.columns.len()];
            for (col, value) in other.columns.iter().zip(row) {
                if let Some(idx) = self.columns.iter().position(|c| c == col) {
                    out[idx] = value;
                }
            }
            self.rows.push(out);
        }
    }

    fn from_reply(reply: InfoReply) -> Self {
        // Rows are bounded by the data actually sent, whatever `count` claims.
        let longest = reply.keywords.iter().map(|k| k.values.len()).max().unwrap_or(0);
        let count = reply
            .count
            .map_or(longest, |c| usize::try_from(c).unwrap_or(0).min(longest));
        if count == 0 {
            return RecordTable::default();
        }

        let columns = reply.keywords.iter().map(|k| k.name.clone()).collect();
        let rows = (0..count)
            .map(|i| {
                reply
                    .keywords
                    .iter()
                    .map(|k| k.values.get(i).map(cell_text).unwrap_or_default())
                    .collect()
            })
            .collect();
        RecordTable { columns, rows }
    }
}

fn cell_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn checked_info<A: Archive + ?Sized>(
    archive: &A,
    ds: String,
    keys: &str,
    rec_info: bool,
) -> Result<InfoReply> {
    let reply = archive.record_info(&ds, keys, rec_info)?;
    if reply.status != 0 {
        return Err(Error::Lookup {
            ds,
            status: reply.status,
            message: reply.error.unwrap_or_default(),
        });
    }
    Ok(reply)
}

/// Lists the records a block matches, without staging anything.
pub fn lookup<A: Archive + ?Sized>(archive: &A, block: &QueryBlock) -> Result<RecordTable> {
    let reply = checked_info(archive, block.recordset()?, &block.keys_param(), false)?;
    Ok(RecordTable::from_reply(reply))
}

/// Fetches every keyword of every matching record.
pub fn lookup_metadata<A: Archive + ?Sized>(archive: &A, block: &QueryBlock) -> Result<MetaDict> {
    let reply = checked_info(archive, block.recordset()?, "**ALL**", true)?;

    let mut out = MetaDict::new();
    for (i, rec) in reply.recinfo.iter().enumerate() {
        let fields = reply
            .keywords
            .iter()
            .filter_map(|k| k.values.get(i).map(|v| (k.name.clone(), v.clone())))
            .collect();
        out.insert(rec.name.clone(), fields);
    }
    Ok(out)
}

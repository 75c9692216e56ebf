// Copyright 2023 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Implements snapshot files, which stand in for a provider.
//!
//! A snapshot is a TOML file holding the zones of a
//! [`MemoryDirectory`]:
//!
//! ```toml
//! [[zones]]
//! domain = "example.com"
//!
//! [[zones.records]]
//! name = "example.com"
//! ttl = 3600
//! type = "MX"
//! priority = 10
//! data = "mail.example.com"
//! ```

use std::fs;
use std::io;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

use zonesync::reconcile::MemoryDirectory;
use zonesync::rr::{Rdata, Record, Type};

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct Snapshot {
    #[serde(default)]
    zones: Vec<ZoneSnapshot>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct ZoneSnapshot {
    domain: String,
    #[serde(default)]
    records: Vec<RecordSnapshot>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct RecordSnapshot {
    name: String,
    ttl: u32,
    #[serde(rename = "type")]
    rr_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    priority: Option<u16>,
    data: String,
}

/// Loads the directory stored at `path`. A missing file is an empty
/// directory.
pub fn load(path: &Path) -> Result<MemoryDirectory> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("No snapshot at {}; starting empty.", path.display());
            return Ok(MemoryDirectory::new());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read {}", path.display()));
        }
    };
    let snapshot: Snapshot =
        toml::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))?;

    let mut directory = MemoryDirectory::new();
    for zone in snapshot.zones {
        let records = zone
            .records
            .into_iter()
            .map(into_record)
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("invalid record in zone {}", zone.domain))?;
        directory.insert_zone(&zone.domain, records);
    }
    Ok(directory)
}

/// Stores `directory` at `path`.
pub fn save(path: &Path, directory: &MemoryDirectory) -> Result<()> {
    let snapshot = Snapshot {
        zones: directory
            .zones()
            .map(|(domain, records)| ZoneSnapshot {
                domain: domain.to_owned(),
                records: records.into_iter().map(from_record).collect(),
            })
            .collect(),
    };
    let text = toml::to_string(&snapshot).context("failed to serialize the snapshot")?;
    fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))
}

fn into_record(snapshot: RecordSnapshot) -> Result<Record> {
    let rr_type: Type = snapshot
        .rr_type
        .parse()
        .map_err(|e| anyhow!("{}: {}", e, snapshot.rr_type))?;
    let data = match snapshot.priority {
        Some(priority) => Rdata::Mx {
            priority,
            exchange: snapshot.data,
        },
        None => Rdata::Text(snapshot.data),
    };
    Record::new(snapshot.name, snapshot.ttl, rr_type, data).map_err(Into::into)
}

fn from_record(record: &Record) -> RecordSnapshot {
    let (priority, data) = match record.data() {
        Rdata::Mx { priority, exchange } => (Some(*priority), exchange.clone()),
        Rdata::Text(text) => (None, text.clone()),
    };
    RecordSnapshot {
        name: record.name().to_owned(),
        ttl: record.ttl(),
        rr_type: record.rr_type().to_string(),
        priority,
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshots_load_records() {
        let snapshot: Snapshot = toml::from_str(
            r#"
            [[zones]]
            domain = "example.com"

            [[zones.records]]
            name = "example.com"
            ttl = 3600
            type = "mx"
            priority = 10
            data = "mail.example.com"

            [[zones.records]]
            name = "www.example.com"
            ttl = 300
            type = "A"
            data = "192.0.2.1"
            "#,
        )
        .unwrap();
        let zone = snapshot.zones.into_iter().next().unwrap();
        assert_eq!(zone.domain, "example.com");
        let records: Vec<Record> = zone
            .records
            .into_iter()
            .map(|record| into_record(record).unwrap())
            .collect();
        assert_eq!(records[0].rr_type(), Type::MX);
        assert_eq!(records[0].to_string(), "example.com 3600 MX 10 mail.example.com");
        assert_eq!(records[1].to_string(), "www.example.com 300 A 192.0.2.1");
    }

    #[test]
    fn records_without_priority_cannot_be_mx() {
        let snapshot = RecordSnapshot {
            name: "example.com".into(),
            ttl: 300,
            rr_type: "MX".into(),
            priority: None,
            data: "mail.example.com".into(),
        };
        assert!(into_record(snapshot).is_err());
    }
}

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

//! Implements zone loading.

use std::fs;

use anyhow::{Context, Result};
use log::debug;

use zonesync::name::Name;
use zonesync::rr::RecordSet;
use zonesync::zone_file;

use crate::config::ZoneConfig;

/// A zone loaded from its zone file.
pub struct LoadedZone {
    pub name: Name,
    pub records: RecordSet,
}

/// Loads the zones configured in `zones`. Unlike a long-running
/// server, there is nothing useful to do with a partial set of zones,
/// so the first failure is returned.
pub fn load(zones: &[ZoneConfig]) -> Result<Vec<LoadedZone>> {
    zones.iter().map(load_zone).collect()
}

fn load_zone(zone_config: &ZoneConfig) -> Result<LoadedZone> {
    let name = &zone_config.name.0;
    debug!("Loading {} from {}.", name, zone_config.path.display());
    let text = fs::read_to_string(&zone_config.path)
        .with_context(|| format!("failed to read {}", zone_config.path.display()))?;
    let records = zone_file::parse(&text, Some(name))
        .with_context(|| format!("failed to parse {}", zone_config.path.display()))?;
    debug!("Loaded {} record(s) for {}.", records.len(), name);
    Ok(LoadedZone {
        name: name.clone(),
        records,
    })
}

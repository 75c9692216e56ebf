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

//! Implements the `sync` command (reconciling a snapshot with the zone
//! files).

use std::io::{self, Write};

use anyhow::{Context, Result};
use log::{error, info};

use zonesync::reconcile;

use crate::args::SyncArgs;
use crate::config;
use crate::snapshot;
use crate::zones;

/// Runs the `sync` command.
pub fn sync(args: SyncArgs) -> Result<()> {
    let config = config::load(&args.source).context("failed to load the configuration")?;
    let loaded = zones::load(&config.zones)?;
    let mut directory = snapshot::load(&args.snapshot)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for zone in &loaded {
        let name = zone.name.to_string();
        let domain = name.trim_end_matches('.');

        if args.dry_run {
            let plan = reconcile::plan(&mut directory, domain, &zone.records)
                .with_context(|| format!("failed to plan changes to {}", domain))?;
            if !plan.zone_exists {
                writeln!(out, "# {} would be created", domain)?;
            }
            plan.write_diff(&mut out)?;
            continue;
        }

        match reconcile::reconcile(&mut directory, domain, &zone.records, &mut out) {
            Ok(summary) => info!("{}: {}.", domain, summary),
            Err(e) => {
                // Whatever was applied before the failure is real, so
                // it must be saved.
                if let Err(save_error) = snapshot::save(&args.snapshot, &directory) {
                    error!("Failed to save the partially updated snapshot: {:#}", save_error);
                }
                return Err(e).with_context(|| format!("failed to reconcile {}", domain));
            }
        }
    }

    out.flush()?;
    if !args.dry_run {
        snapshot::save(&args.snapshot, &directory)?;
    }
    Ok(())
}

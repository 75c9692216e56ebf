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

//! Implements the `serve` command (serving the zones once over AXFR).

use anyhow::{anyhow, Context, Result};
use log::{info, warn};

use zonesync::coordinator::{self, CompletionPolicy};
use zonesync::name::Name;
use zonesync::rr::RecordSet;

use crate::args::ServeArgs;
use crate::config;
use crate::zones;

/// Runs the `serve` command.
pub fn serve(args: ServeArgs) -> Result<()> {
    let mut config = config::load(&args.source).context("failed to load the configuration")?;
    config.apply_serve_args(&args);
    let settings = config.transfer_settings();

    // Load the zones before binding: a bad zone file should fail
    // without ever accepting a connection.
    if config.zones.len() == 1 {
        info!("Beginning to load 1 zone.");
    } else {
        info!("Beginning to load {} zones.", config.zones.len());
    }
    let loaded = zones::load(&config.zones)?;
    if loaded.is_empty() {
        warn!("No zones are configured; there is nothing to transfer.");
    }
    let domains: Vec<Name> = loaded.iter().map(|zone| zone.name.clone()).collect();
    let records: RecordSet = loaded.into_iter().flat_map(|zone| zone.records).collect();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the Tokio runtime")?;
    let report = runtime.block_on(async {
        let handle = coordinator::start(&settings, &domains, &records)
            .await
            .context("failed to start the server")?;
        info!(
            "Set-up is complete; waiting for transfers on {}.",
            handle.local_addr()
        );
        let report = match settings.timeout {
            Some(limit) => handle.wait_for(limit).await,
            None => handle.wait().await,
        };
        Ok::<_, anyhow::Error>(report)
    })?;

    let missing = report.missing();
    if missing.is_empty() {
        info!("Every zone has been transferred.");
        Ok(())
    } else if settings.completion == CompletionPolicy::DrainForever {
        warn!("{} zone(s) were never transferred.", missing.len());
        Ok(())
    } else {
        let names: Vec<String> = missing.iter().map(ToString::to_string).collect();
        Err(anyhow!("zones were not transferred: {}", names.join(", ")))
    }
}

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

//! Implements command-line argument parsing.

use std::ffi::OsStr;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::anyhow;
use clap::{ArgGroup, Args as ClapArgs, Parser, Subcommand};

use zonesync::coordinator::CompletionPolicy;
use zonesync::name::Name;

/// Parses the command line arguments.
pub fn parse() -> Args {
    Args::parse()
}

/// Keeps zones at a hosted DNS provider in step with local zone files
#[derive(Debug, Parser)]
#[command(author, version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the zones once over AXFR so that the provider can pull them
    Serve(ServeArgs),

    /// Reconcile a snapshot of the provider's zones with the zone files
    Sync(SyncArgs),
}

/// Where the zones to work on come from.
#[derive(Debug, ClapArgs)]
#[command(group(ArgGroup::new("source").required(true).args(["config", "zones"])))]
pub struct ZoneSource {
    /// Set the configuration file to use
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Add zones to work on
    #[arg(
        long = "zone",
        value_delimiter = ',',
        value_name = "FILE|NAME:FILE",
        conflicts_with = "config"
    )]
    pub zones: Vec<ZoneDescription>,
}

#[derive(Debug, ClapArgs)]
pub struct ServeArgs {
    #[command(flatten)]
    pub source: ZoneSource,

    /// Set the server bind IP address and port
    #[arg(long, value_name = "IP:PORT", conflicts_with = "config")]
    pub bind: Option<SocketAddr>,

    /// Set when to stop serving (all-domains-seen or drain-forever)
    #[arg(long, value_name = "POLICY", conflicts_with = "config")]
    pub completion: Option<CompletionPolicy>,

    /// Stop waiting for transfers after this many seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,
}

#[derive(Debug, ClapArgs)]
pub struct SyncArgs {
    #[command(flatten)]
    pub source: ZoneSource,

    /// Set the snapshot file standing in for the provider
    #[arg(long, value_name = "FILE")]
    pub snapshot: PathBuf,

    /// Print the changes without applying them
    #[arg(long)]
    pub dry_run: bool,
}

/// A description of a zone provided on the command line with the
/// `--zone` option. This is parsed with its [`FromStr`] implementation
/// and accepts two forms, one of which gives the domain explicitly,
/// and the other of which infers the domain by stripping the `.zone`
/// suffix from the basename of the path to the zone file:
///
/// * `example.com.:path/to/the-zone-file.zone`
/// * `path/to/example.com.zone`
#[derive(Clone, Debug)]
pub struct ZoneDescription {
    pub name: Name,
    pub path: PathBuf,
}

impl FromStr for ZoneDescription {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some((name, path)) = s.split_once(':') {
            Ok(Self {
                name: parse_domain(name)?,
                path: PathBuf::from(path),
            })
        } else if s.ends_with(".zone") {
            let stem = Path::new(s)
                .file_stem()
                .and_then(OsStr::to_str)
                .ok_or_else(|| anyhow!("failed to compute the domain from the zone file path"))?;
            Ok(Self {
                name: parse_domain(stem)?,
                path: PathBuf::from(s),
            })
        } else {
            Err(anyhow!(
                "if no domain is provided, the file name must have the form <DOMAIN>.zone",
            ))
        }
    }
}

/// Parses a domain, which may be written with or without the trailing
/// dot.
fn parse_domain(text: &str) -> anyhow::Result<Name> {
    let qualified = format!("{}.", text.trim_end_matches('.'));
    qualified
        .parse()
        .map_err(|e| anyhow!("invalid domain {:?}: {}", text, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_description_from_str_computes_domain_from_path() {
        let path = PathBuf::from_iter(["path_to", "a", "..", "zones", ".", "example.com.zone"]);
        let description: ZoneDescription = path.to_str().unwrap().parse().unwrap();
        assert_eq!(description.name, "example.com.".parse().unwrap());
        assert_eq!(description.path, path);
    }

    #[test]
    fn zone_description_from_str_accepts_explicit_domains() {
        let description: ZoneDescription = "example.org:db.example".parse().unwrap();
        assert_eq!(description.name, "example.org.".parse().unwrap());
        assert_eq!(description.path, PathBuf::from("db.example"));
        assert!("db.example".parse::<ZoneDescription>().is_err());
    }

    #[test]
    fn args_parse_subcommands() {
        let args = Args::try_parse_from([
            "zonesync",
            "serve",
            "--zone",
            "example.com.zone,example.org:org.db",
            "--timeout",
            "30",
        ])
        .unwrap();
        match args.command {
            Command::Serve(serve) => {
                assert_eq!(serve.source.zones.len(), 2);
                assert_eq!(serve.timeout, Some(30));
            }
            other => panic!("unexpected command: {:?}", other),
        }

        let args = Args::try_parse_from([
            "zonesync",
            "sync",
            "--config",
            "zonesync.toml",
            "--snapshot",
            "he.toml",
            "--dry-run",
        ])
        .unwrap();
        assert!(matches!(args.command, Command::Sync(SyncArgs { dry_run: true, .. })));
        assert!(Args::try_parse_from(["zonesync", "sync", "--snapshot", "he.toml"]).is_err());
    }
}

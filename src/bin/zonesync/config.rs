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

//! Implements the configuration file.

use std::fmt::{self, Write};
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use log::Level::Debug;
use log::{debug, log_enabled};
use paste::paste;
use serde::{de, Deserialize};

use zonesync::coordinator::{CompletionPolicy, TransferSettings};
use zonesync::name::Name;
use zonesync::server::{ServerSettings, DEFAULT_NAMESERVERS};

use crate::args::{ServeArgs, ZoneSource};

////////////////////////////////////////////////////////////////////////
// CONFIGURATION LOADING                                              //
////////////////////////////////////////////////////////////////////////

/// Loads the configuration named by `source`: either the file it gives,
/// or a default configuration for the zones listed on the command line.
pub fn load(source: &ZoneSource) -> Result<Config> {
    match source.config {
        Some(ref path) => load_from_path(path),
        None => {
            let config = Config {
                zones: source
                    .zones
                    .iter()
                    .map(|zd| ZoneConfig {
                        name: ConfigName(zd.name.clone()),
                        path: zd.path.clone(),
                    })
                    .collect(),
                ..Config::default()
            };
            log_config_summary(&config);
            Ok(config)
        }
    }
}

/// Loads the configuration from the file given by `path`.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let dir = match path.as_ref().parent() {
        Some(p) => p,
        None => return Err(anyhow!("the configuration file path has no parent")),
    };
    let raw_config = fs::read(path.as_ref()).context("failed to read the configuration file")?;
    let mut config: Config =
        toml::from_slice(&raw_config).context("failed to parse the configuration file")?;

    // Zone file paths are interpreted relative to the configuration
    // file's directory.
    for zone_config in &mut config.zones {
        if zone_config.path.is_relative() {
            zone_config.path = dir.join(&zone_config.path);
        }
    }

    log_config_summary(&config);
    Ok(config)
}

/// Summarizes the configuration in the log, if the debug log level is
/// enabled.
fn log_config_summary(config: &Config) {
    if !log_enabled!(Debug) {
        return;
    }

    let nameservers: Vec<String> = config.nameservers.iter().map(|ns| ns.0.to_string()).collect();
    let mut message = format!(
        "Configuration loaded:\n\
         Bind address: {}\n\
         Nameservers:  {}\n\
         Completion:   {}\n\
         Timeout:      {}\n\
         Zones:        ",
        config.bind,
        nameservers.join(", "),
        config.completion.0,
        config
            .timeout
            .map_or_else(|| String::from("none"), |t| format!("{} seconds", t)),
    );
    if config.zones.is_empty() {
        message.push_str("none");
    } else {
        write!(message, "{}", config.zones.len()).unwrap();
        for zone_config in &config.zones {
            write!(
                message,
                "\n  {} from {}",
                zone_config.name.0,
                zone_config.path.display()
            )
            .unwrap();
        }
    }
    debug!("{}", message);
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION FILE STRUCTURE                                       //
////////////////////////////////////////////////////////////////////////

/// The complete configuration file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    #[serde(default = "default_nameservers")]
    pub nameservers: Vec<ConfigName>,
    #[serde(default = "default_completion")]
    pub completion: ConfigCompletionPolicy,
    /// How long to wait for transfers, in seconds.
    pub timeout: Option<u64>,
    pub zones: Vec<ZoneConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            nameservers: default_nameservers(),
            completion: default_completion(),
            timeout: None,
            zones: Vec::new(),
        }
    }
}

impl Config {
    /// Applies the overrides given on the `serve` command line.
    pub fn apply_serve_args(&mut self, args: &ServeArgs) {
        if let Some(bind) = args.bind {
            self.bind = bind;
        }
        if let Some(completion) = args.completion {
            self.completion = ConfigCompletionPolicy(completion);
        }
        if args.timeout.is_some() {
            self.timeout = args.timeout;
        }
    }

    /// Returns the settings to start the transfer server with.
    pub fn transfer_settings(&self) -> TransferSettings {
        TransferSettings {
            bind: self.bind,
            server: ServerSettings {
                nameservers: self.nameservers.iter().map(|ns| ns.0.clone()).collect(),
                ..ServerSettings::default()
            },
            completion: self.completion.0,
            timeout: self.timeout.map(Duration::from_secs),
        }
    }
}

const DEFAULT_BIND_IP: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
const DEFAULT_BIND_PORT: u16 = 53;

fn default_bind() -> SocketAddr {
    SocketAddr::new(DEFAULT_BIND_IP, DEFAULT_BIND_PORT)
}

fn default_nameservers() -> Vec<ConfigName> {
    DEFAULT_NAMESERVERS.iter().cloned().map(ConfigName).collect()
}

fn default_completion() -> ConfigCompletionPolicy {
    ConfigCompletionPolicy(CompletionPolicy::default())
}

/// The configuration of a single zone.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ZoneConfig {
    pub name: ConfigName,
    pub path: PathBuf,
}

////////////////////////////////////////////////////////////////////////
// WRAPPERS OVER ZONESYNC TYPES FOR SERDE                             //
////////////////////////////////////////////////////////////////////////

/// Generates a deserializable `ConfigX` structure wrapping an `X` type
/// from [`zonesync`], using its [`FromStr`](std::str::FromStr)
/// implementation.
macro_rules! make_serde_wrapper {
    ($wrapper:ident, $over:ty, $description:literal) => {
        /// A macro-generated deserializable wrapper over a [`zonesync`]
        /// type.
        #[derive(Clone, Debug)]
        pub struct $wrapper(pub $over);

        impl<'de> Deserialize<'de> for $wrapper {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: de::Deserializer<'de>,
            {
                deserializer.deserialize_str(paste! { [<$wrapper Visitor>] })
            }
        }

        paste! {
            /// A macro-generated [`Visitor`](de::Visitor).
            #[derive(Debug)]
            struct [<$wrapper Visitor>];
        }

        impl<'de> de::Visitor<'de> for paste! { [<$wrapper Visitor>] } {
            type Value = $wrapper;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str($description)
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                value
                    .parse()
                    .map($wrapper)
                    .map_err(|e| E::custom(format!("invalid {}: {}", $description, e)))
            }
        }
    };
}

make_serde_wrapper!(ConfigName, Name, "domain name");
make_serde_wrapper!(ConfigCompletionPolicy, CompletionPolicy, "completion policy");

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_applies_defaults() {
        let config: Config = toml::from_str(
            r#"
            [[zones]]
            name = "example.com."
            path = "example.com.zone"
            "#,
        )
        .unwrap();
        let settings = config.transfer_settings();
        assert_eq!(settings.bind, default_bind());
        assert_eq!(settings.server.nameservers, *DEFAULT_NAMESERVERS);
        assert_eq!(settings.completion, CompletionPolicy::AllDomainsSeen);
        assert_eq!(settings.timeout, None);
        assert_eq!(config.zones[0].name.0, "example.com.".parse().unwrap());
    }

    #[test]
    fn config_reads_every_key() {
        let config: Config = toml::from_str(
            r#"
            bind = "127.0.0.1:5353"
            nameservers = ["ns1.example.net.", "ns2.example.net."]
            completion = "drain-forever"
            timeout = 600

            [[zones]]
            name = "example.com."
            path = "/srv/zones/example.com.zone"
            "#,
        )
        .unwrap();
        let settings = config.transfer_settings();
        assert_eq!(settings.bind, "127.0.0.1:5353".parse().unwrap());
        assert_eq!(settings.server.nameservers.len(), 2);
        assert_eq!(settings.completion, CompletionPolicy::DrainForever);
        assert_eq!(settings.timeout, Some(Duration::from_secs(600)));
    }

    #[test]
    fn config_rejects_bad_input() {
        let unknown = toml::from_str::<Config>("zones = []\nlisten = \"[::1]:53\"");
        assert!(unknown.is_err());
        let bad_name = toml::from_str::<Config>(
            "zones = [{ name = \"example.com\", path = \"example.com.zone\" }]",
        );
        assert!(bad_name.is_err());
        let bad_policy = toml::from_str::<Config>("completion = \"sometimes\"\nzones = []");
        assert!(bad_policy.is_err());
    }
}

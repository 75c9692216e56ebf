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

//! Settings for the records a [`Server`](super::Server) synthesizes.

use lazy_static::lazy_static;

use crate::name::Name;

lazy_static! {
    /// The secondary nameservers of Hurricane Electric's free DNS
    /// service, which pull slave zones over AXFR.
    pub static ref DEFAULT_NAMESERVERS: Vec<Name> = [
        "ns2.he.net.",
        "ns3.he.net.",
        "ns4.he.net.",
        "ns5.he.net.",
    ]
    .iter()
    .map(|ns| ns.parse().unwrap())
    .collect();
    static ref DEFAULT_HOSTMASTER: Name = "hostmaster.".parse().unwrap();
}

/// The contents of the SOA and NS records a [`Server`](super::Server)
/// places at the apex of every zone it transfers.
///
/// The SOA serial is not a setting: it is the Unix time at which the
/// server is constructed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerSettings {
    /// The upstream nameservers. One NS record is synthesized for each,
    /// and the first is the SOA MNAME.
    pub nameservers: Vec<Name>,

    /// The SOA RNAME.
    pub hostmaster: Name,

    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    pub minimum: u32,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            nameservers: DEFAULT_NAMESERVERS.clone(),
            hostmaster: DEFAULT_HOSTMASTER.clone(),
            refresh: 60,
            retry: 60,
            expire: 604800,
            minimum: 300,
        }
    }
}

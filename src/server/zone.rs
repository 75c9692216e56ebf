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

//! Assembly of the zones a [`Server`](super::Server) transfers.

use std::collections::HashMap;
use std::fmt;

use log::{debug, warn};

use super::ServerSettings;
use crate::name::{self, Name};
use crate::rr::rdata::{self, Component};
use crate::rr::{Record, RecordSet, Type};

/// The CLASS of every record this crate serves.
pub(super) const CLASS_IN: u16 = 1;

/// The TTL of the synthesized SOA and NS records.
const SYNTHESIZED_TTL: u32 = 0;

/// A record ready to be written to a message.
#[derive(Clone, Debug)]
pub(super) struct EncodedRecord {
    pub owner: Name,
    pub rr_type: u16,
    pub ttl: u32,
    pub rdata: Vec<Component>,
}

/// A zone as it is transferred: the answer section of its AXFR
/// response, from the opening SOA to the closing SOA.
#[derive(Debug)]
pub(super) struct Zone {
    pub domain: Name,
    pub answers: Vec<EncodedRecord>,
}

/// Builds a [`Zone`] for each of `domains` from `records`.
///
/// Each record goes to the longest domain containing its owner.
/// Records under none of the domains are logged and left out, as are
/// SOA records, since the SOA is synthesized.
pub(super) fn build_zones<'a, I>(
    settings: &ServerSettings,
    serial: u32,
    domains: I,
    records: &RecordSet,
) -> Result<HashMap<Name, Zone>, ZoneError>
where
    I: IntoIterator<Item = &'a Name>,
{
    let mut contents: HashMap<Name, Vec<EncodedRecord>> = HashMap::new();
    for domain in domains {
        if domain.is_root() {
            return Err(ZoneError::RootDomain);
        }
        contents.entry(domain.clone()).or_default();
    }
    let mname = settings
        .nameservers
        .first()
        .ok_or(ZoneError::NoNameservers)?;

    for record in records {
        if record.rr_type() == Type::SOA {
            debug!("skipping configured SOA record {record}");
            continue;
        }
        let owner: Name = record.name().parse().map_err(|error| ZoneError::InvalidOwner {
            owner: record.name().to_owned(),
            error,
        })?;
        let domain = contents
            .keys()
            .filter(|domain| owner.is_subdomain_of(domain))
            .max_by_key(|domain| domain.label_count())
            .cloned();
        let Some(domain) = domain else {
            warn!("ignoring record outside of every zone: {record}");
            continue;
        };
        let encoded = encode_record(owner, record)?;
        if let Some(zone_records) = contents.get_mut(&domain) {
            zone_records.push(encoded);
        }
    }

    let mut zones = HashMap::with_capacity(contents.len());
    for (domain, zone_records) in contents {
        let soa = synthesize_soa(settings, mname, serial, &domain);
        let mut answers = Vec::with_capacity(zone_records.len() + settings.nameservers.len() + 2);
        answers.push(soa.clone());
        answers.extend(settings.nameservers.iter().map(|ns| EncodedRecord {
            owner: domain.clone(),
            rr_type: ns_code(),
            ttl: SYNTHESIZED_TTL,
            rdata: vec![Component::CompressibleName(ns.clone())],
        }));
        answers.extend(zone_records);
        answers.push(soa);
        zones.insert(domain.clone(), Zone { domain, answers });
    }
    Ok(zones)
}

fn encode_record(owner: Name, record: &Record) -> Result<EncodedRecord, ZoneError> {
    let rdata_error = |error| ZoneError::Rdata {
        record: Box::new(record.clone()),
        error,
    };
    let rdata = rdata::encode(record.rr_type(), record.data()).map_err(rdata_error)?;
    let rr_type = record
        .rr_type()
        .code()
        .ok_or_else(|| rdata_error(rdata::Error::UnsupportedType(record.rr_type())))?;
    Ok(EncodedRecord {
        owner,
        rr_type,
        ttl: record.ttl(),
        rdata,
    })
}

fn synthesize_soa(
    settings: &ServerSettings,
    mname: &Name,
    serial: u32,
    domain: &Name,
) -> EncodedRecord {
    let mut timers = Vec::with_capacity(20);
    for value in [
        serial,
        settings.refresh,
        settings.retry,
        settings.expire,
        settings.minimum,
    ] {
        timers.extend_from_slice(&value.to_be_bytes());
    }
    EncodedRecord {
        owner: domain.clone(),
        rr_type: soa_code(),
        ttl: SYNTHESIZED_TTL,
        rdata: vec![
            Component::CompressibleName(mname.clone()),
            Component::CompressibleName(settings.hostmaster.clone()),
            Component::Octets(timers),
        ],
    }
}

fn soa_code() -> u16 {
    Type::SOA.code().unwrap_or(6)
}

fn ns_code() -> u16 {
    Type::NS.code().unwrap_or(2)
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that a [`Server`](super::Server) could not be
/// built from its zone data.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ZoneError {
    /// The root cannot be served.
    RootDomain,

    /// No upstream nameservers were configured, so there is no SOA
    /// MNAME.
    NoNameservers,

    /// A record owner is not a valid fully-qualified name.
    InvalidOwner { owner: String, error: name::Error },

    /// A record's data could not be encoded.
    Rdata {
        record: Box<Record>,
        error: rdata::Error,
    },

    /// The AXFR response for a zone would not fit in one message.
    TooLarge(Name),
}

impl fmt::Display for ZoneError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::RootDomain => f.write_str("the root zone cannot be served"),
            Self::NoNameservers => f.write_str("no upstream nameservers are configured"),
            Self::InvalidOwner { owner, error } => {
                write!(f, "invalid record owner {:?}: {}", owner, error)
            }
            Self::Rdata { record, error } => write!(f, "invalid record {}: {}", record, error),
            Self::TooLarge(domain) => {
                write!(f, "zone {} does not fit in a single AXFR message", domain)
            }
        }
    }
}

impl std::error::Error for ZoneError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidOwner { error, .. } => Some(error),
            Self::Rdata { error, .. } => Some(error),
            _ => None,
        }
    }
}

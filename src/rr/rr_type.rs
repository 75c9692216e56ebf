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

//! Provides the [`Type`] enumeration for DNS RR types.

use std::fmt;
use std::str::FromStr;

use crate::util::Caseless;

////////////////////////////////////////////////////////////////////////
// RR TYPES                                                           //
////////////////////////////////////////////////////////////////////////

/// The RR types that can be synchronized.
///
/// This is the closed set of types the hosted provider lets one manage.
/// All but [`Type::ALIAS`] are standard DNS types with a wire code;
/// ALIAS is a provider-side pseudo-type that is resolved by the provider
/// and never appears in a zone transfer.
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Type {
    A,
    AAAA,
    AFSDB,
    ALIAS,
    CAA,
    CNAME,
    HINFO,
    LOC,
    MX,
    NAPTR,
    NS,
    PTR,
    RP,
    SOA,
    SPF,
    SRV,
    SSHFP,
    TXT,
}

impl Type {
    /// Every supported type, in declaration order.
    pub const ALL: [Type; 18] = [
        Self::A,
        Self::AAAA,
        Self::AFSDB,
        Self::ALIAS,
        Self::CAA,
        Self::CNAME,
        Self::HINFO,
        Self::LOC,
        Self::MX,
        Self::NAPTR,
        Self::NS,
        Self::PTR,
        Self::RP,
        Self::SOA,
        Self::SPF,
        Self::SRV,
        Self::SSHFP,
        Self::TXT,
    ];

    /// Returns the on-the-wire TYPE value, or [`None`] for types that
    /// have no wire representation.
    pub fn code(self) -> Option<u16> {
        match self {
            Self::A => Some(1),
            Self::NS => Some(2),
            Self::CNAME => Some(5),
            Self::SOA => Some(6),
            Self::PTR => Some(12),
            Self::HINFO => Some(13),
            Self::MX => Some(15),
            Self::TXT => Some(16),
            Self::RP => Some(17),
            Self::AFSDB => Some(18),
            Self::AAAA => Some(28),
            Self::LOC => Some(29),
            Self::SRV => Some(33),
            Self::NAPTR => Some(35),
            Self::SSHFP => Some(44),
            Self::SPF => Some(99),
            Self::CAA => Some(257),
            Self::ALIAS => None,
        }
    }

    /// Returns the indices of the whitespace-separated RDATA fields
    /// that hold domain names. MX is not listed, since its exchange is
    /// kept apart from its priority (see [`Rdata`](super::Rdata)).
    pub fn name_fields(self) -> &'static [usize] {
        match self {
            Self::ALIAS | Self::CNAME | Self::NS | Self::PTR => &[0],
            Self::RP | Self::SOA => &[0, 1],
            Self::AFSDB => &[1],
            Self::SRV => &[3],
            Self::NAPTR => &[5],
            _ => &[],
        }
    }

    /// Returns the mnemonic of the type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::AAAA => "AAAA",
            Self::AFSDB => "AFSDB",
            Self::ALIAS => "ALIAS",
            Self::CAA => "CAA",
            Self::CNAME => "CNAME",
            Self::HINFO => "HINFO",
            Self::LOC => "LOC",
            Self::MX => "MX",
            Self::NAPTR => "NAPTR",
            Self::NS => "NS",
            Self::PTR => "PTR",
            Self::RP => "RP",
            Self::SOA => "SOA",
            Self::SPF => "SPF",
            Self::SRV => "SRV",
            Self::SSHFP => "SSHFP",
            Self::TXT => "TXT",
        }
    }
}

impl FromStr for Type {
    type Err = &'static str;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|rr_type| Caseless(rr_type.as_str()) == Caseless(text))
            .ok_or("unknown or unsupported type")
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

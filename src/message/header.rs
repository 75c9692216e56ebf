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

//! Layout of the DNS message header ([RFC 1035 § 4.1.1]) and the
//! [`Opcode`] and [`Rcode`] types.
//!
//! [RFC 1035 § 4.1.1]: https://datatracker.ietf.org/doc/html/rfc1035#section-4.1.1

use std::fmt;

pub const HEADER_SIZE: usize = 12;
pub const ID_START: usize = 0;
pub const FLAGS_HIGH: usize = 2;
pub const FLAGS_LOW: usize = 3;
pub const QR_MASK: u8 = 0x80;
pub const OPCODE_MASK: u8 = 0x78;
pub const OPCODE_SHIFT: usize = 3;
pub const AA_MASK: u8 = 0x04;
pub const TC_MASK: u8 = 0x02;
pub const RD_MASK: u8 = 0x01;
pub const RA_MASK: u8 = 0x80;
pub const RCODE_MASK: u8 = 0x0f;
pub const QDCOUNT_START: usize = 4;
pub const ANCOUNT_START: usize = 6;
pub const NSCOUNT_START: usize = 8;
pub const ARCOUNT_START: usize = 10;

/// The largest offset that a compression pointer can refer to.
pub const POINTER_MAX: usize = 0x3fff;

/// The largest DNS message that fits in a TCP frame.
pub const MAX_MESSAGE_SIZE: usize = u16::MAX as usize;

/// The four-bit opcode of a DNS message. Only the values this crate
/// uses have constants.
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub struct Opcode(u8);

impl Opcode {
    pub const QUERY: Self = Self(0);
    pub const NOTIFY: Self = Self(4);

    /// Extracts the opcode from the high octet of the header flags.
    pub(super) fn from_flags(flags_high: u8) -> Self {
        Self((flags_high & OPCODE_MASK) >> OPCODE_SHIFT)
    }

    /// Returns the bits of the opcode in position for the high octet of
    /// the header flags.
    pub(super) fn to_flags(self) -> u8 {
        self.0 << OPCODE_SHIFT
    }
}

impl fmt::Debug for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::QUERY => f.write_str("QUERY"),
            Self::NOTIFY => f.write_str("NOTIFY"),
            Self(value) => write!(f, "OPCODE{}", value),
        }
    }
}

/// The four-bit response code of a DNS message.
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub struct Rcode(u8);

impl Rcode {
    pub const NOERROR: Self = Self(0);
    pub const FORMERR: Self = Self(1);
    pub const SERVFAIL: Self = Self(2);
    pub const NOTAUTH: Self = Self(9);

    pub(super) fn from_flags(flags_low: u8) -> Self {
        Self(flags_low & RCODE_MASK)
    }

    pub(super) fn to_flags(self) -> u8 {
        self.0
    }
}

impl fmt::Debug for Rcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::NOERROR => f.write_str("NOERROR"),
            Self::FORMERR => f.write_str("FORMERR"),
            Self::SERVFAIL => f.write_str("SERVFAIL"),
            Self::NOTAUTH => f.write_str("NOTAUTH"),
            Self(value) => write!(f, "RCODE{}", value),
        }
    }
}

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

//! The processing logic of a minimal AXFR server.
//!
//! The [`Server`] structure is the heart of this module; see its
//! documentation for details.

use std::collections::HashMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use log::debug;

use crate::message::{reader, Opcode, Qclass, Qtype, Question, Rcode, Reader, Writer};
use crate::name::Name;
use crate::rr::RecordSet;

mod settings;
mod zone;

pub use settings::{ServerSettings, DEFAULT_NAMESERVERS};
pub use zone::ZoneError;
use zone::{Zone, CLASS_IN};

////////////////////////////////////////////////////////////////////////
// SERVER PUBLIC API AND CORE MESSAGE-HANDLING LOGIC                  //
////////////////////////////////////////////////////////////////////////

/// A server that answers AXFR requests for a fixed set of zones,
/// abstracted from any underlying network I/O provider.
///
/// The [`Server`] receives and parses DNS messages and produces
/// responses through the [`Server::handle_message`] method. A network
/// I/O provider such as [`TokioIoProvider`](crate::io::TokioIoProvider)
/// is responsible for receiving these messages and sending the
/// responses.
///
/// Only zone transfers are served. Any other request, and any transfer
/// request for a zone the server does not have, is declined with a
/// [`DropReason`] and gets no DNS response at all.
///
/// The zone data never changes after construction, so a `Server` can
/// be shared between connections without locking.
#[derive(Debug)]
pub struct Server {
    zones: HashMap<Name, Zone>,
    serial: u32,
}

impl Server {
    /// Creates a new `Server` for `domains`, whose records are taken
    /// from `records`.
    ///
    /// All record data is encoded here, so that an invalid record is
    /// reported now rather than when a transfer is attempted. The SOA
    /// serial is the current Unix time.
    pub fn new<'a, I>(
        settings: &ServerSettings,
        domains: I,
        records: &RecordSet,
    ) -> Result<Self, ZoneError>
    where
        I: IntoIterator<Item = &'a Name>,
    {
        let serial = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |since_epoch| since_epoch.as_secs() as u32);
        let zones = zone::build_zones(settings, serial, domains, records)?;
        let server = Self { zones, serial };

        // Check now that every zone fits in a message. The QNAME of a
        // real request may differ in case, which costs at most a few
        // octets of compression.
        for zone in server.zones.values() {
            let question = Question {
                qname: zone.domain.clone(),
                qtype: Qtype::AXFR,
                qclass: Qclass::IN,
            };
            if server.build_response(0, &question, zone).is_err() {
                return Err(ZoneError::TooLarge(zone.domain.clone()));
            }
        }
        Ok(server)
    }

    /// Returns the serial of the synthesized SOA records.
    pub fn serial(&self) -> u32 {
        self.serial
    }

    /// Returns an iterator over the domains this server transfers.
    pub fn domains(&self) -> impl Iterator<Item = &Name> {
        self.zones.values().map(|zone| &zone.domain)
    }

    /// Handles a received DNS message.
    ///
    /// A valid AXFR request for a configured zone produces a
    /// [`Transfer`]. Anything else is declined: the caller should close
    /// the connection without responding.
    pub fn handle_message(&self, received: &[u8]) -> Result<Transfer, DropReason> {
        let mut reader = Reader::try_from(received).map_err(DropReason::Malformed)?;
        if reader.qr() {
            return Err(DropReason::ProtocolViolation("QR is set on a request"));
        } else if reader.opcode() != Opcode::QUERY {
            return Err(DropReason::ProtocolViolation("opcode is not QUERY"));
        } else if reader.qdcount() != 1 {
            return Err(DropReason::ProtocolViolation("QDCOUNT is not 1"));
        }
        let question = reader.read_question().map_err(DropReason::Malformed)?;
        debug!(
            "received request {:#06x} for {} {:?} {}",
            reader.id(),
            question.qname,
            question.qclass,
            question.qtype,
        );

        if question.qtype != Qtype::AXFR {
            return Err(DropReason::UnsupportedQtype(question.qtype));
        } else if question.qclass != Qclass::IN && question.qclass != Qclass::ANY {
            return Err(DropReason::UnsupportedQclass(question.qclass));
        }
        let zone = self
            .zones
            .get(&question.qname)
            .ok_or_else(|| DropReason::UnauthorizedZone(question.qname.clone()))?;

        let response = self
            .build_response(reader.id(), &question, zone)
            .map_err(|_| DropReason::ResponseTooLong(zone.domain.clone()))?;
        Ok(Transfer {
            domain: zone.domain.clone(),
            response,
        })
    }

    /// Builds the single-message AXFR response for `zone`.
    fn build_response(
        &self,
        id: u16,
        question: &Question,
        zone: &Zone,
    ) -> Result<Vec<u8>, crate::message::writer::Error> {
        let mut writer = Writer::new();
        writer.set_id(id);
        writer.set_qr(true);
        writer.set_opcode(Opcode::QUERY);
        writer.set_aa(true);
        writer.set_rd(false);
        writer.set_ra(false);
        writer.set_rcode(Rcode::NOERROR);
        writer.add_question(question)?;
        for answer in &zone.answers {
            writer.add_answer(
                &answer.owner,
                answer.rr_type,
                CLASS_IN,
                answer.ttl,
                &answer.rdata,
            )?;
        }
        Ok(writer.finish())
    }
}

/// A zone transfer response produced by [`Server::handle_message`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Transfer {
    /// The transferred zone, as configured (not as the QNAME spelled
    /// it).
    pub domain: Name,

    /// The response message, to be sent in a single frame.
    pub response: Vec<u8>,
}

////////////////////////////////////////////////////////////////////////
// DROP REASONS                                                       //
////////////////////////////////////////////////////////////////////////

/// Why [`Server::handle_message`] declined a message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DropReason {
    /// The message could not be parsed.
    Malformed(reader::Error),

    /// The message is not a well-formed request.
    ProtocolViolation(&'static str),

    UnsupportedQtype(Qtype),

    UnsupportedQclass(Qclass),

    /// The requested zone is not served here.
    UnauthorizedZone(Name),

    /// The zone's response does not fit in a single message.
    ResponseTooLong(Name),
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Malformed(err) => write!(f, "malformed message: {}", err),
            Self::ProtocolViolation(what) => write!(f, "protocol violation: {}", what),
            Self::UnsupportedQtype(qtype) => write!(f, "unsupported QTYPE {}", qtype),
            Self::UnsupportedQclass(qclass) => write!(f, "unsupported QCLASS {:?}", qclass),
            Self::UnauthorizedZone(qname) => write!(f, "not authoritative for {}", qname),
            Self::ResponseTooLong(domain) => {
                write!(f, "the AXFR response for {} is too long", domain)
            }
        }
    }
}

impl std::error::Error for DropReason {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

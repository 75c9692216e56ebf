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

//! Implementation of the [`Writer`] type to serialize DNS messages.

use std::collections::HashMap;
use std::fmt;

use super::header::*;
use super::{Opcode, Question, Rcode};
use crate::name::Name;
use crate::rr::rdata::Component;

////////////////////////////////////////////////////////////////////////
// WRITER                                                             //
////////////////////////////////////////////////////////////////////////

/// A serializer for DNS messages containing a question section and an
/// answer section, which is everything a zone transfer response needs.
///
/// The message grows in an owned buffer and may not exceed
/// [`MAX_MESSAGE_SIZE`] octets. An operation that would make it larger
/// fails with [`Error::MessageTooLong`] and leaves the message as it
/// was.
///
/// Names are compressed ([RFC 1035 § 4.1.4]) in a case-preserving
/// manner: a name is only replaced by a pointer to a prior occurrence
/// whose octets match exactly, so the case of every name in the message
/// survives decompression, as [RFC 5936 § 3.4] expects of AXFR. Owner
/// names and [`Component::CompressibleName`]s are compressed;
/// [`Component::Name`]s are always written in full.
///
/// [RFC 1035 § 4.1.4]: https://datatracker.ietf.org/doc/html/rfc1035#section-4.1.4
/// [RFC 5936 § 3.4]: https://datatracker.ietf.org/doc/html/rfc5936#section-3.4
pub struct Writer {
    octets: Vec<u8>,
    qdcount: u16,
    ancount: u16,

    /// Maps the exact on-the-wire octets of each name suffix written so
    /// far to the offset of its first occurrence.
    suffixes: HashMap<Box<[u8]>, u16>,
}

impl Writer {
    /// Creates a new `Writer` with an all-zero header and no questions
    /// or records.
    pub fn new() -> Self {
        Self {
            octets: vec![0; HEADER_SIZE],
            qdcount: 0,
            ancount: 0,
            suffixes: HashMap::new(),
        }
    }

    /// Sets the 16-bit ID of the message.
    pub fn set_id(&mut self, id: u16) {
        self.octets[ID_START..ID_START + 2].copy_from_slice(&id.to_be_bytes());
    }

    /// Sets the QR (query response) bit.
    pub fn set_qr(&mut self, qr: bool) {
        self.set_flag(FLAGS_HIGH, QR_MASK, qr);
    }

    /// Sets the opcode of the message.
    pub fn set_opcode(&mut self, opcode: Opcode) {
        self.octets[FLAGS_HIGH] = (self.octets[FLAGS_HIGH] & !OPCODE_MASK) | opcode.to_flags();
    }

    /// Sets the AA (authoritative answer) bit.
    pub fn set_aa(&mut self, aa: bool) {
        self.set_flag(FLAGS_HIGH, AA_MASK, aa);
    }

    /// Sets the RD (recursion desired) bit.
    pub fn set_rd(&mut self, rd: bool) {
        self.set_flag(FLAGS_HIGH, RD_MASK, rd);
    }

    /// Sets the RA (recursion available) bit.
    pub fn set_ra(&mut self, ra: bool) {
        self.set_flag(FLAGS_LOW, RA_MASK, ra);
    }

    /// Sets the RCODE of the message.
    pub fn set_rcode(&mut self, rcode: Rcode) {
        self.octets[FLAGS_LOW] = (self.octets[FLAGS_LOW] & !RCODE_MASK) | rcode.to_flags();
    }

    /// Returns the number of questions written so far.
    pub fn qdcount(&self) -> u16 {
        self.qdcount
    }

    /// Returns the number of answers written so far.
    pub fn ancount(&self) -> u16 {
        self.ancount
    }

    /// Returns the current size of the message.
    pub fn len(&self) -> usize {
        self.octets.len()
    }

    /// Returns whether the message is just a header.
    pub fn is_empty(&self) -> bool {
        self.octets.len() == HEADER_SIZE
    }

    /// Adds a question to the message. Questions must be added before
    /// any answers.
    pub fn add_question(&mut self, question: &Question) -> Result<()> {
        debug_assert_eq!(self.ancount, 0);
        self.with_rollback(|writer| {
            writer.write_name(&question.qname, true);
            writer.push_u16(question.qtype.into());
            writer.push_u16(question.qclass.into());
            writer.qdcount = writer.qdcount.checked_add(1).ok_or(Error::MessageTooLong)?;
            Ok(())
        })
    }

    /// Adds a resource record to the answer section. `rr_type` and
    /// `class` are the raw TYPE and CLASS values.
    pub fn add_answer(
        &mut self,
        owner: &Name,
        rr_type: u16,
        class: u16,
        ttl: u32,
        rdata: &[Component],
    ) -> Result<()> {
        self.with_rollback(|writer| {
            writer.write_name(owner, true);
            writer.push_u16(rr_type);
            writer.push_u16(class);
            writer.octets.extend_from_slice(&ttl.to_be_bytes());
            let rdlength_start = writer.octets.len();
            writer.push_u16(0);
            for component in rdata {
                match component {
                    Component::Octets(octets) => writer.octets.extend_from_slice(octets),
                    Component::CompressibleName(name) => writer.write_name(name, true),
                    Component::Name(name) => writer.write_name(name, false),
                }
            }
            let rdlength = u16::try_from(writer.octets.len() - rdlength_start - 2)
                .or(Err(Error::MessageTooLong))?;
            writer.octets[rdlength_start..rdlength_start + 2]
                .copy_from_slice(&rdlength.to_be_bytes());
            writer.ancount = writer.ancount.checked_add(1).ok_or(Error::MessageTooLong)?;
            Ok(())
        })
    }

    /// Finishes the message, returning its octets.
    pub fn finish(mut self) -> Vec<u8> {
        self.octets[QDCOUNT_START..QDCOUNT_START + 2].copy_from_slice(&self.qdcount.to_be_bytes());
        self.octets[ANCOUNT_START..ANCOUNT_START + 2].copy_from_slice(&self.ancount.to_be_bytes());
        self.octets[NSCOUNT_START..NSCOUNT_START + 2].fill(0);
        self.octets[ARCOUNT_START..ARCOUNT_START + 2].fill(0);
        self.octets
    }

    /// Executes `f(self)`, then checks the message size. If `f` failed
    /// or the message grew too long, the message is restored to its
    /// prior state before returning the error.
    fn with_rollback<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        let saved_len = self.octets.len();
        let saved_qdcount = self.qdcount;
        let saved_ancount = self.ancount;
        let result = f(self).and_then(|()| {
            if self.octets.len() > MAX_MESSAGE_SIZE {
                Err(Error::MessageTooLong)
            } else {
                Ok(())
            }
        });
        if result.is_err() {
            self.octets.truncate(saved_len);
            self.qdcount = saved_qdcount;
            self.ancount = saved_ancount;
            self.suffixes
                .retain(|_, &mut pointer| (pointer as usize) < saved_len);
        }
        result
    }

    /// Writes `name` at the end of the message. If `compress` is set,
    /// the longest suffix of `name` that already appears in the message
    /// (with identical octets) is replaced by a pointer to it.
    fn write_name(&mut self, name: &Name, compress: bool) {
        let wire = name.wire_repr();
        let base = self.octets.len();

        let mut match_at = None;
        if compress {
            for offset in name.suffix_offsets() {
                let suffix = &wire[offset..];
                if suffix.len() == 1 {
                    break;
                }
                if let Some(&pointer) = self.suffixes.get(suffix) {
                    match_at = Some((offset, pointer));
                    break;
                }
            }
        }

        let literal_end = match_at.map_or(wire.len(), |(offset, _)| offset);
        for offset in name.suffix_offsets().take_while(|&o| o < literal_end) {
            let suffix = &wire[offset..];
            if suffix.len() == 1 {
                break;
            }
            let position = base + offset;
            if position <= POINTER_MAX {
                self.suffixes
                    .entry(suffix.into())
                    .or_insert(position as u16);
            }
        }

        self.octets.extend_from_slice(&wire[..literal_end]);
        if let Some((_, pointer)) = match_at {
            self.push_u16(0xc000 | pointer);
        }
    }

    fn push_u16(&mut self, data: u16) {
        self.octets.extend_from_slice(&data.to_be_bytes());
    }

    fn set_flag(&mut self, position: usize, mask: u8, value: bool) {
        if value {
            self.octets[position] |= mask;
        } else {
            self.octets[position] &= !mask;
        }
    }
}

impl Default for Writer {
    fn default() -> Self {
        Self::new()
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that data could not be added to a [`Writer`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Error {
    /// The message would exceed the 65,535 octets a TCP frame can
    /// carry.
    MessageTooLong,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::MessageTooLong => f.write_str("message too long"),
        }
    }
}

impl std::error::Error for Error {}

/// The type returned by fallible [`Writer`] methods.
pub type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::super::{Qclass, Qtype, Reader};
    use super::*;

    fn name(text: &str) -> Name {
        text.parse().unwrap()
    }

    fn question(qname: &str) -> Question {
        Question {
            qname: name(qname),
            qtype: Qtype::AXFR,
            qclass: Qclass::IN,
        }
    }

    #[test]
    fn header_fields_are_written() {
        let mut writer = Writer::new();
        writer.set_id(0x1234);
        writer.set_qr(true);
        writer.set_opcode(Opcode::NOTIFY);
        writer.set_aa(true);
        writer.set_rd(true);
        writer.set_rd(false);
        writer.set_ra(true);
        writer.set_rcode(Rcode::NOTAUTH);
        let octets = writer.finish();
        let reader = Reader::try_from(octets.as_slice()).unwrap();
        assert_eq!(reader.id(), 0x1234);
        assert!(reader.qr());
        assert_eq!(reader.opcode(), Opcode::NOTIFY);
        assert!(reader.aa());
        assert!(!reader.rd());
        assert!(reader.ra());
        assert_eq!(reader.rcode(), Rcode::NOTAUTH);
        assert_eq!(reader.qdcount(), 0);
    }

    #[test]
    fn owners_are_compressed_against_prior_suffixes() {
        let mut writer = Writer::new();
        writer.add_question(&question("example.com.")).unwrap();
        let rdata = [Component::Octets(vec![127, 0, 0, 1])];
        writer
            .add_answer(&name("www.example.com."), 1, 1, 300, &rdata)
            .unwrap();
        let octets = writer.finish();

        // Header (12) + question name (13) + QTYPE and QCLASS (4), then
        // "www" followed by a pointer to offset 12.
        assert_eq!(&octets[29..35], b"\x03www\xc0\x0c");

        let mut reader = Reader::try_from(octets.as_slice()).unwrap();
        reader.read_question().unwrap();
        let rr = reader.read_rr().unwrap();
        assert_eq!(rr.owner, name("www.example.com."));
        assert_eq!(rr.rdata, &[127, 0, 0, 1]);
        assert!(reader.at_eom());
    }

    #[test]
    fn compression_preserves_case() {
        let mut writer = Writer::new();
        writer.add_question(&question("example.com.")).unwrap();
        writer
            .add_answer(&name("EXAMPLE.com."), 2, 1, 0, &[])
            .unwrap();
        let octets = writer.finish();

        // Only "com." matches exactly, so "EXAMPLE" is written in full
        // and followed by a pointer to the "com" label at offset 20.
        assert_eq!(&octets[29..39], b"\x07EXAMPLE\xc0\x14");

        let mut reader = Reader::try_from(octets.as_slice()).unwrap();
        reader.read_question().unwrap();
        let rr = reader.read_rr().unwrap();
        assert_eq!(rr.owner.to_string(), "EXAMPLE.com.");
    }

    #[test]
    fn uncompressible_names_are_written_in_full() {
        let mut writer = Writer::new();
        writer.add_question(&question("example.com.")).unwrap();
        let target = name("example.com.");
        writer
            .add_answer(
                &name("example.com."),
                17,
                1,
                0,
                &[
                    Component::Name(target.clone()),
                    Component::CompressibleName(target.clone()),
                ],
            )
            .unwrap();
        let octets = writer.finish();
        let mut reader = Reader::try_from(octets.as_slice()).unwrap();
        reader.read_question().unwrap();
        let rr = reader.read_rr().unwrap();
        assert_eq!(rr.rdata.len(), 13 + 2);
        assert_eq!(&rr.rdata[..13], target.wire_repr());
        assert_eq!(&rr.rdata[13..], b"\xc0\x0c");
    }

    #[test]
    fn oversized_messages_are_rejected_and_rolled_back() {
        let mut writer = Writer::new();
        writer.add_question(&question("example.com.")).unwrap();
        let owner = name("example.com.");
        let big = [Component::Octets(vec![0; 60_000])];
        writer.add_answer(&owner, 16, 1, 0, &big).unwrap();
        let len = writer.len();
        assert_eq!(
            writer.add_answer(&owner, 16, 1, 0, &big),
            Err(Error::MessageTooLong)
        );
        assert_eq!(writer.len(), len);
        assert_eq!(writer.ancount(), 1);
    }
}

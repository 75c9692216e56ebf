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

//! Conversion of record data from presentation format to the on-the-wire
//! form used in zone transfers.
//!
//! The result of [`encode`] is a list of [`Component`]s rather than a
//! flat buffer, so that the message [`Writer`](crate::message::Writer)
//! can compress embedded domain names where the DNS standards allow it.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use super::{Rdata, Type};
use crate::name::{self, Name};
use crate::util::decode_hex;

mod loc;
mod text;
pub use text::{decode_character_string, Field, Fields};

////////////////////////////////////////////////////////////////////////
// COMPONENTS                                                         //
////////////////////////////////////////////////////////////////////////

/// A piece of on-the-wire RDATA.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Component {
    /// Octets copied to the message as-is.
    Octets(Vec<u8>),

    /// A domain name that may be compressed. Per [RFC 3597 § 4], this is
    /// only used for the RR types of RFC 1035.
    ///
    /// [RFC 3597 § 4]: https://datatracker.ietf.org/doc/html/rfc3597#section-4
    CompressibleName(Name),

    /// A domain name that must be written uncompressed.
    Name(Name),
}

impl Component {
    /// Returns the uncompressed length of the component.
    pub fn len(&self) -> usize {
        match self {
            Self::Octets(octets) => octets.len(),
            Self::CompressibleName(name) | Self::Name(name) => name.wire_repr().len(),
        }
    }

    /// Returns whether the component is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

////////////////////////////////////////////////////////////////////////
// ENCODING                                                           //
////////////////////////////////////////////////////////////////////////

/// Encodes the data of a record of type `rr_type` into its
/// on-the-wire form.
pub fn encode(rr_type: Type, data: &Rdata) -> Result<Vec<Component>, Error> {
    let text = match (rr_type, data) {
        (Type::MX, Rdata::Mx { priority, exchange }) => {
            return Ok(vec![
                Component::Octets(priority.to_be_bytes().to_vec()),
                Component::CompressibleName(parse_name(exchange, "exchange")?),
            ]);
        }
        (_, Rdata::Mx { .. }) => return Err(Error::InvalidField("priority")),
        (_, Rdata::Text(text)) => text.as_str(),
    };

    let mut fields = Fields::new(text);
    let mut builder = Builder::default();
    match rr_type {
        Type::A => {
            let address: Ipv4Addr = fields.parse("IPv4 address")?;
            builder.octets(&address.octets());
        }
        Type::AAAA => {
            let address: Ipv6Addr = fields.parse("IPv6 address")?;
            builder.octets(&address.octets());
        }
        Type::MX => {
            // Presentation format "priority exchange", as zone files
            // write it.
            builder.u16(fields.parse("priority")?);
            builder.compressible_name(fields.expect("exchange")?, "exchange")?;
        }
        Type::NS | Type::CNAME | Type::PTR => {
            builder.compressible_name(fields.expect("target")?, "target")?;
        }
        Type::SOA => {
            builder.compressible_name(fields.expect("MNAME")?, "MNAME")?;
            builder.compressible_name(fields.expect("RNAME")?, "RNAME")?;
            for what in ["serial", "refresh", "retry", "expire", "minimum"] {
                builder.u32(fields.parse(what)?);
            }
        }
        Type::TXT | Type::SPF => {
            builder.character_string(fields.expect("text")?)?;
            while let Some(field) = fields.next_field()? {
                builder.character_string(field)?;
            }
        }
        Type::HINFO => {
            builder.character_string(fields.expect("CPU")?)?;
            builder.character_string(fields.expect("OS")?)?;
        }
        Type::RP => {
            builder.name(fields.expect("mailbox")?, "mailbox")?;
            builder.name(fields.expect("TXT name")?, "TXT name")?;
        }
        Type::AFSDB => {
            builder.u16(fields.parse("subtype")?);
            builder.name(fields.expect("hostname")?, "hostname")?;
        }
        Type::SRV => {
            builder.u16(fields.parse("priority")?);
            builder.u16(fields.parse("weight")?);
            builder.u16(fields.parse("port")?);
            builder.name(fields.expect("target")?, "target")?;
        }
        Type::NAPTR => {
            builder.u16(fields.parse("order")?);
            builder.u16(fields.parse("preference")?);
            builder.character_string(fields.expect("flags")?)?;
            builder.character_string(fields.expect("services")?)?;
            builder.character_string(fields.expect("regexp")?)?;
            builder.name(fields.expect("replacement")?, "replacement")?;
        }
        Type::SSHFP => {
            builder.u8(fields.parse("algorithm")?);
            builder.u8(fields.parse("fingerprint type")?);
            // The fingerprint may be split into several fields.
            let mut hex = String::from(fields.expect("fingerprint")?.text);
            while let Some(field) = fields.next_field()? {
                hex.push_str(field.text);
            }
            builder.octets(&decode_hex(&hex).ok_or(Error::InvalidField("fingerprint"))?);
        }
        Type::CAA => {
            builder.u8(fields.parse("flags")?);
            let tag = fields.expect("tag")?;
            if tag.text.is_empty()
                || tag.text.len() > 255
                || !tag.text.bytes().all(|b| b.is_ascii_alphanumeric())
            {
                return Err(Error::InvalidField("tag"));
            }
            builder.u8(tag.text.len() as u8);
            builder.octets(tag.text.as_bytes());
            // The value is not length-prefixed: it runs to the end of
            // the RDATA.
            let value = decode_character_string(fields.expect("value")?)?;
            builder.octets(&value);
        }
        Type::LOC => {
            builder.octets(&loc::encode(&mut fields)?);
        }
        Type::ALIAS => return Err(Error::UnsupportedType(rr_type)),
    }
    fields.finish()?;
    Ok(builder.finish())
}

fn parse_name(text: &str, what: &'static str) -> Result<Name, Error> {
    text.parse()
        .map_err(|error| Error::InvalidName { field: what, error })
}

/// Accumulates [`Component`]s, merging adjacent octets.
#[derive(Default)]
struct Builder {
    components: Vec<Component>,
}

impl Builder {
    fn octets(&mut self, octets: &[u8]) {
        if let Some(Component::Octets(last)) = self.components.last_mut() {
            last.extend_from_slice(octets);
        } else {
            self.components.push(Component::Octets(octets.to_vec()));
        }
    }

    fn u8(&mut self, value: u8) {
        self.octets(&[value]);
    }

    fn u16(&mut self, value: u16) {
        self.octets(&value.to_be_bytes());
    }

    fn u32(&mut self, value: u32) {
        self.octets(&value.to_be_bytes());
    }

    fn character_string(&mut self, field: Field) -> Result<(), Error> {
        let octets = decode_character_string(field)?;
        self.u8(octets.len() as u8);
        self.octets(&octets);
        Ok(())
    }

    fn name(&mut self, field: Field, what: &'static str) -> Result<(), Error> {
        self.components
            .push(Component::Name(parse_name(field.text, what)?));
        Ok(())
    }

    fn compressible_name(&mut self, field: Field, what: &'static str) -> Result<(), Error> {
        self.components
            .push(Component::CompressibleName(parse_name(field.text, what)?));
        Ok(())
    }

    fn finish(self) -> Vec<Component> {
        self.components
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that record data could not be encoded.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Error {
    CharacterStringTooLong,
    ExtraData,
    InvalidEscape,
    InvalidField(&'static str),
    InvalidName {
        field: &'static str,
        error: name::Error,
    },
    MissingField(&'static str),
    UnsupportedType(Type),
    UnterminatedQuote,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::CharacterStringTooLong => {
                f.write_str("character string is longer than 255 octets")
            }
            Self::ExtraData => f.write_str("extra data after the last field"),
            Self::InvalidEscape => f.write_str("invalid escape sequence"),
            Self::InvalidField(what) => write!(f, "invalid {}", what),
            Self::InvalidName { field, error } => write!(f, "invalid {}: {}", field, error),
            Self::MissingField(what) => write!(f, "missing {}", what),
            Self::UnsupportedType(rr_type) => {
                write!(f, "{} records have no on-the-wire form", rr_type)
            }
            Self::UnterminatedQuote => f.write_str("unterminated quoted string"),
        }
    }
}

impl std::error::Error for Error {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_text(rr_type: Type, text: &str) -> Result<Vec<Component>, Error> {
        encode(rr_type, &Rdata::Text(text.into()))
    }

    fn name(text: &str) -> Name {
        text.parse().unwrap()
    }

    #[test]
    fn a_and_aaaa_encode_addresses() {
        assert_eq!(
            encode_text(Type::A, "192.0.2.1").unwrap(),
            [Component::Octets(vec![192, 0, 2, 1])]
        );
        let aaaa = encode_text(Type::AAAA, "2001:db8::1").unwrap();
        assert_eq!(aaaa.len(), 1);
        assert_eq!(aaaa[0].len(), 16);
        assert_eq!(
            encode_text(Type::A, "300.0.0.1"),
            Err(Error::InvalidField("IPv4 address"))
        );
    }

    #[test]
    fn mx_pair_encodes_priority_and_compressible_exchange() {
        let data = Rdata::Mx {
            priority: 10,
            exchange: "mail.example.com.".into(),
        };
        assert_eq!(
            encode(Type::MX, &data).unwrap(),
            [
                Component::Octets(vec![0, 10]),
                Component::CompressibleName(name("mail.example.com."))
            ]
        );
    }

    #[test]
    fn srv_target_is_not_compressible() {
        assert_eq!(
            encode_text(Type::SRV, "1 2 443 host.example.com.").unwrap(),
            [
                Component::Octets(vec![0, 1, 0, 2, 0x01, 0xbb]),
                Component::Name(name("host.example.com."))
            ]
        );
    }

    #[test]
    fn txt_encodes_every_character_string() {
        assert_eq!(
            encode_text(Type::TXT, "\"v=spf1 -all\" more").unwrap(),
            [Component::Octets(b"\x0bv=spf1 -all\x04more".to_vec())]
        );
    }

    #[test]
    fn caa_value_is_not_length_prefixed() {
        assert_eq!(
            encode_text(Type::CAA, "0 issue \"letsencrypt.org\"").unwrap(),
            [Component::Octets(b"\x00\x05issueletsencrypt.org".to_vec())]
        );
        assert_eq!(
            encode_text(Type::CAA, "0 is-sue \"x\""),
            Err(Error::InvalidField("tag"))
        );
    }

    #[test]
    fn sshfp_joins_split_fingerprints() {
        assert_eq!(
            encode_text(Type::SSHFP, "1 1 0123 4567").unwrap(),
            [Component::Octets(vec![1, 1, 0x01, 0x23, 0x45, 0x67])]
        );
    }

    #[test]
    fn soa_names_are_compressible() {
        let soa = encode_text(
            Type::SOA,
            "ns1.example.com. hostmaster.example.com. 1 60 60 604800 300",
        )
        .unwrap();
        assert_eq!(soa.len(), 3);
        assert_eq!(soa[0], Component::CompressibleName(name("ns1.example.com.")));
        assert_eq!(soa[2].len(), 20);
    }

    #[test]
    fn names_must_be_fully_qualified() {
        assert_eq!(
            encode_text(Type::CNAME, "www.example.com"),
            Err(Error::InvalidName {
                field: "target",
                error: name::Error::NotFullyQualified
            })
        );
    }

    #[test]
    fn extra_fields_are_rejected() {
        assert_eq!(
            encode_text(Type::A, "192.0.2.1 192.0.2.2"),
            Err(Error::ExtraData)
        );
    }

    #[test]
    fn alias_cannot_be_encoded() {
        assert_eq!(
            encode_text(Type::ALIAS, "target.example.com."),
            Err(Error::UnsupportedType(Type::ALIAS))
        );
    }
}

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

//! Parsing of zone text in the [RFC 1035 § 5] master file format.
//!
//! [`parse`] turns zone text into a [`RecordSet`]. Records keep their
//! data in presentation format, so the parser does not decode RDATA;
//! it only makes the data self-contained by qualifying relative domain
//! names in the fields of name-bearing types (NS, CNAME, MX, SOA, and
//! so on) against the current origin.
//!
//! ```
//! use zonesync::rr::{Rdata, Type};
//! use zonesync::zone_file;
//!
//! const ZONE: &str = r#"
//! $ORIGIN example.com.
//! $TTL 1h
//! @       IN SOA ns1 hostmaster (
//!             1 3600 900 604800 300 )
//!         IN MX 10 mail
//! mail    300 IN A 192.0.2.25
//! "#;
//!
//! let records = zone_file::parse(ZONE, None).unwrap();
//! let mx = records.iter().find(|r| r.rr_type() == Type::MX).unwrap();
//! assert_eq!(mx.name(), "example.com.");
//! assert_eq!(mx.ttl(), 3600);
//! assert_eq!(
//!     *mx.data(),
//!     Rdata::Mx { priority: 10, exchange: "mail.example.com.".into() },
//! );
//! ```
//!
//! Supported syntax: the `$ORIGIN` and `$TTL` directives; `@` for the
//! origin; relative owner names; blank owners, which repeat the
//! previous owner; TTLs as plain seconds or with BIND-style units
//! (`1h30m`); an optional `IN` class; parentheses extending an entry
//! over several lines; `;` comments; and quoted strings. `$INCLUDE` is
//! rejected.
//!
//! An omitted TTL is taken from `$TTL` if it has been set, and
//! otherwise from the previous record.
//!
//! [RFC 1035 § 5]: https://datatracker.ietf.org/doc/html/rfc1035#section-5

use crate::name::Name;
use crate::rr::{Rdata, Record, RecordSet, Type};
use crate::util::Caseless;

pub mod error;
mod reader;

pub use error::{Error, ErrorKind, Result};
use reader::{Entry, Reader};

/// Parses zone text into a set of records.
///
/// `origin` is the initial origin, against which relative names are
/// qualified until a `$ORIGIN` directive changes it.
pub fn parse(text: &str, origin: Option<&Name>) -> Result<RecordSet> {
    let mut parser = Parser {
        origin: origin.map(ToString::to_string),
        default_ttl: None,
        last_owner: None,
        last_ttl: None,
    };
    let mut reader = Reader::new(text);
    let mut records = RecordSet::new();
    while let Some(entry) = reader.next_entry()? {
        let line = entry.line;
        if let Some(record) = parser
            .process(entry)
            .map_err(|kind| Error::new(line, kind))?
        {
            records.insert(record);
        }
    }
    Ok(records)
}

////////////////////////////////////////////////////////////////////////
// PARSER                                                             //
////////////////////////////////////////////////////////////////////////

/// The state carried from one entry to the next.
struct Parser {
    origin: Option<String>,
    default_ttl: Option<u32>,
    last_owner: Option<String>,
    last_ttl: Option<u32>,
}

type KindResult<T> = std::result::Result<T, ErrorKind>;

impl Parser {
    /// Processes an entry, returning the record it holds (if it is not
    /// a directive).
    fn process(&mut self, entry: Entry) -> KindResult<Option<Record>> {
        let mut fields = entry.fields.into_iter();

        let owner = if entry.blank_owner {
            self.last_owner
                .clone()
                .ok_or(ErrorKind::EmptyOwnerWithNoPrevious)?
        } else {
            let first = fields.next().ok_or(ErrorKind::ExpectedName)?;
            if first.starts_with('$') {
                self.process_directive(&first, fields.collect())?;
                return Ok(None);
            }
            let owner = self.qualify(&first)?;
            validate_name(&owner)?;
            owner
        };
        self.last_owner = Some(owner.clone());

        // The TTL and class may each be omitted, and may come in either
        // order.
        let mut ttl = None;
        let mut rr_type = None;
        let mut seen_class = false;
        while let Some(field) = fields.next() {
            if ttl.is_none() && field.starts_with(|c: char| c.is_ascii_digit()) {
                ttl = Some(parse_ttl(&field).ok_or(ErrorKind::InvalidTtl)?);
            } else if !seen_class && is_class(&field) {
                if Caseless(&field) != Caseless("IN") {
                    return Err(ErrorKind::UnsupportedClass(field));
                }
                seen_class = true;
            } else {
                let parsed = field
                    .parse::<Type>()
                    .map_err(|_| ErrorKind::UnsupportedType(field.clone()))?;
                rr_type = Some(parsed);
                break;
            }
        }
        let rr_type = rr_type.ok_or(ErrorKind::ExpectedType)?;

        let ttl = match ttl {
            Some(ttl) => ttl,
            None => self
                .default_ttl
                .or(self.last_ttl)
                .ok_or(ErrorKind::ExpectedTtl)?,
        };
        self.last_ttl = Some(ttl);

        let rdata: Vec<String> = fields.collect();
        if rdata.is_empty() {
            return Err(ErrorKind::ExpectedRdata);
        }
        let data = self.process_rdata(rr_type, rdata)?;
        Record::new(owner, ttl, rr_type, data)
            .map(Some)
            .map_err(ErrorKind::InvalidRecord)
    }

    fn process_directive(&mut self, directive: &str, args: Vec<String>) -> KindResult<()> {
        let is = |name: &str| Caseless(directive) == Caseless(name);
        if is("$INCLUDE") {
            return Err(ErrorKind::IncludeNotSupported);
        } else if !is("$ORIGIN") && !is("$TTL") {
            return Err(ErrorKind::UnknownDirective(directive.to_owned()));
        }

        let [arg] = <[String; 1]>::try_from(args).map_err(|args| {
            if !args.is_empty() {
                ErrorKind::ExpectedEol
            } else if is("$TTL") {
                ErrorKind::ExpectedTtl
            } else {
                ErrorKind::ExpectedName
            }
        })?;
        if is("$TTL") {
            self.default_ttl = Some(parse_ttl(&arg).ok_or(ErrorKind::InvalidTtl)?);
        } else {
            let origin = self.qualify(&arg)?;
            validate_name(&origin)?;
            self.origin = Some(origin);
        }
        Ok(())
    }

    fn process_rdata(&self, rr_type: Type, mut fields: Vec<String>) -> KindResult<Rdata> {
        if rr_type == Type::MX {
            let [priority, exchange] =
                <[String; 2]>::try_from(fields).map_err(|_| ErrorKind::ExpectedMxData)?;
            let priority = priority.parse().map_err(|_| ErrorKind::InvalidPriority)?;
            return Ok(Rdata::Mx {
                priority,
                exchange: self.qualify(&exchange)?,
            });
        }

        for &index in rr_type.name_fields() {
            if let Some(field) = fields.get_mut(index) {
                *field = self.qualify(field)?;
            }
        }
        if rr_type == Type::SOA {
            // The timers (but not the serial) may be written with units.
            for field in fields.iter_mut().skip(3).take(4) {
                *field = parse_ttl(field).ok_or(ErrorKind::InvalidTtl)?.to_string();
            }
        }
        Ok(Rdata::Text(fields.join(" ")))
    }

    /// Makes `name` fully qualified against the current origin.
    fn qualify(&self, name: &str) -> KindResult<String> {
        if name == "@" {
            self.origin.clone().ok_or(ErrorKind::AtWhenOriginNotSet)
        } else if is_absolute(name) {
            Ok(name.to_owned())
        } else {
            match self.origin.as_deref() {
                Some(".") => Ok(format!("{}.", name)),
                Some(origin) => Ok(format!("{}.{}", name, origin)),
                None => Err(ErrorKind::PqdnWhenOriginNotSet),
            }
        }
    }
}

/// Returns whether `name` ends with an unescaped dot.
fn is_absolute(name: &str) -> bool {
    match name.strip_suffix('.') {
        Some(rest) => rest.chars().rev().take_while(|&c| c == '\\').count() % 2 == 0,
        None => false,
    }
}

fn validate_name(name: &str) -> KindResult<()> {
    name.parse::<Name>()
        .map(|_| ())
        .map_err(ErrorKind::InvalidName)
}

fn is_class(field: &str) -> bool {
    ["IN", "CH", "CS", "HS"]
        .into_iter()
        .any(|class| Caseless(class) == Caseless(field))
}

/// Parses a TTL, given either as a number of seconds or as a sequence
/// of numbers with `w`, `d`, `h`, `m`, or `s` units.
fn parse_ttl(text: &str) -> Option<u32> {
    if let Ok(seconds) = text.parse() {
        return Some(seconds);
    }
    let mut total: u32 = 0;
    let mut value: Option<u32> = None;
    for c in text.chars() {
        if let Some(digit) = c.to_digit(10) {
            value = Some(value.unwrap_or(0).checked_mul(10)?.checked_add(digit)?);
        } else {
            let multiplier = match c.to_ascii_lowercase() {
                'w' => 604_800,
                'd' => 86_400,
                'h' => 3_600,
                'm' => 60,
                's' => 1,
                _ => return None,
            };
            total = total.checked_add(value.take()?.checked_mul(multiplier)?)?;
        }
    }
    if value.is_some() {
        // A trailing number without a unit is only allowed on its own.
        return None;
    }
    Some(total)
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, ttl: u32, rr_type: Type, data: &str) -> Record {
        Record::new(name, ttl, rr_type, Rdata::Text(data.into())).unwrap()
    }

    fn parse_err(text: &str) -> Error {
        parse(text, Some(&"example.com.".parse().unwrap())).unwrap_err()
    }

    #[test]
    fn parse_handles_origin_ttl_and_owners() {
        let text = "\
$ORIGIN example.com.
$TTL 3600
@        A     192.0.2.1
www  300 IN A  192.0.2.2
         AAAA  2001:db8::2
host.other.test. IN 600 A 192.0.2.3
";
        let records = parse(text, None).unwrap();
        assert_eq!(
            records,
            RecordSet::from([
                record("example.com.", 3600, Type::A, "192.0.2.1"),
                record("www.example.com.", 300, Type::A, "192.0.2.2"),
                record("www.example.com.", 3600, Type::AAAA, "2001:db8::2"),
                record("host.other.test.", 600, Type::A, "192.0.2.3"),
            ])
        );
    }

    #[test]
    fn parse_falls_back_to_the_previous_ttl() {
        let records = parse("a.test. 600 A 192.0.2.1\nb.test. A 192.0.2.2\n", None).unwrap();
        assert!(records.iter().all(|record| record.ttl() == 600));
        assert_eq!(
            parse("a.test. A 192.0.2.1", None).unwrap_err().kind(),
            &ErrorKind::ExpectedTtl
        );
    }

    #[test]
    fn parse_qualifies_names_in_rdata() {
        let text = "\
$TTL 300
@     SOA   ns1 hostmaster ( 2023010101 1h 15m 1w 5m )
      NS    ns1.example.net.
      MX    10 mail
www   CNAME @
_sip._tcp SRV 10 20 5060 sip
@     TXT   \"v=spf1 mx -all\"
";
        let origin: Name = "example.com.".parse().unwrap();
        let records = parse(text, Some(&origin)).unwrap();
        let expected = RecordSet::from([
            record(
                "example.com.",
                300,
                Type::SOA,
                "ns1.example.com. hostmaster.example.com. 2023010101 3600 900 604800 300",
            ),
            record("example.com.", 300, Type::NS, "ns1.example.net."),
            Record::new(
                "example.com.",
                300,
                Type::MX,
                Rdata::Mx {
                    priority: 10,
                    exchange: "mail.example.com.".into(),
                },
            )
            .unwrap(),
            record("www.example.com.", 300, Type::CNAME, "example.com."),
            record(
                "_sip._tcp.example.com.",
                300,
                Type::SRV,
                "10 20 5060 sip.example.com.",
            ),
            record("example.com.", 300, Type::TXT, "\"v=spf1 mx -all\""),
        ]);
        assert_eq!(records, expected);
    }

    #[test]
    fn parse_reports_errors_with_lines() {
        let err = parse_err("$TTL 300\nwww A 192.0.2.1\n  CH A 192.0.2.1\n");
        assert_eq!(err.line(), 3);
        assert_eq!(err.kind(), &ErrorKind::UnsupportedClass("CH".into()));

        assert_eq!(
            parse_err("$TTL 300\n  A 192.0.2.1").kind(),
            &ErrorKind::EmptyOwnerWithNoPrevious
        );
        assert_eq!(parse_err("www 300 WKS x").kind(), &ErrorKind::UnsupportedType("WKS".into()));
        assert_eq!(parse_err("www 300 MX mail").kind(), &ErrorKind::ExpectedMxData);
        assert_eq!(parse_err("www 300 A").kind(), &ErrorKind::ExpectedRdata);
        assert_eq!(parse_err("$INCLUDE other.zone").kind(), &ErrorKind::IncludeNotSupported);
        assert_eq!(
            parse_err("$GENERATE 1-2 a A 1").kind(),
            &ErrorKind::UnknownDirective("$GENERATE".into())
        );
        assert_eq!(parse_err("$ORIGIN a. b.").kind(), &ErrorKind::ExpectedEol);
        assert_eq!(parse_err("$TTL").kind(), &ErrorKind::ExpectedTtl);
        assert_eq!(parse_err("$TTL 1x").kind(), &ErrorKind::InvalidTtl);
        assert_eq!(
            parse("www 300 A 192.0.2.1", None).unwrap_err().kind(),
            &ErrorKind::PqdnWhenOriginNotSet
        );
        assert_eq!(
            parse("@ 300 A 192.0.2.1", None).unwrap_err().kind(),
            &ErrorKind::AtWhenOriginNotSet
        );
    }

    #[test]
    fn ttls_accept_units() {
        assert_eq!(parse_ttl("300"), Some(300));
        assert_eq!(parse_ttl("1h30m"), Some(5400));
        assert_eq!(parse_ttl("1W2d"), Some(777_600));
        assert_eq!(parse_ttl("1h30"), None);
        assert_eq!(parse_ttl("h"), None);
        assert_eq!(parse_ttl("5000000000"), None);
    }

    #[test]
    fn absolute_names_need_an_unescaped_dot() {
        assert!(is_absolute("example.com."));
        assert!(!is_absolute("example.com"));
        assert!(!is_absolute("example\\."));
        assert!(is_absolute("example\\\\."));
    }
}

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

//! Implementation of the [`Record`] value type.

use std::collections::BTreeSet;
use std::fmt;

use super::Type;

////////////////////////////////////////////////////////////////////////
// RECORDS                                                            //
////////////////////////////////////////////////////////////////////////

/// A resource record as the hosted provider models it.
///
/// Records are plain values. Equality is structural over the owner
/// name, TTL, type, and data, so two records that differ only in TTL
/// are different records. This is what reconciliation compares.
///
/// The owner name is kept as text: the provider reports names without
/// a trailing dot, while zone text produces fully-qualified names, and
/// neither form is rewritten. To compare records from the two sources,
/// compare their [`canonical`](Record::canonical) forms.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Record {
    name: String,
    ttl: u32,
    rr_type: Type,
    data: Rdata,
}

/// The data of a [`Record`].
///
/// MX is the only type whose data the provider splits: its priority is
/// a separate field. Every other type carries its presentation-format
/// RDATA as a single string.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Rdata {
    Text(String),
    Mx { priority: u16, exchange: String },
}

/// A set of records, ordered so that iteration (and hence the diff
/// output) is deterministic.
pub type RecordSet = BTreeSet<Record>;

impl Record {
    /// Creates a new record, checking that `data` has the shape that
    /// `rr_type` requires.
    pub fn new(
        name: impl Into<String>,
        ttl: u32,
        rr_type: Type,
        data: Rdata,
    ) -> Result<Self, MalformedRecord> {
        let name = name.into();
        if name.is_empty() {
            return Err(MalformedRecord::EmptyName);
        }
        match (rr_type, &data) {
            (Type::MX, Rdata::Text(_)) => Err(MalformedRecord::MissingPriority),
            (Type::MX, Rdata::Mx { .. }) | (_, Rdata::Text(_)) => Ok(Self {
                name,
                ttl,
                rr_type,
                data,
            }),
            (other, Rdata::Mx { .. }) => Err(MalformedRecord::UnexpectedPriority(other)),
        }
    }

    /// Returns the owner name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the TTL in seconds.
    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    /// Returns the RR type.
    pub fn rr_type(&self) -> Type {
        self.rr_type
    }

    /// Returns the record data.
    pub fn data(&self) -> &Rdata {
        &self.data
    }

    /// Returns the record with every domain name in it (the owner, the
    /// MX exchange, and the name fields of the RDATA) lowercased and
    /// stripped of its trailing dot. Two records that the provider
    /// treats as the same have equal canonical forms.
    pub fn canonical(&self) -> Record {
        let data = match &self.data {
            Rdata::Mx { priority, exchange } => Rdata::Mx {
                priority: *priority,
                exchange: canonical_name(exchange),
            },
            Rdata::Text(text) => Rdata::Text(canonical_text(self.rr_type, text)),
        };
        Self {
            name: canonical_name(&self.name),
            ttl: self.ttl,
            rr_type: self.rr_type,
            data,
        }
    }
}

/// Lowercases `name` and removes its trailing dot, unless the dot is
/// escaped or `name` is the root.
fn canonical_name(name: &str) -> String {
    let relative = match name.strip_suffix('.') {
        Some(rest)
            if !rest.is_empty()
                && rest.chars().rev().take_while(|&c| c == '\\').count() % 2 == 0 =>
        {
            rest
        }
        _ => name,
    };
    relative.to_ascii_lowercase()
}

fn canonical_text(rr_type: Type, text: &str) -> String {
    let fields = rr_type.name_fields();
    if fields.is_empty() {
        text.to_owned()
    } else if text.contains('"') {
        // Character-strings may hold spaces. The only type with both
        // character-strings and names is NAPTR, whose name is last.
        match text.trim_end().rsplit_once(char::is_whitespace) {
            Some((head, name)) => format!("{} {}", head, canonical_name(name)),
            None => text.to_owned(),
        }
    } else {
        text.split_whitespace()
            .enumerate()
            .map(|(i, field)| {
                if fields.contains(&i) {
                    canonical_name(field)
                } else {
                    field.to_owned()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} {} {}", self.name, self.ttl, self.rr_type, self.data)
    }
}

impl fmt::Display for Rdata {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Mx { priority, exchange } => write!(f, "{} {}", priority, exchange),
        }
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that a [`Record`] could not be constructed.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MalformedRecord {
    EmptyName,
    MissingPriority,
    UnexpectedPriority(Type),
}

impl fmt::Display for MalformedRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::EmptyName => f.write_str("the owner name is empty"),
            Self::MissingPriority => f.write_str("MX data must include a priority"),
            Self::UnexpectedPriority(rr_type) => {
                write!(f, "{} data cannot include a priority", rr_type)
            }
        }
    }
}

impl std::error::Error for MalformedRecord {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Rdata {
        Rdata::Text(s.into())
    }

    #[test]
    fn mx_requires_priority() {
        assert_eq!(
            Record::new("example.com", 300, Type::MX, text("mail.example.com")),
            Err(MalformedRecord::MissingPriority)
        );
        let mx = Rdata::Mx {
            priority: 10,
            exchange: "mail.example.com".into(),
        };
        assert!(Record::new("example.com", 300, Type::MX, mx).is_ok());
    }

    #[test]
    fn only_mx_may_carry_priority() {
        let mx = Rdata::Mx {
            priority: 10,
            exchange: "mail.example.com".into(),
        };
        assert_eq!(
            Record::new("example.com", 300, Type::CNAME, mx),
            Err(MalformedRecord::UnexpectedPriority(Type::CNAME))
        );
    }

    #[test]
    fn empty_names_are_rejected() {
        assert_eq!(
            Record::new("", 300, Type::A, text("192.0.2.1")),
            Err(MalformedRecord::EmptyName)
        );
    }

    #[test]
    fn ttl_is_part_of_identity() {
        let a = Record::new("example.com", 300, Type::A, text("192.0.2.1")).unwrap();
        let b = Record::new("example.com", 3600, Type::A, text("192.0.2.1")).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn mx_priority_is_part_of_identity() {
        let make = |priority| {
            let data = Rdata::Mx {
                priority,
                exchange: "mail.example.com".into(),
            };
            Record::new("example.com", 300, Type::MX, data).unwrap()
        };
        assert_ne!(make(10), make(20));
        assert_eq!(make(10), make(10));
    }

    #[test]
    fn canonical_forms_ignore_trailing_dots_and_case() {
        let cname = |owner: &str, target: &str| {
            Record::new(owner, 300, Type::CNAME, text(target)).unwrap()
        };
        let provider = cname("www.example.com", "Host.Example.com");
        let zone_text = cname("WWW.example.com.", "host.example.com.");
        assert_ne!(provider, zone_text);
        assert_eq!(provider.canonical(), zone_text.canonical());
        assert_eq!(
            provider.canonical().to_string(),
            "www.example.com 300 CNAME host.example.com"
        );

        let mx = |exchange: &str| {
            let data = Rdata::Mx {
                priority: 10,
                exchange: exchange.into(),
            };
            Record::new("example.com.", 300, Type::MX, data).unwrap()
        };
        assert_eq!(mx("mail.example.com").canonical(), mx("MAIL.example.com.").canonical());
    }

    #[test]
    fn canonical_forms_keep_other_data() {
        let txt = Record::new("example.com", 300, Type::TXT, text("\"Hello.\"")).unwrap();
        assert_eq!(txt.canonical(), txt);
        let srv = Record::new(
            "_sip._tcp.example.com",
            300,
            Type::SRV,
            text("0 5 5060 Sip.example.com."),
        );
        assert_eq!(srv.unwrap().canonical().data(), &text("0 5 5060 sip.example.com"));
        let naptr = Record::new(
            "example.com",
            300,
            Type::NAPTR,
            text("100 10 \"u\" \"E2U+sip\" \"!^.*$!sip:a b@example.com!\" Target.example.com."),
        );
        assert_eq!(
            naptr.unwrap().canonical().data(),
            &text("100 10 \"u\" \"E2U+sip\" \"!^.*$!sip:a b@example.com!\" target.example.com")
        );
        let root = Record::new(".", 300, Type::NS, text("a.root-servers.net.")).unwrap();
        assert_eq!(root.canonical().name(), ".");
    }

    #[test]
    fn records_display_in_diff_format() {
        let a = Record::new("example.com", 300, Type::A, text("192.0.2.1")).unwrap();
        assert_eq!(a.to_string(), "example.com 300 A 192.0.2.1");
        let mx = Rdata::Mx {
            priority: 10,
            exchange: "mail.example.com".into(),
        };
        let mx = Record::new("example.com", 3600, Type::MX, mx).unwrap();
        assert_eq!(mx.to_string(), "example.com 3600 MX 10 mail.example.com");
    }
}

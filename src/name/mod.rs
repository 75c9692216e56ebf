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

//! Implementation of the [`Name`] type for fully-qualified domain
//! names.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::iter::FusedIterator;
use std::str::FromStr;

use arrayvec::ArrayVec;

mod error;
mod wire;
pub use error::Error;

/// The maximum length of the uncompressed on-the-wire representation of
/// a domain name.
pub const MAX_WIRE_LEN: usize = 255;

/// The maximum length of a label in a domain name (not including the
/// octet that provides the length).
pub const MAX_LABEL_LEN: usize = 63;

////////////////////////////////////////////////////////////////////////
// NAME STRUCTURE                                                     //
////////////////////////////////////////////////////////////////////////

/// A fully-qualified domain name.
///
/// A `Name` stores the uncompressed on-the-wire representation defined
/// in [RFC 1035 § 3.1]: a sequence of length-prefixed labels ending
/// with the null (root) label. Every `Name` is therefore absolute; the
/// [`FromStr`] implementation rejects text without a trailing dot.
///
/// Comparison and hashing are ASCII-case-insensitive, as required for
/// DNS names ([RFC 4343]). The original case is kept for display and
/// for serialization, since [RFC 5936 § 3.4] asks AXFR servers to
/// preserve it.
///
/// [RFC 1035 § 3.1]: https://datatracker.ietf.org/doc/html/rfc1035#section-3.1
/// [RFC 4343]: https://datatracker.ietf.org/doc/html/rfc4343
/// [RFC 5936 § 3.4]: https://datatracker.ietf.org/doc/html/rfc5936#section-3.4
#[derive(Clone)]
pub struct Name {
    octets: Box<[u8]>,
}

impl Name {
    /// Returns the root name (`.`).
    pub fn root() -> Self {
        Self {
            octets: Box::new([0]),
        }
    }

    /// Returns the uncompressed on-the-wire representation of the name.
    pub fn wire_repr(&self) -> &[u8] {
        &self.octets
    }

    /// Returns whether this is the root name.
    pub fn is_root(&self) -> bool {
        self.octets.len() == 1
    }

    /// Returns the number of labels in the name, not counting the null
    /// label.
    pub fn label_count(&self) -> usize {
        self.labels().count()
    }

    /// Returns an iterator over the non-null labels of the name, from
    /// left to right.
    pub fn labels(&self) -> Labels<'_> {
        Labels {
            octets: &self.octets,
            offset: 0,
        }
    }

    /// Returns whether `self` is equal to or a subdomain of `other`.
    pub fn is_subdomain_of(&self, other: &Name) -> bool {
        self.suffix_offsets()
            .any(|offset| self.octets[offset..].eq_ignore_ascii_case(&other.octets))
    }

    /// Returns the offset of every suffix of the name in its on-the-wire
    /// representation, starting with the whole name (offset zero) and
    /// ending with the root label.
    pub(crate) fn suffix_offsets(&self) -> impl Iterator<Item = usize> + '_ {
        let mut next = Some(0);
        std::iter::from_fn(move || {
            let offset = next?;
            let len = self.octets[offset] as usize;
            next = if len == 0 {
                None
            } else {
                Some(offset + len + 1)
            };
            Some(offset)
        })
    }

    /// Constructs a name from its validated on-the-wire representation.
    fn from_validated(octets: &[u8]) -> Self {
        Self {
            octets: octets.into(),
        }
    }
}

/// An iterator over the labels of a [`Name`].
pub struct Labels<'a> {
    octets: &'a [u8],
    offset: usize,
}

impl<'a> Iterator for Labels<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let len = self.octets[self.offset] as usize;
        if len == 0 {
            None
        } else {
            let start = self.offset + 1;
            self.offset = start + len;
            Some(&self.octets[start..self.offset])
        }
    }
}

impl FusedIterator for Labels<'_> {}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        // Length octets are at most 63, so lowercasing cannot alter
        // them.
        self.octets.eq_ignore_ascii_case(&other.octets)
    }
}

impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for octet in self.octets.iter() {
            state.write_u8(octet.to_ascii_lowercase());
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TEXTUAL REPRESENTATION                                             //
////////////////////////////////////////////////////////////////////////

impl FromStr for Name {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(Error::StrEmpty);
        } else if s == "." {
            return Ok(Self::root());
        }

        // The first octet of each label is a placeholder for its length,
        // filled in when the label ends.
        let mut octets = ArrayVec::<u8, MAX_WIRE_LEN>::new();
        let mut label_start = 0;
        octets.push(0);

        let mut remaining_octets = s.as_bytes();
        while let Some(&octet) = remaining_octets.first() {
            if octet == b'\\' {
                let (value, consumed) = parse_escape(&remaining_octets[1..])?;
                octets.try_push(value).or(Err(Error::NameTooLong))?;
                remaining_octets = &remaining_octets[consumed + 1..];
            } else if octet == b'.' {
                let label_len = octets.len() - label_start - 1;
                if label_len == 0 {
                    return Err(Error::NullNonTerminal);
                } else if label_len > MAX_LABEL_LEN {
                    return Err(Error::LabelTooLong);
                }
                octets[label_start] = label_len as u8;
                label_start = octets.len();
                octets.try_push(0).or(Err(Error::NameTooLong))?;
                remaining_octets = &remaining_octets[1..];
            } else if !octet.is_ascii() {
                return Err(Error::StrNotAscii);
            } else {
                octets.try_push(octet).or(Err(Error::NameTooLong))?;
                remaining_octets = &remaining_octets[1..];
            }
        }

        // If the text ended with an unescaped dot, then the last
        // placeholder became the null label.
        if label_start + 1 == octets.len() {
            Ok(Self::from_validated(&octets))
        } else {
            Err(Error::NotFullyQualified)
        }
    }
}

/// Parses an escape sequence. We expect `remaining_octets` to start
/// with the octet immediately *after* the backslash that introduces the
/// escape sequence.
fn parse_escape(remaining_octets: &[u8]) -> Result<(u8, usize), Error> {
    match remaining_octets {
        [] => Err(Error::InvalidEscape),
        [a, b, c, ..] if a.is_ascii_digit() && b.is_ascii_digit() && c.is_ascii_digit() => {
            let value = 100 * (a - b'0') as usize + 10 * (b - b'0') as usize + (c - b'0') as usize;
            if value > 255 {
                Err(Error::InvalidEscape)
            } else {
                Ok((value as u8, 3))
            }
        }
        [a, ..] if a.is_ascii_digit() => Err(Error::InvalidEscape),
        [a, ..] => Ok((*a, 1)),
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_root() {
            return f.write_str(".");
        }
        for label in self.labels() {
            for &octet in label {
                match octet {
                    b'.' | b'\\' | b'"' | b'(' | b')' | b';' => {
                        write!(f, "\\{}", char::from(octet))?
                    }
                    0x21..=0x7e => write!(f, "{}", char::from(octet))?,
                    _ => write!(f, "\\{:03}", octet)?,
                }
            }
            f.write_str(".")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\"{}\"", self)
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

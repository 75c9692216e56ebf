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

//! Splitting of presentation-format RDATA into fields, and decoding of
//! `<character-string>`s.

use arrayvec::ArrayVec;

use super::Error;

/// A single whitespace-separated field of presentation-format RDATA.
///
/// The text is kept raw: escape sequences are not decoded until the
/// field is interpreted, since names and character strings decode them
/// differently.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Field<'a> {
    pub text: &'a str,
    pub quoted: bool,
}

/// An iterator over the [`Field`]s of presentation-format RDATA.
///
/// A quoted field runs to the next unescaped `"`, and may contain
/// whitespace. As in BIND, the closing quote ends the field even when
/// no whitespace follows it.
pub struct Fields<'a> {
    rest: &'a str,
}

impl<'a> Fields<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { rest: text }
    }

    /// Returns the next field.
    pub fn next_field(&mut self) -> Result<Option<Field<'a>>, Error> {
        self.rest = self.rest.trim_start();
        let bytes = self.rest.as_bytes();
        if bytes.is_empty() {
            return Ok(None);
        }

        if bytes[0] == b'"' {
            let mut escaped = false;
            for (index, c) in self.rest.char_indices().skip(1) {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    let text = &self.rest[1..index];
                    self.rest = &self.rest[index + 1..];
                    return Ok(Some(Field { text, quoted: true }));
                }
            }
            Err(Error::UnterminatedQuote)
        } else {
            let mut escaped = false;
            let end = self
                .rest
                .char_indices()
                .find(|&(_, c)| {
                    if escaped {
                        escaped = false;
                        false
                    } else if c == '\\' {
                        escaped = true;
                        false
                    } else {
                        c.is_ascii_whitespace()
                    }
                })
                .map_or(self.rest.len(), |(index, _)| index);
            let text = &self.rest[..end];
            self.rest = &self.rest[end..];
            Ok(Some(Field {
                text,
                quoted: false,
            }))
        }
    }

    /// Returns the next field, failing with [`Error::MissingField`] if
    /// there is none.
    pub fn expect(&mut self, what: &'static str) -> Result<Field<'a>, Error> {
        self.next_field()?.ok_or(Error::MissingField(what))
    }

    /// Parses the next field with its [`FromStr`](std::str::FromStr)
    /// implementation.
    pub fn parse<T: std::str::FromStr>(&mut self, what: &'static str) -> Result<T, Error> {
        self.expect(what)?
            .text
            .parse()
            .or(Err(Error::InvalidField(what)))
    }

    /// Succeeds only if no fields remain.
    pub fn finish(&mut self) -> Result<(), Error> {
        match self.next_field()? {
            Some(_) => Err(Error::ExtraData),
            None => Ok(()),
        }
    }

    /// Returns the remaining unparsed text, trimmed.
    pub fn remainder(&self) -> &'a str {
        self.rest.trim()
    }
}

/// Decodes a field as an [RFC 1035 § 3.3] `<character-string>`,
/// processing `\X` and `\DDD` escapes. The result is at most 255
/// octets.
///
/// [RFC 1035 § 3.3]: https://datatracker.ietf.org/doc/html/rfc1035#section-3.3
pub fn decode_character_string(field: Field) -> Result<ArrayVec<u8, 255>, Error> {
    let mut octets = ArrayVec::new();
    let mut remaining = field.text.as_bytes();
    while let Some((&octet, rest)) = remaining.split_first() {
        let (value, rest) = if octet == b'\\' {
            decode_escape(rest)?
        } else {
            (octet, rest)
        };
        octets
            .try_push(value)
            .or(Err(Error::CharacterStringTooLong))?;
        remaining = rest;
    }
    Ok(octets)
}

/// Decodes the escape sequence at the start of `rest`, which follows a
/// backslash.
fn decode_escape(rest: &[u8]) -> Result<(u8, &[u8]), Error> {
    match rest {
        [a, b, c, tail @ ..]
            if a.is_ascii_digit() && b.is_ascii_digit() && c.is_ascii_digit() =>
        {
            let value =
                100 * (a - b'0') as u16 + 10 * (b - b'0') as u16 + (c - b'0') as u16;
            u8::try_from(value)
                .map(|value| (value, tail))
                .or(Err(Error::InvalidEscape))
        }
        [a, ..] if a.is_ascii_digit() => Err(Error::InvalidEscape),
        [a, tail @ ..] => Ok((*a, tail)),
        [] => Err(Error::InvalidEscape),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(text: &str) -> Result<Vec<Field>, Error> {
        let mut fields = Fields::new(text);
        let mut collected = Vec::new();
        while let Some(field) = fields.next_field()? {
            collected.push(field);
        }
        Ok(collected)
    }

    #[test]
    fn fields_split_on_whitespace_and_quotes() {
        let fields = collect("  10 \"two words\"\"next\" tail\\ x ").unwrap();
        let texts: Vec<(&str, bool)> = fields.iter().map(|f| (f.text, f.quoted)).collect();
        assert_eq!(
            texts,
            [
                ("10", false),
                ("two words", true),
                ("next", true),
                ("tail\\ x", false)
            ]
        );
    }

    #[test]
    fn escaped_quotes_do_not_end_fields() {
        let fields = collect(r#""say \"hi\"""#).unwrap();
        assert_eq!(fields.len(), 1);
        let decoded = decode_character_string(fields[0]).unwrap();
        assert_eq!(decoded.as_slice(), b"say \"hi\"");
    }

    #[test]
    fn unterminated_quotes_are_rejected() {
        assert_eq!(collect("\"open"), Err(Error::UnterminatedQuote));
    }

    #[test]
    fn decimal_escapes_are_decoded() {
        let field = Field {
            text: "a\\000b\\255",
            quoted: false,
        };
        assert_eq!(
            decode_character_string(field).unwrap().as_slice(),
            b"a\x00b\xff"
        );
        let field = Field {
            text: "\\256",
            quoted: false,
        };
        assert_eq!(decode_character_string(field), Err(Error::InvalidEscape));
    }

    #[test]
    fn long_character_strings_are_rejected() {
        let long = "x".repeat(256);
        let field = Field {
            text: &long,
            quoted: true,
        };
        assert_eq!(
            decode_character_string(field),
            Err(Error::CharacterStringTooLong)
        );
    }
}

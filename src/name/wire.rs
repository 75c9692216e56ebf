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

//! Parsing of compressed on-the-wire names.

use arrayvec::ArrayVec;

use super::{Error, Name, MAX_LABEL_LEN, MAX_WIRE_LEN};

impl Name {
    /// Parses a possibly compressed name starting at index `start` of
    /// `octets`. Indices given in pointers are treated as indices of
    /// `octets`, so the intention is for an entire DNS message to be
    /// passed in `octets`.
    ///
    /// On success, returns the name and the number of octets it
    /// occupies at `start` (that is, up to and including the first
    /// pointer, if any).
    pub fn try_from_compressed(octets: &[u8], start: usize) -> Result<(Self, usize), Error> {
        let mut wire_repr = ArrayVec::<u8, MAX_WIRE_LEN>::new();
        let mut next_chunk = Some(start);
        let mut len_at_start = None;

        while let Some(chunk_start) = next_chunk {
            let mut index = chunk_start;
            loop {
                let len = *octets.get(index).ok_or(Error::UnexpectedEom)?;
                if len & 0xc0 == 0xc0 {
                    next_chunk = Some(parse_pointer(octets, chunk_start, index)?);
                    index += 2;
                    break;
                } else if len as usize > MAX_LABEL_LEN {
                    return Err(Error::LabelTooLong);
                }

                let end_of_label = index + len as usize + 1;
                let label = octets.get(index..end_of_label).ok_or(Error::UnexpectedEom)?;
                wire_repr
                    .try_extend_from_slice(label)
                    .or(Err(Error::NameTooLong))?;
                index = end_of_label;
                if len == 0 {
                    next_chunk = None;
                    break;
                }
            }
            len_at_start.get_or_insert(index - chunk_start);
        }

        // The loop only exits after setting len_at_start at least once.
        let consumed = len_at_start.unwrap_or_default();
        Ok((Self::from_validated(&wire_repr), consumed))
    }
}

/// Parses a pointer at `index` in `octets`. This also checks that the
/// pointer refers to an index *earlier* than the start of the chunk it
/// is in (`chunk_start`).
fn parse_pointer(octets: &[u8], chunk_start: usize, index: usize) -> Result<usize, Error> {
    let pointer_bytes = octets.get(index..index + 2).ok_or(Error::UnexpectedEom)?;
    let pointer = (u16::from_be_bytes([pointer_bytes[0], pointer_bytes[1]]) & !0xc000) as usize;
    if pointer >= chunk_start {
        // According to RFC 1035 § 4.1.4, pointers point to a *prior*
        // occurrence of the name. Importantly, this prevents loops.
        Err(Error::InvalidPointer)
    } else {
        Ok(pointer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncompressed_names_are_parsed() {
        let octets = b"junk\x07example\x03com\x00more";
        let (name, len) = Name::try_from_compressed(octets, 4).unwrap();
        assert_eq!(name, "example.com.".parse().unwrap());
        assert_eq!(len, 13);
    }

    #[test]
    fn pointers_are_followed() {
        let octets = b"\x07example\x03com\x00\x03www\xc0\x00";
        let (name, len) = Name::try_from_compressed(octets, 13).unwrap();
        assert_eq!(name, "www.example.com.".parse().unwrap());
        assert_eq!(len, 6);
    }

    #[test]
    fn forward_and_self_pointers_are_rejected() {
        assert_eq!(
            Name::try_from_compressed(b"\xc0\x00", 0),
            Err(Error::InvalidPointer)
        );
        assert_eq!(
            Name::try_from_compressed(b"\x01a\xc0\x05\x00\x00", 0),
            Err(Error::InvalidPointer)
        );
    }

    #[test]
    fn truncated_names_are_rejected() {
        assert_eq!(
            Name::try_from_compressed(b"\x07exam", 0),
            Err(Error::UnexpectedEom)
        );
        assert_eq!(
            Name::try_from_compressed(b"\x03com", 0),
            Err(Error::UnexpectedEom)
        );
        assert_eq!(
            Name::try_from_compressed(b"\xc0", 0),
            Err(Error::UnexpectedEom)
        );
    }
}

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

//! Encoding of LOC RDATA ([RFC 1876]).
//!
//! The presentation format is
//!
//! ```text
//! d1 [m1 [s1]] {"N"|"S"} d2 [m2 [s2]] {"E"|"W"} alt["m"] [siz["m"] [hp["m"] [vp["m"]]]]
//! ```
//!
//! [RFC 1876]: https://datatracker.ietf.org/doc/html/rfc1876

use super::{Error, Fields};

/// The equator and prime meridian are encoded as 2^31.
const ANGLE_ORIGIN: i64 = 1 << 31;

/// Altitudes are encoded relative to 100,000 m below the WGS 84
/// reference spheroid, in centimeters.
const ALTITUDE_ORIGIN_CM: i64 = 10_000_000;

const DEFAULT_SIZE_CM: u64 = 100;
const DEFAULT_HORIZONTAL_PRECISION_CM: u64 = 1_000_000;
const DEFAULT_VERTICAL_PRECISION_CM: u64 = 1_000;

/// Encodes LOC RDATA, consuming its fields.
pub fn encode(fields: &mut Fields) -> Result<[u8; 16], Error> {
    let latitude = parse_angle(fields, 90, ('N', 'S'), "latitude")?;
    let longitude = parse_angle(fields, 180, ('E', 'W'), "longitude")?;
    let altitude = parse_meters(fields.expect("altitude")?.text, "altitude")?;
    let altitude = u32::try_from(altitude + ALTITUDE_ORIGIN_CM)
        .or(Err(Error::InvalidField("altitude")))?;

    let mut precisions = [
        DEFAULT_SIZE_CM,
        DEFAULT_HORIZONTAL_PRECISION_CM,
        DEFAULT_VERTICAL_PRECISION_CM,
    ];
    for (precision, what) in precisions
        .iter_mut()
        .zip(["size", "horizontal precision", "vertical precision"])
    {
        match fields.next_field()? {
            Some(field) => {
                let cm = parse_meters(field.text, what)?;
                *precision = u64::try_from(cm).or(Err(Error::InvalidField(what)))?;
            }
            None => break,
        }
    }

    let mut octets = [0; 16];
    octets[0] = 0; // VERSION
    octets[1] = encode_precision(precisions[0]);
    octets[2] = encode_precision(precisions[1]);
    octets[3] = encode_precision(precisions[2]);
    octets[4..8].copy_from_slice(&latitude.to_be_bytes());
    octets[8..12].copy_from_slice(&longitude.to_be_bytes());
    octets[12..16].copy_from_slice(&altitude.to_be_bytes());
    Ok(octets)
}

/// Parses an angle given as degrees, optional minutes, optional
/// seconds, and a hemisphere letter, returning its encoding in
/// thousandths of a second of arc offset from 2^31.
fn parse_angle(
    fields: &mut Fields,
    max_degrees: i64,
    (positive, negative): (char, char),
    what: &'static str,
) -> Result<u32, Error> {
    let mut parts = [0i64; 3];
    let mut n_parts = 0;
    let sign = loop {
        let field = fields.expect(what)?;
        if field.text.eq_ignore_ascii_case(&positive.to_string()) {
            break 1;
        } else if field.text.eq_ignore_ascii_case(&negative.to_string()) {
            break -1;
        } else if n_parts == 3 {
            return Err(Error::InvalidField(what));
        }
        parts[n_parts] = if n_parts == 2 {
            parse_decimal(field.text, 3).ok_or(Error::InvalidField(what))?
        } else {
            field.text.parse().or(Err(Error::InvalidField(what)))?
        };
        n_parts += 1;
    };

    let [degrees, minutes, milliseconds] = parts;
    if n_parts == 0
        || degrees > max_degrees
        || minutes >= 60
        || milliseconds >= 60_000
        || degrees < 0
        || minutes < 0
        || milliseconds < 0
    {
        return Err(Error::InvalidField(what));
    }
    let thousandths = ((degrees * 60 + minutes) * 60) * 1000 + milliseconds;
    if thousandths > max_degrees * 3_600_000 {
        return Err(Error::InvalidField(what));
    }
    u32::try_from(ANGLE_ORIGIN + sign * thousandths).or(Err(Error::InvalidField(what)))
}

/// Parses a distance in meters (with an optional `m` suffix) into
/// centimeters.
fn parse_meters(text: &str, what: &'static str) -> Result<i64, Error> {
    let text = text.strip_suffix(['m', 'M']).unwrap_or(text);
    parse_decimal(text, 2).ok_or(Error::InvalidField(what))
}

/// Parses a decimal number with at most `scale` fractional digits,
/// returning it multiplied by 10^`scale`.
fn parse_decimal(text: &str, scale: u32) -> Option<i64> {
    let (negative, text) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (whole, fraction) = text.split_once('.').unwrap_or((text, ""));
    if whole.is_empty()
        || fraction.len() > scale as usize
        || !whole.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit())
    {
        return None;
    }
    let whole: i64 = whole.parse().ok()?;
    let fraction: i64 = if fraction.is_empty() {
        0
    } else {
        fraction.parse::<i64>().ok()? * 10i64.pow(scale - fraction.len() as u32)
    };
    let value = whole.checked_mul(10i64.pow(scale))?.checked_add(fraction)?;
    Some(if negative { -value } else { value })
}

/// Encodes a size or precision in centimeters as the mantissa/exponent
/// octet of RFC 1876 § 2. Values are truncated to one significant
/// digit, and saturate at 9e9 cm.
fn encode_precision(mut cm: u64) -> u8 {
    let mut exponent = 0;
    while cm >= 10 && exponent < 9 {
        cm /= 10;
        exponent += 1;
    }
    ((cm.min(9) as u8) << 4) | exponent
}

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

//! Error types for zone text parsing.
//!
//! All syntax errors carry an [`ErrorKind`], which gives the error
//! message, and the line on which the offending entry starts.

use std::fmt;

use crate::name;
use crate::rr::MalformedRecord;

/// An error signaling that zone text could not be parsed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Error {
    line: usize,
    kind: ErrorKind,
}

impl Error {
    pub(super) fn new(line: usize, kind: ErrorKind) -> Self {
        Self { line, kind }
    }

    /// Returns the line at which the error occurred.
    pub fn line(&self) -> usize {
        self.line
    }

    /// Returns the kind of error that occurred.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} at line {}", self.kind, self.line)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self.kind {
            ErrorKind::InvalidName(ref e) => Some(e),
            ErrorKind::InvalidRecord(ref e) => Some(e),
            _ => None,
        }
    }
}

/// A result type for zone text parsing.
pub type Result<T> = std::result::Result<T, Error>;

/// Kinds of zone text syntax errors.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum ErrorKind {
    AtWhenOriginNotSet,
    EmptyOwnerWithNoPrevious,
    EofBeforeCloseParen,
    EofInEscape,
    ExpectedEol,
    ExpectedMxData,
    ExpectedName,
    ExpectedRdata,
    ExpectedTtl,
    ExpectedType,
    IncludeNotSupported,
    InvalidName(name::Error),
    InvalidPriority,
    InvalidRecord(MalformedRecord),
    InvalidTtl,
    NestedParens,
    PqdnWhenOriginNotSet,
    UnknownDirective(String),
    UnmatchedCloseParen,
    UnsupportedClass(String),
    UnsupportedType(String),
    UnterminatedQuote,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::AtWhenOriginNotSet => f.write_str("cannot use @ when no origin is set"),
            Self::EmptyOwnerWithNoPrevious => {
                f.write_str("the owner cannot be empty when no previous owner is available")
            }
            Self::EofBeforeCloseParen => {
                f.write_str("reached end of input before close parenthesis")
            }
            Self::EofInEscape => f.write_str("reached end of input in escape sequence"),
            Self::ExpectedEol => f.write_str("expected the end of the line"),
            Self::ExpectedMxData => f.write_str("expected an MX priority and exchange"),
            Self::ExpectedName => f.write_str("expected a domain name"),
            Self::ExpectedRdata => f.write_str("expected record data"),
            Self::ExpectedTtl => f.write_str("expected a TTL"),
            Self::ExpectedType => f.write_str("expected an RR type"),
            Self::IncludeNotSupported => f.write_str("$INCLUDE is not supported"),
            Self::InvalidName(e) => write!(f, "invalid name: {}", e),
            Self::InvalidPriority => f.write_str("invalid MX priority"),
            Self::InvalidRecord(e) => write!(f, "invalid record: {}", e),
            Self::InvalidTtl => f.write_str("invalid TTL"),
            Self::NestedParens => f.write_str("nested parentheses"),
            Self::PqdnWhenOriginNotSet => {
                f.write_str("cannot use a partially qualified domain name when no origin is set")
            }
            Self::UnknownDirective(directive) => write!(f, "unknown directive {}", directive),
            Self::UnmatchedCloseParen => f.write_str("unmatched close parenthesis"),
            Self::UnsupportedClass(class) => write!(f, "unsupported class {}", class),
            Self::UnsupportedType(rr_type) => write!(f, "unknown or unsupported type {}", rr_type),
            Self::UnterminatedQuote => f.write_str("unterminated quoted string"),
        }
    }
}

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

//! The [`Reader`] structure.
//!
//! See the [`zone_file` module-level documentation](`super`) for how
//! the [`Reader`] is used.

use std::iter::Peekable;
use std::str::Chars;

use super::error::{Error, ErrorKind, Result};

/// Splits zone text into entries.
///
/// An entry is one logical line: a physical line, extended across
/// newlines by parentheses. The [`Reader`] removes comments and
/// parentheses and splits the entry into fields. Quoted strings and
/// escape sequences are kept in their fields exactly as written, since
/// record data is stored in presentation format; the [`Reader`] only
/// makes sure that quoted or escaped whitespace does not end a field.
pub(super) struct Reader<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
}

/// An entry read by a [`Reader`].
#[derive(Debug, Eq, PartialEq)]
pub(super) struct Entry {
    /// The line on which the entry starts.
    pub line: usize,

    /// Whether the entry starts with whitespace, which means that the
    /// owner was omitted.
    pub blank_owner: bool,

    pub fields: Vec<String>,
}

impl<'a> Reader<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            chars: text.chars().peekable(),
            line: 1,
        }
    }

    /// Reads the next entry, skipping lines with no fields. Returns
    /// [`None`] at the end of the input.
    pub fn next_entry(&mut self) -> Result<Option<Entry>> {
        while let Some(&first) = self.chars.peek() {
            let line = self.line;
            let blank_owner = first == ' ' || first == '\t';
            let fields = self.read_fields()?;
            if !fields.is_empty() {
                return Ok(Some(Entry {
                    line,
                    blank_owner,
                    fields,
                }));
            }
        }
        Ok(None)
    }

    /// Reads the fields up to the end of the current entry.
    fn read_fields(&mut self) -> Result<Vec<String>> {
        let mut fields = Vec::new();
        let mut field = String::new();
        let mut paren_line = None;

        while let Some(c) = self.chars.next() {
            match c {
                '\n' => {
                    self.line += 1;
                    finish_field(&mut field, &mut fields);
                    if paren_line.is_none() {
                        return Ok(fields);
                    }
                }
                ' ' | '\t' | '\r' => finish_field(&mut field, &mut fields),
                ';' => {
                    finish_field(&mut field, &mut fields);
                    while self.chars.next_if(|&c| c != '\n').is_some() {}
                }
                '(' => {
                    finish_field(&mut field, &mut fields);
                    if paren_line.is_some() {
                        return Err(Error::new(self.line, ErrorKind::NestedParens));
                    }
                    paren_line = Some(self.line);
                }
                ')' => {
                    finish_field(&mut field, &mut fields);
                    if paren_line.take().is_none() {
                        return Err(Error::new(self.line, ErrorKind::UnmatchedCloseParen));
                    }
                }
                '"' => self.read_quoted(&mut field)?,
                '\\' => {
                    field.push('\\');
                    self.read_escaped(&mut field)?;
                }
                other => field.push(other),
            }
        }

        if let Some(line) = paren_line {
            return Err(Error::new(line, ErrorKind::EofBeforeCloseParen));
        }
        finish_field(&mut field, &mut fields);
        Ok(fields)
    }

    /// Reads the rest of a quoted string into `field`, including both
    /// quotation marks. The opening mark has already been consumed.
    fn read_quoted(&mut self, field: &mut String) -> Result<()> {
        let start = self.line;
        field.push('"');
        loop {
            match self.chars.next() {
                Some('"') => {
                    field.push('"');
                    return Ok(());
                }
                Some('\\') => {
                    field.push('\\');
                    self.read_escaped(field)?;
                }
                Some('\n') | None => return Err(Error::new(start, ErrorKind::UnterminatedQuote)),
                Some(other) => field.push(other),
            }
        }
    }

    /// Reads the character following a backslash into `field`.
    fn read_escaped(&mut self, field: &mut String) -> Result<()> {
        match self.chars.next() {
            Some(c) => {
                if c == '\n' {
                    self.line += 1;
                }
                field.push(c);
                Ok(())
            }
            None => Err(Error::new(self.line, ErrorKind::EofInEscape)),
        }
    }
}

fn finish_field(field: &mut String, fields: &mut Vec<String>) {
    if !field.is_empty() {
        fields.push(std::mem::take(field));
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

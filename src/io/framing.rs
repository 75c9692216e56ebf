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

//! Length-prefixed framing of DNS messages over stream transports
//! ([RFC 1035 § 4.2.2]).
//!
//! Each message is preceded by a two-octet, big-endian length field.
//!
//! [RFC 1035 § 4.2.2]: https://datatracker.ietf.org/doc/html/rfc1035#section-4.2.2

use std::fmt;
use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::message::header::MAX_MESSAGE_SIZE;

/// Reads one framed DNS message and returns its payload.
///
/// Reads are repeated until the declared number of octets has arrived.
/// If the peer closes the stream first, this fails with
/// [`FrameError::TruncatedMessage`].
pub async fn read_message<R>(reader: &mut R) -> Result<Vec<u8>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut length = [0; 2];
    let received = read_fully(reader, &mut length).await?;
    if received < 2 {
        return Err(FrameError::TruncatedMessage {
            expected: 2,
            received,
        });
    }

    let expected = u16::from_be_bytes(length) as usize;
    let mut payload = vec![0; expected];
    let received = read_fully(reader, &mut payload).await?;
    if received < expected {
        return Err(FrameError::TruncatedMessage {
            expected: expected + 2,
            received: received + 2,
        });
    }
    Ok(payload)
}

/// Writes `payload` preceded by its length. Payloads longer than
/// 65,535 octets are rejected with [`FrameError::MessageTooLong`]
/// before anything is written.
pub async fn write_message<W>(writer: &mut W, payload: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(payload)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Returns `payload` preceded by its length.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(FrameError::MessageTooLong(payload.len()));
    }
    let mut frame = Vec::with_capacity(payload.len() + 2);
    frame.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Reads until `buf` is full or the stream ends, returning the number
/// of octets read.
async fn read_fully<R>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut n_read = 0;
    while n_read < buf.len() {
        match reader.read(&mut buf[n_read..]).await? {
            0 => break,
            n => n_read += n,
        }
    }
    Ok(n_read)
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error encountered while reading or writing a framed message.
#[derive(Debug)]
pub enum FrameError {
    /// The stream ended early. Both counts include the two-octet length
    /// field; `expected` is 2 if the length field itself was cut off.
    TruncatedMessage { expected: usize, received: usize },

    /// The payload (of the given length) does not fit in a frame.
    MessageTooLong(usize),

    Io(io::Error),
}

impl From<io::Error> for FrameError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::TruncatedMessage { expected, received } => write!(
                f,
                "truncated message: expected {} octets, received {}",
                expected, received
            ),
            Self::MessageTooLong(len) => write!(f, "message of {} octets is too long", len),
            Self::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for FrameError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn framed_payload_is_returned_byte_for_byte() {
        let payload: Vec<u8> = (0..=255).cycle().take(1000).collect();
        let mut buf = Vec::new();
        write_message(&mut buf, &payload).await.unwrap();
        assert_eq!(&buf[..2], &[0x03, 0xe8]);

        let mut stream = buf.as_slice();
        assert_eq!(read_message(&mut stream).await.unwrap(), payload);
        assert!(stream.is_empty());
    }

    #[tokio::test]
    async fn reads_across_short_chunks() {
        let (mut client, mut server) = tokio::io::duplex(4);
        let writer = tokio::spawn(async move {
            write_message(&mut client, b"hello, world").await.unwrap();
        });
        assert_eq!(read_message(&mut server).await.unwrap(), b"hello, world");
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn early_close_is_a_truncated_message() {
        let mut stream: &[u8] = b"\x00\x10abc";
        match read_message(&mut stream).await {
            Err(FrameError::TruncatedMessage { expected, received }) => {
                assert_eq!(expected, 18);
                assert_eq!(received, 5);
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let mut stream: &[u8] = b"\x00";
        assert!(matches!(
            read_message(&mut stream).await,
            Err(FrameError::TruncatedMessage {
                expected: 2,
                received: 1
            })
        ));
    }

    #[test]
    fn oversized_payloads_are_rejected() {
        let payload = vec![0; MAX_MESSAGE_SIZE + 1];
        assert!(matches!(
            encode_frame(&payload),
            Err(FrameError::MessageTooLong(65536))
        ));
        assert_eq!(encode_frame(&payload[1..]).unwrap().len(), 65537);
    }
}

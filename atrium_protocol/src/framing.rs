// Length-delimited message framing over TCP.
//
// Provides a simple wire format for `message.rs` types: a 4-byte big-endian
// length prefix followed by a JSON-serialized message payload. Both
// `write_message` and `read_message` operate on raw `&[u8]` / `Vec<u8>` —
// the caller handles JSON serialization separately, keeping this module
// format-agnostic.
//
// The length prefix is what lets the relay survive a malformed payload:
// the frame boundary is known before the payload is parsed, so one bad
// JSON body never desynchronizes the stream.
//
// A `MAX_MESSAGE_SIZE` constant (64 KB) protects against unbounded
// allocation from malformed or malicious length prefixes. Relay messages
// are small — the largest is a member snapshot of a crowded room.

use std::io::{self, Read, Write};

/// Maximum allowed message size (64 KB). Protects against unbounded
/// allocation from malformed length prefixes. A member snapshot of a few
/// hundred players fits with room to spare.
pub const MAX_MESSAGE_SIZE: u32 = 64 * 1024;

/// Write a length-delimited message: 4-byte big-endian length, then payload.
pub fn write_message<W: Write>(writer: &mut W, msg: &[u8]) -> io::Result<()> {
    let len = msg.len();
    if len > MAX_MESSAGE_SIZE as usize {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("message too large: {len} bytes (max {MAX_MESSAGE_SIZE})"),
        ));
    }
    #[expect(clippy::cast_possible_truncation)]
    let len_bytes = (len as u32).to_be_bytes();
    writer.write_all(&len_bytes)?;
    writer.write_all(msg)?;
    writer.flush()?;
    Ok(())
}

/// Read a length-delimited message: 4-byte big-endian length, then payload.
///
/// Returns `UnexpectedEof` if the stream closes cleanly before or during a
/// message. Returns `InvalidData` if the length exceeds `MAX_MESSAGE_SIZE`.
pub fn read_message<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("message too large: {len} bytes (max {MAX_MESSAGE_SIZE})"),
        ));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

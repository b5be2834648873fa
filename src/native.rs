// Copyright (C) 2024-2025 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of journal-tracing.
//
// journal-tracing is free software: you can redistribute it and/or modify it under the terms of the
// GNU General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// mpdpopm is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even
// the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details.
//
// You should have received a copy of the GNU General Public License along with mpdpopm.  If not,
// see <http://www.gnu.org/licenses/>.

//! Native journal protocol encoding.
//!
//! The journal accepts entries on its well-known datagram socket in its [native] format: one
//! field per line as `NAME=value\n`, except that a value containing a newline is framed in the
//! binary form-- the field name, a newline, the value's length as a 64-bit little-endian
//! integer, the value bytes, and a trailing newline. The daemon supplies the trusted fields
//! (timestamp, hostname, pid & friends) itself; an entry carries only what the sender asserts.
//!
//! [native]: https://systemd.io/JOURNAL_NATIVE_PROTOCOL/
//!
//! [`encode_entry`] lays down `PRIORITY` & `MESSAGE` first, then the converted fields. The
//! message travels like any other field; it is not subject to the converter's sanitization, the
//! name `MESSAGE` being the journal's own.

use crate::convert::Conversion;

use bytes::BufMut;

/// Encode one converted record as a native-protocol datagram payload.
pub fn encode_entry(conversion: &Conversion) -> Vec<u8> {
    let mut buf: Vec<u8> = Vec::with_capacity(
        64 + conversion.message.len()
            + conversion
                .fields
                .iter()
                .map(|(k, v)| k.len() + v.len() + 2)
                .sum::<usize>(),
    );
    append_field(&mut buf, "PRIORITY", &(conversion.priority as u8).to_string());
    append_field(&mut buf, "MESSAGE", &conversion.message);
    for (name, value) in &conversion.fields {
        append_field(&mut buf, name, value);
    }
    buf
}

/// Append one field, choosing the textual or binary framing as the value demands.
pub fn append_field(buf: &mut Vec<u8>, name: &str, value: &str) {
    if value.contains('\n') {
        buf.put_slice(name.as_bytes());
        buf.put_u8(b'\n');
        buf.put_u64_le(value.len() as u64);
        buf.put_slice(value.as_bytes());
        buf.put_u8(b'\n');
    } else {
        buf.put_slice(name.as_bytes());
        buf.put_u8(b'=');
        buf.put_slice(value.as_bytes());
        buf.put_u8(b'\n');
    }
}

/// Decode a native-protocol payload back into its fields. The inverse of [`encode_entry`], for
/// assertions; lossy on malformed input.
#[cfg(test)]
pub(crate) fn decode_entry(buf: &[u8]) -> std::collections::HashMap<String, String> {
    let mut fields = std::collections::HashMap::new();
    let mut i = 0;
    while i < buf.len() {
        let nl = match buf[i..].iter().position(|&b| b == b'\n') {
            Some(n) => i + n,
            None => break,
        };
        let line = &buf[i..nl];
        if let Some(eq) = line.iter().position(|&b| b == b'=') {
            fields.insert(
                String::from_utf8_lossy(&line[..eq]).into_owned(),
                String::from_utf8_lossy(&line[eq + 1..]).into_owned(),
            );
            i = nl + 1;
        } else {
            // binary framing: NAME \n u64-LE length, value bytes, \n
            let name = String::from_utf8_lossy(line).into_owned();
            let mut len = [0_u8; 8];
            len.copy_from_slice(&buf[nl + 1..nl + 9]);
            let len = u64::from_le_bytes(len) as usize;
            let value = String::from_utf8_lossy(&buf[nl + 9..nl + 9 + len]).into_owned();
            fields.insert(name, value);
            i = nl + 9 + len + 1;
        }
    }
    fields
}

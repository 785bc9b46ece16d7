//! NetworkTables v3 handshake and streaming parser (§4.5).
//!
//! The inbound message stream has no outer length prefix, so the parser
//! consumes as many complete messages as it can and reports how many bytes
//! it used; the caller keeps the remainder as carry for the next read.

use crate::codec::{decode_uleb_string, encode_uleb};
use crate::state::KeyedStore;

/// A live NetworkTables entry, keyed by the RIO-assigned id.
#[derive(Debug, Clone, PartialEq)]
pub struct NtEntry {
    pub key: String,
    pub value_type: u8,
    pub value: String,
}

pub type NtEntries = KeyedStore<u16, NtEntry>;

#[derive(Debug, Clone, PartialEq)]
pub enum NtEvent {
    Status(String),
    Entry { key: String, value: String },
    Delete { key: String },
    Clear,
}

/// Builds the client-hello payload: `{0x01, 0x03, 0x00, ulebstring(identity)}`.
pub fn client_hello(identity: &str) -> Vec<u8> {
    let mut buf = vec![0x01, 0x03, 0x00];
    buf.extend(encode_uleb(identity.len() as u64));
    buf.extend_from_slice(identity.as_bytes());
    buf
}

/// Consumes as many complete messages from `data` as possible.
///
/// Returns the events produced and the number of bytes consumed; the caller
/// should retain `data[consumed..]` as carry. A keepalive byte (`0x00`) is
/// skipped with no event.
pub fn parse_stream(data: &[u8], entries: &NtEntries) -> (Vec<NtEvent>, usize) {
    let mut events = Vec::new();
    let mut i = 0usize;
    while i < data.len() {
        if data[i] == 0x00 {
            i += 1;
            continue;
        }
        match parse_message(&data[i..], entries) {
            Some((msg_events, used)) => {
                events.extend(msg_events);
                i += used;
            }
            None => break,
        }
    }
    (events, i)
}

/// Parses a single message at the front of `data`. Returns `None` if the
/// message is incomplete (more bytes needed) rather than malformed in a way
/// that would desync the stream; unknown message types advance by one byte.
fn parse_message(data: &[u8], entries: &NtEntries) -> Option<(Vec<NtEvent>, usize)> {
    let msg_type = *data.first()?;
    let mut idx = 1usize;

    match msg_type {
        0x02 => {
            let ver = *data.get(idx..idx + 2)?;
            idx += 2;
            let version = u16::from_be_bytes([ver[0], ver[1]]);
            Some((
                vec![NtEvent::Status(format!("Proto unsupported ({version})"))],
                idx,
            ))
        }
        0x10 => {
            let (key, used) = decode_uleb_string(&data[idx..])?;
            idx += used;
            let value_type = *data.get(idx)?;
            idx += 1;
            let id = u16::from_be_bytes([*data.get(idx)?, *data.get(idx + 1)?]);
            idx += 2;
            let _seq = u16::from_be_bytes([*data.get(idx)?, *data.get(idx + 1)?]);
            idx += 2;
            let _persistent = *data.get(idx)?;
            idx += 1;
            let (value, used) = decode_value(value_type, &data[idx..])?;
            idx += used;

            entries.set(
                id,
                NtEntry {
                    key: key.clone(),
                    value_type,
                    value: value.clone(),
                },
            );
            Some((vec![NtEvent::Entry { key, value }], idx))
        }
        0x11 => {
            let id = u16::from_be_bytes([*data.get(idx)?, *data.get(idx + 1)?]);
            idx += 2;
            let _seq = u16::from_be_bytes([*data.get(idx)?, *data.get(idx + 1)?]);
            idx += 2;
            let value_type = *data.get(idx)?;
            idx += 1;
            let (value, used) = decode_value(value_type, &data[idx..])?;
            idx += used;

            let events = if let Some(mut entry) = entries.get(&id) {
                entry.value_type = value_type;
                entry.value = value.clone();
                let key = entry.key.clone();
                entries.set(id, entry);
                vec![NtEvent::Entry { key, value }]
            } else {
                Vec::new()
            };
            Some((events, idx))
        }
        0x13 => {
            let id = u16::from_be_bytes([*data.get(idx)?, *data.get(idx + 1)?]);
            idx += 2;
            let events = if let Some(entry) = entries.remove(&id) {
                vec![NtEvent::Delete { key: entry.key }]
            } else {
                Vec::new()
            };
            Some((events, idx))
        }
        0x14 => {
            if data.len() < idx + 4 {
                return None;
            }
            idx += 4;
            entries.clear();
            Some((vec![NtEvent::Clear], idx))
        }
        0x04 => {
            let _server_flag = *data.get(idx)?;
            idx += 1;
            let (identity, used) = decode_uleb_string(&data[idx..])?;
            idx += used;
            let events = if identity.is_empty() {
                Vec::new()
            } else {
                vec![NtEvent::Status(format!("Connected ({identity})"))]
            };
            Some((events, idx))
        }
        _ => Some((Vec::new(), 1)),
    }
}

/// Decodes a typed NT value, returning its rendered string and bytes used.
fn decode_value(value_type: u8, data: &[u8]) -> Option<(String, usize)> {
    match value_type {
        0x00 => {
            let b = *data.first()?;
            Some(((if b == 0x01 { "true" } else { "false" }).to_string(), 1))
        }
        0x01 => {
            let bytes: [u8; 8] = data.get(0..8)?.try_into().ok()?;
            Some((format!("{:.4}", f64::from_be_bytes(bytes)), 8))
        }
        0x02 => decode_uleb_string(data),
        0x10 => {
            let count = *data.first()? as usize;
            if data.len() < 1 + count {
                return None;
            }
            Some((format!("bool[{count}]"), 1 + count))
        }
        0x11 => {
            let count = *data.first()? as usize;
            let need = 1 + 8 * count;
            if data.len() < need {
                return None;
            }
            Some((format!("double[{count}]"), need))
        }
        0x12 => {
            let count = *data.first()? as usize;
            let mut idx = 1usize;
            for _ in 0..count {
                let (_, used) = decode_uleb_string(&data[idx..])?;
                idx += used;
            }
            Some((format!("string[{count}]"), idx))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_hello_layout() {
        let hello = client_hello("ds");
        assert_eq!(&hello[0..3], &[0x01, 0x03, 0x00]);
        assert_eq!(hello[3], 2); // uleb length of "ds"
        assert_eq!(&hello[4..], b"ds");
    }

    #[test]
    fn keepalive_bytes_are_skipped_without_events() {
        let entries = NtEntries::default();
        let (events, consumed) = parse_stream(&[0x00, 0x00, 0x00], &entries);
        assert!(events.is_empty());
        assert_eq!(consumed, 3);
    }

    #[test]
    fn entry_assign_then_update_tracks_key() {
        let entries = NtEntries::default();
        let mut assign = vec![0x10];
        assign.push(1); // uleb key length
        assign.push(b'x');
        assign.push(0x01); // type double
        assign.extend_from_slice(&7u16.to_be_bytes()); // id
        assign.extend_from_slice(&0u16.to_be_bytes()); // seq
        assign.push(0); // persistent
        assign.extend_from_slice(&1.5f64.to_be_bytes());

        let (events, used) = parse_stream(&assign, &entries);
        assert_eq!(used, assign.len());
        assert_eq!(
            events,
            vec![NtEvent::Entry {
                key: "x".to_string(),
                value: "1.5000".to_string()
            }]
        );

        let mut update = vec![0x11];
        update.extend_from_slice(&7u16.to_be_bytes());
        update.extend_from_slice(&1u16.to_be_bytes());
        update.push(0x01);
        update.extend_from_slice(&2.25f64.to_be_bytes());

        let (events, used) = parse_stream(&update, &entries);
        assert_eq!(used, update.len());
        assert_eq!(
            events,
            vec![NtEvent::Entry {
                key: "x".to_string(),
                value: "2.2500".to_string()
            }]
        );
    }

    #[test]
    fn entry_delete_emits_prior_key() {
        let entries = NtEntries::default();
        entries.set(
            9,
            NtEntry {
                key: "y".into(),
                value_type: 0x00,
                value: "true".into(),
            },
        );
        let mut delete = vec![0x13];
        delete.extend_from_slice(&9u16.to_be_bytes());
        let (events, used) = parse_stream(&delete, &entries);
        assert_eq!(used, delete.len());
        assert_eq!(events, vec![NtEvent::Delete { key: "y".to_string() }]);
        assert!(entries.get(&9).is_none());
    }

    #[test]
    fn clear_entries_drops_everything() {
        let entries = NtEntries::default();
        entries.set(
            1,
            NtEntry {
                key: "a".into(),
                value_type: 0,
                value: "true".into(),
            },
        );
        let clear = vec![0x14, 0, 0, 0, 0];
        let (events, used) = parse_stream(&clear, &entries);
        assert_eq!(used, clear.len());
        assert_eq!(events, vec![NtEvent::Clear]);
        assert!(entries.is_empty());
    }

    #[test]
    fn truncated_message_is_left_as_carry() {
        let entries = NtEntries::default();
        // entry-assign with a key but nothing else
        let partial = vec![0x10, 1, b'x'];
        let (events, consumed) = parse_stream(&partial, &entries);
        assert!(events.is_empty());
        assert_eq!(consumed, 0);
    }

    #[test]
    fn unknown_message_type_advances_one_byte() {
        let entries = NtEntries::default();
        let (events, consumed) = parse_stream(&[0xFF, 0x00], &entries);
        assert!(events.is_empty());
        assert_eq!(consumed, 2);
    }
}

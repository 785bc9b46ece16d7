//! RIO→DS TCP frame parser (§4.4.2).
//!
//! The wire format is ambiguous: each frame is prefixed by either a 2-byte
//! big-endian length or a 1-byte length, and nothing in the stream says
//! which. The parser tries the 2-byte interpretation first and falls back
//! to the 1-byte one, exactly like the upstream Java/roboRIO side does.

use crate::codec::{filter_ascii, u16_be};

#[derive(Debug, Clone, PartialEq)]
pub enum TcpEvent {
    Log { level: &'static str, message: String },
    Stat { key: String, value: String },
}

/// Consumes as many complete frames as `data` holds, returning the emitted
/// events and the number of bytes consumed. The caller should keep
/// `data[consumed..]` as carry for the next read.
pub fn parse_frames(data: &[u8]) -> (Vec<TcpEvent>, usize) {
    let mut events = Vec::new();
    let mut i = 0usize;

    while i < data.len() {
        if data.len() - i < 2 {
            break;
        }

        let two_byte_len = u16_be(&data[i..i + 2]) as usize;
        if two_byte_len > 0 && data.len() - i >= two_byte_len + 2 {
            let tag = data[i + 2];
            let payload = &data[i + 3..i + 2 + two_byte_len];
            handle_tag(tag, payload, &mut events);
            i += 2 + two_byte_len;
            continue;
        }

        let one_byte_len = data[i] as usize;
        if one_byte_len == 0 || data.len() - i < one_byte_len + 1 {
            break;
        }
        let tag = data[i + 1];
        let payload = &data[i + 2..i + 1 + one_byte_len];
        handle_tag(tag, payload, &mut events);
        i += 1 + one_byte_len;
    }

    (events, i)
}

fn handle_tag(tag: u8, payload: &[u8], events: &mut Vec<TcpEvent>) {
    match tag {
        0x00 => {
            if !payload.is_empty() {
                events.push(TcpEvent::Log {
                    level: "info",
                    message: filter_ascii(payload).trim().to_string(),
                });
            }
        }
        0x01 => {
            if !payload.is_empty() {
                events.push(TcpEvent::Log {
                    level: "info",
                    message: format!("Usage: {}", filter_ascii(payload).trim()),
                });
            }
        }
        0x0B => {
            let (level, message) = parse_error_message(payload);
            events.push(TcpEvent::Log { level, message });
        }
        0x0C => {
            if payload.len() > 6 {
                let text = filter_ascii(&payload[6..]).trim().to_string();
                if !text.is_empty() {
                    events.push(TcpEvent::Log {
                        level: "info",
                        message: text,
                    });
                }
            }
        }
        0x0A => {
            if let Some(event) = parse_version_info(payload) {
                events.push(event);
            }
        }
        0x04 => {
            if payload.len() >= 4 {
                let comms = u16_be(&payload[0..2]);
                let v12 = u16_be(&payload[2..4]);
                events.push(TcpEvent::Stat {
                    key: "Disable Faults Comms".into(),
                    value: comms.to_string(),
                });
                events.push(TcpEvent::Stat {
                    key: "Disable Faults 12V".into(),
                    value: v12.to_string(),
                });
            }
        }
        0x05 => {
            if payload.len() >= 6 {
                let v6 = u16_be(&payload[0..2]);
                let v5 = u16_be(&payload[2..4]);
                let v3 = u16_be(&payload[4..6]);
                events.push(TcpEvent::Stat {
                    key: "Rail Faults 6V".into(),
                    value: v6.to_string(),
                });
                events.push(TcpEvent::Stat {
                    key: "Rail Faults 5V".into(),
                    value: v5.to_string(),
                });
                events.push(TcpEvent::Stat {
                    key: "Rail Faults 3.3V".into(),
                    value: v3.to_string(),
                });
            }
        }
        _ => {}
    }
}

/// Reads consecutive 1-byte-length-prefixed strings until the buffer runs out.
fn parse_length_prefixed_strings(data: &[u8]) -> Vec<String> {
    let mut out = Vec::new();
    let mut i = 0usize;
    while i < data.len() {
        let len = data[i] as usize;
        i += 1;
        if len == 0 || i + len > data.len() {
            break;
        }
        out.push(filter_ascii(&data[i..i + len]));
        i += len;
    }
    out
}

fn parse_error_message(payload: &[u8]) -> (&'static str, String) {
    if payload.len() < 13 {
        return ("warn", "error message (truncated)".to_string());
    }
    let level = if payload[12] & 0x80 != 0 {
        "error"
    } else {
        "warn"
    };
    let strings = parse_length_prefixed_strings(&payload[13..]);
    let details = strings.first().cloned().unwrap_or_default();
    let location = strings.get(1).cloned().unwrap_or_default();
    let stack = strings.get(2).cloned().unwrap_or_default();

    let mut text = details;
    if !location.is_empty() {
        text.push_str(" @ ");
        text.push_str(&location);
    }
    if !stack.is_empty() {
        text.push_str(" | ");
        text.push_str(&stack);
    }
    (level, text)
}

fn parse_version_info(payload: &[u8]) -> Option<TcpEvent> {
    if payload.len() < 5 {
        return None;
    }
    let dev_type = match payload[0] {
        0 => "Software",
        2 => "CAN Talon",
        8 => "PDP",
        9 => "PCM",
        21 => "Pigeon",
        _ => "Unknown",
    };
    let strings = parse_length_prefixed_strings(&payload[4..]);
    let name = strings.first().cloned().unwrap_or_default();
    let version = strings.get(1).cloned().unwrap_or_default();
    if name.is_empty() || version.is_empty() {
        return None;
    }
    let key = match name.as_str() {
        "roboRIO Image" => "RIO Version".to_string(),
        "FRC_Lib_Version" => "WPILib Version".to_string(),
        _ => format!("{dev_type} {name}"),
    };
    Some(TcpEvent::Stat { key, value: version })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_2byte(tag: u8, payload: &[u8]) -> Vec<u8> {
        let len = (1 + payload.len()) as u16;
        let mut out = len.to_be_bytes().to_vec();
        out.push(tag);
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn radio_events_emits_trimmed_log() {
        let frame = frame_2byte(0x00, b"booting up  \n");
        let (events, consumed) = parse_frames(&frame);
        assert_eq!(consumed, frame.len());
        assert_eq!(
            events,
            vec![TcpEvent::Log {
                level: "info",
                message: "booting up".to_string()
            }]
        );
    }

    #[test]
    fn error_message_with_details_location_and_stack() {
        let mut payload = vec![0u8; 12];
        payload.push(0x80); // error flag
        for s in ["boom", "A.cpp:10", ""] {
            payload.push(s.len() as u8);
            payload.extend_from_slice(s.as_bytes());
        }
        let frame = frame_2byte(0x0B, &payload);
        let (events, _) = parse_frames(&frame);
        assert_eq!(
            events,
            vec![TcpEvent::Log {
                level: "error",
                message: "boom @ A.cpp:10".to_string()
            }]
        );
    }

    #[test]
    fn version_info_special_cases_rio_image_and_wpilib() {
        let mut payload = vec![0u8; 4];
        payload.push("roboRIO Image".len() as u8);
        payload.extend_from_slice(b"roboRIO Image");
        payload.push("2024.1.1".len() as u8);
        payload.extend_from_slice(b"2024.1.1");
        let frame = frame_2byte(0x0A, &payload);
        let (events, _) = parse_frames(&frame);
        assert_eq!(
            events,
            vec![TcpEvent::Stat {
                key: "RIO Version".to_string(),
                value: "2024.1.1".to_string()
            }]
        );
    }

    #[test]
    fn one_byte_fallback_when_two_byte_interpretation_overruns() {
        // A 1-byte length of 3 (tag + 2-byte payload) with trailing garbage
        // the 2-byte interpretation would wrongly consume the whole buffer for.
        let mut buf = vec![3u8, 0x01, b'h', b'i'];
        buf.extend_from_slice(&[0xFFu8; 1]); // extra byte, not enough for 2-byte len
        let (events, consumed) = parse_frames(&buf);
        assert_eq!(consumed, 4);
        assert_eq!(
            events,
            vec![TcpEvent::Log {
                level: "info",
                message: "Usage: hi".to_string()
            }]
        );
    }

    #[test]
    fn partial_frame_is_left_as_carry() {
        let mut buf = frame_2byte(0x00, b"hello");
        buf.truncate(buf.len() - 2); // chop off the tail of the payload
        let (events, consumed) = parse_frames(&buf);
        assert!(events.is_empty());
        assert_eq!(consumed, 0);
    }

    #[test]
    fn disable_faults_emits_two_stats() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&3u16.to_be_bytes());
        payload.extend_from_slice(&1u16.to_be_bytes());
        let frame = frame_2byte(0x04, &payload);
        let (events, _) = parse_frames(&frame);
        assert_eq!(
            events,
            vec![
                TcpEvent::Stat {
                    key: "Disable Faults Comms".to_string(),
                    value: "3".to_string()
                },
                TcpEvent::Stat {
                    key: "Disable Faults 12V".to_string(),
                    value: "1".to_string()
                },
            ]
        );
    }
}

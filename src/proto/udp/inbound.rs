//! RIO→DS UDP status datagram parser (§4.3.2, §4.3.3): fixed header plus
//! the extended TLV tags (disk/CPU/RAM/CAN/PDP telemetry).

use crate::codec::{bytes_human, f32_be, u32_be};

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u8 {
        const ESTOP = 0b1000_0000;
        const BROWNOUT = 0b0001_0000;
        const CODE_START = 0b0000_1000;
        const ENABLED = 0b0000_0100;
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Trace: u8 {
        const ROBOT_CODE = 0b0010_0000;
        const IS_ROBORIO = 0b0001_0000;
    }
}

/// A decoded RIO→DS status datagram, with the extended tags already
/// rendered as `(key, value)` telemetry pairs for the aggregator.
#[derive(Debug, Clone)]
pub struct UdpStatusPacket {
    pub seq: u16,
    pub status: Status,
    pub trace: Trace,
    pub battery: f32,
    pub match_time: Option<u16>,
    pub telemetry: Vec<(String, String)>,
}

/// Parses a RIO→DS datagram. Returns `None` if the packet is too short to
/// contain the fixed 7-byte header; this is the only failure mode, since
/// the extended tag walk degrades tag-by-tag rather than aborting.
pub fn decode(buf: &[u8]) -> Option<UdpStatusPacket> {
    if buf.len() < 7 {
        return None;
    }
    let seq = u16::from_be_bytes([buf[0], buf[1]]);
    let status = Status::from_bits_truncate(buf[3]);
    let trace = Trace::from_bits_truncate(buf[4]);
    let battery = f32::from(buf[5]) + f32::from(buf[6]) / 256.0;
    let match_time = if buf.len() >= 23 {
        Some(u16::from_be_bytes([buf[20], buf[21]]))
    } else {
        None
    };

    Some(UdpStatusPacket {
        seq,
        status,
        trace,
        battery,
        match_time,
        telemetry: parse_extended_tags(buf),
    })
}

fn parse_extended_tags(packet: &[u8]) -> Vec<(String, String)> {
    let mut out = Vec::new();
    if packet.len() <= 8 {
        return out;
    }
    let tags = &packet[8..];
    let mut c = 0usize;
    while c + 1 < tags.len() {
        let size = tags[c] as usize;
        if size == 0 || c + 1 + size > tags.len() {
            break;
        }
        let tag = tags[c + 1];
        let payload = &tags[c + 2..c + 1 + size];
        match tag {
            0x04 => {
                if payload.len() >= 8 {
                    out.push(("Disk Free".into(), bytes_human(u32_be(&payload[4..8]))));
                }
            }
            0x05 => {
                if !payload.is_empty() {
                    out.push(("CPU %".into(), format!("{:.1}%", cpu_percent(payload))));
                }
            }
            0x06 => {
                if payload.len() >= 8 {
                    out.push(("RAM Free".into(), bytes_human(u32_be(&payload[4..8]))));
                }
            }
            0x0E => {
                if payload.len() >= 14 {
                    let util = f32_be(&payload[0..4]) * 100.0;
                    let bus_off = u32_be(&payload[4..8]);
                    let tx_full = u32_be(&payload[8..12]);
                    let rx_err = payload[12];
                    let tx_err = payload[13];
                    out.push(("CAN Util".into(), format!("{util:.1}%")));
                    out.push(("CAN Bus Off".into(), bus_off.to_string()));
                    out.push(("CAN TX Full".into(), tx_full.to_string()));
                    out.push(("CAN RX Err".into(), rx_err.to_string()));
                    out.push(("CAN TX Err".into(), tx_err.to_string()));
                }
            }
            0x08 => {
                if payload.len() >= 4 {
                    if let Some(total) = pdp_total_current(payload) {
                        out.push(("PDP Total Current".into(), format!("{total:.1} A")));
                    }
                    let voltage = payload[payload.len() - 2];
                    let temperature = payload[payload.len() - 1];
                    out.push(("PDP Voltage".into(), format!("{voltage} V")));
                    out.push(("PDP Temperature".into(), format!("{temperature} C")));
                }
            }
            _ => {}
        }
        c += size + 1;
    }
    out
}

fn cpu_percent(payload: &[u8]) -> f64 {
    let num = payload[0] as usize;
    if num == 0 {
        return 0.0;
    }
    let mut c = 1usize;
    let mut total = 0.0f64;
    for _ in 0..num {
        if c + 16 > payload.len() {
            break;
        }
        let crit = f32_be(&payload[c..c + 4]) as f64;
        let above = f32_be(&payload[c + 4..c + 8]) as f64;
        let norm = f32_be(&payload[c + 8..c + 12]) as f64;
        let low = f32_be(&payload[c + 12..c + 16]) as f64;
        let den = crit + above + norm + low;
        if den > 0.0 {
            total += (crit + above * 0.90 + norm * 0.75 + low * 0.25) / den;
        }
        c += 16;
    }
    (total / num as f64) * 100.0
}

/// Unpacks 10-bit port currents starting at `payload[1]`, skipping 4 bits of
/// padding after the 6th and 12th port, and sums `value / 8.0` amps.
fn pdp_total_current(payload: &[u8]) -> Option<f64> {
    if payload.len() < 4 {
        return None;
    }
    let body = &payload[1..payload.len() - 3];
    let mut bits = Vec::with_capacity(body.len() * 8);
    for &b in body {
        for j in (0..8).rev() {
            bits.push((b >> j) & 1);
        }
    }

    let mut total = 0.0f64;
    let mut port_num = 0u32;
    let mut i = 0usize;
    while i + 10 <= bits.len() {
        let mut val: u16 = 0;
        for &bit in &bits[i..i + 10] {
            val = (val << 1) | bit as u16;
        }
        total += val as f64 / 8.0;
        i += 10;
        port_num += 1;
        if port_num == 6 || port_num == 12 {
            i += 4;
        }
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_packet_is_rejected() {
        assert!(decode(&[0u8; 6]).is_none());
    }

    #[test]
    fn header_fields_decode_in_place() {
        let mut buf = vec![0u8; 9];
        buf[0..2].copy_from_slice(&42u16.to_be_bytes());
        buf[3] = 0b1000_0100; // estop + enabled
        buf[4] = 0b0011_0000; // robot code + is rio
        buf[5] = 12;
        buf[6] = 128;
        let packet = decode(&buf).unwrap();
        assert_eq!(packet.seq, 42);
        assert!(packet.status.contains(Status::ESTOP));
        assert!(packet.status.contains(Status::ENABLED));
        assert!(packet.trace.contains(Trace::ROBOT_CODE));
        assert!(packet.trace.contains(Trace::IS_ROBORIO));
        assert!((packet.battery - 12.5).abs() < 1e-6);
        assert!(packet.match_time.is_none());
    }

    #[test]
    fn match_time_requires_23_bytes() {
        let mut buf = vec![0u8; 23];
        buf[20..22].copy_from_slice(&137u16.to_be_bytes());
        let packet = decode(&buf).unwrap();
        assert_eq!(packet.match_time, Some(137));
    }

    #[test]
    fn disk_info_tag_is_humanized() {
        let mut buf = vec![0u8; 8];
        // size=9 (1 tag byte + 8 payload bytes), tag=0x04, 4 filler bytes, then free bytes
        buf.push(9);
        buf.push(0x04);
        buf.extend_from_slice(&[0u8; 4]);
        buf.extend_from_slice(&(2u32 * 1024 * 1024).to_be_bytes());
        let packet = decode(&buf).unwrap();
        assert_eq!(
            packet.telemetry,
            vec![("Disk Free".to_string(), "2.0 MB".to_string())]
        );
    }

    #[test]
    fn can_metrics_emits_five_entries() {
        let mut buf = vec![0u8; 8];
        let mut payload = Vec::new();
        payload.extend_from_slice(&0.5f32.to_be_bytes()); // util 0.5 -> 50%
        payload.extend_from_slice(&3u32.to_be_bytes()); // bus off
        payload.extend_from_slice(&1u32.to_be_bytes()); // tx full
        payload.push(2); // rx err
        payload.push(1); // tx err
        buf.push((payload.len() + 1) as u8);
        buf.push(0x0E);
        buf.extend_from_slice(&payload);
        let packet = decode(&buf).unwrap();
        assert_eq!(packet.telemetry.len(), 5);
        assert_eq!(packet.telemetry[0], ("CAN Util".to_string(), "50.0%".to_string()));
        assert_eq!(packet.telemetry[2], ("CAN TX Full".to_string(), "1".to_string()));
    }

    #[test]
    fn pdp_log_skips_four_bits_after_sixth_and_twelfth_port() {
        // Two ports packed as 10-bit values 8 (1.0A) and 16 (2.0A), no skip
        // triggered since we stop well short of the 6th port.
        let bits = [
            0, 0, 0, 0, 0, 0, 1, 0, 0, 0, // port 0: value 8
            0, 0, 0, 1, 0, 0, 0, 0, 0, 0, // port 1: value 16
        ];
        let mut byte = 0u8;
        let mut packed = Vec::new();
        for (i, &b) in bits.iter().enumerate() {
            byte = (byte << 1) | b;
            if i % 8 == 7 {
                packed.push(byte);
                byte = 0;
            }
        }
        let rem = bits.len() % 8;
        if rem != 0 {
            byte <<= 8 - rem;
            packed.push(byte);
        }
        let mut payload = vec![0u8]; // leading filler byte
        payload.extend_from_slice(&packed);
        payload.push(0); // padding byte (index len-3)
        payload.push(12); // voltage
        payload.push(40); // temperature

        let total = pdp_total_current(&payload).unwrap();
        assert!((total - 3.0).abs() < 1e-9);
    }
}

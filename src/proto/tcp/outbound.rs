//! DS→RIO TCP frame builder (§4.4.1), sent on a 100 ms tick: six joystick
//! descriptors, one game-data tag, one ping.

use bytes::{BufMut, Bytes, BytesMut};

use crate::state::JoystickSnapshot;

pub(crate) trait OutgoingTcpTag {
    fn id(&self) -> u8;
    fn data(&self) -> Bytes;

    fn construct(&self) -> Bytes {
        let data = self.data();
        let payload_len = 1 + data.len();
        assert!(payload_len <= u16::MAX as usize, "TCP tag payload too large");

        let mut buf = BytesMut::with_capacity(2 + payload_len);
        buf.put_u16(payload_len as u16);
        buf.put_u8(self.id());
        buf.extend_from_slice(&data);
        buf.freeze()
    }
}

/// Tag 0x02: one joystick's descriptor, indexed 0..5.
struct JoystickDescTag<'a> {
    index: u8,
    snapshot: Option<&'a JoystickSnapshot>,
}

impl OutgoingTcpTag for JoystickDescTag<'_> {
    fn id(&self) -> u8 {
        0x02
    }

    fn data(&self) -> Bytes {
        match self.snapshot {
            None => Bytes::from(vec![self.index, 0, 0, 0]),
            Some(js) if js.disabled => Bytes::from(vec![self.index, 0, 0, 0]),
            Some(js) => {
                let is_xbox = u8::from(js.mapping == "standard");
                let name = js.name.as_bytes();
                let name_len = name.len().min(u8::MAX as usize) as u8;

                let mut buf = BytesMut::with_capacity(8 + name_len as usize + 5);
                buf.put_u8(self.index);
                buf.put_u8(is_xbox);
                buf.put_u8(0x15); // HID_GAMEPAD
                buf.put_u8(name_len);
                buf.extend_from_slice(&name[..name_len as usize]);
                buf.put_u8(6); // num_axes
                for i in 0..6u8 {
                    buf.put_u8(i % 3);
                }
                buf.put_u8(js.buttons.len().min(u8::MAX as usize) as u8);
                buf.put_u8(0); // pov count
                buf.freeze()
            }
        }
    }
}

/// Tag 0x0E: the active game-data string.
struct GameDataTag<'a>(&'a str);

impl OutgoingTcpTag for GameDataTag<'_> {
    fn id(&self) -> u8 {
        0x0E
    }

    fn data(&self) -> Bytes {
        Bytes::copy_from_slice(self.0.as_bytes())
    }
}

/// Tag 0x1D: an empty keepalive ping.
struct DsPingTag;

impl OutgoingTcpTag for DsPingTag {
    fn id(&self) -> u8 {
        0x1D
    }

    fn data(&self) -> Bytes {
        Bytes::new()
    }
}

/// Builds the full DS→RIO TCP frame for this tick.
pub fn build_tcp_frame(game_data: &str, joysticks: &[Option<JoystickSnapshot>; 6]) -> Bytes {
    let mut buf = BytesMut::new();
    for (i, slot) in joysticks.iter().enumerate() {
        let tag = JoystickDescTag {
            index: i as u8,
            snapshot: slot.as_ref(),
        };
        buf.extend_from_slice(&tag.construct());
    }
    buf.extend_from_slice(&GameDataTag(game_data).construct());
    buf.extend_from_slice(&DsPingTag.construct());
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_joystick_descriptor_is_four_bytes() {
        let tag = JoystickDescTag {
            index: 3,
            snapshot: None,
        };
        assert_eq!(tag.construct().as_ref(), &[0, 5, 0x02, 3, 0, 0, 0]);
    }

    #[test]
    fn populated_joystick_descriptor_layout() {
        let js = JoystickSnapshot {
            name: "Stick".into(),
            mapping: "standard".into(),
            axes: vec![0.0; 6],
            buttons: vec![false; 10],
            disabled: false,
        };
        let tag = JoystickDescTag {
            index: 0,
            snapshot: Some(&js),
        };
        let bytes = tag.construct();
        assert_eq!(bytes[3], 0); // index
        assert_eq!(bytes[4], 1); // is_xbox
        assert_eq!(bytes[5], 0x15); // frc type
        assert_eq!(bytes[6], 5); // name_len
        assert_eq!(&bytes[7..12], b"Stick");
        assert_eq!(bytes[12], 6); // num_axes
    }

    #[test]
    fn frame_concatenates_six_descriptors_game_data_and_ping() {
        let joysticks: [Option<JoystickSnapshot>; 6] = Default::default();
        let frame = build_tcp_frame("redredblue", &joysticks);
        // 6 empty descriptors (7 bytes each) + game data tag + ping tag
        let descriptors_len = 7 * 6;
        assert_eq!(frame[0..2], 5u16.to_be_bytes());
        let game_data_tag_start = descriptors_len;
        assert_eq!(
            &frame[game_data_tag_start..game_data_tag_start + 2],
            &11u16.to_be_bytes()
        );
        assert_eq!(frame[game_data_tag_start + 2], 0x0E);
        assert_eq!(&frame[game_data_tag_start + 3..][..10], b"redredblue");
        let ping_start = game_data_tag_start + 3 + 10;
        assert_eq!(&frame[ping_start..], &[0, 1, 0x1D]);
    }
}

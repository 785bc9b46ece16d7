//! DS→RIO UDP control datagram builder (§4.3.1): fixed 6-byte header plus
//! the date/timezone and joystick TLV tags.

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{Datelike, Timelike, Utc};

use crate::codec::{dbl_to_i8, pack_bools_reversed};
use crate::state::{Alliance, JoystickSnapshot, Mode};

bitflags::bitflags! {
    /// The control byte (offset 3): e-stop, enabled, and mode bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Control: u8 {
        const ESTOP = 0b1000_0000;
        const ENABLED = 0b0000_0100;
        const AUTO = 0b0000_0010;
        const TEST = 0b0000_0001;
    }
}

impl Control {
    pub fn build(estop: bool, enabled: bool, mode: Mode) -> Control {
        let mut bits = Control::empty();
        if estop {
            bits |= Control::ESTOP;
        }
        if enabled {
            bits |= Control::ENABLED;
        }
        match mode {
            Mode::Auto => bits |= Control::AUTO,
            Mode::Test => bits |= Control::TEST,
            Mode::Teleop => {}
        }
        bits
    }
}

bitflags::bitflags! {
    /// The request byte (offset 4): always carries DS_CONNECTED, plus the
    /// single-shot restart flags consumed for this tick.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Request: u8 {
        const DS_CONNECTED = 0b0001_0000;
        const RESTART_CODE = 0b0000_0100;
        const REBOOT_RIO = 0b0000_1000;
    }
}

impl Request {
    pub fn build(restart_code: bool, restart_rio: bool) -> Request {
        let mut bits = Request::DS_CONNECTED;
        if restart_code {
            bits |= Request::RESTART_CODE;
        }
        if restart_rio {
            bits |= Request::REBOOT_RIO;
        }
        bits
    }
}

/// A TLV tag appended to the UDP control datagram: `{len+1, id, payload}`.
trait UdpTag {
    fn id(&self) -> u8;
    fn data(&self) -> Bytes;

    fn construct(&self) -> Bytes {
        let data = self.data();
        let payload_len = 1 + data.len();
        assert!(payload_len <= u8::MAX as usize, "UDP tag payload too large");

        let mut buf = BytesMut::with_capacity(1 + payload_len);
        buf.put_u8(payload_len as u8);
        buf.put_u8(self.id());
        buf.extend_from_slice(&data);
        buf.freeze()
    }
}

/// Tag 0x0F: current UTC wall-clock time for the RIO to adopt.
pub struct DateTimeTag {
    pub micros: u32,
    pub second: u8,
    pub minute: u8,
    pub hour: u8,
    pub day: u8,
    pub month0: u8,
    pub year_since_1900: u8,
}

impl DateTimeTag {
    pub fn now() -> DateTimeTag {
        let now = Utc::now();
        DateTimeTag {
            micros: now.timestamp_subsec_micros(),
            second: now.time().second() as u8,
            minute: now.time().minute() as u8,
            hour: now.time().hour() as u8,
            day: now.date_naive().day() as u8,
            month0: now.date_naive().month0() as u8,
            year_since_1900: (now.date_naive().year() - 1900) as u8,
        }
    }
}

impl UdpTag for DateTimeTag {
    fn id(&self) -> u8 {
        0x0F
    }

    fn data(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(11);
        buf.put_u32(self.micros);
        buf.put_u8(self.second);
        buf.put_u8(self.minute);
        buf.put_u8(self.hour);
        buf.put_u8(self.day);
        buf.put_u8(self.month0);
        buf.put_u8(self.year_since_1900);
        buf.freeze()
    }
}

/// Tag 0x10: the DS's IANA timezone name.
pub struct TimezoneTag {
    pub name: String,
}

impl UdpTag for TimezoneTag {
    fn id(&self) -> u8 {
        0x10
    }

    fn data(&self) -> Bytes {
        Bytes::from(self.name.clone())
    }
}

/// Tag 0x0C: one joystick's axes, buttons, and (always empty) POVs.
pub struct JoystickTag<'a>(pub Option<&'a JoystickSnapshot>);

impl UdpTag for JoystickTag<'_> {
    fn id(&self) -> u8 {
        0x0C
    }

    fn data(&self) -> Bytes {
        match self.0 {
            None => Bytes::from_static(&[0x00, 0x00, 0x00]),
            Some(js) if js.is_empty_like() => Bytes::from_static(&[0x00, 0x00, 0x00]),
            Some(js) => {
                let packed = pack_bools_reversed(&js.buttons);
                let mut buf = BytesMut::with_capacity(1 + 6 + 1 + packed.len() + 1);
                buf.put_u8(0x06);
                for i in 0..6usize {
                    let v = js.axes.get(i).copied().unwrap_or(0.0);
                    buf.put_i8(dbl_to_i8(v));
                }
                assert!(js.buttons.len() <= u8::MAX as usize, "too many buttons");
                buf.put_u8(js.buttons.len() as u8);
                buf.extend_from_slice(&packed);
                buf.put_u8(0x00); // POV count, always zero
                buf.freeze()
            }
        }
    }
}

/// Builds the full DS→RIO control datagram for this tick.
///
/// `include_clock` should be true for the first ten datagrams of a session
/// (§4.3.1); `joysticks` is indexed 0..5 and entries may be `None`.
#[allow(clippy::too_many_arguments)]
pub fn build_control_datagram(
    seq: u16,
    estop: bool,
    enabled: bool,
    mode: Mode,
    alliance: Option<Alliance>,
    restart_code: bool,
    restart_rio: bool,
    include_clock: bool,
    joysticks: &[Option<JoystickSnapshot>; 6],
) -> Bytes {
    let control = Control::build(estop, enabled, mode);
    let request = Request::build(restart_code, restart_rio);
    let station = alliance.map(Alliance::station_byte).unwrap_or(0);

    let mut buf = BytesMut::with_capacity(64);
    buf.put_u16(seq);
    buf.put_u8(0x01); // comm version
    buf.put_u8(control.bits());
    buf.put_u8(request.bits());
    buf.put_u8(station);

    if include_clock {
        buf.extend_from_slice(&DateTimeTag::now().construct());
        let tz = iana_time_zone::get_timezone().unwrap_or_else(|_| "UTC".to_string());
        buf.extend_from_slice(&TimezoneTag { name: tz }.construct());
    }

    if enabled {
        for slot in joysticks {
            buf.extend_from_slice(&JoystickTag(slot.as_ref()).construct());
        }
    }

    buf.freeze()
}

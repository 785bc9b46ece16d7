//! JSON message shapes exchanged with UI clients over the local control
//! socket (§4.1, §6). Each direction is its own tagged enum so serde can
//! dispatch purely on the `type` field.

use serde::{Deserialize, Serialize};

/// A command sent from a UI client to the bridge.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Command {
    Hello,
    Connect {
        team: String,
    },
    Disconnect,
    Reconnect,
    Enable,
    Disable,
    Estop,
    GameData {
        value: String,
    },
    Mode {
        value: String,
    },
    Alliance {
        value: String,
    },
    Joystick {
        #[serde(rename = "frcIndex")]
        frc_index: Option<u8>,
        index: u8,
        name: String,
        axes: Vec<f32>,
        buttons: Vec<bool>,
        mapping: String,
        disabled: bool,
    },
    RestartCode,
    RestartRio,
}

/// A message broadcast from the bridge to every connected UI client.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Message {
    Log {
        level: &'static str,
        message: String,
    },
    Link {
        value: &'static str,
    },
    Stats {
        robot: &'static str,
        code: &'static str,
        estop: &'static str,
        brownout: &'static str,
        enabled: &'static str,
        battery: String,
        #[serde(rename = "dsTx")]
        ds_tx: &'static str,
        #[serde(rename = "matchTime")]
        match_time: String,
    },
    StatsExtra {
        value: String,
    },
    NtEntry {
        value: String,
    },
    NtDelete {
        value: String,
    },
    NtClear,
    NtStatus {
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_command_parses_team() {
        let cmd: Command = serde_json::from_str(r#"{"type":"connect","team":"2471"}"#).unwrap();
        assert_eq!(
            cmd,
            Command::Connect {
                team: "2471".to_string()
            }
        );
    }

    #[test]
    fn joystick_command_parses_frc_index_and_axes() {
        let cmd: Command = serde_json::from_str(
            r#"{"type":"joystick","frcIndex":2,"index":0,"name":"Stick","axes":[0.0,1.0],"buttons":[true,false],"mapping":"standard","disabled":false}"#,
        )
        .unwrap();
        assert_eq!(
            cmd,
            Command::Joystick {
                frc_index: Some(2),
                index: 0,
                name: "Stick".to_string(),
                axes: vec![0.0, 1.0],
                buttons: vec![true, false],
                mapping: "standard".to_string(),
                disabled: false,
            }
        );
    }

    #[test]
    fn unit_variants_round_trip_by_type_alone() {
        let cmd: Command = serde_json::from_str(r#"{"type":"restartCode"}"#).unwrap();
        assert_eq!(cmd, Command::RestartCode);
    }

    #[test]
    fn log_message_serializes_with_camel_case_type() {
        let msg = Message::Log {
            level: "info",
            message: "Bridge connected".to_string(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "log");
        assert_eq!(json["level"], "info");
    }

    #[test]
    fn stats_message_renames_ds_tx_and_match_time() {
        let msg = Message::Stats {
            robot: "Connected",
            code: "Running",
            estop: "OK",
            brownout: "No",
            enabled: "Enabled",
            battery: "12.50 V".to_string(),
            ds_tx: "Active",
            match_time: "37".to_string(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["dsTx"], "Active");
        assert_eq!(json["matchTime"], "37");
    }
}

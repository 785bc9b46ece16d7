//! Process-wide shared state (§3): operator intent, joystick snapshots, and
//! the small keyed maps the NT and telemetry codecs use for their debounce
//! bookkeeping.
//!
//! Scalars are atomics or swap-based single-shot flags; strings are guarded
//! by their own small mutex since Rust has no atomic string cell; the keyed
//! tables are a `Mutex<HashMap<..>>` since only per-key atomicity is
//! required, never a cross-key transaction.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Mutex;

/// Robot operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Teleop,
    Auto,
    Test,
}

impl Mode {
    pub fn parse(s: &str) -> Option<Mode> {
        match s {
            "teleop" => Some(Mode::Teleop),
            "auto" => Some(Mode::Auto),
            "test" => Some(Mode::Test),
            _ => None,
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            Mode::Teleop => 0,
            Mode::Auto => 1,
            Mode::Test => 2,
        }
    }

    fn from_u8(v: u8) -> Mode {
        match v {
            1 => Mode::Auto,
            2 => Mode::Test,
            _ => Mode::Teleop,
        }
    }
}

/// Alliance color and station position, e.g. red station 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alliance {
    pub red: bool,
    pub number: u8,
}

impl Alliance {
    /// Parses the UI's `"red:1" | "blue:3"` etc. shape. Empty or malformed
    /// input (including an out-of-range number) is rejected, per §4.1.
    pub fn parse(s: &str) -> Option<Alliance> {
        if s.is_empty() {
            return None;
        }
        let (color, num) = s.split_once(':')?;
        let number: u8 = num.parse().ok()?;
        if !(1..=3).contains(&number) {
            return None;
        }
        let red = match color {
            "red" => true,
            "blue" => false,
            _ => return None,
        };
        Some(Alliance { red, number })
    }

    /// Encodes to the wire byte used in the UDP control packet (§4.3.1):
    /// red:{1,2,3} -> {0,1,2}; blue:{1,2,3} -> {3,4,5}.
    pub fn station_byte(self) -> u8 {
        let zero_based = self.number - 1;
        if self.red {
            zero_based
        } else {
            zero_based + 3
        }
    }
}

/// Process-wide operator intent (§3): the fields the UI commands mutate and
/// the UDP/TCP send loops read every tick.
pub struct OperatorIntent {
    team: Mutex<String>,
    enabled: AtomicBool,
    estop: AtomicBool,
    mode: AtomicU8,
    alliance: Mutex<Option<Alliance>>,
    game_data: Mutex<String>,
    restart_code: AtomicBool,
    restart_rio: AtomicBool,
}

impl Default for OperatorIntent {
    fn default() -> Self {
        OperatorIntent {
            team: Mutex::new(String::new()),
            enabled: AtomicBool::new(false),
            estop: AtomicBool::new(false),
            mode: AtomicU8::new(Mode::Teleop.to_u8()),
            alliance: Mutex::new(None),
            game_data: Mutex::new(String::new()),
            restart_code: AtomicBool::new(false),
            restart_rio: AtomicBool::new(false),
        }
    }
}

impl OperatorIntent {
    pub fn team(&self) -> String {
        self.team.lock().unwrap().clone()
    }

    pub fn set_team(&self, team: impl Into<String>) {
        *self.team.lock().unwrap() = team.into();
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, v: bool) {
        self.enabled.store(v, Ordering::Relaxed);
    }

    pub fn estop(&self) -> bool {
        self.estop.load(Ordering::Relaxed)
    }

    pub fn set_estop(&self, v: bool) {
        self.estop.store(v, Ordering::Relaxed);
    }

    pub fn mode(&self) -> Mode {
        Mode::from_u8(self.mode.load(Ordering::Relaxed))
    }

    pub fn set_mode(&self, mode: Mode) {
        self.mode.store(mode.to_u8(), Ordering::Relaxed);
    }

    pub fn alliance(&self) -> Option<Alliance> {
        *self.alliance.lock().unwrap()
    }

    pub fn set_alliance(&self, alliance: Alliance) {
        *self.alliance.lock().unwrap() = Some(alliance);
    }

    pub fn game_data(&self) -> String {
        self.game_data.lock().unwrap().clone()
    }

    pub fn set_game_data(&self, v: impl Into<String>) {
        *self.game_data.lock().unwrap() = v.into();
    }

    pub fn request_restart_code(&self) {
        self.restart_code.store(true, Ordering::SeqCst);
    }

    pub fn request_restart_rio(&self) {
        self.restart_rio.store(true, Ordering::SeqCst);
    }

    /// Consumes the code-restart flag: true at most once per `set`.
    pub fn take_restart_code(&self) -> bool {
        self.restart_code.swap(false, Ordering::SeqCst)
    }

    /// Consumes the rio-restart flag: true at most once per `set`.
    pub fn take_restart_rio(&self) -> bool {
        self.restart_rio.swap(false, Ordering::SeqCst)
    }
}

/// A joystick's last reported state, replaced wholesale on each UI update.
#[derive(Debug, Clone, Default)]
pub struct JoystickSnapshot {
    pub name: String,
    pub mapping: String,
    pub axes: Vec<f32>,
    pub buttons: Vec<bool>,
    pub disabled: bool,
}

impl JoystickSnapshot {
    pub fn is_empty_like(&self) -> bool {
        self.name.is_empty() || self.disabled
    }
}

/// Generic keyed concurrent map: per-key last-write-wins, no cross-key
/// transactions. Backs the joystick table, NT entry table, and the two
/// debounce maps (§5).
pub struct KeyedStore<K, V> {
    inner: Mutex<HashMap<K, V>>,
}

impl<K: Eq + Hash + Clone, V: Clone> Default for KeyedStore<K, V> {
    fn default() -> Self {
        KeyedStore {
            inner: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> KeyedStore<K, V> {
    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.lock().unwrap().get(key).cloned()
    }

    pub fn set(&self, key: K, value: V) {
        self.inner.lock().unwrap().insert(key, value);
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.inner.lock().unwrap().remove(key)
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }

    /// Inserts `value` for `key` unless the existing value already equals
    /// it, returning `true` when the store changed. Backs every debounce
    /// rule in §5 (stats extra, NT last-delivered).
    pub fn set_if_changed(&self, key: K, value: V) -> bool
    where
        V: PartialEq,
    {
        let mut map = self.inner.lock().unwrap();
        if map.get(&key) == Some(&value) {
            return false;
        }
        map.insert(key, value);
        true
    }
}

/// Session lifecycle (§3): {idle -> resolving -> active -> draining -> idle}.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Resolving,
    Active,
    Draining,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restart_flags_are_single_shot() {
        let intent = OperatorIntent::default();
        intent.request_restart_code();
        assert!(intent.take_restart_code());
        assert!(!intent.take_restart_code());
    }

    #[test]
    fn alliance_parse_rejects_malformed_and_out_of_range() {
        assert!(Alliance::parse("").is_none());
        assert!(Alliance::parse("green:1").is_none());
        assert!(Alliance::parse("red:0").is_none());
        assert!(Alliance::parse("red:4").is_none());
        assert_eq!(
            Alliance::parse("red:1"),
            Some(Alliance {
                red: true,
                number: 1
            })
        );
    }

    #[test]
    fn alliance_station_encoding_is_total_0_to_5() {
        for color in ["red", "blue"] {
            for n in 1..=3u8 {
                let a = Alliance::parse(&format!("{color}:{n}")).unwrap();
                assert!(a.station_byte() <= 5);
            }
        }
    }

    #[test]
    fn keyed_store_debounce_semantics() {
        let store: KeyedStore<String, String> = KeyedStore::default();
        assert!(store.set_if_changed("k".into(), "v".into()));
        assert!(!store.set_if_changed("k".into(), "v".into()));
        assert!(store.set_if_changed("k".into(), "w".into()));
        assert!(store.set_if_changed("k".into(), "v".into()));
    }
}

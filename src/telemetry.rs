//! Telemetry aggregator (§4.6): a single debounce sink shared by the UDP
//! extended tags and the TCP auxiliary parser.

use crate::state::KeyedStore;

/// Deduplicates `(key, value)` updates, suppressing repeats of the last
/// emitted value for a key. Backs both §4.3.3 and §4.4.2.
#[derive(Default)]
pub struct TelemetryAggregator {
    last: KeyedStore<String, String>,
}

impl TelemetryAggregator {
    /// Records `value` for `key`, returning `Some("key: value")` the first
    /// time a key appears or whenever its value changes, `None` otherwise.
    pub fn update(&self, key: &str, value: &str) -> Option<String> {
        if self.last.set_if_changed(key.to_string(), value.to_string()) {
            Some(format!("{key}: {value}"))
        } else {
            None
        }
    }

    /// Clears every tracked key. Callers should broadcast an empty
    /// `statsExtra` value once after calling this, per §4.6.
    pub fn reset(&self) {
        self.last.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_update_always_emits() {
        let agg = TelemetryAggregator::default();
        assert_eq!(
            agg.update("Disk Free", "2.0 MB"),
            Some("Disk Free: 2.0 MB".to_string())
        );
    }

    #[test]
    fn repeat_value_is_suppressed() {
        let agg = TelemetryAggregator::default();
        agg.update("CPU %", "12.0%");
        assert_eq!(agg.update("CPU %", "12.0%"), None);
        assert_eq!(
            agg.update("CPU %", "13.0%"),
            Some("CPU %: 13.0%".to_string())
        );
    }

    #[test]
    fn reset_allows_reemission_of_the_same_value() {
        let agg = TelemetryAggregator::default();
        agg.update("RAM Free", "1.0 GB");
        agg.reset();
        assert_eq!(
            agg.update("RAM Free", "1.0 GB"),
            Some("RAM Free: 1.0 GB".to_string())
        );
    }
}

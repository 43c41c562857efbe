use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::reader::RawRecord;

pub const CAPACITY_KEY: &str = "POWER_SUPPLY_CAPACITY";
pub const STATUS_KEY: &str = "POWER_SUPPLY_STATUS";
pub const HEALTH_KEY: &str = "POWER_SUPPLY_HEALTH";

/// Most recently observed battery telemetry. Replaced as a whole, never field by field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatteryState {
    pub capacity: Option<f32>,
    pub status: Option<String>,
    pub health: Option<String>,
}

impl BatteryState {
    pub fn from_record(record: &RawRecord) -> Self {
        Self {
            capacity: parse_capacity(record.get(CAPACITY_KEY)),
            status: non_empty(record.get(STATUS_KEY)),
            health: non_empty(record.get(HEALTH_KEY)),
        }
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.capacity.is_none() && self.status.is_none() && self.health.is_none()
    }
}

fn parse_capacity(raw: Option<&str>) -> Option<f32> {
    let Some(raw) = raw else {
        log::debug!("{} missing from record", CAPACITY_KEY);
        return None;
    };
    match raw.trim().parse::<f32>() {
        Ok(v) if v.is_finite() => Some(v.clamp(0.0, 100.0)),
        _ => {
            log::debug!("Ignoring non-numeric {}={:?}", CAPACITY_KEY, raw);
            None
        }
    }
}

fn non_empty(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim).filter(|s| !s.is_empty()).map(String::from)
}

/// Shared slot holding the latest published [`BatteryState`].
///
/// The lock is held only for the copy in or out, so readers always see a
/// complete state from a single publish.
#[derive(Debug, Clone, Default)]
pub struct SharedBattery {
    inner: Arc<Mutex<BatteryState>>,
}

impl SharedBattery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, state: BatteryState) {
        *self.lock() = state;
    }

    pub fn snapshot(&self) -> BatteryState {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, BatteryState> {
        // `publish` is a single move, so a poisoned slot still holds a whole state.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// One-shot exit flag shared by the render loop and the watcher.
///
/// Terminate signals do not set it directly; they reach the render loop as
/// [`InputEvent::Quit`](crate::device::InputEvent::Quit), which then sets it.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if this call was the one that set the flag.
    pub fn trigger(&self) -> bool {
        !self.flag.swap(true, Ordering::SeqCst)
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn record(text: &str) -> RawRecord {
        crate::reader::parse_record(text.as_bytes()).unwrap()
    }

    #[test]
    fn projects_known_keys() {
        let state = BatteryState::from_record(&record(
            "POWER_SUPPLY_CAPACITY=80\nPOWER_SUPPLY_STATUS=Charging\nPOWER_SUPPLY_HEALTH=Good\n",
        ));
        assert_eq!(state.capacity, Some(80.0));
        assert_eq!(state.status.as_deref(), Some("Charging"));
        assert_eq!(state.health.as_deref(), Some("Good"));
    }

    #[test]
    fn non_numeric_capacity_is_absent() {
        let state = BatteryState::from_record(&record(
            "POWER_SUPPLY_CAPACITY=lots\nPOWER_SUPPLY_STATUS=Full\n",
        ));
        assert_eq!(state.capacity, None);
        assert_eq!(state.status.as_deref(), Some("Full"));

        let state = BatteryState::from_record(&record("POWER_SUPPLY_CAPACITY\n"));
        assert_eq!(state.capacity, None);

        let state = BatteryState::from_record(&record("POWER_SUPPLY_CAPACITY=NaN\n"));
        assert_eq!(state.capacity, None);
    }

    #[test]
    fn capacity_is_clamped() {
        let state = BatteryState::from_record(&record("POWER_SUPPLY_CAPACITY=104\n"));
        assert_eq!(state.capacity, Some(100.0));
        let state = BatteryState::from_record(&record("POWER_SUPPLY_CAPACITY=-3\n"));
        assert_eq!(state.capacity, Some(0.0));
    }

    #[test]
    fn empty_labels_are_absent() {
        let state = BatteryState::from_record(&record(
            "POWER_SUPPLY_CAPACITY=5\nPOWER_SUPPLY_STATUS=\n",
        ));
        assert_eq!(state.status, None);
        assert_eq!(state.health, None);
    }

    #[test]
    fn shutdown_trigger_is_one_shot() {
        let signal = ShutdownSignal::new();
        let other = signal.clone();
        assert!(!other.is_set());
        assert!(signal.trigger());
        assert!(!other.trigger());
        assert!(other.is_set());
    }

    #[test]
    fn publish_is_atomic_for_concurrent_readers() {
        let shared = SharedBattery::new();
        let writer = {
            let shared = shared.clone();
            thread::spawn(move || {
                for n in 0..2000u32 {
                    let tag = n.to_string();
                    shared.publish(BatteryState {
                        capacity: Some((n % 101) as f32),
                        status: Some(tag.clone()),
                        health: Some(tag),
                    });
                }
            })
        };

        for _ in 0..2000 {
            let seen = shared.snapshot();
            if seen.is_empty() {
                continue;
            }
            let status: u32 = seen.status.as_deref().unwrap().parse().unwrap();
            assert_eq!(seen.health, seen.status);
            assert_eq!(seen.capacity, Some((status % 101) as f32));
        }
        writer.join().unwrap();
    }
}

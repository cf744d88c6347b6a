//! Fire-and-forget progress/status events emitted during a session. Trait
//! shape follows a typical listener-trait pattern (`EventBus`/`Listener`),
//! collapsed to a single method since the event set here is closed and
//! doesn't need per-kind subscription filtering.

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub model: u16,
    pub firmware: u32,
    pub serial: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockSync {
    pub host_ticks: i64,
    pub device_ticks: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Progress { current: u64, maximum: u64 },
    DeviceInfo(DeviceInfo),
    ClockSync(ClockSync),
    Waiting,
    Vendor { kind: u8, data: Vec<u8> },
}

pub trait EventSink {
    fn on_event(&mut self, event: &Event);
}

/// No-op sink for callers who don't care about progress/status events.
impl EventSink for () {
    fn on_event(&mut self, _event: &Event) {}
}

/// Collects every event in order; useful for tests and the demo CLI.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<Event>,
}

impl EventSink for RecordingSink {
    fn on_event(&mut self, event: &Event) {
        self.events.push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_preserves_order() {
        let mut sink = RecordingSink::default();
        sink.on_event(&Event::Progress {
            current: 0,
            maximum: 10,
        });
        sink.on_event(&Event::Waiting);
        assert_eq!(sink.events.len(), 2);
        assert_eq!(
            sink.events[0],
            Event::Progress {
                current: 0,
                maximum: 10
            }
        );
    }
}

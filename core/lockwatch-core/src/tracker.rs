//! Attempt tracking.
//!
//! Three partially overlapping paths can finish an attempt: an explicit submit
//! click, a text change that clears the field, and a content change where the
//! probe reads zero (or, with no readable field, the timing fallback fires).
//! Each path only completes on a submit or a clear-to-zero, and the probe's
//! non-zero branch only resynchronizes the length, so one logical attempt is
//! never counted twice.
//!
//! This is best effort. Known gaps: an auto-submitting keypad whose display is
//! invisible to the probe and whose rejection redraw lands outside the fallback
//! window is missed, and unrelated redraws inside the window after a digit are
//! counted.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::classifier::{classify, Signal, UiEvent};
use crate::config::{DetectionConfig, DEFAULT_FALLBACK_MAX_MS, DEFAULT_FALLBACK_MIN_MS};
use crate::probe::FieldLengthProbe;

/// Inclusive elapsed-time window for the probe-less fallback heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackWindow {
    min: Duration,
    max: Duration,
}

impl FallbackWindow {
    pub fn from_millis(min_ms: i64, max_ms: i64) -> Self {
        Self {
            min: Duration::milliseconds(min_ms),
            max: Duration::milliseconds(max_ms),
        }
    }

    pub fn contains(&self, elapsed: Duration) -> bool {
        self.min <= elapsed && elapsed <= self.max
    }
}

impl Default for FallbackWindow {
    fn default() -> Self {
        Self::from_millis(DEFAULT_FALLBACK_MIN_MS, DEFAULT_FALLBACK_MAX_MS)
    }
}

impl From<&DetectionConfig> for FallbackWindow {
    fn from(config: &DetectionConfig) -> Self {
        Self::from_millis(config.fallback_min_ms, config.fallback_max_ms)
    }
}

/// Per-session PIN entry state. Every method that returns `bool` reports
/// whether an attempt was completed by that call.
#[derive(Debug, Clone, Default)]
pub struct AttemptTracker {
    entered_length: u32,
    last_digit_at: Option<DateTime<Utc>>,
    window: FallbackWindow,
}

impl AttemptTracker {
    pub fn new(window: FallbackWindow) -> Self {
        Self {
            entered_length: 0,
            last_digit_at: None,
            window,
        }
    }

    pub fn entered_length(&self) -> u32 {
        self.entered_length
    }

    pub fn last_digit_at(&self) -> Option<DateTime<Utc>> {
        self.last_digit_at
    }

    pub fn reset(&mut self) {
        self.entered_length = 0;
        self.last_digit_at = None;
    }

    /// Classifies `event` and feeds it through the matching path.
    pub fn handle(&mut self, event: &UiEvent, probe: &dyn FieldLengthProbe) -> bool {
        match event {
            UiEvent::ContentChanged { at } => self.on_content_changed(probe, *at),
            _ => {
                let signal = classify(event, self.entered_length);
                self.apply(signal, event.at())
            }
        }
    }

    pub fn apply(&mut self, signal: Signal, at: DateTime<Utc>) -> bool {
        match signal {
            Signal::DigitEntered => {
                self.on_digit(at);
                false
            }
            Signal::Deleted => {
                self.on_delete();
                false
            }
            Signal::Submitted => self.on_submit(),
            Signal::FieldCleared => self.on_field_cleared(),
            Signal::NoSignal => false,
        }
    }

    pub fn on_digit(&mut self, at: DateTime<Utc>) {
        self.entered_length = self.entered_length.saturating_add(1);
        self.last_digit_at = Some(at);
    }

    pub fn on_delete(&mut self) {
        self.entered_length = self.entered_length.saturating_sub(1);
    }

    pub fn on_submit(&mut self) -> bool {
        self.complete("submit")
    }

    pub fn on_field_cleared(&mut self) -> bool {
        self.complete("field_cleared")
    }

    pub fn on_content_changed(&mut self, probe: &dyn FieldLengthProbe, now: DateTime<Utc>) -> bool {
        match probe.probe() {
            Some(0) if self.entered_length > 0 => self.complete("probe_cleared"),
            Some(length) => {
                if length != self.entered_length {
                    debug!(
                        tracked = self.entered_length,
                        probed = length,
                        "Resynchronized entered length from probe"
                    );
                }
                self.entered_length = length;
                false
            }
            None => self.on_probe_miss(now),
        }
    }

    /// Counts the entry that was still in the field when the device unlocked.
    /// The clear-to-zero for a correct PIN often arrives after the unlock.
    pub fn finish_on_unlock(&mut self) -> bool {
        self.complete("unlock")
    }

    fn on_probe_miss(&mut self, now: DateTime<Utc>) -> bool {
        let last_digit_at = match self.last_digit_at {
            Some(at) if self.entered_length > 0 => at,
            _ => return false,
        };

        let elapsed = now.signed_duration_since(last_digit_at);
        if self.window.contains(elapsed) {
            self.complete("timing_fallback")
        } else {
            debug!(
                elapsed_ms = elapsed.num_milliseconds(),
                "Content change outside fallback window; ignoring"
            );
            false
        }
    }

    fn complete(&mut self, path: &'static str) -> bool {
        if self.entered_length == 0 {
            return false;
        }
        debug!(path, digits = self.entered_length, "Attempt completed");
        self.reset();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::NoFieldProbe;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 10, 7, 30, 0).unwrap()
    }

    fn ms(offset: i64) -> DateTime<Utc> {
        t0() + Duration::milliseconds(offset)
    }

    fn tracker_with_digits(count: u32) -> AttemptTracker {
        let mut tracker = AttemptTracker::default();
        for index in 0..count {
            tracker.on_digit(ms(i64::from(index) * 100));
        }
        tracker
    }

    fn run(tracker: &mut AttemptTracker, events: &[(UiEvent, Option<u32>)]) -> u32 {
        let mut attempts = 0;
        for (event, probed) in events {
            let probed = *probed;
            if tracker.handle(event, &move || probed) {
                attempts += 1;
            }
        }
        attempts
    }

    #[test]
    fn any_number_of_digits_then_submit_is_one_attempt() {
        for digits in 1..=8 {
            let mut tracker = AttemptTracker::default();
            let mut attempts = 0;
            for index in 0..digits {
                attempts += u32::from(tracker.handle(&UiEvent::clicked("4", ms(index * 50)), &NoFieldProbe));
            }
            attempts += u32::from(tracker.handle(&UiEvent::clicked("Delete", ms(900)), &NoFieldProbe));
            attempts += u32::from(tracker.handle(&UiEvent::clicked("OK", ms(1_000)), &NoFieldProbe));
            assert_eq!(attempts, if digits > 1 { 1 } else { 0 }, "digits={digits}");
        }

        let mut tracker = AttemptTracker::default();
        tracker.on_digit(ms(0));
        assert!(tracker.handle(&UiEvent::clicked("Enter", ms(10)), &NoFieldProbe));
        assert_eq!(tracker.entered_length(), 0);
        assert_eq!(tracker.last_digit_at(), None);
    }

    #[test]
    fn delete_never_goes_negative() {
        let mut tracker = AttemptTracker::default();
        tracker.on_delete();
        tracker.on_delete();
        assert_eq!(tracker.entered_length(), 0);
        tracker.on_digit(ms(0));
        tracker.on_delete();
        tracker.on_delete();
        assert_eq!(tracker.entered_length(), 0);
    }

    #[test]
    fn submit_and_clear_without_digits_record_nothing() {
        let mut tracker = AttemptTracker::default();
        assert!(!tracker.on_submit());
        assert!(!tracker.on_field_cleared());
        assert!(!tracker.finish_on_unlock());
    }

    #[test]
    fn probe_smaller_nonzero_length_resyncs_without_attempt() {
        let mut tracker = tracker_with_digits(4);
        assert!(!tracker.on_content_changed(&|| Some(2u32), ms(1_000)));
        assert_eq!(tracker.entered_length(), 2);
    }

    #[test]
    fn probe_length_resync_can_raise_the_count() {
        let mut tracker = AttemptTracker::default();
        assert!(!tracker.on_content_changed(&|| Some(3u32), ms(0)));
        assert_eq!(tracker.entered_length(), 3);
        assert!(tracker.on_content_changed(&|| Some(0u32), ms(10)));
    }

    #[test]
    fn probe_zero_after_entry_records_exactly_one_attempt() {
        let mut tracker = tracker_with_digits(4);
        assert!(tracker.on_content_changed(&|| Some(0u32), ms(1_000)));
        assert_eq!(tracker.entered_length(), 0);
        assert!(!tracker.on_content_changed(&|| Some(0u32), ms(1_100)));
    }

    #[test]
    fn probe_miss_uses_inclusive_timing_window() {
        let last_digit = 300;
        let cases = [
            (150, false),
            (199, false),
            (200, true),
            (1_000, true),
            (4_000, true),
            (4_001, false),
            (5_000, false),
        ];
        for (elapsed, expected) in cases {
            let mut tracker = tracker_with_digits(4);
            assert_eq!(tracker.last_digit_at(), Some(ms(last_digit)));
            let recorded = tracker.on_content_changed(&NoFieldProbe, ms(last_digit + elapsed));
            assert_eq!(recorded, expected, "elapsed={elapsed}");
            assert_eq!(tracker.entered_length() == 0, expected);
        }
    }

    #[test]
    fn probe_miss_without_digit_timestamp_does_nothing() {
        let mut tracker = AttemptTracker::default();
        tracker.on_content_changed(&|| Some(2u32), ms(0));
        assert_eq!(tracker.last_digit_at(), None);
        assert!(!tracker.on_content_changed(&NoFieldProbe, ms(1_000)));
        assert_eq!(tracker.entered_length(), 2);
    }

    #[test]
    fn custom_window_is_honoured() {
        let mut tracker = AttemptTracker::new(FallbackWindow::from_millis(50, 100));
        tracker.on_digit(ms(0));
        assert!(!tracker.on_content_changed(&NoFieldProbe, ms(150)));
        assert!(tracker.on_content_changed(&NoFieldProbe, ms(100)));
    }

    #[test]
    fn text_clear_after_click_entry_is_one_attempt() {
        let mut tracker = AttemptTracker::default();
        let events = vec![
            (UiEvent::clicked("1", ms(0)), None),
            (UiEvent::clicked("2", ms(100)), None),
            (UiEvent::text_changed(&["••"], ms(120)), None),
            (UiEvent::text_changed::<&str>(&[], ms(900)), None),
            // Late redraw of the now-empty field must not count again.
            (UiEvent::ContentChanged { at: ms(950) }, Some(0)),
        ];
        assert_eq!(run(&mut tracker, &events), 1);
    }

    #[test]
    fn replaying_the_same_sequence_is_deterministic() {
        let events = vec![
            (UiEvent::clicked("1", ms(0)), None),
            (UiEvent::clicked("2", ms(200)), None),
            (UiEvent::ContentChanged { at: ms(1_000) }, None),
            (UiEvent::clicked("3", ms(2_000)), None),
            (UiEvent::clicked("backspace", ms(2_100)), None),
            (UiEvent::clicked("4", ms(2_200)), None),
            (UiEvent::ContentChanged { at: ms(2_300) }, Some(1)),
            (UiEvent::clicked("OK", ms(2_400)), None),
        ];
        let first = run(&mut AttemptTracker::default(), &events);
        let second = run(&mut AttemptTracker::default(), &events);
        assert_eq!(first, 2);
        assert_eq!(first, second);
    }
}

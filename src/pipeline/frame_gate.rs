use std::time::{Duration, Instant};

pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_FRAME_STRIDE: u64 = 5;

/// Decides which arriving frames reach the inference worker.
#[derive(Clone, Debug)]
pub enum FrameGate {
    /// Accept a frame once `interval` has passed since the last accepted one.
    Interval {
        interval: Duration,
        last_accepted: Option<Instant>,
    },
    /// Accept every `stride`-th frame, starting with the first. A zero stride
    /// admits nothing; configuration rejects it up front.
    Count { stride: u64, counter: u64 },
}

impl FrameGate {
    pub fn interval(interval: Duration) -> Self {
        FrameGate::Interval {
            interval,
            last_accepted: None,
        }
    }

    pub fn every_nth(stride: u64) -> Self {
        FrameGate::Count {
            stride,
            counter: 0,
        }
    }

    pub fn admit(&mut self, timestamp: Instant) -> bool {
        match self {
            FrameGate::Interval {
                interval,
                last_accepted,
            } => {
                let accept = match last_accepted {
                    Some(last) => timestamp.saturating_duration_since(*last) >= *interval,
                    None => true,
                };
                if accept {
                    *last_accepted = Some(timestamp);
                }
                accept
            }
            FrameGate::Count { stride, counter } => {
                let accept = counter.checked_rem(*stride) == Some(0);
                *counter = counter.wrapping_add(1);
                accept
            }
        }
    }

    /// Passes the frame through if admitted; otherwise drops it here, which
    /// runs its release handle before returning.
    pub fn filter<T>(&mut self, timestamp: Instant, frame: T) -> Option<T> {
        if self.admit(timestamp) {
            Some(frame)
        } else {
            drop(frame);
            None
        }
    }
}

impl Default for FrameGate {
    fn default() -> Self {
        FrameGate::interval(DEFAULT_FRAME_INTERVAL)
    }
}

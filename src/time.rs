//! Session clock timestamps.

use serde::{Deserialize, Serialize};

const MILLIS_PER_MINUTE: u64 = 60_000;

/// Milliseconds on the clock the transport stamps fragments with.
///
/// On target this is Embassy uptime; host transports typically use
/// Unix epoch milliseconds. Arithmetic saturates rather than wrapping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const fn from_millis(ms: u64) -> Self {
        Timestamp(ms)
    }

    pub const fn as_millis(self) -> u64 {
        self.0
    }

    pub const fn add_minutes(self, minutes: u32) -> Self {
        Timestamp(self.0.saturating_add(minutes as u64 * MILLIS_PER_MINUTE))
    }

    pub const fn sub_minutes(self, minutes: u32) -> Self {
        Timestamp(self.0.saturating_sub(minutes as u64 * MILLIS_PER_MINUTE))
    }

    /// Milliseconds elapsed since `earlier` (zero if `earlier` is later).
    pub const fn millis_since(self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minute_arithmetic() {
        let t = Timestamp::from_millis(3_600_000);
        assert_eq!(t.add_minutes(5).as_millis(), 3_900_000);
        assert_eq!(t.sub_minutes(60).as_millis(), 0);
        assert_eq!(t.sub_minutes(61).as_millis(), 0);
    }

    #[test]
    fn elapsed_saturates() {
        let a = Timestamp::from_millis(100);
        let b = Timestamp::from_millis(250);
        assert_eq!(b.millis_since(a), 150);
        assert_eq!(a.millis_since(b), 0);
    }
}

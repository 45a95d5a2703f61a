// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::{Duration, Instant};

/// Lets one probe call through at a time while the circuit is half-open.
///
/// A further probe is allowed once `cooldown` has passed since the last one, which covers
/// probes whose outcome is never recorded because the call was dropped.
#[derive(Debug, Clone)]
pub(crate) struct SingleProbe {
    cooldown: Duration,
    entered_at: Option<Instant>,
}

impl SingleProbe {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            entered_at: None,
        }
    }

    pub fn allow(&mut self, now: Instant) -> bool {
        match self.entered_at {
            Some(entered_at) if now.saturating_duration_since(entered_at) <= self.cooldown => false,
            _ => {
                self.entered_at = Some(now);
                true
            }
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_probe_until_cooldown_elapses() {
        let mut probe = SingleProbe::new(Duration::from_secs(5));
        let now = Instant::now();

        assert!(probe.allow(now));
        assert!(!probe.allow(now));
        assert!(!probe.allow(now + Duration::from_secs(5)));
        assert!(probe.allow(now + Duration::from_secs(5) + Duration::from_micros(1)));
        assert!(!probe.allow(now + Duration::from_secs(6)));
    }
}

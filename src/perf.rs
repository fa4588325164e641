#[cfg(feature = "perf")]
use std::time::Instant;

#[cfg(feature = "perf")]
pub struct PerfGuard {
    label: &'static str,
    start: Instant,
}

#[cfg(feature = "perf")]
impl Drop for PerfGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        tracing::info!(
            label = self.label,
            elapsed_us = elapsed.as_micros() as u64,
            "perf"
        );
    }
}

#[cfg(feature = "perf")]
#[inline]
pub fn scope(label: &'static str) -> PerfGuard {
    PerfGuard {
        label,
        start: Instant::now(),
    }
}

#[cfg(not(feature = "perf"))]
pub struct PerfGuard;

#[cfg(not(feature = "perf"))]
#[inline]
pub fn scope(_label: &'static str) -> PerfGuard {
    PerfGuard
}

use std::arch::x86_64::{_mm_clflush, _mm_mfence, _rdtsc};
use std::ptr::read_volatile;

use bankmap_core::config::MeasureConfig;
use bankmap_core::memory::LatencyOracle;
use log::{debug, info, trace, warn};

/// Rejected rounds allowed per accepted round before outliers are accepted anyway.
const MAX_REJECTS_PER_ROUND: usize = 100;

/// Latency oracle built on `rdtsc` and `clflush`.
///
/// Each measurement runs `outer_rounds` timed rounds. A round accesses both
/// addresses `inner_rounds` times, flushing each line after the access so the
/// next access goes to DRAM. Rounds slower than `threshold_multiplier` times
/// the calibrated baseline are treated as interrupted and repeated.
pub struct RdtscOracle {
    inner_rounds: usize,
    outer_rounds: usize,
    reject_above: f64,
}

impl RdtscOracle {
    /// Creates an oracle and calibrates its baseline on `base`.
    ///
    /// The baseline is the latency of `base` against `base + 8`, which share a
    /// cache line and therefore never conflict.
    ///
    /// # Safety
    ///
    /// `base` must be valid for reads of at least 16 bytes.
    pub unsafe fn calibrate(base: *const u8, config: &MeasureConfig) -> Self {
        assert!(config.inner_rounds > 0 && config.outer_rounds > 0);
        let mut oracle = RdtscOracle {
            inner_rounds: config.inner_rounds,
            outer_rounds: config.outer_rounds,
            reject_above: f64::INFINITY,
        };
        // warm up, then time without rejection
        let baseline = unsafe {
            oracle.time_pair(base, base.add(8));
            oracle.time_pair(base, base.add(8))
        };
        oracle.reject_above = baseline * config.threshold_multiplier;
        info!(
            "Baseline {:.3} ticks, rejecting rounds above {:.3}",
            baseline, oracle.reject_above
        );
        oracle
    }

    /// Average ticks per accepted round.
    unsafe fn time_pair(&self, a: *const u8, b: *const u8) -> f64 {
        let mut accepted = 0;
        let mut rejected = 0;
        let mut sum: u64 = 0;
        let mut min = u64::MAX;
        let mut max = 0;
        while accepted < self.outer_rounds {
            let ticks = unsafe { self.round(a, b) };
            if ticks as f64 > self.reject_above
                && rejected < self.outer_rounds * MAX_REJECTS_PER_ROUND
            {
                rejected += 1;
                continue;
            }
            accepted += 1;
            sum += ticks;
            min = min.min(ticks);
            max = max.max(ticks);
        }
        if rejected >= self.outer_rounds * MAX_REJECTS_PER_ROUND {
            warn!(
                "Retry budget exhausted for {:p}/{:p}; outliers included",
                a, b
            );
        }
        let avg = sum as f64 / self.outer_rounds as f64;
        trace!(
            "Avg Ticks: {:.3}, Max Ticks: {}, Min Ticks: {}, rejected {}",
            avg, max, min, rejected
        );
        avg
    }

    /// One timed round of interleaved flushed accesses.
    unsafe fn round(&self, a: *const u8, b: *const u8) -> u64 {
        unsafe {
            let start = _rdtsc();
            for _ in 0..self.inner_rounds {
                read_volatile(a);
                _mm_clflush(a);
                _mm_mfence();
                read_volatile(b);
                _mm_clflush(b);
                _mm_mfence();
            }
            let end = _rdtsc();
            end.saturating_sub(start)
        }
    }
}

impl LatencyOracle for RdtscOracle {
    unsafe fn measure_latency(&self, a: *const u8, b: *const u8) -> f64 {
        let latency = unsafe { self.time_pair(a, b) };
        debug!("{:p} <-> {:p}: {:.3}", a, b, latency);
        latency
    }
}

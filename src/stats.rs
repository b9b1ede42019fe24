//! Statistics for a run of the spot pipeline.
//!
//! The pipeline is single-threaded, so counters are plain integers owned by
//! whoever records them. Remote lookup latency is tracked in an HDR
//! histogram.

use hdrhistogram::Histogram;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::spot::Spot;

/// Counters kept by the enrichment cache.
#[derive(Debug)]
pub struct LookupStats {
    /// Resolves answered from the local store
    pub cache_hits: u64,

    /// Calls to the remote callbook (retries included)
    pub remote_lookups: u64,

    /// Definitive "no such call sign" answers from the callbook
    pub not_found: u64,

    /// Resolves that ended in an error (not cached)
    pub errors: u64,

    /// Times the callbook session had to be renewed
    pub session_renewals: u64,

    /// Failed writes to the local store
    pub store_failures: u64,

    /// Remote resolve latency in milliseconds
    latency_ms: Histogram<u64>,
}

impl LookupStats {
    pub fn new() -> Self {
        Self {
            cache_hits: 0,
            remote_lookups: 0,
            not_found: 0,
            errors: 0,
            session_renewals: 0,
            store_failures: 0,
            // 1ms to 2 minutes, 2 significant figures
            latency_ms: Histogram::new_with_bounds(1, 120_000, 2)
                .expect("Failed to create latency histogram"),
        }
    }

    /// Record how long one remote resolve took.
    pub fn record_latency(&mut self, elapsed: Duration) {
        let ms = (elapsed.as_millis() as u64).clamp(1, 120_000);
        let _ = self.latency_ms.record(ms);
    }

    pub fn latency_percentiles(&self) -> Option<HistogramPercentiles> {
        if self.latency_ms.is_empty() {
            return None;
        }
        let h = &self.latency_ms;
        Some(HistogramPercentiles {
            p50: h.value_at_quantile(0.50),
            p90: h.value_at_quantile(0.90),
            p99: h.value_at_quantile(0.99),
            min: h.min(),
            max: h.max(),
            mean: h.mean(),
        })
    }
}

impl Default for LookupStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters kept by the pipeline.
#[derive(Debug)]
pub struct PipelineStats {
    /// Lines read from the feed after login
    pub lines: u64,

    /// Lines parsed into spots
    pub spots: u64,

    /// Lines that looked like spots but failed to parse
    pub parse_failures: u64,

    /// Lines that were not spots at all
    pub non_spot_lines: u64,

    /// Spots that passed the filter chain
    pub passed: u64,

    /// Spots passed only because of the friend override
    pub friend_overrides: u64,

    /// Spots rejected by the filter chain
    pub filtered: u64,

    /// Passing spots collapsed into a repeat marker
    pub repeats: u64,

    /// Connection losses
    pub disconnects: u64,

    /// Passing spots per band
    passed_by_band: HashMap<String, u64>,

    /// When stats collection started
    start_time: Instant,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self {
            lines: 0,
            spots: 0,
            parse_failures: 0,
            non_spot_lines: 0,
            passed: 0,
            friend_overrides: 0,
            filtered: 0,
            repeats: 0,
            disconnects: 0,
            passed_by_band: HashMap::new(),
            start_time: Instant::now(),
        }
    }

    /// Record a spot that made it through the filter chain.
    pub fn record_pass(&mut self, spot: &Spot) {
        self.passed += 1;
        let band = spot
            .band()
            .map(|b| b.to_string())
            .unwrap_or_else(|| "other".to_string());
        *self.passed_by_band.entry(band).or_insert(0) += 1;
    }

    /// Get the elapsed time since stats collection started.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Generate a summary report.
    pub fn summary(&self, lookups: &LookupStats) -> StatsSummary {
        StatsSummary {
            elapsed_secs: self.elapsed().as_secs_f64(),
            lines: self.lines,
            spots: self.spots,
            parse_failures: self.parse_failures,
            non_spot_lines: self.non_spot_lines,
            passed: self.passed,
            friend_overrides: self.friend_overrides,
            filtered: self.filtered,
            repeats: self.repeats,
            disconnects: self.disconnects,
            cache_hits: lookups.cache_hits,
            remote_lookups: lookups.remote_lookups,
            not_found: lookups.not_found,
            lookup_errors: lookups.errors,
            session_renewals: lookups.session_renewals,
            store_failures: lookups.store_failures,
            lookup_latency_ms: lookups.latency_percentiles(),
            passed_by_band: self.passed_by_band.clone(),
        }
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Percentile values from a histogram.
#[derive(Debug, Clone)]
pub struct HistogramPercentiles {
    pub p50: u64,
    pub p90: u64,
    pub p99: u64,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
}

/// Summary of collected statistics.
#[derive(Debug, Clone)]
pub struct StatsSummary {
    pub elapsed_secs: f64,
    pub lines: u64,
    pub spots: u64,
    pub parse_failures: u64,
    pub non_spot_lines: u64,
    pub passed: u64,
    pub friend_overrides: u64,
    pub filtered: u64,
    pub repeats: u64,
    pub disconnects: u64,
    pub cache_hits: u64,
    pub remote_lookups: u64,
    pub not_found: u64,
    pub lookup_errors: u64,
    pub session_renewals: u64,
    pub store_failures: u64,
    pub lookup_latency_ms: Option<HistogramPercentiles>,
    pub passed_by_band: HashMap<String, u64>,
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "═══════════════════════════════════════════════════════")?;
        writeln!(f, "                  RBN FILTER STATISTICS")?;
        writeln!(f, "═══════════════════════════════════════════════════════")?;
        writeln!(f)?;
        writeln!(f, "Runtime: {:.1}s", self.elapsed_secs)?;
        writeln!(f, "Lines read: {}", self.lines)?;
        writeln!(f, "Spots parsed: {}", self.spots)?;
        writeln!(f, "Parse failures: {}", self.parse_failures)?;
        writeln!(f, "Non-spot lines: {}", self.non_spot_lines)?;
        writeln!(
            f,
            "Passed: {} ({:.1}%), {} by friend override",
            self.passed,
            if self.spots > 0 {
                self.passed as f64 / self.spots as f64 * 100.0
            } else {
                0.0
            },
            self.friend_overrides
        )?;
        writeln!(f, "Filtered: {}", self.filtered)?;
        writeln!(f, "Repeats: {}", self.repeats)?;
        writeln!(f, "Disconnects: {}", self.disconnects)?;
        writeln!(f)?;
        writeln!(f, "Callbook:")?;
        writeln!(f, "  Cache hits: {}", self.cache_hits)?;
        writeln!(f, "  Remote lookups: {}", self.remote_lookups)?;
        writeln!(f, "  Not found: {}", self.not_found)?;
        writeln!(f, "  Errors: {}", self.lookup_errors)?;
        writeln!(f, "  Session renewals: {}", self.session_renewals)?;
        if self.store_failures > 0 {
            writeln!(f, "  Store write failures: {}", self.store_failures)?;
        }

        if let Some(ref p) = self.lookup_latency_ms {
            writeln!(f, "  Latency (ms): Min: {}, Max: {}, Mean: {:.1}", p.min, p.max, p.mean)?;
            writeln!(f, "                P50: {}, P90: {}, P99: {}", p.p50, p.p90, p.p99)?;
        }

        if !self.passed_by_band.is_empty() {
            writeln!(f)?;
            writeln!(f, "Passed by Band:")?;
            let mut bands: Vec<_> = self.passed_by_band.iter().collect();
            bands.sort_by(|a, b| b.1.cmp(a.1));
            for (band, count) in bands {
                writeln!(f, "  {}: {}", band, count)?;
            }
        }

        Ok(())
    }
}

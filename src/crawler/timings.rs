//! Per-attempt request phase timings

use std::fmt;
use std::time::{Duration, Instant};

/// A measured stage of a single geocoding request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Building the URL, query string, and headers
    Preparation,

    /// Selecting (and on first use, building) the client bound to the proxy
    ProxyBinding,

    /// Sending the request until response headers arrive
    Transport,

    /// Waiting for the first chunk of the body
    TimeToFirstByte,

    /// Reading the rest of the body
    ContentDownload,
}

impl Phase {
    /// All phases in execution order
    pub const ALL: [Phase; 5] = [
        Phase::Preparation,
        Phase::ProxyBinding,
        Phase::Transport,
        Phase::TimeToFirstByte,
        Phase::ContentDownload,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Preparation => "preparation",
            Phase::ProxyBinding => "proxy_binding",
            Phase::Transport => "transport",
            Phase::TimeToFirstByte => "time_to_first_byte",
            Phase::ContentDownload => "content_download",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered phase → duration map for one attempt
///
/// Never merged across attempts; each retry starts from an empty map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhaseTimings {
    entries: Vec<(Phase, Duration)>,
}

impl PhaseTimings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a phase, replacing any earlier value for it
    pub fn record(&mut self, phase: Phase, duration: Duration) {
        match self.entries.iter_mut().find(|(p, _)| *p == phase) {
            Some(entry) => entry.1 = duration,
            None => self.entries.push((phase, duration)),
        }
    }

    pub fn get(&self, phase: Phase) -> Option<Duration> {
        self.entries
            .iter()
            .find(|(p, _)| *p == phase)
            .map(|(_, d)| *d)
    }

    /// Sum of all recorded phases
    pub fn total(&self) -> Duration {
        self.entries.iter().map(|(_, d)| *d).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Phase, Duration)> + '_ {
        self.entries.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for PhaseTimings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (phase, duration)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {:.6}s", phase, duration.as_secs_f64())?;
        }
        f.write_str("}")
    }
}

/// Lap timer that fills a [`PhaseTimings`] as phases complete
#[derive(Debug)]
pub(crate) struct PhaseTimer {
    lap_start: Instant,
    timings: PhaseTimings,
}

impl PhaseTimer {
    pub(crate) fn start() -> Self {
        Self {
            lap_start: Instant::now(),
            timings: PhaseTimings::new(),
        }
    }

    /// Closes the current phase and starts the next lap
    pub(crate) fn lap(&mut self, phase: Phase) {
        let now = Instant::now();
        self.timings.record(phase, now.duration_since(self.lap_start));
        self.lap_start = now;
    }

    pub(crate) fn timings(&self) -> &PhaseTimings {
        &self.timings
    }

    pub(crate) fn finish(self) -> PhaseTimings {
        self.timings
    }
}

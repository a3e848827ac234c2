use std::fmt;

// ---------------------------------------------------------------------------
// TracePosition / Channel – what a waveform capture was recorded at
// ---------------------------------------------------------------------------

/// Filter-wheel position of a capture. Filters are 1-based; the dark captures
/// are recorded with the light path blocked before and after the sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TracePosition {
    Filter(usize),
    PrePedestal,
    PostPedestal,
}

impl TracePosition {
    /// File stem of the capture inside a run directory.
    pub fn file_stem(&self) -> String {
        match self {
            TracePosition::Filter(n) => n.to_string(),
            TracePosition::PrePedestal => "12-0".to_string(),
            TracePosition::PostPedestal => "12-1".to_string(),
        }
    }
}

impl fmt::Display for TracePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TracePosition::Filter(n) => write!(f, "F{n}"),
            TracePosition::PrePedestal => write!(f, "pre-pedestal"),
            TracePosition::PostPedestal => write!(f, "post-pedestal"),
        }
    }
}

/// Voltage channel of the digitizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Pmt,
    Photodiode,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Pmt => write!(f, "pmt"),
            Channel::Photodiode => write!(f, "photodiode"),
        }
    }
}

// ---------------------------------------------------------------------------
// WaveformCapture – one recorded file
// ---------------------------------------------------------------------------

/// One capture: a timestamp channel and the two voltage channels, all the
/// same length, at the effective sample rate of the run.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformCapture {
    pub position: TracePosition,
    pub timestamp: Vec<f64>,
    pub pmt: Vec<f64>,
    pub photodiode: Vec<f64>,
}

impl WaveformCapture {
    pub fn channel(&self, channel: Channel) -> &[f64] {
        match channel {
            Channel::Pmt => &self.pmt,
            Channel::Photodiode => &self.photodiode,
        }
    }

    /// Usable length: the shortest of the three channels.
    pub fn len(&self) -> usize {
        self.timestamp
            .len()
            .min(self.pmt.len())
            .min(self.photodiode.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keep only samples `[0, limit)` of every channel.
    pub fn truncate(&mut self, limit: usize) {
        self.timestamp.truncate(limit);
        self.pmt.truncate(limit);
        self.photodiode.truncate(limit);
    }

    /// Subtract a constant baseline from one channel in place.
    pub fn subtract_baseline(&mut self, channel: Channel, baseline: f64) {
        let samples = match channel {
            Channel::Pmt => &mut self.pmt,
            Channel::Photodiode => &mut self.photodiode,
        };
        for v in samples.iter_mut() {
            *v -= baseline;
        }
    }
}

// ---------------------------------------------------------------------------
// RunData – every capture of one run, trimmed to a common length
// ---------------------------------------------------------------------------

/// The (pre, post) pair of dark captures.
#[derive(Debug, Clone, PartialEq)]
pub struct PedestalMeasurement {
    pub pre: WaveformCapture,
    pub post: WaveformCapture,
}

/// All captures of one run. `filters[i]` is filter position `i + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct RunData {
    /// Effective sample rate (hardware rate / prescale), in samples/s.
    pub sample_rate: f64,
    pub filters: Vec<WaveformCapture>,
    pub pedestal: PedestalMeasurement,
}

// ---------------------------------------------------------------------------
// Per-cycle and per-filter results
// ---------------------------------------------------------------------------

/// One independent High/Low comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CyclePair {
    pub high: f64,
    pub low: f64,
}

impl CyclePair {
    /// Order two plateau means into a pair.
    pub fn from_means(a: f64, b: f64) -> Self {
        Self {
            high: a.max(b),
            low: a.min(b),
        }
    }

    pub fn level(&self) -> f64 {
        (self.high + self.low) / 2.0
    }

    pub fn asymmetry(&self) -> f64 {
        (self.high - self.low) / (self.high + self.low)
    }
}

/// Aggregated result of one filter position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterResult {
    pub position: usize,
    pub asymmetry: f64,
    pub asymmetry_err: f64,
    /// Current proxy: mean plateau level in volts.
    pub level: f64,
    pub level_err: f64,
    pub photodiode: f64,
    pub photodiode_err: f64,
    /// Number of comparisons aggregated.
    pub pairs: usize,
}

//! Step-edge matched filter.
//!
//! A chopper transition is a step, so correlating the trace with a ±1 step
//! kernel turns every transition into a triangular peak whose position does
//! not depend on the absolute baseline or amplitude of the filter.

use super::mean;

// ---------------------------------------------------------------------------
// TransitionSequence
// ---------------------------------------------------------------------------

/// Transition instants detected in one trace.
///
/// `peaks` are indices into the trimmed filter response; adding `offset`
/// (half the kernel) maps them onto the sample index where the step occurs.
/// Indexing in the trimmed domain puts each peak at the centre of the plateau
/// that precedes its step, which is the reference point H/L windows use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionSequence {
    peaks: Vec<usize>,
    offset: usize,
}

impl TransitionSequence {
    pub fn new(peaks: Vec<usize>, offset: usize) -> Self {
        Self { peaks, offset }
    }

    /// Peak indices in the trimmed response domain.
    pub fn peaks(&self) -> &[usize] {
        &self.peaks
    }

    /// Sample indices of the steps in the original trace.
    pub fn edge_positions(&self) -> Vec<usize> {
        self.peaks.iter().map(|p| p + self.offset).collect()
    }

    /// Spacing between consecutive transitions, in samples.
    pub fn periods(&self) -> Vec<usize> {
        self.peaks.windows(2).map(|w| w[1] - w[0]).collect()
    }

    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }
}

// ---------------------------------------------------------------------------
// EdgeDetector
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeDetector {
    /// Nominal kernel size `k`; the kernel holds `k / 2` ones then `k / 2`
    /// minus ones.
    kernel_size: usize,
    /// Minimum separation of two detected transitions.
    min_distance: usize,
}

impl EdgeDetector {
    /// Detector for a trace with `samples_per_cycle` samples per chopper
    /// cycle: the kernel spans half a cycle. `None` if the cycle is too short
    /// to build a kernel.
    pub fn for_cycle(samples_per_cycle: f64, distance_fraction: f64) -> Option<Self> {
        let kernel_size = (0.5 * samples_per_cycle).floor() as usize;
        if kernel_size < 2 {
            return None;
        }
        let min_distance = ((distance_fraction * kernel_size as f64).floor() as usize).max(1);
        Some(Self {
            kernel_size,
            min_distance,
        })
    }

    pub fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    pub fn min_distance(&self) -> usize {
        self.min_distance
    }

    /// Samples discarded at each end of the response.
    pub fn half_kernel(&self) -> usize {
        self.kernel_size / 2
    }

    /// `|trace * kernel| / k` for the same-length convolution, with
    /// `k / 2` edge samples dropped at both ends.
    ///
    /// Element `i` compares the `k / 2` samples from `i + k/2` onwards with
    /// the `k / 2` samples before them.
    pub fn response(&self, trace: &[f64]) -> Vec<f64> {
        let half = self.half_kernel();
        if trace.len() <= 2 * half {
            return Vec::new();
        }

        // The kernel sums to zero, so removing the mean changes nothing but
        // keeps the running sums small.
        let m = mean(trace);
        let mut prefix = Vec::with_capacity(trace.len() + 1);
        prefix.push(0.0);
        let mut acc = 0.0;
        for v in trace {
            acc += v - m;
            prefix.push(acc);
        }

        let scale = 1.0 / self.kernel_size as f64;
        (0..trace.len() - 2 * half)
            .map(|i| {
                let before = prefix[i + half] - prefix[i];
                let after = prefix[i + 2 * half] - prefix[i + half];
                (after - before).abs() * scale
            })
            .collect()
    }

    /// Locate every transition of a trace.
    pub fn detect(&self, trace: &[f64]) -> TransitionSequence {
        let response = self.response(trace);
        TransitionSequence::new(find_peaks(&response, self.min_distance), self.half_kernel())
    }
}

// ---------------------------------------------------------------------------
// Peak search
// ---------------------------------------------------------------------------

/// Local maxima of `x` at least `distance` samples apart, in ascending order.
///
/// A flat-topped maximum reports its middle sample. When two maxima are closer
/// than `distance`, the higher one is kept; end samples are never maxima.
pub fn find_peaks(x: &[f64], distance: usize) -> Vec<usize> {
    let peaks = local_maxima(x);
    if distance <= 1 || peaks.len() < 2 {
        return peaks;
    }

    let mut order: Vec<usize> = (0..peaks.len()).collect();
    order.sort_by(|&a, &b| x[peaks[a]].total_cmp(&x[peaks[b]]));

    let mut keep = vec![true; peaks.len()];
    for &j in order.iter().rev() {
        if !keep[j] {
            continue;
        }
        let mut k = j;
        while k > 0 && peaks[j] - peaks[k - 1] < distance {
            k -= 1;
            keep[k] = false;
        }
        let mut k = j + 1;
        while k < peaks.len() && peaks[k] - peaks[j] < distance {
            keep[k] = false;
            k += 1;
        }
    }

    peaks
        .into_iter()
        .zip(keep)
        .filter_map(|(p, kept)| kept.then_some(p))
        .collect()
}

fn local_maxima(x: &[f64]) -> Vec<usize> {
    let mut peaks = Vec::new();
    if x.len() < 3 {
        return peaks;
    }
    let last = x.len() - 1;
    let mut i = 1;
    while i < last {
        if x[i - 1] < x[i] {
            let mut ahead = i + 1;
            while ahead < last && x[ahead] == x[i] {
                ahead += 1;
            }
            if x[ahead] < x[i] {
                peaks.push((i + ahead - 1) / 2);
                i = ahead;
            }
        }
        i += 1;
    }
    peaks
}

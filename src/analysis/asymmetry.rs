use super::{mean, sem};
use crate::data::model::{CyclePair, FilterResult};

/// Aggregate the comparisons of one filter position into a [`FilterResult`].
///
/// Asymmetry and level are each summarized as mean ± SEM over the pairs; the
/// photodiode summary is taken over the whole pedestal-corrected trace.
pub fn aggregate(position: usize, pairs: &[CyclePair], photodiode: &[f64]) -> FilterResult {
    let asymmetries: Vec<f64> = pairs.iter().map(CyclePair::asymmetry).collect();
    let levels: Vec<f64> = pairs.iter().map(CyclePair::level).collect();

    FilterResult {
        position,
        asymmetry: mean(&asymmetries),
        asymmetry_err: sem(&asymmetries),
        level: mean(&levels),
        level_err: sem(&levels),
        photodiode: mean(photodiode),
        photodiode_err: sem(photodiode),
        pairs: pairs.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn mean_and_standard_error() {
        let pairs = [
            CyclePair { high: 1.1, low: 0.9 },
            CyclePair { high: 1.3, low: 0.7 },
        ];
        let r = aggregate(4, &pairs, &[0.2, 0.4]);
        assert_eq!(r.position, 4);
        assert_eq!(r.pairs, 2);
        // asymmetries 0.1 and 0.3
        assert_relative_eq!(r.asymmetry, 0.2, epsilon = 1e-12);
        assert_relative_eq!(r.asymmetry_err, 0.1 / 2f64.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(r.level, 1.0, epsilon = 1e-12);
        assert_relative_eq!(r.level_err, 0.0, epsilon = 1e-12);
        assert_relative_eq!(r.photodiode, 0.3, epsilon = 1e-12);
        assert_relative_eq!(r.photodiode_err, 0.1 / 2f64.sqrt(), epsilon = 1e-12);
    }
}

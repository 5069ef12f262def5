use std::fmt::Display;

/// A value that can be fed to an `OnlineStatistic`.
pub trait Sample: Copy + PartialOrd + Display {
    /// Starting value for the running minimum.
    const HIGHEST: Self;
    /// Starting value for the running maximum.
    const LOWEST: Self;
    const ZERO: Self;

    fn as_f64(self) -> f64;
}

impl Sample for u64 {
    const HIGHEST: Self = u64::MAX;
    const LOWEST: Self = u64::MIN;
    const ZERO: Self = 0;

    fn as_f64(self) -> f64 {
        self as f64
    }
}

impl Sample for f64 {
    const HIGHEST: Self = f64::INFINITY;
    const LOWEST: Self = f64::NEG_INFINITY;
    const ZERO: Self = 0.0;

    fn as_f64(self) -> f64 {
        self
    }
}

/// Streaming min/max/mean/variance (Welford), accumulated in `f64`.
#[derive(Debug, Clone)]
pub struct OnlineStatistic<T: Sample> {
    name: String,
    min: T,
    max: T,
    count: u64,
    mean: f64,
    m2: f64,
}

impl<T: Sample> OnlineStatistic<T> {
    /// `name` is the full column suffix, e.g. `bidirectional_ps`.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), min: T::HIGHEST, max: T::LOWEST, count: 0, mean: 0.0, m2: 0.0 }
    }

    pub fn update(&mut self, value: T) {
        self.count += 1;
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
        let v = value.as_f64();
        let delta = v - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (v - self.mean);
    }

    pub fn reset(&mut self) {
        self.min = T::HIGHEST;
        self.max = T::LOWEST;
        self.count = 0;
        self.mean = 0.0;
        self.m2 = 0.0;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// `None` until the first sample.
    pub fn min(&self) -> Option<T> {
        (self.count > 0).then_some(self.min)
    }

    pub fn max(&self) -> Option<T> {
        (self.count > 0).then_some(self.max)
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sum of squared deviations from the mean, not normalised by the count.
    /// This is what the `stddev` column carries.
    pub fn accumulator(&self) -> f64 {
        self.m2
    }

    /// Population variance, for callers that want a normalised figure.
    pub fn variance(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.m2 / self.count as f64
        }
    }

    pub fn column_names(&self) -> [String; 4] {
        let n = &self.name;
        [format!("{n}_min"), format!("{n}_max"), format!("{n}_mean"), format!("{n}_stddev")]
    }

    /// Values in `column_names` order; empty statistics print zeros.
    pub fn fields(&self) -> [String; 4] {
        [
            self.min().unwrap_or(T::ZERO).to_string(),
            self.max().unwrap_or(T::ZERO).to_string(),
            self.mean.to_string(),
            self.m2.to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
    }

    #[test]
    fn tracks_min_max_mean() {
        let samples = [7.5, -2.0, 3.25, 11.0, 0.0, 3.25];
        let mut stat = OnlineStatistic::<f64>::new("x");
        for s in samples {
            stat.update(s);
        }

        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        let m2: f64 = samples.iter().map(|s| (s - mean).powi(2)).sum();

        assert_eq!(stat.count(), 6);
        assert_eq!(stat.min(), Some(-2.0));
        assert_eq!(stat.max(), Some(11.0));
        assert!(approx(stat.mean(), mean));
        assert!(approx(stat.accumulator(), m2));
        assert!(approx(stat.variance(), m2 / 6.0));
    }

    #[test]
    fn integer_samples_accumulate_in_f64() {
        let mut stat = OnlineStatistic::<u64>::new("ps");
        for v in [1u64, 2, 3, 4] {
            stat.update(v);
        }
        assert_eq!(stat.min(), Some(1));
        assert_eq!(stat.max(), Some(4));
        assert!(approx(stat.mean(), 2.5));
        assert!(approx(stat.accumulator(), 5.0));
        assert_eq!(stat.fields(), ["1".to_string(), "4".into(), "2.5".into(), "5".into()]);
    }

    #[test]
    fn single_sample_has_zero_spread() {
        let mut stat = OnlineStatistic::<u64>::new("ps");
        stat.update(42);
        assert_eq!(stat.min(), stat.max());
        assert_eq!(stat.accumulator(), 0.0);
    }

    #[test]
    fn reset_restores_sentinels() {
        let mut stat = OnlineStatistic::<f64>::new("piat");
        stat.update(0.5);
        stat.update(1.5);
        stat.reset();

        assert_eq!(stat.count(), 0);
        assert_eq!(stat.min(), None);
        assert_eq!(stat.max(), None);
        assert_eq!(stat.mean(), 0.0);
        assert_eq!(stat.accumulator(), 0.0);

        stat.update(9.0);
        assert_eq!(stat.min(), Some(9.0));
        assert_eq!(stat.max(), Some(9.0));
    }

    #[test]
    fn empty_statistic_prints_zeros() {
        let stat = OnlineStatistic::<f64>::new("bidirectional_piat");
        assert_eq!(stat.fields(), ["0", "0", "0", "0"].map(String::from));
        assert_eq!(
            stat.column_names(),
            [
                "bidirectional_piat_min",
                "bidirectional_piat_max",
                "bidirectional_piat_mean",
                "bidirectional_piat_stddev"
            ]
            .map(String::from)
        );
    }
}

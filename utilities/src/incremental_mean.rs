/// Running arithmetic mean updated one observation at a time:
/// `avg = (avg * n + observed) / (n + 1)`.
///
/// The accumulator can be seeded with an a-priori estimate which is reported
/// until the first real observation arrives and then replaced by measured
/// data only.
#[derive(Debug, Clone, Copy)]
pub struct IncrementalMean {
    mean: f64,
    samples: u32,
}

impl IncrementalMean {
    pub fn seeded(estimate: f64) -> Self {
        Self {
            mean: estimate,
            samples: 0,
        }
    }

    pub fn record(&mut self, observed: f64) {
        self.mean = (self.mean * f64::from(self.samples) + observed) / f64::from(self.samples + 1);
        self.samples += 1;
    }

    pub fn value(&self) -> f64 {
        self.mean
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_batch_mean() {
        let durations = [1.25, 0.8, 2.0, 1.6, 0.95, 1.1];

        let mut mean = IncrementalMean::seeded(99.0);
        for d in durations {
            mean.record(d);
        }

        let batch: f64 = durations.iter().sum::<f64>() / durations.len() as f64;
        assert!((mean.value() - batch).abs() < 1e-12);
        assert_eq!(mean.samples(), durations.len() as u32);
    }

    #[test]
    fn seed_is_replaced_by_first_observation() {
        let mut mean = IncrementalMean::seeded(10.0);
        assert_eq!(mean.value(), 10.0);

        mean.record(2.0);
        assert_eq!(mean.value(), 2.0);
    }
}

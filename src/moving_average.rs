use std::collections::VecDeque;
use std::ops::{AddAssign, Div, SubAssign};

// Adapted from https://docs.rs/simple_moving_average/latest/src/simple_moving_average/single_sum_sma.rs.html
pub(crate) struct SingleSumSMA<Sample> {
    samples: VecDeque<Sample>,
    window_size: usize,
    sum: Sample,
    zero: Sample,
}

impl<Sample> SingleSumSMA<Sample>
where
    Sample: Copy + AddAssign + SubAssign + Div<f64, Output = Sample>,
{
    pub fn new(window_size: usize, zero: Sample) -> Self {
        Self {
            samples: VecDeque::with_capacity(window_size),
            window_size,
            sum: zero,
            zero,
        }
    }

    pub fn add_sample(&mut self, new_sample: Sample) {
        if self.window_size == 0 {
            return;
        }

        self.sum += new_sample;

        if self.samples.len() == self.window_size {
            if let Some(oldest) = self.samples.pop_back() {
                self.sum -= oldest;
            }
        }
        self.samples.push_front(new_sample);
    }

    pub fn get_average(&self) -> Sample {
        let num_samples = self.samples.len();

        if num_samples == 0 {
            return self.sum;
        }

        self.sum / num_samples as f64
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() == self.window_size
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.sum = self.zero;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averages_over_a_sliding_window() {
        let mut sma = SingleSumSMA::<f64>::new(3, 0.0);
        assert!(!sma.is_full());
        sma.add_sample(3.0);
        assert_eq!(sma.get_average(), 3.0);
        sma.add_sample(6.0);
        sma.add_sample(9.0);
        assert!(sma.is_full());
        assert_eq!(sma.get_average(), 6.0);
        sma.add_sample(12.0);
        assert_eq!(sma.get_average(), 9.0);
    }

    #[test]
    fn clear_resets_the_window() {
        let mut sma = SingleSumSMA::<f64>::new(2, 0.0);
        sma.add_sample(5.0);
        sma.add_sample(7.0);
        sma.clear();
        assert!(!sma.is_full());
        assert_eq!(sma.get_average(), 0.0);
    }
}

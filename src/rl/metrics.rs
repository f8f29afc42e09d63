//! Windowed training metrics

use std::collections::VecDeque;
use std::time::Instant;

/// Moving average calculator
#[derive(Debug, Clone)]
pub struct MovingAverage {
    values: VecDeque<f32>,
    window_size: usize,
    sum: f32,
}

impl MovingAverage {
    pub fn new(window_size: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(window_size),
            window_size: window_size.max(1),
            sum: 0.0,
        }
    }

    pub fn push(&mut self, value: f32) {
        if self.values.len() >= self.window_size
            && let Some(old) = self.values.pop_front()
        {
            self.sum -= old;
        }
        self.values.push_back(value);
        self.sum += value;
    }

    pub fn average(&self) -> f32 {
        if self.values.is_empty() {
            0.0
        } else {
            self.sum / self.values.len() as f32
        }
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.sum = 0.0;
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Per-learner training metrics tracker
#[derive(Debug, Clone)]
pub struct TrainingMetrics {
    pub episode_rewards: MovingAverage,
    pub episode_lengths: MovingAverage,
    pub value_loss: MovingAverage,
    pub survival_rate: MovingAverage,
    pub perfect_rate: MovingAverage,
    pub total_episodes: usize,
    pub total_steps: usize,
    start_time: Instant,
}

impl TrainingMetrics {
    pub fn new(window_size: usize) -> Self {
        Self {
            episode_rewards: MovingAverage::new(window_size),
            episode_lengths: MovingAverage::new(window_size),
            value_loss: MovingAverage::new(window_size),
            survival_rate: MovingAverage::new(window_size),
            perfect_rate: MovingAverage::new(window_size),
            total_episodes: 0,
            total_steps: 0,
            start_time: Instant::now(),
        }
    }

    /// Record episode completion
    pub fn record_episode(
        &mut self,
        reward: f32,
        length: usize,
        loss: f32,
        survived: bool,
        perfect: bool,
    ) {
        self.episode_rewards.push(reward);
        self.episode_lengths.push(length as f32);
        self.value_loss.push(loss);
        self.survival_rate.push(if survived { 1.0 } else { 0.0 });
        self.perfect_rate.push(if perfect { 1.0 } else { 0.0 });
        self.total_episodes += 1;
        self.total_steps += length;
    }

    pub fn steps_per_second(&self) -> f64 {
        let duration = self.start_time.elapsed().as_secs_f64();
        if duration > 0.0 {
            self.total_steps as f64 / duration
        } else {
            0.0
        }
    }

    pub fn log_to_console(&self, label: &str) {
        tracing::info!(
            "[{}] Episodes {} | Steps {} | SPS {:.1}",
            label,
            self.total_episodes,
            self.total_steps,
            self.steps_per_second()
        );
        tracing::info!(
            "[{}]   reward={:.2}, length={:.1}, loss={:.4}, survival={:.1}%, perfect={:.1}%",
            label,
            self.episode_rewards.average(),
            self.episode_lengths.average(),
            self.value_loss.average(),
            self.survival_rate.average() * 100.0,
            self.perfect_rate.average() * 100.0
        );
    }
}

impl Default for TrainingMetrics {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_moving_average() {
        let mut avg = MovingAverage::new(3);

        avg.push(1.0);
        assert!((avg.average() - 1.0).abs() < 1e-6);

        avg.push(2.0);
        assert!((avg.average() - 1.5).abs() < 1e-6);

        avg.push(3.0);
        assert!((avg.average() - 2.0).abs() < 1e-6);

        avg.push(4.0); // Pushes out 1.0
        assert!((avg.average() - 3.0).abs() < 1e-6);
        assert_eq!(avg.len(), 3);

        avg.clear();
        assert!(avg.is_empty());
        assert_eq!(avg.average(), 0.0);
    }

    #[test]
    fn test_training_metrics_totals() {
        let mut metrics = TrainingMetrics::new(10);
        metrics.record_episode(10.0, 50, 0.5, true, true);
        metrics.record_episode(-20.0, 30, 1.5, false, false);

        assert_eq!(metrics.total_episodes, 2);
        assert_eq!(metrics.total_steps, 80);
        assert!((metrics.episode_rewards.average() + 5.0).abs() < 1e-6);
        assert!((metrics.perfect_rate.average() - 0.5).abs() < 1e-6);
    }
}

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use sentry_ndk_types::protocol::EventKind;

/// A source of uniform draws in `[0, 1)`.
pub trait RandomSource: Send + Sync {
    /// Returns the next draw.
    fn draw(&self) -> f32;
}

/// Draws from the thread-local generator of `rand`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn draw(&self) -> f32 {
        rand::random::<f32>()
    }
}

/// Replays a fixed sequence of draws, wrapping around at the end.
///
/// An empty sequence always draws `0.0`.
#[derive(Debug, Default)]
pub struct SequenceSource {
    draws: Vec<f32>,
    next: AtomicUsize,
}

impl SequenceSource {
    /// Creates a source replaying `draws` in order.
    pub fn new<I: IntoIterator<Item = f32>>(draws: I) -> SequenceSource {
        SequenceSource {
            draws: draws.into_iter().collect(),
            next: AtomicUsize::new(0),
        }
    }
}

impl RandomSource for SequenceSource {
    fn draw(&self) -> f32 {
        if self.draws.is_empty() {
            return 0.0;
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.draws.len();
        self.draws[index]
    }
}

/// Makes keep/drop decisions for captured events.
#[derive(Clone)]
pub struct Sampler {
    source: Arc<dyn RandomSource>,
}

impl fmt::Debug for Sampler {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Sampler").finish()
    }
}

impl Default for Sampler {
    fn default() -> Self {
        Sampler::new(Arc::new(ThreadRandom))
    }
}

impl Sampler {
    /// Creates a sampler drawing from the given source.
    pub fn new(source: Arc<dyn RandomSource>) -> Sampler {
        Sampler { source }
    }

    /// Decides whether an event of `kind` is kept at `rate`.
    ///
    /// Only transactions are subject to the rate; every other kind is kept.
    pub fn should_sample(&self, kind: EventKind, rate: f32) -> bool {
        match kind {
            EventKind::Transaction => self.roll(rate),
            EventKind::Message => true,
        }
    }

    /// Returns a random boolean with a probability defined by rate.
    ///
    /// `rate >= 1` always keeps and `rate <= 0` never does, without drawing.
    pub fn roll(&self, rate: f32) -> bool {
        if rate >= 1.0 {
            true
        } else if rate <= 0.0 {
            false
        } else {
            self.source.draw() < rate
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn fixed(draws: &[f32]) -> Sampler {
        Sampler::new(Arc::new(SequenceSource::new(draws.iter().copied())))
    }

    #[rstest]
    #[case(0.0, false)]
    #[case(-0.5, false)]
    #[case(1.0, true)]
    #[case(3.0, true)]
    fn test_edges_ignore_draws(#[case] rate: f32, #[case] expected: bool) {
        let sampler = fixed(&[0.0, 0.999_999]);
        for _ in 0..4 {
            assert_eq!(sampler.should_sample(EventKind::Transaction, rate), expected);
        }
    }

    #[test]
    fn test_keeps_iff_draw_below_rate() {
        let sampler = fixed(&[0.1, 0.5, 0.49, 0.9]);
        let kept: Vec<bool> = (0..4)
            .map(|_| sampler.should_sample(EventKind::Transaction, 0.5))
            .collect();
        assert_eq!(kept, [true, false, true, false]);
    }

    #[test]
    fn test_messages_are_always_kept() {
        let sampler = fixed(&[0.99]);
        assert!(sampler.should_sample(EventKind::Message, 0.0));
        assert!(sampler.should_sample(EventKind::Message, 0.5));
    }

    #[test]
    fn test_sequence_wraps() {
        let source = SequenceSource::new([0.25, 0.75]);
        let draws: Vec<f32> = (0..3).map(|_| source.draw()).collect();
        assert_eq!(draws, [0.25, 0.75, 0.25]);
        assert_eq!(SequenceSource::new([]).draw(), 0.0);
    }

    #[test]
    fn test_thread_random_in_range() {
        let source = ThreadRandom;
        for _ in 0..1000 {
            let draw = source.draw();
            assert!((0.0..1.0).contains(&draw));
        }
    }

    #[test]
    fn test_rate_roughly_respected() {
        let sampler = Sampler::default();
        let kept = (0..10_000)
            .filter(|_| sampler.should_sample(EventKind::Transaction, 0.3))
            .count();
        assert!((2_500..3_500).contains(&kept), "kept {}", kept);
    }
}

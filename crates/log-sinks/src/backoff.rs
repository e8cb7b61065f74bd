use std::{cmp, time::Duration};

use rand::Rng;

/// Exponential backoff with full jitter, ported from the teacher workspace's
/// `sync_types::Backoff`. Used wherever a sink needs to retry a fallible
/// operation against something outside its control, such as a pipe consumer
/// that hasn't started listening yet.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Backoff {
    initial_backoff: Duration,
    max_backoff: Duration,
    num_failures: u32,
}

impl Backoff {
    pub fn new(initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            initial_backoff,
            max_backoff,
            num_failures: 0,
        }
    }

    pub fn fail(&mut self, rng: &mut impl Rng) -> Duration {
        // https://aws.amazon.com/blogs/architecture/exponential-backoff-and-jitter/
        let p = 2u32.checked_pow(self.num_failures).unwrap_or(u32::MAX);
        self.num_failures += 1;
        let jitter = rng.gen::<f32>();
        let backoff = self.initial_backoff.checked_mul(p).unwrap_or(self.max_backoff);
        cmp::min(backoff, self.max_backoff).mul_f32(jitter)
    }

    pub fn failures(&self) -> u32 {
        self.num_failures
    }
}

use std::time::{Duration, Instant};

/// Delay between the first redraw request of a burst and the redraw
pub const DEFAULT_REDRAW_DELAY: Duration = Duration::from_millis(200);

/// Collapses bursts of redraw requests into one redraw
///
/// The first request arms a deadline `delay` in the future; later requests
/// before the deadline are absorbed. [`RedrawScheduler::poll`] reports the
/// deadline once it has passed.
#[derive(Debug, Clone)]
pub struct RedrawScheduler {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Default for RedrawScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_REDRAW_DELAY)
    }
}

impl RedrawScheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    /// Ask for a redraw
    ///
    /// # Returns
    /// `true` if this request armed a new deadline
    pub fn request(&mut self, now: Instant) -> bool {
        if self.deadline.is_some() {
            return false;
        }
        self.deadline = Some(now + self.delay);
        true
    }

    /// `true` exactly once per burst, when its deadline has passed
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }
}

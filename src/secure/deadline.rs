use std::future::Future;
use std::pin::Pin;
use std::task::Context;
use std::time::Duration;

use tokio::time::{Instant, Sleep};

/// I/O deadline for one direction of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Deadline {
    #[default]
    Unbounded,
    At(Instant),
}

impl Deadline {
    pub fn after(duration: Duration) -> Self {
        Deadline::At(Instant::now() + duration)
    }
}

/// Timer backing a `Deadline`. Holds no timer at all while unbounded, so the
/// relay phase pays nothing for it.
#[derive(Debug, Default)]
pub(crate) struct DeadlineTimer {
    sleep: Option<Pin<Box<Sleep>>>,
}

impl DeadlineTimer {
    pub fn set(&mut self, deadline: Deadline) {
        match deadline {
            Deadline::Unbounded => {
                self.sleep = None;
            }
            Deadline::At(when) => match self.sleep.as_mut() {
                Some(sleep) => sleep.as_mut().reset(when),
                None => self.sleep = Some(Box::pin(tokio::time::sleep_until(when))),
            },
        }
    }

    pub fn deadline(&self) -> Deadline {
        match self.sleep.as_ref() {
            Some(sleep) => Deadline::At(sleep.deadline()),
            None => Deadline::Unbounded,
        }
    }

    /// Returns true once the deadline has passed. Registers the waker otherwise,
    /// so a pending read or write wakes up when the deadline fires.
    pub fn poll_expired(&mut self, cx: &mut Context<'_>) -> bool {
        match self.sleep.as_mut() {
            Some(sleep) => sleep.as_mut().poll(cx).is_ready(),
            None => false,
        }
    }
}

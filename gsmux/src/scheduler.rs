//! # scheduler - Time and yielding
//!
//! The modem layer never blocks on the operating system. Each wait is a
//! loop against a millisecond clock, and each turn of the loop calls
//! `yield_now` so that whatever environment we're running in can do other
//! work - kick a watchdog, run another task, or just sleep a little.

// ****************************************************************************
//
// Imports
//
// ****************************************************************************

use std::thread;
use std::time::{Duration, Instant};

// ****************************************************************************
//
// Public Types
//
// ****************************************************************************

/// Supplies the clock and the yield point for every busy-wait.
pub trait Scheduler {
	/// Milliseconds since some fixed point. Must not go backwards.
	fn millis(&mut self) -> u64;

	/// Called on every iteration of every wait loop.
	fn yield_now(&mut self);

	/// Wait for `ms` milliseconds, yielding as we go.
	fn delay(&mut self, ms: u32) {
		let start = self.millis();
		while self.millis() - start < u64::from(ms) {
			self.yield_now();
		}
	}
}

/// A `Scheduler` for hosted targets. Yielding sleeps for one tick, which
/// stops the wait loops spinning a whole core.
#[derive(Debug)]
pub struct StdScheduler {
	start: Instant,
	tick: Duration,
}

// ****************************************************************************
//
// Public Functions
//
// ****************************************************************************

impl StdScheduler {
	/// A scheduler that sleeps 1ms per yield.
	pub fn new() -> StdScheduler {
		StdScheduler::with_tick(Duration::from_millis(1))
	}

	/// A scheduler that sleeps `tick` per yield. A zero tick just yields
	/// the thread.
	pub fn with_tick(tick: Duration) -> StdScheduler {
		StdScheduler {
			start: Instant::now(),
			tick: tick,
		}
	}
}

impl Default for StdScheduler {
	fn default() -> StdScheduler {
		StdScheduler::new()
	}
}

impl Scheduler for StdScheduler {
	fn millis(&mut self) -> u64 {
		let elapsed = self.start.elapsed();
		elapsed.as_secs() * 1000 + u64::from(elapsed.subsec_millis())
	}

	fn yield_now(&mut self) {
		if self.tick == Duration::from_millis(0) {
			thread::yield_now();
		} else {
			thread::sleep(self.tick);
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn std_clock_moves_forward() {
		let mut s = StdScheduler::new();
		let a = s.millis();
		s.delay(5);
		assert!(s.millis() >= a + 5);
	}
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************

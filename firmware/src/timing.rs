//! Bounded busy-waits on the microsecond counter.
//!
//! Nothing in the firmware waits without a deadline: a peripheral that hangs
//! costs at most the timeout of the wait it hangs in.

use core::convert::Infallible;

use board::hal::Monotonic;

/// Why a [`wait_for`] gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait<E> {
    /// The condition did not hold within the timeout, after this many microseconds
    Expired(u32),
    /// Evaluating the condition failed
    Failed(E),
}

/// Poll `ready` until it returns `true` or `timeout_us` have passed.
///
/// Returns the microseconds elapsed when the condition was met.
pub fn wait_for<C, E>(
    clock: &C,
    timeout_us: u32,
    mut ready: impl FnMut() -> Result<bool, E>,
) -> Result<u32, Wait<E>>
where
    C: Monotonic,
{
    let start = clock.now_us();
    loop {
        // Wrapping subtraction keeps this correct across a counter overflow
        let elapsed = clock.now_us().wrapping_sub(start);
        if ready().map_err(Wait::Failed)? {
            return Ok(elapsed);
        }
        if elapsed >= timeout_us {
            return Err(Wait::Expired(elapsed));
        }
    }
}

/// Spin for `us` microseconds.
pub fn delay_us<C: Monotonic>(clock: &C, us: u32) {
    let _ = wait_for(clock, us, || Ok::<_, Infallible>(false));
}

#[cfg(test)]
mod tests {
    use super::*;
    use board::MicroClock;

    #[test]
    fn returns_elapsed_time_when_ready() {
        let clock = MicroClock::new();
        let mut polls = 0;
        let elapsed = wait_for(&clock, 100, || {
            polls += 1;
            Ok::<_, Infallible>(polls == 10)
        });
        assert_eq!(elapsed, Ok(10));
    }

    #[test]
    fn expires_after_timeout() {
        let clock = MicroClock::new();
        let result = wait_for(&clock, 250, || Ok::<_, Infallible>(false));
        assert_eq!(result, Err(Wait::Expired(250)));
    }

    #[test]
    fn survives_counter_wrap() {
        let clock = MicroClock::starting_at(u32::MAX - 5);
        delay_us(&clock, 20);
        assert!(clock.peek() < 20);
        assert!(clock.peek() >= 14);
    }

    #[test]
    fn predicate_error_aborts() {
        let clock = MicroClock::new();
        let result = wait_for(&clock, 100, || Err::<bool, _>("broken"));
        assert_eq!(result, Err(Wait::Failed("broken")));
    }
}

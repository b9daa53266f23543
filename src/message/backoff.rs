use std::time::Duration;

/// An iterator of delays between attempts to complete an operation. Each
/// delay is the previous one times `factor`, up to `max`. The iterator ends
/// after `attempts` delays.
///
pub struct ExponentialBackoff {
    curr: Duration,
    max: Duration,
    factor: u32,
    attempts: usize,
}

impl ExponentialBackoff {
    pub fn new(start: Duration, max: Duration, factor: u32, attempts: usize) -> Self {
        Self {
            curr: start,
            max,
            factor,
            attempts,
        }
    }

    /// Call `f` until it succeeds, sleeping between attempts. `on_err` sees
    /// every failure and the delay about to be taken. The last error is
    /// returned if every attempt fails.
    pub fn retry<F, E, T, L>(self, mut f: F, on_err: L) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        L: Fn(&E, Duration),
    {
        let mut delays = self.peekable();

        loop {
            match f() {
                Ok(value) => return Ok(value),
                Err(e) => match delays.next() {
                    Some(delay) if delays.peek().is_some() => {
                        on_err(&e, delay);
                        std::thread::sleep(delay)
                    }
                    _ => return Err(e),
                },
            }
        }
    }
}

impl Iterator for ExponentialBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        if self.attempts == 0 {
            return None;
        }
        self.attempts -= 1;

        let delay = self.curr;
        self.curr = (self.curr * self.factor).min(self.max);
        Some(delay)
    }
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn delays_grow_to_max() {
        let delays: Vec<_> = ExponentialBackoff::new(Duration::from_millis(10), Duration::from_millis(30), 2, 4).collect();
        assert_eq!(delays, vec![10, 20, 30, 30].into_iter().map(Duration::from_millis).collect::<Vec<_>>());
    }

    #[test]
    fn retry_returns_first_success() {
        let mut calls = 0;
        let result: Result<usize, ()> = ExponentialBackoff::new(Duration::from_millis(1), Duration::from_millis(1), 1, 5)
            .retry(|| { calls += 1; if calls < 3 { Err(()) } else { Ok(calls) } }, |_, _| {});
        assert_eq!(result, Ok(3));
    }

    #[test]
    fn retry_gives_up() {
        let result: Result<(), usize> = ExponentialBackoff::new(Duration::from_millis(1), Duration::from_millis(1), 1, 3)
            .retry(|| Err(7), |_, _| {});
        assert_eq!(result, Err(7));
    }
}

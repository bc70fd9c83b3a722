//! Timing of fitting stages.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
pub struct Timed<V> {
    pub value: V,
    pub elapsed: Duration,
}
impl<V> Timed<V> {
    pub fn result<E>(f: impl FnOnce() -> Result<V, E>) -> Result<Timed<V>, E> {
        let start_time = Instant::now();
        f().map(|value| {
            let elapsed = start_time.elapsed();
            Timed { value, elapsed }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_passes_through() {
        let timed = Timed::result(|| Ok::<_, ()>(42)).unwrap();
        assert_eq!(42, timed.value);

        let err = Timed::<u32>::result(|| Err("failed")).unwrap_err();
        assert_eq!("failed", err);
    }
}

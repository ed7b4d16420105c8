//! Fixed-backoff retry with a deadline
//!
//! Kafka admin and topic-creation calls are wrapped in this helper instead of
//! baking retry loops into business logic. Each failed attempt prints a
//! user-visible message naming the action and its outcome, matching what an
//! operator sees while a broker is still coming up.

use std::fmt::Display;
use std::time::{Duration, Instant};

use tracing::warn;

/// Deadline used for Kafka client and topic creation retries
pub const KAFKA_RETRY_DEADLINE: Duration = Duration::from_secs(60);

/// Wait between retry attempts
pub const KAFKA_RETRY_WAIT: Duration = Duration::from_secs(1);

/// Retry `op` with a fixed wait until it succeeds, the deadline elapses, or a
/// non-retryable error occurs
///
/// `description` should compose with "failed" as the next word, e.g.
/// "Kafka admin client creation".
pub fn retry_with_deadline<T, E, F>(
    description: &str,
    deadline: Duration,
    wait: Duration,
    retryable: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Result<T, E>,
{
    let started = Instant::now();
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(error) if retryable(&error) && started.elapsed() + wait < deadline => {
                warn!(action = description, error = %error, "retrying after failure");
                eprintln!("{description} failed ({error}), retrying... (Ctrl+C to abort)");
                std::thread::sleep(wait);
            }
            Err(error) => return Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_succeeds_after_transient_failures() {
        let mut attempts = 0;
        let result: Result<u32, String> = retry_with_deadline(
            "test action",
            Duration::from_secs(5),
            Duration::from_millis(1),
            |_| true,
            || {
                attempts += 1;
                if attempts < 3 {
                    Err("not yet".to_string())
                } else {
                    Ok(7)
                }
            },
        );
        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts, 3);
    }

    #[test]
    fn test_non_retryable_error_returns_immediately() {
        let mut attempts = 0;
        let result: Result<(), String> = retry_with_deadline(
            "test action",
            Duration::from_secs(5),
            Duration::from_millis(1),
            |e: &String| e != "fatal",
            || {
                attempts += 1;
                Err("fatal".to_string())
            },
        );
        assert!(result.is_err());
        assert_eq!(attempts, 1);
    }

    #[test]
    fn test_deadline_stops_retries() {
        let mut attempts = 0;
        let result: Result<(), String> = retry_with_deadline(
            "test action",
            Duration::from_millis(5),
            Duration::from_millis(2),
            |_| true,
            || {
                attempts += 1;
                Err("still down".to_string())
            },
        );
        assert!(result.is_err());
        assert!(attempts < 10);
    }
}

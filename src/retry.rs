//! Bounded retry shared by post search, background search and the
//! thumbnail person search.

use std::future::Future;
use tracing::debug;

use crate::error::{Error, Result};

/// Calls `generate` up to `max_attempts` times and returns the first
/// candidate accepted by `accept`. Generator errors count as failed attempts
/// and are logged. Running out of attempts yields `ResourceExhausted`.
pub fn bounded<T, G, P>(what: &str, max_attempts: usize, mut generate: G, mut accept: P) -> Result<T>
where
    G: FnMut(usize) -> Result<Option<T>>,
    P: FnMut(&T) -> bool,
{
    for attempt in 0..max_attempts {
        match generate(attempt) {
            Ok(Some(candidate)) if accept(&candidate) => return Ok(candidate),
            Ok(Some(_)) => debug!("{}: attempt {} rejected", what, attempt + 1),
            Ok(None) => debug!("{}: attempt {} produced nothing", what, attempt + 1),
            Err(e) if is_fatal(&e) => return Err(e),
            Err(e) => tracing::warn!("{}: attempt {} failed: {}", what, attempt + 1, e),
        }
    }
    Err(Error::exhausted(what, max_attempts))
}

/// Async flavour of [`bounded`] for generators that hit the network.
pub async fn bounded_async<T, G, F, P>(
    what: &str,
    max_attempts: usize,
    mut generate: G,
    mut accept: P,
) -> Result<T>
where
    G: FnMut(usize) -> F,
    F: Future<Output = Result<Option<T>>>,
    P: FnMut(&T) -> bool,
{
    for attempt in 0..max_attempts {
        match generate(attempt).await {
            Ok(Some(candidate)) if accept(&candidate) => return Ok(candidate),
            Ok(Some(_)) => debug!("{}: attempt {} rejected", what, attempt + 1),
            Ok(None) => debug!("{}: attempt {} produced nothing", what, attempt + 1),
            Err(e) if is_fatal(&e) => return Err(e),
            Err(e) => tracing::warn!("{}: attempt {} failed: {}", what, attempt + 1, e),
        }
    }
    Err(Error::exhausted(what, max_attempts))
}

/// Local setup problems will not go away by trying again.
fn is_fatal(e: &Error) -> bool {
    matches!(e, Error::Config(_) | Error::Io(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn returns_first_accepted_candidate() {
        let mut calls = 0;
        let found = bounded(
            "numbers",
            10,
            |attempt| {
                calls += 1;
                Ok(Some(attempt * 3))
            },
            |n| *n > 5,
        )
        .unwrap();
        assert_eq!(found, 6);
        assert_eq!(calls, 3);
    }

    #[test]
    fn exhaustion_reports_attempt_cap() {
        let err = bounded("posts", 4, |_| Ok(None::<u32>), |_| true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
        assert_eq!(err.to_string(), "posts exhausted after 4 attempts");
    }

    #[test]
    fn service_errors_are_retried_but_config_errors_abort() {
        let mut calls = 0;
        let found = bounded(
            "flaky",
            3,
            |attempt| {
                calls += 1;
                if attempt == 0 {
                    Err(Error::service("reddit", "timeout"))
                } else {
                    Ok(Some(attempt))
                }
            },
            |_| true,
        )
        .unwrap();
        assert_eq!((found, calls), (1, 2));

        let err = bounded("broken", 3, |_| Err::<Option<u8>, _>(Error::Config("x".into())), |_| true)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[tokio::test]
    async fn async_variant_behaves_the_same() {
        let found = bounded_async("async", 5, |attempt| async move { Ok(Some(attempt)) }, |n| *n == 2)
            .await
            .unwrap();
        assert_eq!(found, 2);
    }
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tonic::metadata::MetadataMap;

use crate::{Error, Result};

/// Cancellation and deadline state of one call, polled by the handlers.
#[derive(Clone, Debug, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl CallContext {
    /// A context without deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context expiring `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(timeout),
            cancelled: Arc::default(),
        }
    }

    /// Builds the context from the call's `grpc-timeout` header, if any.
    pub fn from_metadata(metadata: &MetadataMap) -> Self {
        metadata
            .get("grpc-timeout")
            .and_then(|value| value.to_str().ok())
            .and_then(parse_grpc_timeout)
            .map_or_else(Self::new, Self::with_timeout)
    }

    /// Marks the call cancelled. Every clone observes it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether [`cancel`](Self::cancel) was called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fails when the call was cancelled or its deadline passed.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }

        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Error::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}

/// Parses a `grpc-timeout` value: up to eight digits followed by a unit.
///
/// tonic's server also enforces this header and ends the call with
/// `CANCELLED` when it lapses. The parsed deadline lets handlers stop work
/// at their own checkpoints.
fn parse_grpc_timeout(value: &str) -> Option<Duration> {
    if value.len() < 2 || value.len() > 9 {
        return None;
    }

    let (digits, unit) = value.split_at(value.len() - 1);
    let amount = digits.parse::<u64>().ok()?;

    let timeout = match unit {
        "H" => Duration::from_secs(amount.checked_mul(3600)?),
        "M" => Duration::from_secs(amount.checked_mul(60)?),
        "S" => Duration::from_secs(amount),
        "m" => Duration::from_millis(amount),
        "u" => Duration::from_micros(amount),
        "n" => Duration::from_nanos(amount),
        _ => return None,
    };

    Some(timeout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_context_passes() {
        assert!(CallContext::new().check().is_ok());
        assert!(CallContext::with_timeout(Duration::from_secs(60))
            .check()
            .is_ok());
    }

    #[test]
    fn cancelled_context_fails_in_every_clone() {
        let ctx = CallContext::new();
        let clone = ctx.clone();

        ctx.cancel();

        assert!(matches!(clone.check(), Err(Error::Cancelled)));
    }

    #[test]
    fn elapsed_deadline_fails() {
        let ctx = CallContext::with_timeout(Duration::ZERO);
        assert!(matches!(ctx.check(), Err(Error::DeadlineExceeded)));
    }

    #[test]
    fn grpc_timeout_units() {
        assert_eq!(parse_grpc_timeout("2H"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_grpc_timeout("3M"), Some(Duration::from_secs(180)));
        assert_eq!(parse_grpc_timeout("5S"), Some(Duration::from_secs(5)));
        assert_eq!(parse_grpc_timeout("250m"), Some(Duration::from_millis(250)));
        assert_eq!(parse_grpc_timeout("10u"), Some(Duration::from_micros(10)));
        assert_eq!(parse_grpc_timeout("99n"), Some(Duration::from_nanos(99)));
        assert_eq!(parse_grpc_timeout("5s"), None);
        assert_eq!(parse_grpc_timeout("S"), None);
        assert_eq!(parse_grpc_timeout("123456789S"), None);
    }

    #[test]
    fn metadata_deadline_is_applied() {
        let mut metadata = MetadataMap::new();
        metadata.insert("grpc-timeout", "0m".parse().unwrap());

        let ctx = CallContext::from_metadata(&metadata);

        assert!(matches!(ctx.check(), Err(Error::DeadlineExceeded)));
        assert!(CallContext::from_metadata(&MetadataMap::new())
            .check()
            .is_ok());
    }
}

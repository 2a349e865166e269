//! Cooperative cancellation
//!
//! Every public engine operation accepts an optional [`CancellationToken`]
//! and polls it between units of work (chunks, documents, sub-gathers).
//! Cancellation is never an error: operations return their neutral or
//! partial typed result.

use tokio_util::sync::CancellationToken as InnerToken;

/// Owner side of a cancellation pair.
///
/// Dropping the source does not cancel outstanding tokens; call
/// [`CancellationSource::cancel`] to request cancellation and
/// [`CancellationSource::dispose`] to release the source once no more
/// signalling is needed.
#[derive(Debug, Default)]
pub struct CancellationSource {
    inner: InnerToken,
}

impl CancellationSource {
    pub fn new() -> Self {
        Self {
            inner: InnerToken::new(),
        }
    }

    /// Get a token observing this source.
    pub fn token(&self) -> CancellationToken {
        CancellationToken {
            inner: self.inner.clone(),
        }
    }

    /// Request cancellation. All tokens observe the flag immediately.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Release the source. Outstanding tokens keep whatever state the
    /// source had at dispose time.
    pub fn dispose(self) {}
}

/// Read side of a cancellation pair. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: InnerToken,
}

impl CancellationToken {
    /// A token that can never be cancelled.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_cancellation_requested(&self) -> bool {
        self.inner.is_cancelled()
    }
}

/// Convenience for `Option<&CancellationToken>` call sites.
pub fn is_cancelled(token: Option<&CancellationToken>) -> bool {
    token.map(|t| t.is_cancellation_requested()).unwrap_or(false)
}

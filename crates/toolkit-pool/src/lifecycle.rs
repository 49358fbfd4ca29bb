//! Connection lifecycle bookkeeping.

use std::time::{Duration, Instant};

/// Metadata the pool keeps for every connection it created.
#[derive(Debug, Clone)]
pub struct ConnectionMetadata {
    /// Pool-unique connection ID, starting at 1.
    pub id: u64,
    /// When the connection was opened.
    pub created_at: Instant,
    /// When the connection was last lent out.
    pub last_checkout: Option<Instant>,
    /// How many times the connection has been lent out.
    pub checkout_count: u64,
}

impl ConnectionMetadata {
    pub(crate) fn new(id: u64) -> Self {
        Self {
            id,
            created_at: Instant::now(),
            last_checkout: None,
            checkout_count: 0,
        }
    }

    pub(crate) fn mark_checkout(&mut self) {
        self.last_checkout = Some(Instant::now());
        self.checkout_count += 1;
    }

    /// Time since the connection was opened.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_checkout() {
        let mut metadata = ConnectionMetadata::new(1);
        assert_eq!(metadata.checkout_count, 0);
        assert!(metadata.last_checkout.is_none());

        metadata.mark_checkout();
        metadata.mark_checkout();

        assert_eq!(metadata.checkout_count, 2);
        assert!(metadata.last_checkout.is_some());
        assert!(metadata.last_checkout.unwrap() >= metadata.created_at);
    }
}

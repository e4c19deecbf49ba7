//! Chain tip polling.
//!
//! The watcher compares the provider's tip height against the last height it
//! saw. A new tip stays pending, and is reported again on every poll, until
//! the caller acknowledges it by rebuilding the template. That way a stale
//! template can never be mined silently.

use tracing::{info, warn};

use crate::block::ChainTip;
use crate::provider::ChainTipProvider;

/// A tip advance the caller has not yet acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TipChange {
    pub tip: ChainTip,
    /// Polls that have reported this change before the current one.
    pub polls_outstanding: u32,
}

#[derive(Debug, Clone, Default)]
pub struct TemplateWatcher {
    last_height: Option<u32>,
    pending: Option<TipChange>,
}

impl TemplateWatcher {
    /// A watcher that reports whatever tip it sees first.
    pub fn new() -> Self {
        Self::default()
    }

    /// A watcher that already knows the tip at `height`.
    pub fn starting_at(height: u32) -> Self {
        TemplateWatcher {
            last_height: Some(height),
            pending: None,
        }
    }

    pub fn last_height(&self) -> Option<u32> {
        self.last_height
    }

    pub fn pending(&self) -> Option<&TipChange> {
        self.pending.as_ref()
    }

    /// Check the provider for a higher tip.
    ///
    /// Provider failures are logged and tolerated: the last known tip stays
    /// current and the next poll retries.
    pub fn poll<P: ChainTipProvider + ?Sized>(&mut self, provider: &P) -> Option<TipChange> {
        let height = match provider.tip_height() {
            Ok(height) => height,
            Err(err) => {
                warn!(error = %err, "Tip height unavailable");
                return self.repeat_pending();
            }
        };

        let advanced = self.last_height.map_or(true, |last| height > last);
        if !advanced {
            return self.repeat_pending();
        }

        let hash = match provider.tip_hash() {
            Ok(hash) => hash,
            Err(err) => {
                warn!(height, error = %err, "Tip hash unavailable");
                return self.repeat_pending();
            }
        };

        let tip = ChainTip { hash, height };
        info!(height, hash = %tip.display_hash(), "New chain tip");

        // A second advance before acknowledgement keeps counting from the first.
        let polls_outstanding = self.pending.map_or(0, |p| p.polls_outstanding + 1);
        self.last_height = Some(height);
        self.pending = Some(TipChange { tip, polls_outstanding });
        self.pending
    }

    /// Mark tips up to `height` as handled.
    pub fn acknowledge(&mut self, height: u32) {
        if self.pending.is_some_and(|p| p.tip.height <= height) {
            self.pending = None;
        }
        self.last_height = Some(self.last_height.map_or(height, |last| last.max(height)));
    }

    fn repeat_pending(&mut self) -> Option<TipChange> {
        if let Some(pending) = self.pending.as_mut() {
            pending.polls_outstanding += 1;
        }
        self.pending
    }
}

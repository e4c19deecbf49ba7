//! Mining session state machine.
//!
//! ```text
//! Idle --set_address--> Armed --build_template--> Ready
//! Ready --swing(nonce)--> Ready | BlockFound
//! Ready --start_auto--> AutoRunning --stop_auto--> Ready
//! AutoRunning --batch with block--> BlockFound
//! Ready | BlockFound --reset_for_new_template--> Ready
//! ```
//!
//! The session is call-driven. Auto-mining advances only when the host
//! issues a batch, either synchronously through [`MiningSession::tick`] or by
//! running a [`BatchJob`] elsewhere and handing the result back through
//! [`MiningSession::complete_batch`]. At most one batch is in flight, and a
//! result that comes back after a stop or reset is discarded.

use alloc::string::String;
use alloc::sync::Arc;
use core::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::address::{validate_address, Address, InvalidAddressError};
use crate::block::{BlockTemplate, ChainTip, TemplateBuilder, TemplateError};
use crate::config::{BatchSizer, SessionConfig};
use crate::error::MinerError;
use crate::hash::hash_to_display_hex;
use crate::network::Network;
use crate::pow::{search_batch, search_one, PowResult};
use crate::provider::{BlockSink, TxId};
use crate::stats::Stats;
use crate::watcher::TipChange;

/// Illegal transition; the call is rejected without touching state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SessionStateError {
    #[error("no reward address set")]
    NoAddress,
    #[error("no block template")]
    NoTemplate,
    #[error("auto-mining is running")]
    AutoRunning,
    #[error("auto-mining is not running")]
    NotAutoRunning,
    #[error("a batch is still in flight")]
    BatchInFlight,
    #[error("a block was found; load a new template to continue")]
    BlockFound,
    #[error("no block has been found")]
    NoBlockFound,
}

/// A winning nonce and its hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Solution {
    pub nonce: u32,
    pub hash: [u8; 32],
}

impl Solution {
    pub fn hash_hex(&self) -> String {
        hash_to_display_hex(&self.hash)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No reward address.
    Idle,
    /// Address validated, no template yet.
    Armed,
    /// Template loaded; manual swings allowed.
    Ready,
    AutoRunning,
    /// Stopped on a block; waits for submission or a new template.
    BlockFound(Solution),
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Armed => "armed",
            SessionState::Ready => "ready",
            SessionState::AutoRunning => "auto_running",
            SessionState::BlockFound(_) => "block_found",
        }
    }
}

/// A batch issued to run off the session's thread.
#[derive(Debug, Clone)]
pub struct BatchJob {
    id: u64,
    generation: u64,
    template: Arc<BlockTemplate>,
    pub start_nonce: u32,
    pub count: u32,
}

impl BatchJob {
    /// Search the batch. Pure; safe to call on any thread.
    pub fn run(&self) -> PowResult {
        search_batch(&self.template, self.start_nonce, self.count)
    }
}

/// What happened to a completed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    Applied(PowResult),
    /// The session was stopped or reset while the batch ran.
    Discarded,
}

/// How a session reacted to a chain tip change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TipAction {
    /// The template was rebuilt on the new tip.
    Rebuilt,
    /// Auto-mining was stopped and the template rebuilt.
    Interrupted,
    /// Auto-mining was stopped, but a batch is still in flight. The template
    /// is rebuilt when the tip is reported again after the batch returns.
    Stopped,
    /// The template was not replaced; offer the tip again on the next poll.
    Deferred,
}

impl TipAction {
    /// Whether the session now mines on the new tip.
    pub fn is_applied(&self) -> bool {
        matches!(self, TipAction::Rebuilt | TipAction::Interrupted)
    }
}

/// One miner working toward one block for one address on one network.
#[derive(Debug)]
pub struct MiningSession {
    network: Network,
    address: Option<Address>,
    template: Option<Arc<BlockTemplate>>,
    state: SessionState,
    cursor: u32,
    stats: Stats,
    sizer: BatchSizer,
    /// Bumped by every stop or reset; results from older batches are stale.
    generation: u64,
    next_job_id: u64,
    in_flight: Option<u64>,
}

impl MiningSession {
    /// A session with no address yet.
    pub fn new(network: Network, config: SessionConfig) -> Self {
        MiningSession {
            network,
            address: None,
            template: None,
            state: SessionState::Idle,
            cursor: 0,
            stats: Stats::new(),
            sizer: BatchSizer::new(config),
            generation: 0,
            next_job_id: 0,
            in_flight: None,
        }
    }

    /// Validate `address` and create an armed session.
    pub fn with_address(address: &str, network: Network, config: SessionConfig) -> Result<Self, InvalidAddressError> {
        let address = validate_address(address, network)?;
        let mut session = MiningSession::new(network, config);
        session.arm(address);
        Ok(session)
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn address(&self) -> Option<&Address> {
        self.address.as_ref()
    }

    pub fn template(&self) -> Option<&BlockTemplate> {
        self.template.as_deref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Next nonce auto-mining will try.
    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    pub fn config(&self) -> &SessionConfig {
        self.sizer.config()
    }

    /// Current (calibrated) batch size.
    pub fn batch_size(&self) -> u32 {
        self.sizer.current()
    }

    pub fn is_auto_running(&self) -> bool {
        self.state == SessionState::AutoRunning
    }

    pub fn has_batch_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn solution(&self) -> Option<Solution> {
        match self.state {
            SessionState::BlockFound(solution) => Some(solution),
            _ => None,
        }
    }

    /// Replace the reward address. Drops the template, since its coinbase
    /// pays the old address.
    pub fn set_address(&mut self, address: &str) -> Result<(), MinerError> {
        self.ensure_not_auto_running()?;
        let address = validate_address(address, self.network)?;
        self.arm(address);
        Ok(())
    }

    /// Switch networks. The address is network-specific, so the session
    /// returns to `Idle`.
    pub fn set_network(&mut self, network: Network) -> Result<(), SessionStateError> {
        self.ensure_not_auto_running()?;
        if network == self.network {
            return Ok(());
        }
        info!(from = %self.network, to = %network, "Switching network");
        self.network = network;
        self.address = None;
        self.clear_work();
        self.state = SessionState::Idle;
        Ok(())
    }

    /// Build a template paying this session's address and load it.
    pub fn build_template(&mut self, tip: &ChainTip, bits: u32, timestamp: u32) -> Result<&BlockTemplate, MinerError> {
        self.ensure_can_replace_template()?;
        let address = self.address.as_ref().ok_or(SessionStateError::NoAddress)?;
        let template = TemplateBuilder::new(self.network)
            .payout(address)
            .build(tip, bits, timestamp)?;
        self.reset_for_new_template(template)?;
        self.template().ok_or_else(|| SessionStateError::NoTemplate.into())
    }

    /// Load a new template, zeroing the cursor and statistics.
    ///
    /// Not allowed while auto-mining or while a batch is in flight.
    pub fn reset_for_new_template(&mut self, template: BlockTemplate) -> Result<(), MinerError> {
        self.ensure_can_replace_template()?;
        if self.address.is_none() {
            return Err(SessionStateError::NoAddress.into());
        }
        if template.network != self.network {
            return Err(TemplateError::NetworkMismatch {
                expected: self.network,
                found: template.network,
            }
            .into());
        }

        info!(
            height = template.height,
            prev_hash = %template.prev_hash_hex(),
            bits = template.bits,
            reward = template.reward_sats,
            "Template loaded"
        );
        self.clear_work();
        self.template = Some(Arc::new(template));
        self.state = SessionState::Ready;
        Ok(())
    }

    /// Hash one caller-chosen nonce.
    pub fn swing(&mut self, nonce: u32) -> Result<PowResult, SessionStateError> {
        self.ensure_ready()?;
        let template = self.template.as_ref().ok_or(SessionStateError::NoTemplate)?;

        let result = search_one(template, nonce);
        self.stats.record(&result);
        self.stats.current_nonce = nonce;

        if result.block_found() {
            self.found_block(&result);
        } else if result.share_found() {
            debug!(nonce, zeros = result.leading_zero_bits, "Share found on swing");
        }
        Ok(result)
    }

    pub fn start_auto(&mut self) -> Result<(), SessionStateError> {
        self.ensure_ready()?;
        info!(cursor = self.cursor, batch_size = self.batch_size(), "Auto-mining started");
        self.state = SessionState::AutoRunning;
        Ok(())
    }

    /// Stop auto-mining. Stats and cursor are kept so mining can resume. A
    /// batch already in flight will be discarded when it completes.
    pub fn stop_auto(&mut self) -> Result<(), SessionStateError> {
        if self.state != SessionState::AutoRunning {
            return Err(SessionStateError::NotAutoRunning);
        }
        self.generation += 1;
        self.state = SessionState::Ready;
        info!(cursor = self.cursor, total_hashes = self.stats.total_hashes, "Auto-mining stopped");
        Ok(())
    }

    /// Issue the next auto-mining batch.
    pub fn begin_batch(&mut self) -> Result<BatchJob, SessionStateError> {
        if self.state != SessionState::AutoRunning {
            return Err(SessionStateError::NotAutoRunning);
        }
        if self.in_flight.is_some() {
            return Err(SessionStateError::BatchInFlight);
        }
        let template = self.template.clone().ok_or(SessionStateError::NoTemplate)?;

        let id = self.next_job_id;
        self.next_job_id += 1;
        self.in_flight = Some(id);

        Ok(BatchJob {
            id,
            generation: self.generation,
            template,
            start_nonce: self.cursor,
            count: self.batch_size(),
        })
    }

    /// Apply the result of `job`, unless the session moved on meanwhile.
    pub fn complete_batch(&mut self, job: &BatchJob, result: PowResult) -> BatchOutcome {
        if self.in_flight != Some(job.id) {
            warn!(job = job.id, "Ignoring result for a batch that is not in flight");
            return BatchOutcome::Discarded;
        }
        self.in_flight = None;

        if job.generation != self.generation || self.state != SessionState::AutoRunning {
            debug!(job = job.id, hashes = result.hashes_computed, "Discarding stale batch");
            return BatchOutcome::Discarded;
        }

        self.stats.record(&result);
        self.advance_cursor(result.hashes_computed);
        debug!(
            start = job.start_nonce,
            hashes = result.hashes_computed,
            zeros = result.leading_zero_bits,
            "Batch applied"
        );

        if result.block_found() {
            self.found_block(&result);
        }
        BatchOutcome::Applied(result)
    }

    /// Release a job that will never be completed, such as one a worker
    /// could not accept. The cursor is left where the job started. Returns
    /// false if `job` is not the batch in flight.
    pub fn abandon_batch(&mut self, job: &BatchJob) -> bool {
        if self.in_flight != Some(job.id) {
            return false;
        }
        self.in_flight = None;
        warn!(job = job.id, start = job.start_nonce, "Batch abandoned");
        true
    }

    /// Issue, search and apply one batch on the calling thread.
    pub fn tick(&mut self) -> Result<BatchOutcome, SessionStateError> {
        let job = self.begin_batch()?;
        let result = job.run();
        Ok(self.complete_batch(&job, result))
    }

    /// Feed a batch's wall-clock time into batch-size calibration.
    pub fn observe_batch_time(&mut self, hashes: u64, elapsed: Duration) {
        self.sizer.observe(hashes, elapsed);
    }

    /// React to a new chain tip.
    ///
    /// An idle-ready session rebuilds at once. An auto-running session is
    /// left alone the first time the tip is reported and interrupted the next.
    /// While a batch is in flight the template cannot be replaced, so the
    /// rebuild waits for a later report. The template keeps its bits, or uses
    /// the network default if there is no template yet.
    pub fn handle_tip_change(&mut self, change: &TipChange, timestamp: u32) -> Result<TipAction, MinerError> {
        if self.address.is_none() {
            return Err(SessionStateError::NoAddress.into());
        }
        let bits = self.template().map(|t| t.bits).unwrap_or_else(|| self.network.default_bits());

        let action = if self.state == SessionState::AutoRunning {
            if change.polls_outstanding == 0 {
                warn!(height = change.tip.height, "Chain tip advanced while auto-mining; template is stale");
                return Ok(TipAction::Deferred);
            }
            self.stop_auto()?;
            if self.in_flight.is_some() {
                info!(height = change.tip.height, "Auto-mining stopped for new tip; rebuild waits for the batch");
                return Ok(TipAction::Stopped);
            }
            TipAction::Interrupted
        } else {
            if self.in_flight.is_some() {
                return Ok(TipAction::Deferred);
            }
            TipAction::Rebuilt
        };
        if let SessionState::BlockFound(solution) = self.state {
            warn!(nonce = solution.nonce, "Discarding unsubmitted block for new tip");
        }

        self.build_template(&change.tip, bits, timestamp)?;
        Ok(action)
    }

    /// Serialized winning block, hex encoded.
    pub fn block_hex(&self) -> Result<String, MinerError> {
        let solution = self.solution().ok_or(SessionStateError::NoBlockFound)?;
        let template = self.template.as_ref().ok_or(SessionStateError::NoTemplate)?;
        Ok(template.serialize_block_hex(solution.nonce)?)
    }

    /// Hand the winning block to `sink`. On failure the session stays in
    /// `BlockFound` so the submission can be retried.
    pub fn submit_block<S: BlockSink + ?Sized>(&self, sink: &mut S) -> Result<TxId, MinerError> {
        let solution = self.solution().ok_or(SessionStateError::NoBlockFound)?;
        let template = self.template.as_ref().ok_or(SessionStateError::NoTemplate)?;
        let block = template.serialize_block(solution.nonce)?;

        match sink.submit(&block) {
            Ok(txid) => {
                info!(%txid, height = template.height, "Block submitted");
                Ok(txid)
            }
            Err(err) => {
                warn!(error = %err, "Block submission failed");
                Err(err.into())
            }
        }
    }

    fn arm(&mut self, address: Address) {
        info!(address = %address, network = %self.network, "Reward address set");
        self.address = Some(address);
        self.clear_work();
        self.state = SessionState::Armed;
    }

    fn clear_work(&mut self) {
        self.template = None;
        self.cursor = 0;
        self.stats = Stats::new();
        self.generation += 1;
    }

    fn found_block(&mut self, result: &PowResult) {
        let solution = Solution {
            nonce: result.nonce,
            hash: result.hash,
        };
        info!(nonce = solution.nonce, hash = %solution.hash_hex(), "Block found");
        self.state = SessionState::BlockFound(solution);
    }

    fn advance_cursor(&mut self, hashes: u64) {
        let next = self.cursor as u64 + hashes;
        if next > u32::MAX as u64 {
            self.cursor = (next - (1u64 << 32)) as u32;
            self.stats.nonce_space_exhausted = true;
            self.stats.cycles_completed += 1;
            warn!(cycles = self.stats.cycles_completed, "Nonce space exhausted; wrapping");
        } else {
            self.cursor = next as u32;
        }
        self.stats.current_nonce = self.cursor;
    }

    fn ensure_not_auto_running(&self) -> Result<(), SessionStateError> {
        if self.state == SessionState::AutoRunning {
            return Err(SessionStateError::AutoRunning);
        }
        Ok(())
    }

    fn ensure_can_replace_template(&self) -> Result<(), SessionStateError> {
        self.ensure_not_auto_running()?;
        if self.in_flight.is_some() {
            return Err(SessionStateError::BatchInFlight);
        }
        Ok(())
    }

    fn ensure_ready(&self) -> Result<(), SessionStateError> {
        match self.state {
            SessionState::Ready => Ok(()),
            SessionState::Idle => Err(SessionStateError::NoAddress),
            SessionState::Armed => Err(SessionStateError::NoTemplate),
            SessionState::AutoRunning => Err(SessionStateError::AutoRunning),
            SessionState::BlockFound(_) => Err(SessionStateError::BlockFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pow::Classification;
    use alloc::vec::Vec;

    const ADDRESS: &str = "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq";
    const MAINNET_BITS: u32 = 0x17034219;
    /// Roughly one block per 256 hashes.
    const EASY_BITS: u32 = 0x2000ffff;

    fn tip(height: u32) -> ChainTip {
        ChainTip { hash: [height as u8; 32], height }
    }

    fn small_batches() -> SessionConfig {
        SessionConfig {
            batch_size: 2_000,
            min_batch_size: 100,
            max_batch_size: 10_000,
            batch_budget_ms: 50,
        }
    }

    fn ready_session(bits: u32) -> MiningSession {
        let mut session = MiningSession::with_address(ADDRESS, Network::Mainnet, small_batches()).unwrap();
        session.build_template(&tip(100), bits, 1_700_000_000).unwrap();
        session
    }

    #[test]
    fn test_lifecycle_states() {
        let mut session = MiningSession::new(Network::Mainnet, SessionConfig::default());
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.swing(0), Err(SessionStateError::NoAddress));

        session.set_address(ADDRESS).unwrap();
        assert_eq!(session.state(), SessionState::Armed);
        assert_eq!(session.swing(0), Err(SessionStateError::NoTemplate));
        assert_eq!(session.start_auto(), Err(SessionStateError::NoTemplate));

        session.build_template(&tip(100), MAINNET_BITS, 0).unwrap();
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.template().unwrap().height, 101);
    }

    #[test]
    fn test_invalid_address_leaves_session_untouched() {
        let mut session = ready_session(MAINNET_BITS);
        session.swing(1).unwrap();

        let err = session.set_address("tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx").unwrap_err();
        assert!(matches!(err, MinerError::InvalidAddress(_)));
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.stats().total_hashes, 1);
    }

    #[test]
    fn test_swing_updates_stats() {
        let mut session = ready_session(MAINNET_BITS);
        let result = session.swing(42).unwrap();

        assert_eq!(result, search_one(session.template().unwrap(), 42));
        assert_eq!(session.stats().total_hashes, 1);
        assert_eq!(session.stats().current_nonce, 42);
        assert_eq!(session.stats().best_hash, Some(result.hash));
        assert_eq!(session.stats().shares_found, result.share_found() as u32);
        // swings do not move the auto cursor
        assert_eq!(session.cursor(), 0);
    }

    #[test]
    fn test_swing_counts_shares() {
        let mut session = ready_session(MAINNET_BITS);
        let expected = (0..1_000u32)
            .filter(|&n| search_one(session.template().unwrap(), n).share_found())
            .count() as u32;

        for nonce in 0..1_000 {
            session.swing(nonce).unwrap();
        }
        assert_eq!(session.stats().shares_found, expected);
        assert_eq!(session.stats().total_hashes, 1_000);
    }

    #[test]
    fn test_swing_rejected_while_auto_running() {
        let mut session = ready_session(MAINNET_BITS);
        session.start_auto().unwrap();
        session.tick().unwrap();
        let before = session.stats().clone();

        assert_eq!(session.swing(7), Err(SessionStateError::AutoRunning));
        assert_eq!(session.stats(), &before);
    }

    #[test]
    fn test_auto_batches_advance_cursor() {
        let mut session = ready_session(MAINNET_BITS);
        session.start_auto().unwrap();

        for _ in 0..3 {
            assert!(matches!(session.tick().unwrap(), BatchOutcome::Applied(_)));
        }
        assert_eq!(session.cursor(), 6_000);
        assert_eq!(session.stats().total_hashes, 6_000);
        assert_eq!(session.stats().current_nonce, 6_000);
    }

    #[test]
    fn test_stop_preserves_progress() {
        let mut session = ready_session(MAINNET_BITS);
        assert_eq!(session.stop_auto(), Err(SessionStateError::NotAutoRunning));

        session.start_auto().unwrap();
        session.tick().unwrap();
        session.stop_auto().unwrap();

        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.cursor(), 2_000);
        assert_eq!(session.tick(), Err(SessionStateError::NotAutoRunning));

        session.start_auto().unwrap();
        session.tick().unwrap();
        assert_eq!(session.cursor(), 4_000);
    }

    #[test]
    fn test_auto_stops_on_block() {
        let mut session = ready_session(EASY_BITS);
        session.start_auto().unwrap();

        let mut outcomes = Vec::new();
        while session.is_auto_running() {
            outcomes.push(session.tick().unwrap());
            assert!(outcomes.len() < 50, "no block after 100k hashes");
        }

        let solution = session.solution().unwrap();
        let result = search_one(session.template().unwrap(), solution.nonce);
        assert_eq!(result.classification, Classification::Block);
        assert_eq!(result.hash, solution.hash);
        assert_eq!(session.tick(), Err(SessionStateError::NotAutoRunning));
        assert_eq!(session.start_auto(), Err(SessionStateError::BlockFound));
        assert_eq!(session.swing(0), Err(SessionStateError::BlockFound));
    }

    #[test]
    fn test_block_hex_only_after_block() {
        let mut session = ready_session(EASY_BITS);
        assert_eq!(session.block_hex(), Err(MinerError::SessionState(SessionStateError::NoBlockFound)));

        let nonce = (0..10_000u32)
            .find(|&n| search_one(session.template().unwrap(), n).block_found())
            .unwrap();
        let result = session.swing(nonce).unwrap();
        assert!(result.block_found());

        let hex = session.block_hex().unwrap();
        let header = session.template().unwrap().header(nonce).serialize();
        assert!(hex.starts_with(&hex::encode(header)));
    }

    #[test]
    fn test_stale_batch_discarded_after_stop() {
        let mut session = ready_session(MAINNET_BITS);
        session.start_auto().unwrap();

        let job = session.begin_batch().unwrap();
        assert_eq!(session.begin_batch().unwrap_err(), SessionStateError::BatchInFlight);
        session.stop_auto().unwrap();

        // The template cannot be replaced while the batch is out.
        let err = session.build_template(&tip(101), MAINNET_BITS, 0).unwrap_err();
        assert_eq!(err, MinerError::SessionState(SessionStateError::BatchInFlight));

        let result = job.run();
        assert_eq!(session.complete_batch(&job, result), BatchOutcome::Discarded);
        assert_eq!(session.stats().total_hashes, 0);
        assert_eq!(session.cursor(), 0);
        assert!(!session.has_batch_in_flight());
    }

    #[test]
    fn test_stale_batch_discarded_after_restart() {
        let mut session = ready_session(MAINNET_BITS);
        session.start_auto().unwrap();
        let job = session.begin_batch().unwrap();
        session.stop_auto().unwrap();
        session.start_auto().unwrap();

        let result = job.run();
        assert_eq!(session.complete_batch(&job, result), BatchOutcome::Discarded);
        assert!(matches!(session.tick().unwrap(), BatchOutcome::Applied(_)));
        assert_eq!(session.stats().total_hashes, 2_000);
    }

    #[test]
    fn test_duplicate_completion_ignored() {
        let mut session = ready_session(MAINNET_BITS);
        session.start_auto().unwrap();

        let job = session.begin_batch().unwrap();
        let result = job.run();
        assert!(matches!(session.complete_batch(&job, result), BatchOutcome::Applied(_)));
        assert_eq!(session.complete_batch(&job, result), BatchOutcome::Discarded);
        assert_eq!(session.stats().total_hashes, 2_000);
    }

    #[test]
    fn test_abandoned_batch_releases_session() {
        let mut session = ready_session(MAINNET_BITS);
        session.start_auto().unwrap();
        let job = session.begin_batch().unwrap();

        assert!(session.abandon_batch(&job));
        assert!(!session.abandon_batch(&job));
        assert_eq!(session.cursor(), 0);

        session.stop_auto().unwrap();
        session.build_template(&tip(101), MAINNET_BITS, 0).unwrap();
        session.start_auto().unwrap();
        let next = session.begin_batch().unwrap();
        assert_eq!(next.start_nonce, 0);

        // A late result for the abandoned job does not touch the new batch.
        let late = job.run();
        assert_eq!(session.complete_batch(&job, late), BatchOutcome::Discarded);
        assert!(session.has_batch_in_flight());
        assert_eq!(session.stats().total_hashes, 0);
    }

    #[test]
    fn test_tip_change_with_batch_in_flight() {
        let mut session = ready_session(MAINNET_BITS);
        session.start_auto().unwrap();
        let job = session.begin_batch().unwrap();

        let first = TipChange { tip: tip(101), polls_outstanding: 0 };
        assert_eq!(session.handle_tip_change(&first, 0).unwrap(), TipAction::Deferred);
        assert!(session.is_auto_running());

        let second = TipChange { tip: tip(101), polls_outstanding: 1 };
        let action = session.handle_tip_change(&second, 0).unwrap();
        assert_eq!(action, TipAction::Stopped);
        assert!(!action.is_applied());
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.template().unwrap().height, 101);

        let result = job.run();
        assert_eq!(session.complete_batch(&job, result), BatchOutcome::Discarded);

        let third = TipChange { tip: tip(101), polls_outstanding: 2 };
        let action = session.handle_tip_change(&third, 0).unwrap();
        assert_eq!(action, TipAction::Rebuilt);
        assert!(action.is_applied());
        assert_eq!(session.template().unwrap().height, 102);
    }

    #[test]
    fn test_template_rebuild_resets_progress() {
        let mut session = ready_session(MAINNET_BITS);
        session.start_auto().unwrap();
        session.tick().unwrap();
        session.stop_auto().unwrap();
        session.swing(5).unwrap();

        session.build_template(&tip(101), MAINNET_BITS, 0).unwrap();

        assert_eq!(session.cursor(), 0);
        assert_eq!(session.stats(), &Stats::new());
        assert_eq!(session.address().unwrap().as_str(), ADDRESS);
        assert_eq!(session.network(), Network::Mainnet);
        assert_eq!(session.template().unwrap().height, 102);
    }

    #[test]
    fn test_cannot_switch_while_auto_running() {
        let mut session = ready_session(MAINNET_BITS);
        session.start_auto().unwrap();

        assert_eq!(
            session.set_address("1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2"),
            Err(MinerError::SessionState(SessionStateError::AutoRunning))
        );
        assert_eq!(session.set_network(Network::Testnet4), Err(SessionStateError::AutoRunning));
        assert_eq!(session.address().unwrap().as_str(), ADDRESS);

        session.stop_auto().unwrap();
        session.set_network(Network::Testnet4).unwrap();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.address().is_none());
        assert!(session.template().is_none());
    }

    #[test]
    fn test_template_network_must_match() {
        let mut session = ready_session(MAINNET_BITS);
        let testnet = crate::block::build_template(Network::Testnet4, &tip(5), MAINNET_BITS, 0).unwrap();
        let err = session.reset_for_new_template(testnet).unwrap_err();
        assert!(matches!(err, MinerError::Template(TemplateError::NetworkMismatch { .. })));
        assert_eq!(session.template().unwrap().height, 101);
    }

    #[test]
    fn test_cursor_wraps_and_flags_exhaustion() {
        let mut session = ready_session(MAINNET_BITS);
        session.cursor = u32::MAX - 499;
        session.start_auto().unwrap();

        match session.tick().unwrap() {
            BatchOutcome::Applied(result) => assert_eq!(result.hashes_computed, 500),
            BatchOutcome::Discarded => panic!("batch discarded"),
        }
        assert_eq!(session.cursor(), 0);
        assert!(session.stats().nonce_space_exhausted);
        assert_eq!(session.stats().cycles_completed, 1);

        session.tick().unwrap();
        assert_eq!(session.cursor(), 2_000);
    }

    #[test]
    fn test_batch_size_calibration() {
        let mut session = ready_session(MAINNET_BITS);
        session.observe_batch_time(2_000, Duration::from_millis(500));
        assert_eq!(session.batch_size(), 1_000);

        session.start_auto().unwrap();
        let job = session.begin_batch().unwrap();
        assert_eq!(job.count, 1_000);
    }
}

use crate::core::Block;
use crate::utils::sha256_hex;
use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Sender, SyncSender};
use std::sync::Arc;
use std::time::Instant;

/// Attempts per reported percentage point; matches the coarse progress bar
/// the mining UI expects.
const ATTEMPTS_PER_PERCENT: u64 = 20_000;

/// Cooperative cancellation signal for a nonce search.
///
/// Clones share the same flag, so one handle can be given to the miner and
/// another kept by whoever wants to stop it.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> CancellationToken {
        CancellationToken::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Events pushed while a nonce search runs
#[derive(Debug, Clone, PartialEq)]
pub enum MiningProgress {
    /// Periodic tick; `percent` is capped at 99 until the block is found
    Progress { attempts: u64, percent: u8 },
    /// Hash rate over roughly the last second
    Rate { attempts_per_second: u64 },
    /// Final event on success; `percent` is always 100
    Found {
        attempts: u64,
        duration_ms: u64,
        percent: u8,
    },
    Cancelled { attempts: u64 },
}

/// Fire-and-forget receiver of [`MiningProgress`] events.
///
/// Implementations must swallow delivery failures; a closed channel never
/// stops mining.
pub trait ProgressSink {
    fn report(&self, event: MiningProgress);
}

impl ProgressSink for Sender<MiningProgress> {
    fn report(&self, event: MiningProgress) {
        let _ = self.send(event);
    }
}

impl ProgressSink for SyncSender<MiningProgress> {
    fn report(&self, event: MiningProgress) {
        let _ = self.try_send(event);
    }
}

/// How a search is observed and stopped
pub struct MiningControl<'a> {
    pub cancel: &'a CancellationToken,
    pub progress: Option<&'a dyn ProgressSink>,
    pub progress_interval: u64,
    pub cancel_check_interval: u64,
}

impl<'a> MiningControl<'a> {
    pub fn new(cancel: &'a CancellationToken) -> MiningControl<'a> {
        MiningControl {
            cancel,
            progress: None,
            progress_interval: 5_000,
            cancel_check_interval: 1,
        }
    }

    pub fn with_progress(mut self, sink: &'a dyn ProgressSink) -> MiningControl<'a> {
        self.progress = Some(sink);
        self
    }

    pub fn with_intervals(mut self, progress_interval: u64, cancel_check_interval: u64) -> Self {
        self.progress_interval = progress_interval.max(1);
        self.cancel_check_interval = cancel_check_interval.max(1);
        self
    }

    fn report(&self, event: MiningProgress) {
        if let Some(sink) = self.progress {
            sink.report(event);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MiningOutcome {
    Mined {
        nonce: u64,
        hash: String,
        attempts: u64,
        duration_ms: u64,
    },
    /// Stopped by the cancellation token; nothing was found
    Cancelled { attempts: u64 },
}

/// Nonce search over a fixed block header.
///
/// Only the nonce changes between attempts, so the hash input is split once
/// into the text before and after it.
pub struct ProofOfWork {
    prefix: String,
    suffix: String,
    difficulty: u32,
    index: u64,
}

impl ProofOfWork {
    pub fn new_proof_of_work(block: &Block, difficulty: u32) -> ProofOfWork {
        let (prefix, suffix) = block.hash_input_parts(difficulty);
        ProofOfWork {
            prefix,
            suffix,
            difficulty,
            index: block.get_index(),
        }
    }

    /// Integrity plus proof: the stored hash matches the fields and has
    /// enough leading zeros for the stored difficulty.
    pub fn validate(block: &Block) -> bool {
        block.get_hash() == block.compute_hash()
            && meets_difficulty(block.get_hash(), block.get_difficulty())
    }

    fn hash_with_nonce(&self, nonce: u64) -> String {
        let mut data = String::with_capacity(self.prefix.len() + self.suffix.len() + 20);
        data.push_str(&self.prefix);
        data.push_str(&nonce.to_string());
        data.push_str(&self.suffix);
        sha256_hex(data.as_bytes())
    }

    /// Search nonces from 0 upward until the hash meets the difficulty or the
    /// token is cancelled.
    pub fn run(&self, control: &MiningControl<'_>) -> MiningOutcome {
        info!(
            "Mining block {} at difficulty {}",
            self.index, self.difficulty
        );
        let started = Instant::now();
        let mut rate_window = Instant::now();
        let mut rate_attempts: u64 = 0;
        let mut attempts: u64 = 0;
        let mut nonce: u64 = 0;

        loop {
            if attempts % control.cancel_check_interval == 0 && control.cancel.is_cancelled() {
                info!("Mining of block {} cancelled after {attempts} attempts", self.index);
                control.report(MiningProgress::Cancelled { attempts });
                return MiningOutcome::Cancelled { attempts };
            }

            let hash = self.hash_with_nonce(nonce);
            attempts += 1;
            rate_attempts += 1;

            if meets_difficulty(&hash, self.difficulty) {
                let duration_ms = started.elapsed().as_millis() as u64;
                info!(
                    "Found hash {hash} for block {} after {attempts} attempts ({duration_ms} ms)",
                    self.index
                );
                control.report(MiningProgress::Found {
                    attempts,
                    duration_ms,
                    percent: 100,
                });
                return MiningOutcome::Mined {
                    nonce,
                    hash,
                    attempts,
                    duration_ms,
                };
            }

            if attempts % control.progress_interval == 0 {
                let percent = (attempts / ATTEMPTS_PER_PERCENT).min(99) as u8;
                debug!("Block {}: {attempts} attempts", self.index);
                control.report(MiningProgress::Progress { attempts, percent });

                let elapsed = rate_window.elapsed();
                if elapsed.as_millis() >= 1_000 {
                    let attempts_per_second =
                        (rate_attempts as f64 / elapsed.as_secs_f64()).round() as u64;
                    control.report(MiningProgress::Rate {
                        attempts_per_second,
                    });
                    rate_attempts = 0;
                    rate_window = Instant::now();
                }
            }

            nonce = nonce.wrapping_add(1);
        }
    }
}

/// True when the first `difficulty` characters of `hash` are all `'0'`
pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    let required = difficulty as usize;
    hash.len() >= required && hash.bytes().take(required).all(|b| b == b'0')
}

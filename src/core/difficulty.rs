use crate::config::LedgerConfig;
use crate::core::Block;
use log::info;

/// Proportional difficulty controller.
///
/// After every block, once the chain holds at least `retarget_window`
/// blocks, the average mining time of the last `retarget_window` post-genesis
/// blocks is compared with `target_block_time_ms`. Outside the tolerance band
/// the difficulty moves by exactly one step, clamped to
/// `[min_difficulty, max_difficulty]`.
pub struct DifficultyAdjustment;

impl DifficultyAdjustment {
    pub fn calculate_next_difficulty(
        blocks: &[Block],
        current_difficulty: u32,
        config: &LedgerConfig,
    ) -> u32 {
        let window = config.retarget_window;
        if blocks.len() < window {
            return Self::clamp(current_difficulty, config);
        }

        let recent: Vec<&Block> = blocks
            .iter()
            .rev()
            .filter(|block| !block.is_genesis())
            .take(window)
            .collect();
        if recent.len() < window {
            return Self::clamp(current_difficulty, config);
        }

        let average_ms = recent
            .iter()
            .map(|block| block.get_mining_duration_ms() as f64)
            .sum::<f64>()
            / window as f64;

        let target_ms = config.target_block_time_ms as f64;
        let lower_bound = target_ms * (1.0 - config.tolerance);
        let upper_bound = target_ms * (1.0 + config.tolerance);

        let next = if average_ms < lower_bound {
            current_difficulty.saturating_add(1)
        } else if average_ms > upper_bound {
            current_difficulty.saturating_sub(1)
        } else {
            current_difficulty
        };
        let next = Self::clamp(next, config);

        if next != current_difficulty {
            info!(
                "Difficulty retarget: {current_difficulty} -> {next} (average {average_ms:.0} ms, target {target_ms:.0} ms)"
            );
        }
        next
    }

    fn clamp(difficulty: u32, config: &LedgerConfig) -> u32 {
        difficulty.clamp(config.min_difficulty, config.max_difficulty)
    }
}

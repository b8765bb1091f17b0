//! Seeded shuffling and answer-pool selection for choice responses.
//!
//! All randomness flows through a caller-owned [`ProblemRng`] so that one
//! problem seed drives every decision in document order. The free functions
//! taking a `seed` build a fresh generator for standalone use.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use thiserror::Error;

/// Deterministic generator used for every randomized decision of a problem.
pub type ProblemRng = ChaCha8Rng;

/// Build the generator for a problem seed.
pub fn rng_for_seed(seed: u64) -> ProblemRng {
    ChaCha8Rng::seed_from_u64(seed)
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PoolError {
    #[error("answer-pool requires at least one correct choice")]
    NoCorrectChoice,
    #[error("answer-pool requires at least one incorrect choice")]
    NoIncorrectChoice,
    #[error("fixed mask has {mask} entries for {items} items")]
    MaskLength { mask: usize, items: usize },
}

/// Permute `items`, keeping every position whose mask entry is `true`.
///
/// Unfixed items are shuffled among the unfixed slots, so anchors at the head
/// and tail stay where they were authored.
pub fn shuffle_with<T, R: Rng>(
    items: Vec<T>,
    fixed: &[bool],
    rng: &mut R,
) -> Result<Vec<T>, PoolError> {
    if fixed.len() != items.len() {
        return Err(PoolError::MaskLength {
            mask: fixed.len(),
            items: items.len(),
        });
    }

    let mut slots: Vec<Option<T>> = Vec::with_capacity(items.len());
    let mut free = Vec::new();
    for (item, is_fixed) in items.into_iter().zip(fixed) {
        if *is_fixed {
            slots.push(Some(item));
        } else {
            free.push(item);
            slots.push(None);
        }
    }

    free.shuffle(rng);
    let mut free = free.into_iter();
    Ok(slots
        .into_iter()
        .filter_map(|slot| slot.or_else(|| free.next()))
        .collect())
}

/// [`shuffle_with`] using a generator seeded from `seed`.
pub fn shuffle<T>(items: Vec<T>, seed: u64, fixed: &[bool]) -> Result<Vec<T>, PoolError> {
    shuffle_with(items, fixed, &mut rng_for_seed(seed))
}

/// Result of drawing an answer pool.
#[derive(Debug, Clone, PartialEq)]
pub struct Pool<T> {
    /// The presented choices, in display order.
    pub choices: Vec<T>,
    /// The correct choice that made it into the pool.
    pub correct: T,
}

/// Draw a pool of at most `pool_size` choices containing exactly one correct
/// choice and `pool_size - 1` incorrect ones.
///
/// The correct choice is drawn first, then the incorrect list is shuffled and
/// truncated, then the selection itself is shuffled.
pub fn select_pool_with<T: Clone, R: Rng>(
    choices: &[(T, bool)],
    pool_size: usize,
    rng: &mut R,
) -> Result<Pool<T>, PoolError> {
    let correct: Vec<&T> = choices.iter().filter(|(_, c)| *c).map(|(v, _)| v).collect();
    let mut incorrect: Vec<&T> = choices.iter().filter(|(_, c)| !*c).map(|(v, _)| v).collect();
    if correct.is_empty() {
        return Err(PoolError::NoCorrectChoice);
    }
    if incorrect.is_empty() {
        return Err(PoolError::NoIncorrectChoice);
    }

    let chosen = correct[rng.gen_range(0..correct.len())].clone();
    incorrect.shuffle(rng);
    let take = pool_size.saturating_sub(1).min(incorrect.len());

    let mut selected = Vec::with_capacity(take + 1);
    selected.push(chosen.clone());
    selected.extend(incorrect.into_iter().take(take).cloned());
    selected.shuffle(rng);

    Ok(Pool {
        choices: selected,
        correct: chosen,
    })
}

/// [`select_pool_with`] using a generator seeded from `seed`.
pub fn select_pool<T: Clone>(
    choices: &[(T, bool)],
    pool_size: usize,
    seed: u64,
) -> Result<Pool<T>, PoolError> {
    select_pool_with(choices, pool_size, &mut rng_for_seed(seed))
}

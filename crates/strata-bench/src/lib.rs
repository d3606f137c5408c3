//! Workload generators for the strata benchmarks.
//!
//! Everything is derived from a seed with a fixed LCG so runs are
//! reproducible without pulling in a random number crate.
//!
//! - [`request_sizes`]: allocation lengths with a small-object bias
//! - [`churn_ops`]: interleaved allocate/release sequence for pools and slabs

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

/// One step of a churn workload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChurnOp {
    /// Claim a new slot.
    Allocate,
    /// Release the live slot at this position in the caller's live list,
    /// modulo its length.
    Release(usize),
}

fn lcg(state: &mut u64) -> u64 {
    *state = state
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    *state >> 33
}

/// Generate `n` allocation lengths in `1..=max`.
///
/// Three quarters of the requests are at most 64 bytes.
pub fn request_sizes(n: usize, max: usize, seed: u64) -> Vec<usize> {
    let mut state = seed;
    (0..n)
        .map(|_| {
            let r = lcg(&mut state) as usize;
            let bound = if r % 4 == 0 { max } else { max.min(64) };
            1 + (r / 4) % bound.max(1)
        })
        .collect()
}

/// Generate `n` churn operations, allocating with probability
/// `allocate_percent / 100`.
pub fn churn_ops(n: usize, allocate_percent: u64, seed: u64) -> Vec<ChurnOp> {
    let mut state = seed;
    (0..n)
        .map(|_| {
            let r = lcg(&mut state);
            if r % 100 < allocate_percent {
                ChurnOp::Allocate
            } else {
                ChurnOp::Release((r / 100) as usize)
            }
        })
        .collect()
}

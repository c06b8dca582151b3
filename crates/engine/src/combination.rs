//! Combination enumeration and counting.
//!
//! Combinations are generated from explicit index slots advanced like an
//! odometer, which yields strictly increasing tuples in lexicographic order
//! without recursion.

use crate::error::{CoverageError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A strictly increasing sequence of 1-based item indices.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Combination(Vec<usize>);

impl Combination {
    pub fn items(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Combination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl From<Combination> for Vec<usize> {
    fn from(c: Combination) -> Self {
        c.0
    }
}

/// Lazy iterator over every size-`r` subset of `{1..n}`.
///
/// Iteration ends when the slots cannot advance any further. The closed-form
/// count is tracked only for `size_hint` and is absent when it does not fit.
#[derive(Debug, Clone)]
pub struct Combinations {
    n: usize,
    slots: Vec<usize>,
    done: bool,
    remaining: Option<u128>,
}

impl Combinations {
    pub fn new(n: usize, r: usize) -> Result<Self> {
        check_arity(n, r)?;
        Ok(Self {
            n,
            slots: (1..=r).collect(),
            done: false,
            remaining: combination_count(n, r).ok(),
        })
    }

    /// Advance the slots to the next tuple. Returns false once exhausted.
    fn advance(&mut self) -> bool {
        let r = self.slots.len();
        // Slot i may climb as far as n - (r - 1 - i).
        let pivot = (0..r).rev().find(|&i| self.slots[i] < self.n - (r - 1 - i));
        match pivot {
            Some(i) => {
                self.slots[i] += 1;
                for j in i + 1..r {
                    self.slots[j] = self.slots[j - 1] + 1;
                }
                true
            }
            None => false,
        }
    }
}

impl Iterator for Combinations {
    type Item = Combination;

    fn next(&mut self) -> Option<Combination> {
        if self.done {
            return None;
        }
        let out = Combination(self.slots.clone());
        self.done = !self.advance();
        if let Some(left) = self.remaining.as_mut() {
            *left = left.saturating_sub(1);
        }
        Some(out)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            return (0, Some(0));
        }
        match self.remaining.map(usize::try_from) {
            Some(Ok(n)) => (n, Some(n)),
            _ => (0, None),
        }
    }
}

fn check_arity(n: usize, r: usize) -> Result<()> {
    if n == 0 {
        return Err(CoverageError::arity(n, r, "item count must be at least 1"));
    }
    if r == 0 {
        return Err(CoverageError::arity(n, r, "combination size must be at least 1"));
    }
    if r > n {
        return Err(CoverageError::arity(
            n,
            r,
            "combination size exceeds item count",
        ));
    }
    Ok(())
}

/// Every combination of size exactly `r` from `{1..n}`, lexicographic.
pub fn generate_combinations(n: usize, r: usize) -> Result<Vec<Combination>> {
    Ok(Combinations::new(n, r)?.collect())
}

/// Sizes `1..=r` concatenated in increasing size order.
pub fn generate_all_sizes(n: usize, r: usize) -> Result<Vec<Combination>> {
    check_arity(n, r)?;
    let mut out = Vec::new();
    for k in 1..=r {
        out.extend(Combinations::new(n, k)?);
    }
    Ok(out)
}

/// `m!` with `0! = 1! = 1`. Negative input is a domain error.
pub fn factorial(m: i64) -> Result<u128> {
    if m < 0 {
        return Err(CoverageError::ArithmeticDomain(m));
    }
    (2..=m as u128).try_fold(1u128, |acc, k| {
        acc.checked_mul(k)
            .ok_or_else(|| CoverageError::ArithmeticOverflow(format!("{}!", m)))
    })
}

/// `n! / ((n - r)! * r!)` for `0 <= r <= n`.
///
/// Evaluated as the running product `C(n, i + 1) = C(n, i) * (n - i) / (i + 1)`.
/// The common factor of `C(n, i)` and `i + 1` is divided out first, so every
/// step is exact and only a result that itself exceeds `u128` overflows.
pub fn combination_count(n: usize, r: usize) -> Result<u128> {
    if r > n {
        return Err(CoverageError::arity(
            n,
            r,
            "combination size exceeds item count",
        ));
    }
    let k = r.min(n - r) as u128;
    let n_big = n as u128;
    let mut acc = 1u128;
    for i in 0..k {
        let g = gcd(acc, i + 1);
        // (i + 1) / g divides (n - i) because the next term is integral.
        let factor = (n_big - i) / ((i + 1) / g);
        acc = (acc / g)
            .checked_mul(factor)
            .ok_or_else(|| CoverageError::ArithmeticOverflow(format!("C({}, {})", n, r)))?;
    }
    Ok(acc)
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Sum of `C(n, k)` for `k` in `1..=r`.
pub fn total_combination_count(n: usize, r: usize) -> Result<u128> {
    check_arity(n, r)?;
    (1..=r).try_fold(0u128, |acc, k| {
        let c = combination_count(n, k)?;
        acc.checked_add(c)
            .ok_or_else(|| CoverageError::ArithmeticOverflow(format!("sum C({}, 1..={})", n, r)))
    })
}

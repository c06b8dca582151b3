//! Coverage collection – drives the surface once per combination.
//!
//! Every combination walks the same phases:
//!
//! ```text
//! Idle/Read -> Cleared -> Selected -> Computed -> Read
//! ```
//!
//! with a settle delay after each of the first three transitions. The
//! surface holds one shared selection, so combinations never overlap.

use crate::catalogue::{Catalogue, EffectLabel};
use crate::combination::{combination_count, Combination, Combinations};
use crate::error::{CoverageError, Result};
use crate::traits::{CapError, CapResult, Clock, SelectorSurface};
use crate::types::{Dataset, Row};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Cleared,
    Selected,
    Computed,
    Read,
}

impl Phase {
    /// The only phase reachable from `self`.
    pub fn next(self) -> Phase {
        match self {
            Phase::Idle | Phase::Read => Phase::Cleared,
            Phase::Cleared => Phase::Selected,
            Phase::Selected => Phase::Computed,
            Phase::Computed => Phase::Read,
        }
    }

}

/// Surface request that failed, as reported in errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceStep {
    AvailabilityQuery,
    Clear,
    Select,
    Compute,
    Read,
}

impl fmt::Display for SurfaceStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SurfaceStep::AvailabilityQuery => "availability query",
            SurfaceStep::Clear => "clear",
            SurfaceStep::Select => "select",
            SurfaceStep::Compute => "compute",
            SurfaceStep::Read => "read",
        })
    }
}

/// Shared flag checked between combinations.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectOptions {
    /// Extra attempts for a failing readout, each after one settle delay.
    /// Zero keeps the fail-fast behaviour.
    #[serde(default)]
    pub read_retries: u32,
}

pub struct CoverageCollector<'a> {
    catalogue: &'a Catalogue,
    surface: &'a dyn SelectorSurface,
    clock: &'a dyn Clock,
    options: CollectOptions,
    cancel: Option<CancelToken>,
}

impl<'a> CoverageCollector<'a> {
    pub fn new(
        catalogue: &'a Catalogue,
        surface: &'a dyn SelectorSurface,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            catalogue,
            surface,
            clock,
            options: CollectOptions::default(),
            cancel: None,
        }
    }

    pub fn with_options(mut self, options: CollectOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn catalogue(&self) -> &Catalogue {
        self.catalogue
    }

    /// Number of items currently selectable on the surface.
    ///
    /// Only the last catalogue item can be switched off by the surface, so
    /// this asks about that one item once.
    pub async fn active_item_count(&self) -> Result<usize> {
        let last = self.catalogue.len();
        let disabled = self
            .surface
            .is_item_disabled(last)
            .await
            .map_err(|source| CoverageError::SurfaceUnavailable {
                step: SurfaceStep::AvailabilityQuery,
                target: format!("item {}", last),
                source,
            })?;
        let active = if disabled { last - 1 } else { last };
        tracing::debug!(total = last, active, "active item count");
        Ok(active)
    }

    /// Collect size-`r` coverage over the active items.
    pub async fn collect_active(&self, r: usize, delay: Duration) -> Result<Dataset> {
        if r == 0 {
            return Err(CoverageError::arity(
                self.catalogue.len(),
                r,
                "combination size must be at least 1",
            ));
        }
        let n = self.active_item_count().await?;
        self.collect(n, r, delay).await
    }

    /// Collect one row per size-`r` combination of items `1..=n`.
    ///
    /// Any surface failure aborts the run and the rows gathered so far are
    /// dropped.
    pub async fn collect(&self, n: usize, r: usize, delay: Duration) -> Result<Dataset> {
        if n > self.catalogue.len() {
            return Err(CoverageError::arity(
                n,
                r,
                "item count exceeds the catalogue",
            ));
        }
        let combinations = Combinations::new(n, r)?;
        // Only reported; enumeration runs until the slots are exhausted.
        let total = combination_count(n, r).ok();
        let start = Instant::now();
        tracing::info!(n, r, total = ?total, delay_ms = delay.as_millis() as u64, "collection started");

        let mut phase = Phase::Idle;
        let mut dataset = Dataset::new();
        for combination in combinations {
            if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                tracing::warn!(completed = dataset.len(), total = ?total, "collection cancelled");
                return Err(CoverageError::Cancelled {
                    completed: dataset.len(),
                    total,
                });
            }
            let row = self.drive(&mut phase, &combination, delay).await?;
            tracing::debug!(index = dataset.len() + 1, total = ?total, row = ?row, "row collected");
            dataset.push(row);
        }

        tracing::info!(
            rows = dataset.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "collection finished"
        );
        Ok(dataset)
    }

    /// Run one combination through clear, select, compute and read.
    async fn drive(
        &self,
        phase: &mut Phase,
        combination: &Combination,
        delay: Duration,
    ) -> Result<Row> {
        let mut row: Row = combination
            .items()
            .iter()
            .map(|&i| self.catalogue.item_name(i).map(str::to_string))
            .collect::<Result<_>>()?;

        let fail = |step: SurfaceStep| {
            move |source: CapError| CoverageError::SurfaceUnavailable {
                step,
                target: format!("combination {}", combination),
                source,
            }
        };

        self.surface.clear_all().await.map_err(fail(SurfaceStep::Clear))?;
        transition(phase, Phase::Cleared);
        self.clock.sleep(delay).await;

        for &item in combination.items() {
            self.surface.select(item).await.map_err(fail(SurfaceStep::Select))?;
        }
        transition(phase, Phase::Selected);
        self.clock.sleep(delay).await;

        self.surface.compute().await.map_err(fail(SurfaceStep::Compute))?;
        transition(phase, Phase::Computed);
        self.clock.sleep(delay).await;

        for effect in &self.catalogue.effects {
            let value = self
                .read_readout(effect, delay)
                .await
                .map_err(fail(SurfaceStep::Read))?;
            row.push(value);
        }
        transition(phase, Phase::Read);

        Ok(row)
    }

    async fn read_readout(&self, effect: &EffectLabel, delay: Duration) -> CapResult<String> {
        let mut attempt = 0;
        loop {
            match self.surface.read_effectiveness(effect).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.options.read_retries => {
                    attempt += 1;
                    tracing::warn!(
                        readout = %effect.readout,
                        attempt,
                        error = %e,
                        "readout failed, retrying"
                    );
                    self.clock.sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// `"<prefix> 1".."<prefix> k"` followed by the effect display names.
    pub fn dataset_header(&self, k: usize) -> Row {
        dataset_header(self.catalogue, k)
    }

    pub fn with_header(&self, dataset: Dataset, k: usize) -> Dataset {
        with_header(self.catalogue, dataset, k)
    }
}

fn transition(phase: &mut Phase, to: Phase) {
    debug_assert_eq!(phase.next(), to, "illegal transition {:?} -> {:?}", phase, to);
    tracing::trace!(from = ?*phase, to = ?to, "phase");
    *phase = to;
}

pub fn dataset_header(catalogue: &Catalogue, k: usize) -> Row {
    (1..=k)
        .map(|i| format!("{} {}", catalogue.column_prefix, i))
        .chain(catalogue.effect_names().map(str::to_string))
        .collect()
}

pub fn with_header(catalogue: &Catalogue, dataset: Dataset, k: usize) -> Dataset {
    let mut out = Dataset::with_capacity(dataset.len() + 1);
    out.push(dataset_header(catalogue, k));
    out.extend(dataset);
    out
}

/// Lower bound on wall time: three settle delays per combination.
pub fn estimated_duration(combinations: u128, delay: Duration) -> Duration {
    let ms = combinations
        .saturating_mul(3)
        .saturating_mul(delay.as_millis());
    Duration::from_millis(u64::try_from(ms).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemorySurface, SurfaceCall, VirtualClock};

    fn two_items() -> Catalogue {
        Catalogue::new(
            vec!["Name1".into(), "Name2".into()],
            Catalogue::pokemon().effects,
        )
        .unwrap()
    }

    fn fixed() -> MemorySurface {
        MemorySurface::with_fixed_readouts(["0", "0", "2", "0"])
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_phase_cycle() {
        let mut p = Phase::Idle;
        let mut seen = vec![];
        for _ in 0..5 {
            p = p.next();
            seen.push(p);
        }
        assert_eq!(
            seen,
            [
                Phase::Cleared,
                Phase::Selected,
                Phase::Computed,
                Phase::Read,
                Phase::Cleared
            ]
        );
    }

    #[tokio::test]
    async fn test_collect_two_items_single_type() {
        let catalogue = two_items();
        let surface = fixed();
        let clock = VirtualClock::new();
        let collector = CoverageCollector::new(&catalogue, &surface, &clock);

        let data = collector.collect(2, 1, ms(10)).await.unwrap();
        assert_eq!(
            data,
            vec![
                vec!["Name1", "0", "0", "2", "0"],
                vec!["Name2", "0", "0", "2", "0"],
            ]
        );
    }

    #[tokio::test]
    async fn test_collect_call_sequence() {
        let catalogue = Catalogue::pokemon();
        let surface = fixed();
        let clock = VirtualClock::new();
        let collector = CoverageCollector::new(&catalogue, &surface, &clock);

        collector.collect(3, 2, ms(10)).await.unwrap();

        let calls = surface.calls();
        // clear + 2 selects + compute + 4 reads per combination
        assert_eq!(calls.len(), 3 * 8);
        let first: Vec<SurfaceCall> = calls[..8].to_vec();
        assert_eq!(
            first,
            vec![
                SurfaceCall::ClearAll,
                SurfaceCall::Select(1),
                SurfaceCall::Select(2),
                SurfaceCall::Compute,
                SurfaceCall::Read("total-noeffect".into()),
                SurfaceCall::Read("total-notveffective".into()),
                SurfaceCall::Read("total-normeffective".into()),
                SurfaceCall::Read("total-supereffective".into()),
            ]
        );
        assert_eq!(calls[8], SurfaceCall::ClearAll);
        assert_eq!(calls[9], SurfaceCall::Select(1));
        assert_eq!(calls[10], SurfaceCall::Select(3));

        // three settle delays per combination
        assert_eq!(clock.sleeps(), 9);
        assert_eq!(clock.elapsed(), ms(90));
    }

    #[tokio::test]
    async fn test_rows_follow_generation_order() {
        let catalogue = Catalogue::pokemon();
        let surface = MemorySurface::with_readouts(|items| {
            let sum: usize = items.iter().sum();
            [
                items.len().to_string(),
                sum.to_string(),
                "0".into(),
                "0".into(),
            ]
        });
        let clock = VirtualClock::new();
        let collector = CoverageCollector::new(&catalogue, &surface, &clock);

        let data = collector.collect(4, 2, Duration::ZERO).await.unwrap();
        let names: Vec<(&str, &str)> = data
            .iter()
            .map(|r| (r[0].as_str(), r[1].as_str()))
            .collect();
        assert_eq!(
            names,
            [
                ("Normal", "Fire"),
                ("Normal", "Water"),
                ("Normal", "Electric"),
                ("Fire", "Water"),
                ("Fire", "Electric"),
                ("Water", "Electric"),
            ]
        );
        // readouts reflect the selection computed for that row
        assert_eq!(data[0][3], "3");
        assert_eq!(data[5][3], "7");
        assert!(data.iter().all(|r| r.len() == 2 + 4));
    }

    #[tokio::test]
    async fn test_invalid_arity_touches_nothing() {
        let catalogue = two_items();
        let surface = fixed();
        let clock = VirtualClock::new();
        let collector = CoverageCollector::new(&catalogue, &surface, &clock);

        for (n, r) in [(0, 1), (2, 0), (2, 3), (3, 1)] {
            let err = collector.collect(n, r, ms(10)).await.unwrap_err();
            assert!(matches!(err, CoverageError::InvalidArity { .. }), "{}", err);
        }
        let err = collector.collect_active(0, ms(10)).await.unwrap_err();
        assert!(matches!(err, CoverageError::InvalidArity { .. }));

        assert!(surface.calls().is_empty());
        assert_eq!(clock.sleeps(), 0);
    }

    #[tokio::test]
    async fn test_active_item_count() {
        let catalogue = Catalogue::pokemon();
        let clock = VirtualClock::new();

        let surface = fixed();
        let collector = CoverageCollector::new(&catalogue, &surface, &clock);
        assert_eq!(collector.active_item_count().await.unwrap(), 18);
        assert_eq!(surface.calls(), vec![SurfaceCall::IsItemDisabled(18)]);

        let surface = fixed().disable(18);
        let collector = CoverageCollector::new(&catalogue, &surface, &clock);
        assert_eq!(collector.active_item_count().await.unwrap(), 17);
    }

    #[tokio::test]
    async fn test_collect_active_queries_once() {
        let catalogue = Catalogue::pokemon();
        let surface = fixed().disable(18);
        let clock = VirtualClock::new();
        let collector = CoverageCollector::new(&catalogue, &surface, &clock);

        let data = collector.collect_active(1, Duration::ZERO).await.unwrap();
        assert_eq!(data.len(), 17);
        assert_eq!(data.last().unwrap()[0], "Steel");

        let queries = surface
            .calls()
            .into_iter()
            .filter(|c| matches!(c, SurfaceCall::IsItemDisabled(_)))
            .count();
        assert_eq!(queries, 1);
    }

    #[tokio::test]
    async fn test_missing_control_aborts() {
        let catalogue = Catalogue::pokemon();
        let surface = fixed().missing(SurfaceCall::Select(3));
        let clock = VirtualClock::new();
        let collector = CoverageCollector::new(&catalogue, &surface, &clock);

        let err = collector.collect(4, 1, ms(1)).await.unwrap_err();
        match err {
            CoverageError::SurfaceUnavailable {
                step,
                target,
                source,
            } => {
                assert_eq!(step, SurfaceStep::Select);
                assert_eq!(target, "combination [3]");
                assert!(matches!(source, CapError::NotFound(_)));
            }
            other => panic!("unexpected error: {}", other),
        }
        // nothing after the failing select
        assert_eq!(surface.calls().last(), Some(&SurfaceCall::Select(3)));
    }

    #[tokio::test]
    async fn test_read_failure_without_retries() {
        let catalogue = Catalogue::pokemon();
        let surface = fixed().failing_reads(1);
        let clock = VirtualClock::new();
        let collector = CoverageCollector::new(&catalogue, &surface, &clock);

        let err = collector.collect(2, 1, ms(1)).await.unwrap_err();
        assert!(matches!(
            err,
            CoverageError::SurfaceUnavailable {
                step: SurfaceStep::Read,
                ..
            }
        ));
        assert!(err.to_string().contains("during read of combination [1]"));
    }

    #[tokio::test]
    async fn test_read_retries_recover() {
        let catalogue = Catalogue::pokemon();
        let surface = fixed().failing_reads(2);
        let clock = VirtualClock::new();
        let collector = CoverageCollector::new(&catalogue, &surface, &clock)
            .with_options(CollectOptions { read_retries: 2 });

        let data = collector.collect(1, 1, ms(5)).await.unwrap();
        assert_eq!(data, vec![vec!["Normal", "0", "0", "2", "0"]]);
        // 3 settle delays plus one per retry
        assert_eq!(clock.sleeps(), 5);
    }

    #[tokio::test]
    async fn test_cancel_between_combinations() {
        let catalogue = Catalogue::pokemon();
        let surface = fixed();
        let clock = VirtualClock::new();
        let cancel = CancelToken::new();
        cancel.cancel();
        let collector =
            CoverageCollector::new(&catalogue, &surface, &clock).with_cancel(cancel.clone());

        let err = collector.collect(5, 2, ms(1)).await.unwrap_err();
        assert!(matches!(
            err,
            CoverageError::Cancelled {
                completed: 0,
                total: Some(10)
            }
        ));
        assert!(surface.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_before_huge_enumeration() {
        let items: Vec<String> = (1..=100).map(|i| format!("Item{}", i)).collect();
        let catalogue = Catalogue::new(items, Catalogue::pokemon().effects).unwrap();
        let surface = fixed();
        let clock = VirtualClock::new();
        let cancel = CancelToken::new();
        cancel.cancel();
        let collector = CoverageCollector::new(&catalogue, &surface, &clock).with_cancel(cancel);

        // C(100, 50) rows could never be held; nothing is reserved up front.
        let err = collector.collect(100, 50, Duration::ZERO).await.unwrap_err();
        match err {
            CoverageError::Cancelled { completed, total } => {
                assert_eq!(completed, 0);
                assert_eq!(total, combination_count(100, 50).ok());
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(surface.calls().is_empty());
    }

    #[tokio::test]
    async fn test_availability_query_failure() {
        let catalogue = Catalogue::pokemon();
        let surface = fixed().missing(SurfaceCall::IsItemDisabled(18));
        let clock = VirtualClock::new();
        let collector = CoverageCollector::new(&catalogue, &surface, &clock);

        let err = collector.collect_active(1, ms(1)).await.unwrap_err();
        assert!(matches!(
            err,
            CoverageError::SurfaceUnavailable {
                step: SurfaceStep::AvailabilityQuery,
                ..
            }
        ));
        assert!(err
            .to_string()
            .starts_with("surface unavailable during availability query of item 18"));
    }

    #[tokio::test]
    async fn test_cancel_mid_run_keeps_step_order() {
        let catalogue = Catalogue::pokemon();
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        // cancel while the third combination is being read
        let surface = MemorySurface::with_readouts(move |items| {
            if items == [3] {
                trigger.cancel();
            }
            ["1".into(), "1".into(), "1".into(), "1".into()]
        });
        let clock = VirtualClock::new();
        let collector =
            CoverageCollector::new(&catalogue, &surface, &clock).with_cancel(cancel);

        let err = collector.collect(6, 1, ms(1)).await.unwrap_err();
        assert!(matches!(
            err,
            CoverageError::Cancelled {
                completed: 3,
                total: Some(6)
            }
        ));
        // the in-flight combination finished all four reads
        let reads = surface
            .calls()
            .into_iter()
            .filter(|c| matches!(c, SurfaceCall::Read(_)))
            .count();
        assert_eq!(reads, 12);
    }

    #[test]
    fn test_header() {
        let catalogue = Catalogue::pokemon();
        let header = dataset_header(&catalogue, 2);
        assert_eq!(
            header,
            vec![
                "Type 1",
                "Type 2",
                "No Effect",
                "Not Very Effective",
                "Normal Effectiveness",
                "Super Effective"
            ]
        );
    }

    #[tokio::test]
    async fn test_with_header_prepends_one_row() {
        let catalogue = Catalogue::pokemon();
        let surface = fixed();
        let clock = VirtualClock::new();
        let collector = CoverageCollector::new(&catalogue, &surface, &clock);

        let data = collector.collect(3, 2, Duration::ZERO).await.unwrap();
        let rows = data.len();
        let with = collector.with_header(data, 2);
        assert_eq!(with.len(), rows + 1);
        assert_eq!(with[0].len(), 2 + 4);
        assert_eq!(&with[0][..2], ["Type 1", "Type 2"]);
        assert_eq!(with[0][2], "No Effect");
        assert_eq!(with[1][..2], ["Normal", "Fire"]);
    }

    #[test]
    fn test_estimated_duration() {
        let d = estimated_duration(153, Duration::from_millis(10));
        assert_eq!(d, Duration::from_millis(4590));
        assert_eq!(estimated_duration(0, Duration::from_millis(10)), Duration::ZERO);
        assert_eq!(
            estimated_duration(u128::MAX, Duration::from_millis(10)),
            Duration::from_millis(u64::MAX)
        );
    }
}

//! Deterministic in-memory capabilities.
//!
//! - [`MemorySurface`]: selection state plus a call log, readouts from a
//!   fixed row or a function of the computed selection
//! - [`VirtualClock`]: counts requested sleeps, never waits
//! - [`MemoryHost`]: keeps offered files

use crate::catalogue::EffectLabel;
use crate::export::ExportFile;
use crate::traits::*;
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

// ===========================================================================
// Surface
// ===========================================================================

/// One recorded surface interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceCall {
    ClearAll,
    Select(usize),
    Compute,
    /// Read of the readout with this identifier.
    Read(String),
    IsItemDisabled(usize),
}

type ReadoutFn = dyn Fn(&[usize]) -> [String; 4] + Send + Sync;

#[derive(Default)]
struct SurfaceState {
    selected: BTreeSet<usize>,
    computed: Option<[String; 4]>,
    calls: Vec<SurfaceCall>,
}

pub struct MemorySurface {
    readouts: Box<ReadoutFn>,
    disabled: HashSet<usize>,
    missing: Option<SurfaceCall>,
    failing_reads: AtomicU32,
    state: Mutex<SurfaceState>,
}

impl MemorySurface {
    /// Readouts computed from the selected items, in ascending item order.
    pub fn with_readouts<F>(f: F) -> Self
    where
        F: Fn(&[usize]) -> [String; 4] + Send + Sync + 'static,
    {
        Self {
            readouts: Box::new(f),
            disabled: HashSet::new(),
            missing: None,
            failing_reads: AtomicU32::new(0),
            state: Mutex::new(SurfaceState::default()),
        }
    }

    /// Every computation reports the same four values.
    pub fn with_fixed_readouts(values: [&str; 4]) -> Self {
        let values = values.map(str::to_string);
        Self::with_readouts(move |_| values.clone())
    }

    /// Report `item` as disabled.
    pub fn disable(mut self, item: usize) -> Self {
        self.disabled.insert(item);
        self
    }

    /// Fail `call` with `NotFound`, as if its target were missing from the page.
    pub fn missing(mut self, call: SurfaceCall) -> Self {
        self.missing = Some(call);
        self
    }

    /// Fail the first `count` reads with `NotFound`.
    pub fn failing_reads(self, count: u32) -> Self {
        self.failing_reads.store(count, Ordering::SeqCst);
        self
    }

    /// Every interaction so far, in order.
    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.lock().calls.clone()
    }

    pub fn selected(&self) -> Vec<usize> {
        self.lock().selected.iter().copied().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SurfaceState> {
        // A poisoned lock only means a test panicked mid-call.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Log the call and fail it if it was marked missing.
    fn record(&self, state: &mut SurfaceState, call: SurfaceCall) -> CapResult<()> {
        let missing = self.missing.as_ref() == Some(&call);
        let label = format!("{:?}", call);
        state.calls.push(call);
        if missing {
            return Err(CapError::NotFound(label));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl SelectorSurface for MemorySurface {
    async fn clear_all(&self) -> CapResult<()> {
        let mut state = self.lock();
        self.record(&mut state, SurfaceCall::ClearAll)?;
        state.selected.clear();
        Ok(())
    }

    async fn select(&self, item: usize) -> CapResult<()> {
        let mut state = self.lock();
        self.record(&mut state, SurfaceCall::Select(item))?;
        if self.disabled.contains(&item) {
            return Err(CapError::NotFound(format!("item {} is disabled", item)));
        }
        state.selected.insert(item);
        Ok(())
    }

    async fn compute(&self) -> CapResult<()> {
        let mut state = self.lock();
        self.record(&mut state, SurfaceCall::Compute)?;
        let items: Vec<usize> = state.selected.iter().copied().collect();
        state.computed = Some((self.readouts)(&items));
        Ok(())
    }

    async fn read_effectiveness(&self, effect: &EffectLabel) -> CapResult<String> {
        let mut state = self.lock();
        self.record(&mut state, SurfaceCall::Read(effect.readout.clone()))?;
        let pending = self.failing_reads.load(Ordering::SeqCst);
        if pending > 0 {
            self.failing_reads.store(pending - 1, Ordering::SeqCst);
            return Err(CapError::NotFound(format!("readout {}", effect.readout)));
        }
        let position = crate::catalogue::Effectiveness::ALL
            .iter()
            .position(|c| *c == effect.category)
            .unwrap_or_default();
        state
            .computed
            .as_ref()
            .map(|values| values[position].clone())
            .ok_or_else(|| CapError::NotFound(format!("readout {} before compute", effect.readout)))
    }

    async fn is_item_disabled(&self, item: usize) -> CapResult<bool> {
        let mut state = self.lock();
        self.record(&mut state, SurfaceCall::IsItemDisabled(item))?;
        Ok(self.disabled.contains(&item))
    }
}

// ===========================================================================
// Clock
// ===========================================================================

#[derive(Debug, Default)]
pub struct VirtualClock {
    elapsed_ms: AtomicU64,
    sleeps: AtomicU64,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms.load(Ordering::SeqCst))
    }

    pub fn sleeps(&self) -> u64 {
        self.sleeps.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Clock for VirtualClock {
    async fn sleep(&self, duration: Duration) {
        self.elapsed_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
        self.sleeps.fetch_add(1, Ordering::SeqCst);
    }
}

// ===========================================================================
// Export host
// ===========================================================================

#[derive(Debug, Default)]
pub struct MemoryHost {
    files: Mutex<Vec<ExportFile>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn files(&self) -> Vec<ExportFile> {
        self.files
            .lock()
            .map(|f| f.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }
}

impl FileHost for MemoryHost {
    fn offer_file(&self, file: &ExportFile) -> CapResult<()> {
        self.files
            .lock()
            .map_err(|_| CapError::Other("file list lock poisoned".into()))?
            .push(file.clone());
        Ok(())
    }
}

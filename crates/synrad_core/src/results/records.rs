//! Fixed-size records stored in a result buffer.
//!
//! Every record is `Pod`, 8-byte aligned and a multiple of 8 bytes long so it
//! can be viewed in place inside the `u64` backing store.

use bytemuck::{Pod, Zeroable};

/// Merge a delta into an accumulated value.
pub trait Accumulate {
    fn accumulate(&mut self, delta: &Self);
}

impl<T: Accumulate> Accumulate for [T] {
    fn accumulate(&mut self, delta: &Self) {
        for (a, d) in self.iter_mut().zip(delta) {
            a.accumulate(d);
        }
    }
}

/// Hit statistics of one facet, or of the whole geometry.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct HitCounter {
    /// Monte-Carlo hits, whatever their weight.
    pub nb_mc_hit: u64,
    pub nb_abs: u64,
    pub nb_desorbed: u64,
    pub nb_leaked: u64,
    /// Hits weighted by the photon's surviving origin ratio.
    pub nb_hit_equiv: f64,
    pub nb_abs_equiv: f64,
    /// Absorbed flux (photons/s).
    pub flux_abs: f64,
    /// Absorbed power (W).
    pub power_abs: f64,
}

impl Accumulate for HitCounter {
    fn accumulate(&mut self, d: &Self) {
        self.nb_mc_hit += d.nb_mc_hit;
        self.nb_abs += d.nb_abs;
        self.nb_desorbed += d.nb_desorbed;
        self.nb_leaked += d.nb_leaked;
        self.nb_hit_equiv += d.nb_hit_equiv;
        self.nb_abs_equiv += d.nb_abs_equiv;
        self.flux_abs += d.flux_abs;
        self.power_abs += d.power_abs;
    }
}

/// One profile bin or texture cell.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct CellTally {
    pub count: f64,
    pub flux: f64,
    pub power: f64,
}

impl Accumulate for CellTally {
    fn accumulate(&mut self, d: &Self) {
        self.count += d.count;
        self.flux += d.flux;
        self.power += d.power;
    }
}

/// Summed incident directions on a texture cell.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct DirectionCell {
    pub dir: [f64; 3],
    pub count: f64,
}

impl Accumulate for DirectionCell {
    fn accumulate(&mut self, d: &Self) {
        for (a, b) in self.dir.iter_mut().zip(d.dir) {
            *a += b;
        }
        self.count += d.count;
    }
}

/// Absorbed flux and power in one energy bin.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct SpectrumBin {
    pub flux: f64,
    pub power: f64,
}

impl Accumulate for SpectrumBin {
    fn accumulate(&mut self, d: &Self) {
        self.flux += d.flux;
        self.power += d.power;
    }
}

/// Smallest non-zero and largest value of a texture quantity.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct MinMax {
    pub min: f64,
    pub max: f64,
}

impl MinMax {
    pub fn include(&mut self, value: f64) {
        if value <= 0.0 {
            return;
        }
        if self.min == 0.0 || value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
    }
}

/// Display limits over every texture cell.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct TextureLimits {
    pub count: MinMax,
    pub flux: MinMax,
    pub power: MinMax,
}

impl TextureLimits {
    pub fn include(&mut self, cell: &CellTally) {
        self.count.include(cell.count);
        self.flux.include(cell.flux);
        self.power.include(cell.power);
    }
}

/// Global section at the start of every buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct GlobalHeader {
    /// Totals over all facets plus desorption and leak counts.
    pub counter: HitCounter,
    /// Sum of generated photon flux weights.
    pub generated_flux: f64,
    pub generated_power: f64,
    /// Trajectory points summed over regions, for normalisation.
    pub points_total: u64,
    pub _reserved: u64,
    pub limits: TextureLimits,
}

impl Accumulate for GlobalHeader {
    /// Limits are not summed; the aggregator recomputes them after a merge.
    fn accumulate(&mut self, d: &Self) {
        self.counter.accumulate(&d.counter);
        self.generated_flux += d.generated_flux;
        self.generated_power += d.generated_power;
    }
}

//! Per-material SIMD field layout configuration.
//!
//! The dependency/type registries hand the pool opaque [`MaterialId`]s;
//! for each one, callers may register how that material's field data is
//! laid out for vectorized kernels. The pool only stores and validates
//! these records — the kernels that consume them live outside this crate.

use indexmap::IndexMap;
use seam_core::{MaterialId, SimdClass};

/// SIMD layout record for one material's field data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SimdFieldLayout {
    /// Required field alignment in bytes. Power of two, at least 16,
    /// never below the instruction class's minimum.
    pub alignment: usize,
    /// Whether vectorized kernels are enabled for this material.
    pub vectorized: bool,
    /// Instruction class the layout targets.
    pub class: SimdClass,
}

/// Table of per-material SIMD layouts plus the widest class requested.
///
/// `IndexMap` keeps configuration order, so diagnostics iterate materials
/// deterministically.
#[derive(Clone, Debug, Default)]
pub(crate) struct SimdLayoutTable {
    layouts: IndexMap<MaterialId, SimdFieldLayout>,
    widest: SimdClass,
}

impl SimdLayoutTable {
    /// Smallest alignment any SIMD layout may request.
    pub const MIN_ALIGNMENT: usize = 16;

    /// Register or replace the layout for `material`.
    ///
    /// Rejects non-power-of-two or sub-16-byte alignments. A valid
    /// alignment lower than the instruction class's minimum is raised to
    /// that minimum. Tracks the widest class seen across all calls.
    pub fn configure(
        &mut self,
        material: MaterialId,
        alignment: usize,
        vectorized: bool,
        class: SimdClass,
    ) -> bool {
        if !alignment.is_power_of_two() || alignment < Self::MIN_ALIGNMENT {
            return false;
        }
        let alignment = alignment.max(class.min_alignment());
        self.layouts.insert(
            material,
            SimdFieldLayout {
                alignment,
                vectorized,
                class,
            },
        );
        self.widest = self.widest.max(class);
        true
    }

    /// Look up the layout registered for `material`.
    pub fn get(&self, material: MaterialId) -> Option<SimdFieldLayout> {
        self.layouts.get(&material).copied()
    }

    /// Widest instruction class requested so far.
    pub fn widest_class(&self) -> SimdClass {
        self.widest
    }
}

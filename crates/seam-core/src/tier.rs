//! Precision tiers and SIMD instruction classes.
//!
//! A [`PrecisionTier`] names a quality level for narrow-band samples and
//! fixes the byte alignment and per-channel width the pool must honour.
//! A [`SimdClass`] names the widest vector instruction set a field layout
//! is prepared for and imposes a minimum alignment.

/// Quality level of a narrow-band sample set.
///
/// Hotter tiers sit closer to the active mining surface and trade memory
/// for precision and vectorization headroom.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrecisionTier {
    /// Actively mined surface. Full precision, AVX-friendly alignment.
    Hot,
    /// Near the surface but not under active edits.
    #[default]
    Warm,
    /// Retained band away from the surface.
    Cold,
    /// Dormant data kept only for reconstruction.
    Archive,
}

impl PrecisionTier {
    /// Required byte alignment of the backing buffer for this tier.
    pub fn alignment(self) -> usize {
        match self {
            Self::Hot => 32,
            Self::Warm => 16,
            Self::Cold => 8,
            Self::Archive => 4,
        }
    }

    /// Storage bytes per channel for this tier.
    ///
    /// Archive packs multi-channel sets to one byte per channel but keeps
    /// two bytes for single-channel fields, where the extra precision is
    /// cheap.
    pub fn bytes_per_channel(self, channel_count: u32) -> usize {
        match self {
            Self::Hot => 4,
            Self::Warm => 2,
            Self::Cold => 1,
            Self::Archive => {
                if channel_count > 1 {
                    1
                } else {
                    2
                }
            }
        }
    }
}

/// Vector instruction class a SIMD field layout targets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SimdClass {
    /// Scalar code only.
    #[default]
    Scalar,
    /// 128-bit vectors (SSE-class).
    Sse,
    /// 256-bit vectors (AVX-class).
    Avx,
}

impl SimdClass {
    /// Minimum byte alignment required by this instruction class.
    pub fn min_alignment(self) -> usize {
        match self {
            Self::Scalar => 8,
            Self::Sse => 16,
            Self::Avx => 32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_alignments() {
        assert_eq!(PrecisionTier::Hot.alignment(), 32);
        assert_eq!(PrecisionTier::Warm.alignment(), 16);
        assert_eq!(PrecisionTier::Cold.alignment(), 8);
        assert_eq!(PrecisionTier::Archive.alignment(), 4);
    }

    #[test]
    fn default_tier_is_warm_16b() {
        assert_eq!(PrecisionTier::default().alignment(), 16);
    }

    #[test]
    fn archive_single_channel_keeps_two_bytes() {
        assert_eq!(PrecisionTier::Archive.bytes_per_channel(1), 2);
        assert_eq!(PrecisionTier::Archive.bytes_per_channel(2), 1);
        assert_eq!(PrecisionTier::Archive.bytes_per_channel(4), 1);
    }

    #[test]
    fn hot_is_four_bytes_regardless_of_channels() {
        assert_eq!(PrecisionTier::Hot.bytes_per_channel(1), 4);
        assert_eq!(PrecisionTier::Hot.bytes_per_channel(8), 4);
    }

    #[test]
    fn simd_min_alignments() {
        assert_eq!(SimdClass::Scalar.min_alignment(), 8);
        assert_eq!(SimdClass::Sse.min_alignment(), 16);
        assert_eq!(SimdClass::Avx.min_alignment(), 32);
    }

    #[test]
    fn simd_classes_order_by_width() {
        assert!(SimdClass::Scalar < SimdClass::Sse);
        assert!(SimdClass::Sse < SimdClass::Avx);
    }

    #[test]
    fn tier_alignment_is_power_of_two() {
        for tier in [
            PrecisionTier::Hot,
            PrecisionTier::Warm,
            PrecisionTier::Cold,
            PrecisionTier::Archive,
        ] {
            assert!(tier.alignment().is_power_of_two());
        }
    }
}

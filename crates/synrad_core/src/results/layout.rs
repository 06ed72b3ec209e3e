//! Offsets of every section inside a result buffer.
//!
//! The layout is computed once from the geometry, before any worker starts,
//! and shared by every copy of the buffer.

use std::mem::size_of;

use bytemuck::Pod;

use super::records::{CellTally, DirectionCell, GlobalHeader, HitCounter, SpectrumBin};
use crate::geometry::{Geometry, ProfileKind};
use crate::params::SpectrumRange;

/// Bins of a U, V or angle profile.
pub const PROFILE_BINS: usize = 100;

/// A run of `len` records starting `offset` words into the buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Span {
    pub offset: usize,
    pub len: usize,
}

/// Record counts of one facet's optional sections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FacetSizes {
    pub profile_bins: usize,
    pub texture_cells: usize,
    pub direction_cells: usize,
    pub spectrum_bins: usize,
}

/// Where one facet's records live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FacetSection {
    pub counter: Span,
    pub profile: Span,
    pub texture: Span,
    pub direction: Span,
    pub spectrum: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferLayout {
    pub header: Span,
    pub facets: Vec<FacetSection>,
    /// Total length in 8-byte words.
    pub words: usize,
}

/// 8-byte words per record of type `T`.
pub(crate) const fn words_of<T: Pod>() -> usize {
    size_of::<T>() / 8
}

impl BufferLayout {
    pub fn new(sizes: &[FacetSizes]) -> Self {
        let mut cursor = 0;
        let mut take = |len: usize, words_per: usize| {
            let span = Span {
                offset: cursor,
                len,
            };
            cursor += len * words_per;
            span
        };

        let header = take(1, words_of::<GlobalHeader>());
        let facets = sizes
            .iter()
            .map(|s| FacetSection {
                counter: take(1, words_of::<HitCounter>()),
                profile: take(s.profile_bins, words_of::<CellTally>()),
                texture: take(s.texture_cells, words_of::<CellTally>()),
                direction: take(s.direction_cells, words_of::<DirectionCell>()),
                spectrum: take(s.spectrum_bins, words_of::<SpectrumBin>()),
            })
            .collect();

        Self {
            header,
            facets,
            words: cursor,
        }
    }

    /// Section sizes implied by each facet's recording options.
    pub fn facet_sizes(geometry: &Geometry, spectrum: &SpectrumRange) -> Vec<FacetSizes> {
        geometry
            .facets
            .iter()
            .map(|f| {
                let cells = f.texture.as_ref().map_or(0, |t| t.cell_count());
                FacetSizes {
                    profile_bins: if f.profile == ProfileKind::None {
                        0
                    } else {
                        PROFILE_BINS
                    },
                    texture_cells: cells,
                    direction_cells: if f.count_direction { cells } else { 0 },
                    spectrum_bins: if f.record_spectrum { spectrum.bins } else { 0 },
                }
            })
            .collect()
    }

    pub fn for_geometry(geometry: &Geometry, spectrum: &SpectrumRange) -> Self {
        Self::new(&Self::facet_sizes(geometry, spectrum))
    }

    pub fn facet_count(&self) -> usize {
        self.facets.len()
    }

    /// Buffer size in bytes.
    pub fn byte_len(&self) -> usize {
        self.words * 8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sections_are_contiguous() {
        let layout = BufferLayout::new(&[
            FacetSizes::default(),
            FacetSizes {
                profile_bins: 10,
                texture_cells: 4,
                direction_cells: 4,
                spectrum_bins: 2,
            },
        ]);
        let header_words = words_of::<GlobalHeader>();
        assert_eq!(layout.header, Span { offset: 0, len: 1 });
        assert_eq!(layout.facets[0].counter.offset, header_words);
        assert_eq!(layout.facets[0].profile.len, 0);

        let f1 = layout.facets[1];
        assert_eq!(f1.counter.offset, header_words + 8);
        assert_eq!(f1.profile.offset, f1.counter.offset + 8);
        assert_eq!(f1.texture.offset, f1.profile.offset + 30);
        assert_eq!(f1.direction.offset, f1.texture.offset + 12);
        assert_eq!(f1.spectrum.offset, f1.direction.offset + 16);
        assert_eq!(layout.words, f1.spectrum.offset + 4);
        assert_eq!(layout.byte_len(), layout.words * 8);
    }
}

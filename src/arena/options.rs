/*!
 * Allocation Options
 * The per-request policy parameters of the arena
 */

use crate::core::types::Size;
use std::mem::align_of;

/// Alignment policy for a single allocation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Align {
    /// The element type's inherent alignment.
    #[default]
    Natural,
    /// Caller-supplied power-of-two alignment.
    ///
    /// Supplying an alignment weaker than the type's natural alignment, or a
    /// non-power-of-two, is a precondition violation (debug-asserted).
    Exact(Size),
    /// No padding: the allocation begins exactly at the current cursor.
    ///
    /// Dereferencing a packed allocation whose address does not satisfy the
    /// element type's natural alignment is a precondition violation.
    Packed,
}

impl Align {
    /// Concrete byte alignment for an element of `T` under this policy.
    pub(crate) fn resolve<T>(self) -> usize {
        match self {
            Align::Natural => align_of::<T>(),
            Align::Exact(align) => {
                debug_assert!(
                    align.is_power_of_two(),
                    "explicit alignment {align} is not a power of two"
                );
                debug_assert!(
                    align >= align_of::<T>(),
                    "explicit alignment {align} is weaker than the type's natural alignment"
                );
                align.max(align_of::<T>())
            }
            Align::Packed => 1,
        }
    }
}

/// Options carried by every allocation request.
///
/// One value of this type selects a point on the alignment axis of the policy
/// matrix; the other axes (fallibility, cardinality, access form, result
/// shape, locality) are selected by the method called and its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AllocOptions {
    pub align: Align,
}

impl AllocOptions {
    /// Natural alignment of the element type.
    pub const NATURAL: Self = Self {
        align: Align::Natural,
    };

    /// No alignment padding at all.
    pub const PACKED: Self = Self {
        align: Align::Packed,
    };

    /// Explicit power-of-two alignment, at least the type's natural one.
    pub const fn aligned(align: Size) -> Self {
        Self {
            align: Align::Exact(align),
        }
    }
}

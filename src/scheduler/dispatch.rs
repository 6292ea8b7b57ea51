//! Kernel dispatch shape resolution
//!
//! Given a global problem size and a requested local group shape, compute
//! the per-dimension group counts. Callers needing exact tiling must use a
//! group size that divides the global size; indivisible shapes are only
//! accepted when the backend supports partial groups, in which case the
//! trailing group is partial.

use crate::backend::GroupCount;
use crate::error::{ForgeResult, ZeForgeError};

/// Safe ceiling division using u64 arithmetic
#[inline]
fn ceil_div_u64(numerator: u64, denominator: u64) -> u64 {
    debug_assert!(denominator > 0);
    (numerator + denominator - 1) / denominator
}

/// A global problem size paired with a requested group shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchShape {
    pub global: [u32; 3],
    pub group: [u32; 3],
}

impl DispatchShape {
    pub fn new(global: [u32; 3], group: [u32; 3]) -> Self {
        Self { global, group }
    }

    /// A two-dimensional shape with z fixed to 1
    pub fn new_2d(global: (u32, u32), group: (u32, u32)) -> Self {
        Self {
            global: [global.0, global.1, 1],
            group: [group.0, group.1, 1],
        }
    }

    /// Compute per-dimension group counts.
    ///
    /// Fails with `ShapeMismatch` when a group size is zero, or when the
    /// global size is not evenly divisible and `partial_groups` is false.
    pub fn resolve(&self, partial_groups: bool) -> ForgeResult<GroupCount> {
        let mut counts = [0u32; 3];
        for dim in 0..3 {
            let global = self.global[dim];
            let group = self.group[dim];
            if group == 0 {
                return Err(ZeForgeError::ShapeMismatch { dim, global, group });
            }
            if global % group != 0 && !partial_groups {
                return Err(ZeForgeError::ShapeMismatch { dim, global, group });
            }
            counts[dim] = ceil_div_u64(global as u64, group as u64) as u32;
        }
        Ok(GroupCount::new(counts[0], counts[1], counts[2]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_tiling() {
        // 1024 / 32 = 32 in each of two dimensions
        let shape = DispatchShape::new_2d((1024, 1024), (32, 32));
        let count = shape.resolve(false).unwrap();
        assert_eq!(count, GroupCount::new(32, 32, 1));
    }

    #[test]
    fn test_indivisible_rejected_without_partial_groups() {
        let shape = DispatchShape::new_2d((1000, 1024), (32, 32));
        match shape.resolve(false) {
            Err(ZeForgeError::ShapeMismatch { dim: 0, global: 1000, group: 32 }) => {}
            other => panic!("expected ShapeMismatch in dim 0, got {:?}", other),
        }
    }

    #[test]
    fn test_indivisible_ceils_with_partial_groups() {
        let shape = DispatchShape::new_2d((1000, 1024), (32, 32));
        let count = shape.resolve(true).unwrap();
        assert_eq!(count, GroupCount::new(32, 32, 1));
    }

    #[test]
    fn test_zero_group_size_rejected() {
        let shape = DispatchShape::new([16, 16, 1], [4, 0, 1]);
        assert!(matches!(
            shape.resolve(true),
            Err(ZeForgeError::ShapeMismatch { dim: 1, .. })
        ));
    }
}

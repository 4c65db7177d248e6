//! Scratch disk slicing
//!
//! Block storage attached to a machine is provisioned as a number of
//! fixed-capacity units rather than one arbitrarily sized volume. The planner
//! turns "how much the workload needs" into "how many units to request"; the
//! provisioning layer attaches them and stripes or mounts them.

use serde::Serialize;
use thiserror::Error;

/// Capacity of one slice in GiB
///
/// 335 GiB is the smallest gp2 volume that reaches the per-volume throughput
/// ceiling.
pub const DEFAULT_SLICE_CAPACITY_GIB: u64 = 335;

/// Slice planning errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SliceError {
    /// The unit capacity must be positive
    #[error("invalid slice capacity {0}: must be greater than zero")]
    InvalidUnitCapacity(u64),
}

/// How a storage budget is split into fixed-capacity units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlicePlan {
    /// Number of units to provision (at least one)
    pub slice_count: u64,
    /// Capacity of each unit
    pub capacity_per_slice: u64,
}

impl SlicePlan {
    /// Total capacity of all slices
    pub fn total_capacity(&self) -> u64 {
        self.slice_count.saturating_mul(self.capacity_per_slice)
    }
}

impl std::fmt::Display for SlicePlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}GiB", self.slice_count, self.capacity_per_slice)
    }
}

/// Plan the smallest number of `unit_capacity` slices covering `requested`
///
/// Always returns at least one slice, even for an empty request, and never
/// rounds down.
pub fn plan_slices(requested: u64, unit_capacity: u64) -> Result<SlicePlan, SliceError> {
    if unit_capacity == 0 {
        return Err(SliceError::InvalidUnitCapacity(unit_capacity));
    }

    Ok(SlicePlan {
        slice_count: requested.div_ceil(unit_capacity).max(1),
        capacity_per_slice: unit_capacity,
    })
}

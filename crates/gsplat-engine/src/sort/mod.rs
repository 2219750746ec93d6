//! Depth-sort stage contract.
//!
//! The renderer treats the sorter as a black box that owns:
//! - a sort-info buffer whose first `u32` is the number of keys to sort
//! - a ping-pong pair of `{depth_keys, indices}` buffers
//! - an indirect dispatch buffer whose `x` field the projection pass fills
//!
//! The projection pass writes unsorted keys/indices into slot `First`, bumps the
//! counter, and bumps `x` once per `workgroup_size * keys_per_thread` keys.
//! `sort` then records its passes and reports which slot holds the result.

use bytemuck::{Pod, Zeroable};

mod bitonic;

pub use bitonic::{BitonicSchedule, BitonicSorter, BitonicStep};

/// Byte offset of the key counter inside the sort-info buffer.
pub const SORT_COUNT_OFFSET: u64 = 0;

/// Byte size of the key counter.
pub const SORT_COUNT_SIZE: u64 = 4;

/// Byte offset of the workgroup-count `x` field inside the dispatch buffer.
pub const DISPATCH_X_OFFSET: u64 = 0;

/// GPU layout of the sort-info buffer (`SortInfo` in the WGSL kernels).
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct SortInfo {
    /// Keys written by the projection pass this frame.
    pub keys_size: u32,
    /// Maximum number of keys the buffers hold.
    pub capacity: u32,
    /// Sorter-private.
    pub step_count: u32,
    pub _pad: u32,
}

/// `dispatch_workgroups_indirect` arguments.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Pod, Zeroable)]
pub struct DispatchIndirectArgs {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl Default for DispatchIndirectArgs {
    fn default() -> Self {
        Self { x: 0, y: 1, z: 1 }
    }
}

/// Which half of the ping-pong pair a buffer set lives in.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PingPongSlot {
    First,
    Second,
}

impl PingPongSlot {
    pub const ALL: [PingPongSlot; 2] = [PingPongSlot::First, PingPongSlot::Second];

    pub fn index(self) -> usize {
        match self {
            PingPongSlot::First => 0,
            PingPongSlot::Second => 1,
        }
    }

    pub fn other(self) -> Self {
        match self {
            PingPongSlot::First => PingPongSlot::Second,
            PingPongSlot::Second => PingPongSlot::First,
        }
    }
}

/// One half of the ping-pong pair.
#[derive(Debug, Clone)]
pub struct SortBuffers {
    /// `u32` per key; ascending order is back-to-front.
    pub depth_keys: wgpu::Buffer,
    /// Point index per key.
    pub indices: wgpu::Buffer,
}

/// Result of recording a sort.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SortOutcome {
    /// Slot whose `indices` hold the depth-ordered permutation.
    pub final_slot: PingPongSlot,
}

/// Depth sorter consumed by the frame orchestrator.
pub trait DepthSorter {
    /// Maximum number of keys one frame may produce.
    fn capacity(&self) -> u32;

    /// Threads per workgroup of the sorter's indirectly dispatched passes.
    fn workgroup_size(&self) -> u32;

    /// Keys each sorter thread handles (the block-row constant).
    fn keys_per_thread(&self) -> u32;

    fn sort_info_buffer(&self) -> &wgpu::Buffer;

    fn dispatch_indirect_buffer(&self) -> &wgpu::Buffer;

    fn ping_pong(&self) -> &[SortBuffers; 2];

    /// Records the sort into `encoder`.
    ///
    /// Must be called after the projection pass and before the key counter is
    /// copied into the draw arguments.
    fn sort(&self, encoder: &mut wgpu::CommandEncoder) -> SortOutcome;

    /// Keys covered by one workgroup of the sorter's indirect dispatch.
    fn keys_per_workgroup(&self) -> u32 {
        self.workgroup_size() * self.keys_per_thread()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_info_layout() {
        assert_eq!(std::mem::size_of::<SortInfo>(), 16);
        assert_eq!(SORT_COUNT_OFFSET, 0);
        assert_eq!(SORT_COUNT_SIZE as usize, std::mem::size_of::<u32>());
    }

    #[test]
    fn dispatch_args_default_to_unit_yz() {
        let args = DispatchIndirectArgs::default();
        assert_eq!(bytemuck::cast::<_, [u32; 3]>(args), [0, 1, 1]);
    }

    #[test]
    fn slots_alternate() {
        assert_eq!(PingPongSlot::First.other(), PingPongSlot::Second);
        assert_eq!(PingPongSlot::Second.other().index(), 0);
    }
}

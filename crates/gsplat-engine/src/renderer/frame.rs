//! Frame plan: the ordered operations one frame records, and their checks.
//!
//! Every cross-stage dependency in a frame is carried by GPU buffers and
//! enforced only by recording order inside one encoder. The plan makes that
//! order explicit so it can be checked op by op while encoding, and tested
//! without a device.

use thiserror::Error;

use crate::renderer::resources::DRAW_INSTANCE_COUNT_OFFSET;
use crate::sort::{PingPongSlot, SortOutcome, SORT_COUNT_SIZE};

/// Frame state machine: `Preprocessing -> Sorting -> Rendering`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum FrameStage {
    Preprocessing,
    Sorting,
    Rendering,
}

/// One recorded operation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FrameOp {
    /// Zero the sort-info key counter from the nulling buffer.
    ResetSortCount,
    /// Zero the sorter's indirect dispatch `x` from the nulling buffer.
    ResetSortDispatch,
    /// Projection compute pass.
    Project { workgroups: u32 },
    /// Sorter passes.
    Sort,
    /// Key counter into the draw arguments.
    CopyCountToDrawArgs { dst_offset: u64, size: u64 },
    /// The single indirect draw, bound to ping-pong `slot`.
    Draw { slot: PingPongSlot },
}

impl FrameOp {
    /// The copy that feeds the instance-count field.
    pub const fn count_copy() -> Self {
        FrameOp::CopyCountToDrawArgs {
            dst_offset: DRAW_INSTANCE_COUNT_OFFSET,
            size: SORT_COUNT_SIZE,
        }
    }

    pub fn stage(self) -> FrameStage {
        match self {
            FrameOp::ResetSortCount | FrameOp::ResetSortDispatch | FrameOp::Project { .. } => {
                FrameStage::Preprocessing
            }
            FrameOp::Sort => FrameStage::Sorting,
            FrameOp::CopyCountToDrawArgs { .. } | FrameOp::Draw { .. } => FrameStage::Rendering,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameOrderViolation {
    #[error("{op:?} belongs to {op_stage:?} but the frame is already in {current:?}")]
    StageRegressed {
        op: FrameOp,
        op_stage: FrameStage,
        current: FrameStage,
    },

    #[error("{0:?} recorded twice in one frame")]
    Duplicate(FrameOp),

    #[error("projection recorded before both counter resets")]
    ProjectBeforeReset,

    #[error("sort recorded before projection")]
    SortBeforeProjection,

    #[error("count copy recorded before sort")]
    CopyBeforeSort,

    #[error("count copy targets offset {dst_offset} ({size} bytes) instead of the instance count")]
    CopyTargetsWrongField { dst_offset: u64, size: u64 },

    #[error("draw recorded before the count copy")]
    DrawBeforeCopy,

    #[error("draw binds {drawn:?} but the sorter finished in {sorted:?}")]
    SlotMismatch {
        drawn: PingPongSlot,
        sorted: PingPongSlot,
    },

    #[error("sort outcome recorded without a sort op")]
    OutcomeWithoutSort,

    #[error("frame ended without a draw")]
    MissingDraw,
}

/// Ordered ops of one frame plus what the sorter reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FramePlan {
    ops: Vec<FrameOp>,
    sort_outcome: Option<SortOutcome>,
}

impl FramePlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ops(&self) -> &[FrameOp] {
        &self.ops
    }

    pub fn sort_outcome(&self) -> Option<SortOutcome> {
        self.sort_outcome
    }

    /// Stage of the last recorded op.
    pub fn stage(&self) -> Option<FrameStage> {
        self.ops.last().map(|op| op.stage())
    }

    /// Workgroups of the projection op, if recorded.
    pub fn project_workgroups(&self) -> Option<u32> {
        self.ops.iter().find_map(|op| match op {
            FrameOp::Project { workgroups } => Some(*workgroups),
            _ => None,
        })
    }

    fn contains(&self, pred: impl Fn(&FrameOp) -> bool) -> bool {
        self.ops.iter().any(pred)
    }

    /// Appends `op` if it is legal after the ops recorded so far.
    pub fn push(&mut self, op: FrameOp) -> Result<(), FrameOrderViolation> {
        if let Some(current) = self.stage() {
            if op.stage() < current {
                return Err(FrameOrderViolation::StageRegressed {
                    op,
                    op_stage: op.stage(),
                    current,
                });
            }
        }

        let same_kind = |other: &FrameOp| std::mem::discriminant(other) == std::mem::discriminant(&op);
        if self.contains(same_kind) {
            return Err(FrameOrderViolation::Duplicate(op));
        }

        match op {
            FrameOp::ResetSortCount | FrameOp::ResetSortDispatch => {}
            FrameOp::Project { .. } => {
                let counted = self.contains(|o| *o == FrameOp::ResetSortCount);
                let dispatched = self.contains(|o| *o == FrameOp::ResetSortDispatch);
                if !(counted && dispatched) {
                    return Err(FrameOrderViolation::ProjectBeforeReset);
                }
            }
            FrameOp::Sort => {
                if self.project_workgroups().is_none() {
                    return Err(FrameOrderViolation::SortBeforeProjection);
                }
            }
            FrameOp::CopyCountToDrawArgs { dst_offset, size } => {
                if self.sort_outcome.is_none() {
                    return Err(FrameOrderViolation::CopyBeforeSort);
                }
                if dst_offset != DRAW_INSTANCE_COUNT_OFFSET || size != SORT_COUNT_SIZE {
                    return Err(FrameOrderViolation::CopyTargetsWrongField { dst_offset, size });
                }
            }
            FrameOp::Draw { slot } => {
                if !self.contains(|o| matches!(o, FrameOp::CopyCountToDrawArgs { .. })) {
                    return Err(FrameOrderViolation::DrawBeforeCopy);
                }
                if let Some(outcome) = self.sort_outcome {
                    if outcome.final_slot != slot {
                        return Err(FrameOrderViolation::SlotMismatch {
                            drawn: slot,
                            sorted: outcome.final_slot,
                        });
                    }
                }
            }
        }

        self.ops.push(op);
        Ok(())
    }

    /// Records where the sorter left its result; only valid right after `Sort`.
    pub fn record_sort(&mut self, outcome: SortOutcome) -> Result<(), FrameOrderViolation> {
        if self.ops.last() != Some(&FrameOp::Sort) {
            return Err(FrameOrderViolation::OutcomeWithoutSort);
        }
        self.sort_outcome = Some(outcome);
        Ok(())
    }

    /// Checks the plan is complete.
    pub fn finish(&self) -> Result<(), FrameOrderViolation> {
        if !self.contains(|o| matches!(o, FrameOp::Draw { .. })) {
            return Err(FrameOrderViolation::MissingDraw);
        }
        Ok(())
    }

    /// Replays `ops` from scratch, with `outcome` reported after the sort.
    pub fn validate(
        ops: &[FrameOp],
        outcome: Option<SortOutcome>,
    ) -> Result<FramePlan, FrameOrderViolation> {
        let mut plan = FramePlan::new();
        for op in ops {
            plan.push(*op)?;
            if *op == FrameOp::Sort {
                if let Some(outcome) = outcome {
                    plan.record_sort(outcome)?;
                }
            }
        }
        plan.finish()?;
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECOND: SortOutcome = SortOutcome {
        final_slot: PingPongSlot::Second,
    };

    fn canonical(slot: PingPongSlot) -> Vec<FrameOp> {
        vec![
            FrameOp::ResetSortCount,
            FrameOp::ResetSortDispatch,
            FrameOp::Project { workgroups: 4 },
            FrameOp::Sort,
            FrameOp::count_copy(),
            FrameOp::Draw { slot },
        ]
    }

    #[test]
    fn canonical_order_is_accepted() {
        let plan = FramePlan::validate(&canonical(PingPongSlot::Second), Some(SECOND)).unwrap();
        assert_eq!(plan.ops().len(), 6);
        assert_eq!(plan.stage(), Some(FrameStage::Rendering));
        assert_eq!(plan.project_workgroups(), Some(4));
    }

    #[test]
    fn stages_never_go_backwards() {
        let stages: Vec<_> = canonical(PingPongSlot::First).iter().map(|o| o.stage()).collect();
        assert!(stages.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn resets_are_order_independent_but_precede_projection() {
        let mut ops = canonical(PingPongSlot::Second);
        ops.swap(0, 1);
        assert!(FramePlan::validate(&ops, Some(SECOND)).is_ok());

        let ops = [
            FrameOp::ResetSortCount,
            FrameOp::Project { workgroups: 1 },
        ];
        assert_eq!(
            FramePlan::validate(&ops, None),
            Err(FrameOrderViolation::ProjectBeforeReset)
        );
    }

    #[test]
    fn reset_after_projection_is_a_duplicate_or_regression() {
        let mut plan = FramePlan::new();
        for op in &canonical(PingPongSlot::Second)[..3] {
            plan.push(*op).unwrap();
        }
        assert_eq!(
            plan.push(FrameOp::ResetSortCount),
            Err(FrameOrderViolation::Duplicate(FrameOp::ResetSortCount))
        );

        plan.push(FrameOp::Sort).unwrap();
        assert!(matches!(
            plan.push(FrameOp::ResetSortDispatch),
            Err(FrameOrderViolation::StageRegressed { .. })
        ));
    }

    #[test]
    fn sort_needs_projection() {
        let ops = [
            FrameOp::ResetSortCount,
            FrameOp::ResetSortDispatch,
            FrameOp::Sort,
        ];
        assert_eq!(
            FramePlan::validate(&ops, Some(SECOND)),
            Err(FrameOrderViolation::SortBeforeProjection)
        );
    }

    #[test]
    fn copy_needs_a_finished_sort() {
        let mut plan = FramePlan::new();
        for op in &canonical(PingPongSlot::Second)[..4] {
            plan.push(*op).unwrap();
        }
        assert_eq!(
            plan.push(FrameOp::count_copy()),
            Err(FrameOrderViolation::CopyBeforeSort)
        );
        plan.record_sort(SECOND).unwrap();
        assert!(plan.push(FrameOp::count_copy()).is_ok());
    }

    #[test]
    fn copy_into_vertex_count_is_rejected() {
        let mut ops = canonical(PingPongSlot::Second);
        ops[4] = FrameOp::CopyCountToDrawArgs {
            dst_offset: 0,
            size: 4,
        };
        assert_eq!(
            FramePlan::validate(&ops, Some(SECOND)),
            Err(FrameOrderViolation::CopyTargetsWrongField {
                dst_offset: 0,
                size: 4
            })
        );
    }

    #[test]
    fn draw_before_copy_is_rejected() {
        let mut ops = canonical(PingPongSlot::Second);
        ops.swap(4, 5);
        assert_eq!(
            FramePlan::validate(&ops, Some(SECOND)),
            Err(FrameOrderViolation::DrawBeforeCopy)
        );
    }

    #[test]
    fn draw_must_bind_the_sorted_slot() {
        let ops = canonical(PingPongSlot::First);
        assert_eq!(
            FramePlan::validate(&ops, Some(SECOND)),
            Err(FrameOrderViolation::SlotMismatch {
                drawn: PingPongSlot::First,
                sorted: PingPongSlot::Second,
            })
        );
    }

    #[test]
    fn exactly_one_draw() {
        let ops = &canonical(PingPongSlot::Second)[..5];
        assert_eq!(
            FramePlan::validate(ops, Some(SECOND)),
            Err(FrameOrderViolation::MissingDraw)
        );

        let mut ops = canonical(PingPongSlot::Second);
        ops.push(FrameOp::Draw {
            slot: PingPongSlot::Second,
        });
        assert!(matches!(
            FramePlan::validate(&ops, Some(SECOND)),
            Err(FrameOrderViolation::Duplicate(FrameOp::Draw { .. }))
        ));
    }

    #[test]
    fn outcome_only_follows_sort() {
        let mut plan = FramePlan::new();
        plan.push(FrameOp::ResetSortCount).unwrap();
        assert_eq!(
            plan.record_sort(SECOND),
            Err(FrameOrderViolation::OutcomeWithoutSort)
        );
    }

    #[test]
    fn empty_frame_is_still_a_valid_plan() {
        let mut ops = canonical(PingPongSlot::First);
        ops[2] = FrameOp::Project { workgroups: 0 };
        let outcome = SortOutcome {
            final_slot: PingPongSlot::First,
        };
        let plan = FramePlan::validate(&ops, Some(outcome)).unwrap();
        assert_eq!(plan.project_workgroups(), Some(0));
    }
}

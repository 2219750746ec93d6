use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use super::{
    DepthSorter, DispatchIndirectArgs, PingPongSlot, SortBuffers, SortInfo, SortOutcome,
};
use crate::error::{SplatError, SplatResult};
use crate::shader;

const WORKGROUP_SIZE: u32 = 256;
const KEYS_PER_THREAD: u32 = 4;

/// One compare-exchange layer of the network.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BitonicStep {
    /// Mirror comparators inside blocks of `2 * half`.
    Flip { half: u32 },
    /// Comparators `i` / `i + half` inside blocks of `2 * half`.
    Disperse { half: u32 },
}

impl BitonicStep {
    pub fn half(self) -> u32 {
        match self {
            BitonicStep::Flip { half } | BitonicStep::Disperse { half } => half,
        }
    }

    /// Lower and upper element touched by comparator `t`.
    pub fn pair(self, t: u32) -> (u32, u32) {
        let h = self.half();
        let base = (t / h) * 2 * h;
        let offset = t % h;
        match self {
            BitonicStep::Flip { .. } => (base + offset, base + 2 * h - 1 - offset),
            BitonicStep::Disperse { .. } => (base + offset, base + offset + h),
        }
    }
}

/// Step sequence for a power-of-two capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitonicSchedule {
    capacity: u32,
    steps: Vec<BitonicStep>,
}

impl BitonicSchedule {
    /// Schedule for at least `point_count` keys.
    ///
    /// Fails when the rounded-up capacity does not fit in `u32`.
    pub fn for_points(point_count: u32) -> SplatResult<Self> {
        let capacity = point_count
            .max(1)
            .checked_next_power_of_two()
            .ok_or(SplatError::InvalidPointCount(u64::from(point_count)))?;
        let mut steps = Vec::new();
        for level in 1..=capacity.trailing_zeros() {
            let half = 1u32 << (level - 1);
            steps.push(BitonicStep::Flip { half });
            steps.extend((0..level - 1).rev().map(|k| BitonicStep::Disperse { half: 1 << k }));
        }
        Ok(Self { capacity, steps })
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn steps(&self) -> &[BitonicStep] {
        &self.steps
    }

    /// Slot holding the result: each step moves the data to the other slot.
    pub fn final_slot(&self) -> PingPongSlot {
        if self.steps.len() % 2 == 0 {
            PingPongSlot::First
        } else {
            PingPongSlot::Second
        }
    }
}

/// Uniform block for one step; read through a dynamic offset.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct StepParams {
    half: u32,
    flip: u32,
    _pad: [u32; 2],
}

/// GPU bitonic sorter over `next_power_of_two(point_count)` keys.
///
/// Works out of place: step `k` reads slot `k % 2` and writes the other one, so
/// the result lands in [`BitonicSchedule::final_slot`]. All steps are dispatched
/// indirectly, sized by the key count the projection pass produced.
pub struct BitonicSorter {
    schedule: BitonicSchedule,
    pipeline: wgpu::ComputePipeline,
    /// Index `k` reads slot `k` and writes slot `1 - k`.
    bind_groups: [wgpu::BindGroup; 2],
    /// Step parameters at `params_stride` spacing; read through the bind groups.
    _params_ubo: wgpu::Buffer,
    params_stride: u32,
    sort_info: wgpu::Buffer,
    dispatch: wgpu::Buffer,
    ping_pong: [SortBuffers; 2],
}

impl BitonicSorter {
    pub fn new(device: &wgpu::Device, point_count: u32) -> SplatResult<Self> {
        let schedule = BitonicSchedule::for_points(point_count)?;
        let capacity = schedule.capacity();

        let key_bytes = u64::from(capacity) * 4;
        let limits = device.limits();
        let limit = u64::from(limits.max_storage_buffer_binding_size).min(limits.max_buffer_size);
        if key_bytes > limit {
            return Err(SplatError::ExceedsDeviceLimit {
                buffer: "sort key",
                required: key_bytes,
                limit,
            });
        }

        let module = shader::create_module(
            device,
            "gsplat bitonic shader",
            include_str!("shaders/bitonic.wgsl"),
            &[
                ("WORKGROUP_SIZE", WORKGROUP_SIZE),
                ("KEYS_PER_THREAD", KEYS_PER_THREAD),
            ],
        );

        let storage = |binding: u32, read_only: bool| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("gsplat bitonic bgl"),
            entries: &[
                storage(0, true),
                storage(1, true),
                storage(2, true),
                storage(3, false),
                storage(4, false),
                wgpu::BindGroupLayoutEntry {
                    binding: 5,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: wgpu::BufferSize::new(
                            std::mem::size_of::<StepParams>() as u64,
                        ),
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("gsplat bitonic pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("gsplat bitonic pipeline"),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some("bitonic_step"),
            compilation_options: Default::default(),
            cache: None,
        });

        let params_stride = limits
            .min_uniform_buffer_offset_alignment
            .max(std::mem::size_of::<StepParams>() as u32);
        let mut params = vec![0u8; params_stride as usize * schedule.steps().len().max(1)];
        for (k, step) in schedule.steps().iter().enumerate() {
            let p = StepParams {
                half: step.half(),
                flip: matches!(step, BitonicStep::Flip { .. }) as u32,
                _pad: [0; 2],
            };
            let at = k * params_stride as usize;
            params[at..at + std::mem::size_of::<StepParams>()]
                .copy_from_slice(bytemuck::bytes_of(&p));
        }
        let params_ubo = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("gsplat bitonic step params"),
            contents: &params,
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let info = SortInfo {
            keys_size: 0,
            capacity,
            step_count: schedule.steps().len() as u32,
            _pad: 0,
        };
        let sort_info = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("gsplat sort info"),
            contents: bytemuck::bytes_of(&info),
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
        });

        let dispatch = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("gsplat sort dispatch"),
            contents: bytemuck::bytes_of(&DispatchIndirectArgs::default()),
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::INDIRECT
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
        });

        let key_buffer = |label: &'static str| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: key_bytes,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            })
        };
        let ping_pong = [
            SortBuffers {
                depth_keys: key_buffer("gsplat sort keys A"),
                indices: key_buffer("gsplat sort indices A"),
            },
            SortBuffers {
                depth_keys: key_buffer("gsplat sort keys B"),
                indices: key_buffer("gsplat sort indices B"),
            },
        ];

        let params_binding = wgpu::BufferBinding {
            buffer: &params_ubo,
            offset: 0,
            size: wgpu::BufferSize::new(std::mem::size_of::<StepParams>() as u64),
        };
        let bind_group = |src: PingPongSlot, label: &'static str| {
            let s = &ping_pong[src.index()];
            let d = &ping_pong[src.other().index()];
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: sort_info.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: s.depth_keys.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: s.indices.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: d.depth_keys.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: d.indices.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 5,
                        resource: wgpu::BindingResource::Buffer(params_binding.clone()),
                    },
                ],
            })
        };
        let bind_groups = [
            bind_group(PingPongSlot::First, "gsplat bitonic bind group A->B"),
            bind_group(PingPongSlot::Second, "gsplat bitonic bind group B->A"),
        ];

        log::debug!(
            "bitonic sorter: capacity {capacity}, {} steps, result in {:?}",
            schedule.steps().len(),
            schedule.final_slot()
        );

        Ok(Self {
            schedule,
            pipeline,
            bind_groups,
            _params_ubo: params_ubo,
            params_stride,
            sort_info,
            dispatch,
            ping_pong,
        })
    }

    pub fn schedule(&self) -> &BitonicSchedule {
        &self.schedule
    }
}

impl DepthSorter for BitonicSorter {
    fn capacity(&self) -> u32 {
        self.schedule.capacity()
    }

    fn workgroup_size(&self) -> u32 {
        WORKGROUP_SIZE
    }

    fn keys_per_thread(&self) -> u32 {
        KEYS_PER_THREAD
    }

    fn sort_info_buffer(&self) -> &wgpu::Buffer {
        &self.sort_info
    }

    fn dispatch_indirect_buffer(&self) -> &wgpu::Buffer {
        &self.dispatch
    }

    fn ping_pong(&self) -> &[SortBuffers; 2] {
        &self.ping_pong
    }

    fn sort(&self, encoder: &mut wgpu::CommandEncoder) -> SortOutcome {
        let steps = self.schedule.steps();
        if !steps.is_empty() {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("gsplat bitonic sort"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            for k in 0..steps.len() {
                let offset = k as u32 * self.params_stride;
                pass.set_bind_group(0, &self.bind_groups[k % 2], &[offset]);
                pass.dispatch_workgroups_indirect(&self.dispatch, 0);
            }
        }

        SortOutcome {
            final_slot: self.schedule.final_slot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// CPU model of `bitonic.wgsl`: `n` logical threads per step, out of place.
    fn run_network(schedule: &BitonicSchedule, keys: &[u32]) -> (Vec<u32>, Vec<u32>, PingPongSlot) {
        let n = keys.len() as u32;
        let cap = schedule.capacity() as usize;
        // Garbage past `n`, like stale GPU memory.
        let mut slots = [
            (vec![7u32; cap], vec![u32::MAX; cap]),
            (vec![3u32; cap], vec![u32::MAX; cap]),
        ];
        for (i, k) in keys.iter().enumerate() {
            slots[0].0[i] = *k;
            slots[0].1[i] = i as u32;
        }

        let mut src = PingPongSlot::First;
        for step in schedule.steps() {
            let (sk, sv) = slots[src.index()].clone();
            let (dk, dv) = &mut slots[src.other().index()];
            for t in 0..n {
                let (i, l) = step.pair(t);
                if i >= n {
                    continue;
                }
                let (i, l) = (i as usize, l as usize);
                if l as u32 >= n {
                    dk[i] = sk[i];
                    dv[i] = sv[i];
                    continue;
                }
                let in_order = sk[i] < sk[l] || (sk[i] == sk[l] && sv[i] <= sv[l]);
                let (lo, hi) = if in_order { (i, l) } else { (l, i) };
                dk[i] = sk[lo];
                dv[i] = sv[lo];
                dk[l] = sk[hi];
                dv[l] = sv[hi];
            }
            src = src.other();
        }

        let (k, v) = &slots[src.index()];
        (k[..keys.len()].to_vec(), v[..keys.len()].to_vec(), src)
    }

    fn pseudo_random_keys(count: usize, seed: u32) -> Vec<u32> {
        let mut state = seed;
        (0..count)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state % 50
            })
            .collect()
    }

    #[test]
    fn capacity_rounds_up_to_power_of_two() {
        assert_eq!(BitonicSchedule::for_points(0).unwrap().capacity(), 1);
        assert_eq!(BitonicSchedule::for_points(1).unwrap().capacity(), 1);
        assert_eq!(BitonicSchedule::for_points(5).unwrap().capacity(), 8);
        assert_eq!(BitonicSchedule::for_points(1024).unwrap().capacity(), 1024);
    }

    #[test]
    fn capacity_past_u32_is_rejected() {
        for n in [(1u32 << 31) + 1, u32::MAX] {
            assert!(matches!(
                BitonicSchedule::for_points(n),
                Err(SplatError::InvalidPointCount(got)) if got == u64::from(n)
            ));
        }

        let largest = BitonicSchedule::for_points(1 << 31).unwrap();
        assert_eq!(largest.capacity(), 1 << 31);
        assert_eq!(largest.steps().len(), 31 * 32 / 2);
        assert_eq!(largest.steps()[largest.steps().len() - 31], BitonicStep::Flip { half: 1 << 30 });
    }

    #[test]
    fn steps_flip_then_disperse_down_to_one() {
        use BitonicStep::{Disperse, Flip};
        let schedule = BitonicSchedule::for_points(8).unwrap();
        assert_eq!(
            schedule.steps(),
            &[
                Flip { half: 1 },
                Flip { half: 2 },
                Disperse { half: 1 },
                Flip { half: 4 },
                Disperse { half: 2 },
                Disperse { half: 1 },
            ]
        );
    }

    #[test]
    fn step_count_is_triangular_in_log_capacity() {
        for m in 0..12u32 {
            let schedule = BitonicSchedule::for_points(1 << m).unwrap();
            assert_eq!(schedule.steps().len() as u32, m * (m + 1) / 2);
        }
    }

    #[test]
    fn final_slot_follows_step_parity() {
        assert_eq!(BitonicSchedule::for_points(1).unwrap().final_slot(), PingPongSlot::First);
        assert_eq!(BitonicSchedule::for_points(2).unwrap().final_slot(), PingPongSlot::Second);
        assert_eq!(BitonicSchedule::for_points(4).unwrap().final_slot(), PingPongSlot::Second);
        assert_eq!(BitonicSchedule::for_points(8).unwrap().final_slot(), PingPongSlot::First);
        assert_eq!(BitonicSchedule::for_points(32).unwrap().final_slot(), PingPongSlot::Second);
    }

    #[test]
    fn network_sorts_any_prefix_of_capacity() {
        let schedule = BitonicSchedule::for_points(64).unwrap();
        for n in 0..=64 {
            let keys = pseudo_random_keys(n, 0x9e37_79b9 ^ n as u32);
            let (sorted_keys, values, slot) = run_network(&schedule, &keys);

            let mut expected: Vec<(u32, u32)> =
                keys.iter().enumerate().map(|(i, k)| (*k, i as u32)).collect();
            expected.sort();

            let got: Vec<(u32, u32)> = sorted_keys.into_iter().zip(values).collect();
            assert_eq!(got, expected, "n = {n}");
            assert_eq!(slot, schedule.final_slot());
        }
    }

    #[test]
    fn pairs_are_disjoint_within_a_step() {
        let schedule = BitonicSchedule::for_points(32).unwrap();
        for step in schedule.steps() {
            let mut seen = vec![false; 32];
            for t in 0..16 {
                let (i, l) = step.pair(t);
                assert!(i < l, "{step:?} t={t}");
                assert!(!seen[i as usize] && !seen[l as usize], "{step:?} t={t}");
                seen[i as usize] = true;
                seen[l as usize] = true;
            }
            assert!(seen.iter().all(|s| *s));
        }
    }
}

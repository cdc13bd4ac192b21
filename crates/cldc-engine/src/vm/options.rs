//! VM configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Ready-queue discipline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchedulingPolicy {
    /// Lowest accumulated virtual runtime runs next
    #[default]
    FairShare,
    /// FIFO queue with a fixed wall-clock quantum
    RoundRobin,
}

/// Options for creating a Vm
///
/// Deserializable from the `[vm]` table of a `cldc.toml`; every field is
/// optional there and falls back to its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmOptions {
    /// Scheduling policy
    pub policy: SchedulingPolicy,

    /// Wall-clock budget of one scheduler turn before control returns to
    /// the host
    pub window_ms: u64,

    /// Minimum time between two fairness checks of the running context
    pub preemption_interval_ms: u64,

    /// Slice length under round robin
    pub quantum_ms: u64,

    /// Instructions executed between clock reads
    pub preemption_sample_stride: u32,

    /// Idle frames kept for reuse
    pub frame_pool_size: usize,

    /// Bytes of array storage the heap may hand out before allocations
    /// throw `OutOfMemoryError`
    pub heap_limit_bytes: u64,

    /// Priority of this VM relative to others sharing the host (1..=3)
    pub isolate_priority: u8,

    /// Emit a trace event per executed instruction
    pub trace_instructions: bool,

    /// Emit a trace event per frame push and pop
    pub trace_frames: bool,

    /// Record per-context method timelines
    pub profile: bool,

    /// Log every thrown exception, caught or not
    pub print_all_exceptions: bool,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self {
            policy: SchedulingPolicy::FairShare,
            window_ms: 11,
            preemption_interval_ms: 1,
            quantum_ms: 5,
            preemption_sample_stride: 64,
            frame_pool_size: 256,
            heap_limit_bytes: 64 * 1024 * 1024,
            isolate_priority: 2,
            trace_instructions: false,
            trace_frames: false,
            profile: false,
            print_all_exceptions: false,
        }
    }
}

impl VmOptions {
    /// Turn window as a duration
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Preemption interval as a duration
    pub fn preemption_interval(&self) -> Duration {
        Duration::from_millis(self.preemption_interval_ms)
    }

    /// Round-robin quantum as a duration
    pub fn quantum(&self) -> Duration {
        Duration::from_millis(self.quantum_ms)
    }
}

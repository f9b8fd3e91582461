pub mod defaults;

#[cfg(feature = "events")]
pub mod event;

/// number of workload instances backing a deployment
pub type ReplicaCount = u16;

/// spec change counter, also the optimistic concurrency token
pub type Generation = i64;

/// utilization percentage relative to the instance request (may exceed 100)
pub type UtilizationPercent = u32;

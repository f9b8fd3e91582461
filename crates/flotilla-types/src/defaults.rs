//! cluster-wide default values

/// how often a reconciler re-reads the world even without change events
pub const RECONCILER_RESYNC_SEC: u64 = 30;

/// autoscaler evaluation cadence
pub const AUTOSCALER_INTERVAL_SEC: u64 = 15;

/// metric samples older than this hold the previous scaling decision
pub const METRICS_STALENESS_SEC: u64 = 30;

/// per-key retry backoff bounds
pub const BACKOFF_MIN_SEC: u64 = 1;
pub const BACKOFF_MAX_SEC: u64 = 300;

pub const PROBE_PERIOD_SEC: u32 = 10;
pub const PROBE_TIMEOUT_SEC: u32 = 1;
pub const PROBE_FAILURE_THRESHOLD: u32 = 3;
pub const PROBE_INITIAL_DELAY_SEC: u32 = 0;

pub const ROLLOUT_MAX_SURGE: u16 = 1;
pub const ROLLOUT_MAX_UNAVAILABLE: u16 = 1;
pub const ROLLOUT_PROGRESS_DEADLINE_SEC: u32 = 120;

pub const SCALE_UP_STABILIZATION_SEC: u32 = 60;
pub const SCALE_UP_MAX_CHANGE_PERCENT: u32 = 100;
pub const SCALE_DOWN_STABILIZATION_SEC: u32 = 300;
pub const SCALE_DOWN_MAX_CHANGE_PERCENT: u32 = 50;

pub const MIN_READY_SEC: u32 = 0;

/// bound on runtime launch/terminate acknowledgement waits
pub const RUNTIME_OP_TIMEOUT_SEC: u64 = 10;

/// retained change events for the admin event listing
pub const EVENT_LOG_CAPACITY: usize = 1024;

//! Sandbox enforcement and resource budgets

use crate::value::{self, RuntimeError, Value};
use cato_config::LimitsConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Budget checks happen every this many steps
const INTERRUPT_CHECK_INTERVAL: u64 = 1024;

/// Bytes charged per list or tuple slot
const SLOT_BYTES: usize = std::mem::size_of::<Value>();

/// Bytes charged per dict entry (key, value and index overhead)
const ENTRY_BYTES: usize = 2 * SLOT_BYTES + 16;

/// Sandbox errors (resource limits). Scripts cannot catch these.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SandboxError {
    #[error("step limit exceeded ({limit} steps)")]
    StepLimitExceeded { limit: u64 },

    #[error("time limit exceeded ({} ms)", limit.as_millis())]
    TimeoutExceeded { limit: Duration },

    #[error("maximum call depth exceeded ({limit})")]
    CallDepthExceeded { limit: usize },

    #[error("output limit exceeded ({limit} bytes)")]
    OutputLimitExceeded { limit: usize },

    #[error("string too large ({size} bytes, limit {limit})")]
    StringTooLarge { size: usize, limit: usize },

    #[error("collection too large ({len} items, limit {limit})")]
    CollectionTooLarge { len: usize, limit: usize },

    #[error("script too large ({size} bytes, limit {limit})")]
    SourceTooLarge { size: usize, limit: usize },

    #[error("memory limit exceeded ({limit} bytes)")]
    MemoryLimitExceeded { limit: usize },
}

impl SandboxError {
    /// Name of the exhausted resource
    pub fn resource(&self) -> &'static str {
        match self {
            SandboxError::StepLimitExceeded { .. } => "steps",
            SandboxError::TimeoutExceeded { .. } => "time",
            SandboxError::CallDepthExceeded { .. } => "call_depth",
            SandboxError::OutputLimitExceeded { .. } => "output",
            SandboxError::StringTooLarge { .. } => "string_size",
            SandboxError::CollectionTooLarge { .. } => "collection_size",
            SandboxError::SourceTooLarge { .. } => "source_size",
            SandboxError::MemoryLimitExceeded { .. } => "memory",
        }
    }

    /// Configured limit for the exhausted resource
    pub fn limit(&self) -> u64 {
        match self {
            SandboxError::StepLimitExceeded { limit } => *limit,
            SandboxError::TimeoutExceeded { limit } => limit.as_millis() as u64,
            SandboxError::CallDepthExceeded { limit }
            | SandboxError::OutputLimitExceeded { limit }
            | SandboxError::StringTooLarge { limit, .. }
            | SandboxError::CollectionTooLarge { limit, .. }
            | SandboxError::SourceTooLarge { limit, .. }
            | SandboxError::MemoryLimitExceeded { limit } => *limit as u64,
        }
    }
}

/// Resource limits for one script run
#[derive(Debug, Clone, PartialEq)]
pub struct Limits {
    /// Wall-clock budget
    pub timeout: Duration,
    /// Maximum interpreter steps
    pub max_steps: u64,
    /// Maximum nesting of script function calls
    pub max_call_depth: usize,
    /// Maximum captured output
    pub max_output_bytes: usize,
    /// Maximum size of one string or bytes value
    pub max_string_bytes: usize,
    /// Maximum length of one list, tuple or dict
    pub max_collection_len: usize,
    /// Maximum script size
    pub max_source_bytes: usize,
    /// Maximum bytes allocated over the whole run
    pub max_memory_bytes: usize,
    /// Worker thread stack size in bytes
    pub stack_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self::from_config(&LimitsConfig::default())
    }
}

impl From<&LimitsConfig> for Limits {
    fn from(config: &LimitsConfig) -> Self {
        Self::from_config(config)
    }
}

impl Limits {
    pub fn from_config(config: &LimitsConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.timeout_ms),
            max_steps: config.max_steps,
            max_call_depth: config.max_call_depth,
            max_output_bytes: config.max_output_bytes,
            max_string_bytes: config.max_string_bytes,
            max_collection_len: config.max_collection_len,
            max_source_bytes: config.max_source_bytes,
            max_memory_bytes: config.max_memory_bytes,
            stack_size: config.stack_size_kb.saturating_mul(1024),
        }
    }

    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_max_output_bytes(mut self, bytes: usize) -> Self {
        self.max_output_bytes = bytes;
        self
    }

    pub fn with_max_string_bytes(mut self, bytes: usize) -> Self {
        self.max_string_bytes = bytes;
        self
    }

    pub fn with_max_collection_len(mut self, len: usize) -> Self {
        self.max_collection_len = len;
        self
    }

    pub fn with_max_source_bytes(mut self, bytes: usize) -> Self {
        self.max_source_bytes = bytes;
        self
    }

    pub fn with_max_memory_bytes(mut self, bytes: usize) -> Self {
        self.max_memory_bytes = bytes;
        self
    }
}

/// Host-side switch that aborts a running script
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Resource accounting for one run
#[derive(Debug)]
pub struct Budget {
    limits: Limits,
    cancel: CancelToken,
    deadline: Instant,
    steps: u64,
    call_depth: usize,
    output_bytes: usize,
    allocated: usize,
}

impl Budget {
    /// Start the clock.
    ///
    /// Also arms the current thread's walk meter, so build the budget on
    /// the thread that runs the script.
    pub fn new(limits: Limits, cancel: CancelToken) -> Self {
        let deadline = Instant::now() + limits.timeout;
        value::take_walked();
        value::set_walk_allowance(limits.max_steps, limits.max_steps);
        value::set_text_limit(limits.max_string_bytes);
        Self {
            limits,
            cancel,
            deadline,
            steps: 0,
            call_depth: 0,
            output_bytes: 0,
            allocated: 0,
        }
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Steps consumed so far
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Charge one step
    #[inline]
    pub fn tick(&mut self) -> Result<(), RuntimeError> {
        self.charge(1)
    }

    /// Charge `steps` steps plus any nodes walked since the last charge,
    /// checking the deadline and cancellation periodically
    pub fn charge(&mut self, steps: u64) -> Result<(), RuntimeError> {
        let before = self.steps;
        self.steps = self
            .steps
            .saturating_add(steps)
            .saturating_add(value::take_walked());
        if self.steps > self.limits.max_steps {
            return Err(SandboxError::StepLimitExceeded {
                limit: self.limits.max_steps,
            }
            .into());
        }
        value::set_walk_allowance(self.limits.max_steps - self.steps, self.limits.max_steps);
        if before / INTERRUPT_CHECK_INTERVAL != self.steps / INTERRUPT_CHECK_INTERVAL {
            self.check_interrupts()?;
        }
        Ok(())
    }

    /// Fail if the run was cancelled or its deadline passed
    pub fn check_interrupts(&self) -> Result<(), RuntimeError> {
        if self.cancel.is_cancelled() {
            return Err(RuntimeError::Cancelled);
        }
        if Instant::now() >= self.deadline {
            return Err(SandboxError::TimeoutExceeded {
                limit: self.limits.timeout,
            }
            .into());
        }
        Ok(())
    }

    /// Enter a script function call
    pub fn enter_call(&mut self) -> Result<(), RuntimeError> {
        if self.call_depth >= self.limits.max_call_depth {
            return Err(SandboxError::CallDepthExceeded {
                limit: self.limits.max_call_depth,
            }
            .into());
        }
        self.call_depth += 1;
        Ok(())
    }

    pub fn exit_call(&mut self) {
        self.call_depth = self.call_depth.saturating_sub(1);
    }

    /// Bytes allocated so far
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    /// Charge `bytes` of newly allocated script data.
    ///
    /// The meter only grows: memory the script drops is not credited back.
    pub fn allocate(&mut self, bytes: usize) -> Result<(), RuntimeError> {
        self.allocated = self.allocated.saturating_add(bytes);
        if self.allocated > self.limits.max_memory_bytes {
            return Err(SandboxError::MemoryLimitExceeded {
                limit: self.limits.max_memory_bytes,
            }
            .into());
        }
        Ok(())
    }

    /// Charge `count` new list or tuple slots
    pub fn allocate_slots(&mut self, count: usize) -> Result<(), RuntimeError> {
        self.allocate(count.saturating_mul(SLOT_BYTES))
    }

    /// Charge `count` new dict entries
    pub fn allocate_entries(&mut self, count: usize) -> Result<(), RuntimeError> {
        self.allocate(count.saturating_mul(ENTRY_BYTES))
    }

    /// Account for a newly built string or bytes value of `size` bytes
    pub fn check_string(&mut self, size: usize) -> Result<(), RuntimeError> {
        if size > self.limits.max_string_bytes {
            return Err(SandboxError::StringTooLarge {
                size,
                limit: self.limits.max_string_bytes,
            }
            .into());
        }
        self.charge((size / 64) as u64)
    }

    /// Account for a newly built collection of `len` items
    pub fn check_collection(&mut self, len: usize) -> Result<(), RuntimeError> {
        if len > self.limits.max_collection_len {
            return Err(SandboxError::CollectionTooLarge {
                len,
                limit: self.limits.max_collection_len,
            }
            .into());
        }
        self.charge((len / 8) as u64)
    }

    /// Account for `bytes` of captured output
    pub fn record_output(&mut self, bytes: usize) -> Result<(), RuntimeError> {
        self.output_bytes = self.output_bytes.saturating_add(bytes);
        if self.output_bytes > self.limits.max_output_bytes {
            return Err(SandboxError::OutputLimitExceeded {
                limit: self.limits.max_output_bytes,
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budget(limits: Limits) -> Budget {
        Budget::new(limits, CancelToken::new())
    }

    #[test]
    fn test_limits_from_config() {
        let config = LimitsConfig {
            timeout_ms: 250,
            stack_size_kb: 512,
            ..LimitsConfig::default()
        };
        let limits = Limits::from_config(&config);
        assert_eq!(limits.timeout, Duration::from_millis(250));
        assert_eq!(limits.stack_size, 512 * 1024);
    }

    #[test]
    fn test_step_limit() {
        let mut budget = budget(Limits::default().with_max_steps(10));
        for _ in 0..10 {
            budget.tick().unwrap();
        }
        let err = budget.tick().unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Limit(SandboxError::StepLimitExceeded { limit: 10 })
        ));
    }

    #[test]
    fn test_cancellation_is_noticed() {
        let token = CancelToken::new();
        let mut budget = Budget::new(Limits::default(), token.clone());
        token.cancel();
        let result = (0..INTERRUPT_CHECK_INTERVAL * 2).try_for_each(|_| budget.tick());
        assert!(matches!(result, Err(RuntimeError::Cancelled)));
    }

    #[test]
    fn test_deadline() {
        let budget = budget(Limits::default().with_timeout(Duration::ZERO));
        let err = budget.check_interrupts().unwrap_err();
        assert_eq!(err.to_string(), "time limit exceeded (0 ms)");
    }

    #[test]
    fn test_call_depth() {
        let mut budget = budget(Limits::default().with_max_call_depth(2));
        budget.enter_call().unwrap();
        budget.enter_call().unwrap();
        assert!(budget.enter_call().is_err());
        budget.exit_call();
        assert!(budget.enter_call().is_ok());
    }

    #[test]
    fn test_size_limits() {
        let mut budget = budget(
            Limits::default()
                .with_max_string_bytes(100)
                .with_max_collection_len(5)
                .with_max_output_bytes(8),
        );
        assert!(budget.check_string(100).is_ok());
        assert!(budget.check_string(101).is_err());
        assert!(budget.check_collection(6).is_err());
        budget.record_output(8).unwrap();
        let err = budget.record_output(1).unwrap_err();
        assert_eq!(err.to_string(), "output limit exceeded (8 bytes)");
    }

    #[test]
    fn test_memory_meter_is_cumulative() {
        let mut budget = budget(Limits::default().with_max_memory_bytes(1_000));
        budget.allocate(600).unwrap();
        budget.allocate(400).unwrap();
        assert_eq!(budget.allocated(), 1_000);
        let err = budget.allocate(1).unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Limit(SandboxError::MemoryLimitExceeded { limit: 1_000 })
        ));
        assert_eq!(err.to_string(), "memory limit exceeded (1000 bytes)");
    }

    #[test]
    fn test_slots_and_entries_are_charged() {
        let mut budget = budget(Limits::default());
        budget.allocate_slots(10).unwrap();
        assert_eq!(budget.allocated(), 10 * SLOT_BYTES);
        budget.allocate_entries(1).unwrap();
        assert_eq!(budget.allocated(), 10 * SLOT_BYTES + ENTRY_BYTES);
    }
}

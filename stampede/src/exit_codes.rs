#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// The run completed but one or more iterations failed.
    IterationsFailed = 10,

    /// Invalid CLI input (bad flags, unknown workload steps, impossible concurrency, etc.).
    InvalidInput = 30,

    /// Internal/runtime error (IO errors, bus failures, task panics).
    RuntimeError = 40,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub fn from_errors(total_errors: u64) -> Self {
        if total_errors > 0 {
            Self::IterationsFailed
        } else {
            Self::Success
        }
    }
}

use std::time::Duration;

/// Options handed to every probe invocation.
///
/// Derived once from configuration and copied into each call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionOptions {
    /// Probes may log protocol detail when set
    pub verbose: bool,

    /// Upper bound a probe must enforce on its own network I/O
    pub timeout: Duration,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self { verbose: false, timeout: Duration::from_secs(10) }
    }
}

/// Which resolved address families are probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressFamilies {
    pub ipv4: bool,
    pub ipv6: bool,
}

impl Default for AddressFamilies {
    fn default() -> Self {
        Self { ipv4: true, ipv6: true }
    }
}

/// Bounded, fixed-delay retry of failing probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub enabled: bool,
    pub count: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// A policy that runs every probe exactly once.
    pub fn disabled() -> Self {
        Self { enabled: false, ..Self::default() }
    }

    /// Number of times a probe is invoked before its failure is final.
    pub fn max_attempts(&self) -> u32 {
        if self.enabled { self.count.max(1) } else { 1 }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { enabled: true, count: 5, delay: Duration::from_secs(5) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_attempts() {
        assert_eq!(RetryPolicy::default().max_attempts(), 5);
        assert_eq!(RetryPolicy::disabled().max_attempts(), 1);

        let zero = RetryPolicy { enabled: true, count: 0, delay: Duration::ZERO };
        assert_eq!(zero.max_attempts(), 1);

        let disabled_with_count = RetryPolicy { enabled: false, count: 9, delay: Duration::ZERO };
        assert_eq!(disabled_with_count.max_attempts(), 1);
    }
}

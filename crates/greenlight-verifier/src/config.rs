use std::time::Duration;

/// Tunables for the verification and repair loop.
#[derive(Clone, Debug)]
pub struct VerifierConfig {
    /// Upper bound on verification attempts, counting the first (default: 5)
    pub max_repair_attempts: u32,
    /// Wall-clock budget for a single check step (default: 5s)
    pub step_timeout: Duration,
    /// Evidence kept per failing step, in bytes (default: 1024)
    pub evidence_limit_bytes: usize,
    /// Failing-step entries quoted in the audit summary (default: 3)
    pub failure_summary_errors: usize,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            max_repair_attempts: 5,
            step_timeout: Duration::from_secs(5),
            evidence_limit_bytes: 1024,
            failure_summary_errors: 3,
        }
    }
}

impl VerifierConfig {
    /// At least one attempt always runs.
    pub fn with_max_repair_attempts(mut self, attempts: u32) -> Self {
        self.max_repair_attempts = attempts.max(1);
        self
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    pub fn with_evidence_limit(mut self, bytes: usize) -> Self {
        self.evidence_limit_bytes = bytes;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_loop_contract() {
        let config = VerifierConfig::default();
        assert_eq!(config.max_repair_attempts, 5);
        assert_eq!(config.step_timeout, Duration::from_secs(5));
        assert_eq!(config.evidence_limit_bytes, 1024);
    }

    #[test]
    fn attempt_bound_is_clamped_to_one() {
        let config = VerifierConfig::default().with_max_repair_attempts(0);
        assert_eq!(config.max_repair_attempts, 1);
    }
}

//! Classification verdicts.

use serde::{Deserialize, Serialize};

/// Decision produced for one classified step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    /// Proceed; nothing to report.
    Continue,
    /// Proceed, but the run is downgraded to `Unstable`.
    Warn { finding: String },
    /// Stop the run; only post-run actions remain.
    Abort { reason: String },
}

impl Verdict {
    pub fn warn(finding: impl Into<String>) -> Self {
        Verdict::Warn {
            finding: finding.into(),
        }
    }

    pub fn abort(reason: impl Into<String>) -> Self {
        Verdict::Abort {
            reason: reason.into(),
        }
    }

    pub fn is_abort(&self) -> bool {
        matches!(self, Verdict::Abort { .. })
    }

    pub fn is_warn(&self) -> bool {
        matches!(self, Verdict::Warn { .. })
    }

    /// Whether the engine may advance to the next stage.
    pub fn allows_advance(&self) -> bool {
        !self.is_abort()
    }

    fn severity(&self) -> u8 {
        match self {
            Verdict::Continue => 0,
            Verdict::Warn { .. } => 1,
            Verdict::Abort { .. } => 2,
        }
    }

    /// The more severe of two verdicts; ties keep `self`.
    pub fn worst(self, other: Verdict) -> Verdict {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worst_prefers_abort() {
        let v = Verdict::warn("lint").worst(Verdict::abort("smoke test"));
        assert_eq!(v, Verdict::abort("smoke test"));

        let v = Verdict::abort("first").worst(Verdict::abort("second"));
        assert_eq!(v, Verdict::abort("first"));

        let v = Verdict::Continue.worst(Verdict::warn("x"));
        assert!(v.is_warn());
    }

    #[test]
    fn test_serde_tagged() {
        let json = serde_json::to_value(Verdict::abort("boom")).expect("serialize");
        assert_eq!(json["verdict"], "abort");
        assert_eq!(json["reason"], "boom");
    }
}

//! Approval gate for promotion stages.
//!
//! A gated stage publishes a [`PendingApproval`] on the gate's inbox and
//! awaits the one-shot responder under a timeout. The run's task is parked
//! for the duration; no thread is blocked and other runs are unaffected.
//!
//! ```ignore
//! let (gate, mut inbox) = ApprovalGate::channel();
//! tokio::spawn(async move {
//!     while let Some(pending) = inbox.next().await {
//!         pending.approve("release-manager");
//!     }
//! });
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::domain::{Environment, StageKind, Verdict};

/// A request for a human decision, created once per gated stage per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub request_id: Uuid,
    pub run_id: Uuid,
    pub stage: StageKind,
    pub environment: Environment,
    pub message: String,
    pub timeout: Duration,
    pub requested_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
}

impl ApprovalRequest {
    pub fn new(
        run_id: Uuid,
        stage: StageKind,
        environment: Environment,
        message: impl Into<String>,
        timeout: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        let deadline = chrono::Duration::from_std(timeout)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            request_id: Uuid::new_v4(),
            run_id,
            stage,
            environment,
            message: message.into(),
            timeout,
            requested_at: now,
            deadline,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline
    }
}

/// Decision sent back by an approver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approve { approver: String },
    Reject { approver: String, reason: String },
}

/// How an approval request was resolved. Resolved exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "resolution", rename_all = "snake_case")]
pub enum ApprovalResolution {
    Approved {
        approver: String,
    },
    Rejected {
        approver: Option<String>,
        reason: String,
    },
    TimedOut {
        environment: Environment,
        timeout_secs: u64,
    },
}

impl ApprovalResolution {
    pub fn is_approved(&self) -> bool {
        matches!(self, ApprovalResolution::Approved { .. })
    }

    /// `Approved` continues; `Rejected` and `TimedOut` abort the stage.
    pub fn verdict(&self, stage: StageKind) -> Verdict {
        match self {
            ApprovalResolution::Approved { .. } => Verdict::Continue,
            ApprovalResolution::Rejected { approver, reason } => Verdict::abort(match approver {
                Some(who) => format!("{} approval rejected by {}: {}", stage, who, reason),
                None => format!("{} approval rejected: {}", stage, reason),
            }),
            ApprovalResolution::TimedOut {
                environment,
                timeout_secs,
            } => Verdict::abort(format!(
                "promotion to {} timed out after {}s awaiting approval",
                environment, timeout_secs
            )),
        }
    }
}

/// A request waiting for a decision, handed to whoever drains the inbox.
#[derive(Debug)]
pub struct PendingApproval {
    request: ApprovalRequest,
    responder: oneshot::Sender<ApprovalDecision>,
}

impl PendingApproval {
    pub fn request(&self) -> &ApprovalRequest {
        &self.request
    }

    /// Send a decision. Returns `false` when the gate stopped waiting
    /// (timed out) before the decision arrived.
    pub fn respond(self, decision: ApprovalDecision) -> bool {
        self.responder.send(decision).is_ok()
    }

    pub fn approve(self, approver: impl Into<String>) -> bool {
        self.respond(ApprovalDecision::Approve {
            approver: approver.into(),
        })
    }

    pub fn reject(self, approver: impl Into<String>, reason: impl Into<String>) -> bool {
        self.respond(ApprovalDecision::Reject {
            approver: approver.into(),
            reason: reason.into(),
        })
    }
}

/// Receiving side of an [`ApprovalGate`].
#[derive(Debug)]
pub struct ApprovalInbox {
    rx: mpsc::UnboundedReceiver<PendingApproval>,
}

impl ApprovalInbox {
    /// Next pending request; `None` once every gate handle is dropped.
    pub async fn next(&mut self) -> Option<PendingApproval> {
        self.rx.recv().await
    }
}

/// Bounded wait for an external approval signal.
#[derive(Debug, Clone)]
pub struct ApprovalGate {
    inbox: Option<mpsc::UnboundedSender<PendingApproval>>,
}

impl ApprovalGate {
    /// Gate wired to an inbox that an approver drains.
    pub fn channel() -> (Self, ApprovalInbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { inbox: Some(tx) }, ApprovalInbox { rx })
    }

    /// Gate with no approver attached; every request waits out its timeout.
    pub fn detached() -> Self {
        Self { inbox: None }
    }

    /// Suspend until the request is decided or its timeout elapses.
    pub async fn await_approval(&self, request: ApprovalRequest) -> ApprovalResolution {
        let timeout = request.timeout;
        let timed_out = ApprovalResolution::TimedOut {
            environment: request.environment,
            timeout_secs: timeout.as_secs(),
        };

        let Some(inbox) = &self.inbox else {
            tokio::time::sleep(timeout).await;
            return timed_out;
        };

        let (responder, decision) = oneshot::channel();
        if inbox
            .send(PendingApproval {
                request,
                responder,
            })
            .is_err()
        {
            return ApprovalResolution::Rejected {
                approver: None,
                reason: "approval inbox is closed".to_string(),
            };
        }

        match tokio::time::timeout(timeout, decision).await {
            Ok(Ok(ApprovalDecision::Approve { approver })) => {
                ApprovalResolution::Approved { approver }
            }
            Ok(Ok(ApprovalDecision::Reject { approver, reason })) => {
                ApprovalResolution::Rejected {
                    approver: Some(approver),
                    reason,
                }
            }
            Ok(Err(_)) => ApprovalResolution::Rejected {
                approver: None,
                reason: "approver dropped the request".to_string(),
            },
            Err(_) => timed_out,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(env: Environment, timeout: Duration) -> ApprovalRequest {
        let stage = match env {
            Environment::Prod => StageKind::DeployProd,
            _ => StageKind::DeployStaging,
        };
        ApprovalRequest::new(
            Uuid::new_v4(),
            stage,
            env,
            format!("Promote to {}?", env),
            timeout,
            Utc::now(),
        )
    }

    #[test]
    fn test_request_deadline() {
        let now = Utc::now();
        let req = ApprovalRequest::new(
            Uuid::new_v4(),
            StageKind::DeployStaging,
            Environment::Staging,
            "promote",
            Duration::from_secs(3600),
            now,
        );
        assert_eq!(req.deadline, now + chrono::Duration::hours(1));
        assert!(!req.is_expired_at(now));
        assert!(req.is_expired_at(now + chrono::Duration::seconds(3600)));
    }

    #[test]
    fn test_resolution_verdicts() {
        let approved = ApprovalResolution::Approved {
            approver: "alice".into(),
        };
        assert_eq!(approved.verdict(StageKind::DeployProd), Verdict::Continue);

        let rejected = ApprovalResolution::Rejected {
            approver: Some("bob".into()),
            reason: "freeze window".into(),
        };
        assert!(rejected.verdict(StageKind::DeployProd).is_abort());

        let timed_out = ApprovalResolution::TimedOut {
            environment: Environment::Prod,
            timeout_secs: 86_400,
        };
        match timed_out.verdict(StageKind::DeployProd) {
            Verdict::Abort { reason } => assert!(reason.contains("prod")),
            other => panic!("expected abort, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_approved_through_inbox() {
        let (gate, mut inbox) = ApprovalGate::channel();
        tokio::spawn(async move {
            let pending = inbox.next().await.expect("pending request");
            assert_eq!(pending.request().environment, Environment::Staging);
            assert!(pending.approve("alice"));
        });

        let resolution = gate
            .await_approval(request(Environment::Staging, Duration::from_secs(60)))
            .await;
        assert_eq!(
            resolution,
            ApprovalResolution::Approved {
                approver: "alice".into()
            }
        );
    }

    #[tokio::test]
    async fn test_rejected_through_inbox() {
        let (gate, mut inbox) = ApprovalGate::channel();
        tokio::spawn(async move {
            let pending = inbox.next().await.expect("pending request");
            pending.reject("bob", "change freeze");
        });

        let resolution = gate
            .await_approval(request(Environment::Prod, Duration::from_secs(60)))
            .await;
        assert!(matches!(
            resolution,
            ApprovalResolution::Rejected { ref reason, .. } if reason == "change freeze"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_without_decision() {
        let (gate, mut inbox) = ApprovalGate::channel();
        let holder = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Some(pending) = inbox.next().await {
                held.push(pending);
            }
            held.len()
        });

        let resolution = gate
            .await_approval(request(Environment::Prod, Duration::from_secs(86_400)))
            .await;
        assert_eq!(
            resolution,
            ApprovalResolution::TimedOut {
                environment: Environment::Prod,
                timeout_secs: 86_400
            }
        );

        drop(gate);
        assert_eq!(holder.await.expect("holder task"), 1);
    }

    #[tokio::test]
    async fn test_dropped_request_is_rejected() {
        let (gate, mut inbox) = ApprovalGate::channel();
        tokio::spawn(async move {
            let pending = inbox.next().await.expect("pending request");
            drop(pending);
        });

        let resolution = gate
            .await_approval(request(Environment::Staging, Duration::from_secs(60)))
            .await;
        assert!(matches!(
            resolution,
            ApprovalResolution::Rejected { approver: None, .. }
        ));
    }

    #[tokio::test]
    async fn test_closed_inbox_is_rejected() {
        let (gate, inbox) = ApprovalGate::channel();
        drop(inbox);
        let resolution = gate
            .await_approval(request(Environment::Staging, Duration::from_secs(60)))
            .await;
        assert!(!resolution.is_approved());
    }

    #[tokio::test(start_paused = true)]
    async fn test_detached_gate_waits_out_timeout() {
        let gate = ApprovalGate::detached();
        let started = tokio::time::Instant::now();
        let resolution = gate
            .await_approval(request(Environment::Staging, Duration::from_secs(3600)))
            .await;
        assert!(matches!(resolution, ApprovalResolution::TimedOut { .. }));
        assert!(started.elapsed() >= Duration::from_secs(3600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_decision_reports_not_delivered() {
        let (gate, mut inbox) = ApprovalGate::channel();
        let resolution = gate
            .await_approval(request(Environment::Staging, Duration::from_secs(5)))
            .await;
        assert!(matches!(resolution, ApprovalResolution::TimedOut { .. }));

        let pending = inbox.next().await.expect("request was published");
        assert!(!pending.approve("too-late"));
    }
}

//! Notification decisions for finished runs.
//!
//! The dispatcher only decides *whether* and *what* to send. Delivery goes
//! through a [`Notifier`] implementation supplied by the caller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::domain::{Environment, Result, RunParameters, RunStatus};
use crate::obs::emit_notification_dispatched;

/// The rule that produced an intent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationRule {
    /// Final status is `Failure` or `Unstable`.
    Failure,
    /// Final status is `Success` and the run targeted production.
    ProductionSuccess,
}

impl NotificationRule {
    pub fn name(&self) -> &'static str {
        match self {
            NotificationRule::Failure => "failure",
            NotificationRule::ProductionSuccess => "production_success",
        }
    }
}

/// What to send, independent of transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationIntent {
    pub rule: NotificationRule,
    pub job_name: String,
    pub build_number: u64,
    pub status: RunStatus,
    pub subject: String,
    /// Abort reason or accumulated findings.
    pub details: Vec<String>,
    /// Set for production-success notifications.
    pub version_tag: Option<String>,
    pub run_url: Option<String>,
}

/// Decides notifications for one run; each rule fires at most once.
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    version_tag: String,
    run_url: Option<String>,
    sent: HashSet<NotificationRule>,
}

impl NotificationDispatcher {
    pub fn new(version_tag: impl Into<String>, run_url: Option<String>) -> Self {
        Self {
            version_tag: version_tag.into(),
            run_url,
            sent: HashSet::new(),
        }
    }

    /// Decide the notification for a final status.
    ///
    /// Returns `None` while the run is still going, when no rule matches, or
    /// when the matching rule already fired for this run.
    pub fn notify(
        &mut self,
        final_status: RunStatus,
        params: &RunParameters,
        details: &[String],
    ) -> Option<NotificationIntent> {
        let rule = match final_status {
            RunStatus::Failure | RunStatus::Unstable => NotificationRule::Failure,
            RunStatus::Success if params.target_env == Environment::Prod => {
                NotificationRule::ProductionSuccess
            }
            RunStatus::Success | RunStatus::Running => return None,
        };

        if !self.sent.insert(rule) {
            return None;
        }

        let subject = match rule {
            NotificationRule::Failure => format!(
                "{}: {} #{}",
                final_status.name().to_uppercase(),
                params.job_name,
                params.build_number
            ),
            NotificationRule::ProductionSuccess => format!(
                "Production deploy succeeded: {} #{} ({})",
                params.job_name, params.build_number, self.version_tag
            ),
        };
        emit_notification_dispatched(rule.name(), &subject);

        Some(NotificationIntent {
            rule,
            job_name: params.job_name.clone(),
            build_number: params.build_number,
            status: final_status,
            subject,
            details: details.to_vec(),
            version_tag: (rule == NotificationRule::ProductionSuccess)
                .then(|| self.version_tag.clone()),
            run_url: self.run_url.clone(),
        })
    }
}

/// Delivers notification intents.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, intent: &NotificationIntent) -> Result<()>;
}

/// Writes intents to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, intent: &NotificationIntent) -> Result<()> {
        tracing::info!(
            event = "notification.sent",
            rule = intent.rule.name(),
            subject = %intent.subject,
            details = ?intent.details,
            run_url = intent.run_url.as_deref().unwrap_or(""),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatcher() -> NotificationDispatcher {
        NotificationDispatcher::new(
            "v2026.10.19-12",
            Some("https://ci.example.com/job/billing/12".to_string()),
        )
    }

    fn params(env: Environment) -> RunParameters {
        RunParameters::new(env).with_job("billing", 12)
    }

    #[test]
    fn test_failure_notifies() {
        let intent = dispatcher()
            .notify(
                RunStatus::Failure,
                &params(Environment::Staging),
                &["compliance_check reported 1 critical finding(s) (3 total)".to_string()],
            )
            .expect("intent");
        assert_eq!(intent.rule, NotificationRule::Failure);
        assert_eq!(intent.subject, "FAILURE: billing #12");
        assert_eq!(intent.details.len(), 1);
        assert!(intent.version_tag.is_none());
        assert!(intent.run_url.is_some());
    }

    #[test]
    fn test_unstable_uses_failure_rule() {
        let intent = dispatcher()
            .notify(RunStatus::Unstable, &params(Environment::Dev), &[])
            .expect("intent");
        assert_eq!(intent.rule, NotificationRule::Failure);
        assert!(intent.subject.starts_with("UNSTABLE"));
    }

    #[test]
    fn test_production_success_notifies_with_version() {
        let intent = dispatcher()
            .notify(RunStatus::Success, &params(Environment::Prod), &[])
            .expect("intent");
        assert_eq!(intent.rule, NotificationRule::ProductionSuccess);
        assert_eq!(intent.version_tag.as_deref(), Some("v2026.10.19-12"));
        assert_eq!(
            intent.run_url.as_deref(),
            Some("https://ci.example.com/job/billing/12")
        );
    }

    #[test]
    fn test_non_prod_success_is_silent() {
        let mut d = dispatcher();
        assert!(d.notify(RunStatus::Success, &params(Environment::Dev), &[]).is_none());
        assert!(d
            .notify(RunStatus::Success, &params(Environment::Staging), &[])
            .is_none());
    }

    #[test]
    fn test_running_is_silent() {
        assert!(dispatcher()
            .notify(RunStatus::Running, &params(Environment::Prod), &[])
            .is_none());
    }

    #[test]
    fn test_each_rule_fires_once() {
        let mut d = dispatcher();
        let p = params(Environment::Prod);
        assert!(d.notify(RunStatus::Failure, &p, &[]).is_some());
        assert!(d.notify(RunStatus::Failure, &p, &[]).is_none());
        assert!(d.notify(RunStatus::Unstable, &p, &[]).is_none());
        assert!(d.notify(RunStatus::Success, &p, &[]).is_some());
        assert!(d.notify(RunStatus::Success, &p, &[]).is_none());
    }

    #[tokio::test]
    async fn test_log_notifier_accepts_intent() {
        let intent = dispatcher()
            .notify(RunStatus::Failure, &params(Environment::Dev), &[])
            .expect("intent");
        LogNotifier.send(&intent).await.expect("send");
    }
}

//! Serves approval requests for a CLI run.

use chrono::Utc;
use stagegate_core::{ApprovalDecision, ApprovalInbox, ApprovalRequest, Environment};
use std::io::BufRead;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

/// How the CLI answers approval requests.
#[derive(Debug, Clone)]
pub struct ApprovalPolicy {
    /// Environments approved up front with `--approve`.
    pub pre_approved: Vec<Environment>,
    /// Prompt on stdin for anything not pre-approved.
    pub interactive: bool,
    pub approver: String,
}

impl ApprovalPolicy {
    /// Decision without asking anyone, or `None` when a prompt is needed.
    pub fn unattended_decision(&self, request: &ApprovalRequest) -> Option<ApprovalDecision> {
        if self.pre_approved.contains(&request.environment) {
            return Some(ApprovalDecision::Approve {
                approver: self.approver.clone(),
            });
        }
        if self.interactive {
            return None;
        }
        Some(ApprovalDecision::Reject {
            approver: self.approver.clone(),
            reason: format!(
                "{} was not pre-approved (pass --approve {} or --interactive)",
                request.environment, request.environment
            ),
        })
    }
}

/// `y` or `yes`, case-insensitive.
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Lines typed on stdin.
///
/// Read on a plain thread: a blocking read there never holds up runtime
/// shutdown when a prompt goes unanswered.
fn stdin_lines() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Answer every request on the inbox until the engine drops its gate.
pub fn spawn_approver(inbox: ApprovalInbox, policy: ApprovalPolicy) -> JoinHandle<()> {
    let answers = policy.interactive.then(stdin_lines);
    spawn_approver_with(inbox, policy, answers)
}

fn spawn_approver_with(
    mut inbox: ApprovalInbox,
    policy: ApprovalPolicy,
    mut answers: Option<mpsc::UnboundedReceiver<String>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(pending) = inbox.next().await {
            let request = pending.request().clone();
            let decision = match policy.unattended_decision(&request) {
                Some(decision) => decision,
                None => ask(&request, &policy.approver, answers.as_mut()).await,
            };
            info!(
                environment = %request.environment,
                approved = matches!(decision, ApprovalDecision::Approve { .. }),
                "approval answered"
            );
            if !pending.respond(decision) {
                info!(environment = %request.environment, "decision arrived after the deadline");
            }
        }
    })
}

/// Prompt on stderr and wait for an answer until the request's deadline.
async fn ask(
    request: &ApprovalRequest,
    approver: &str,
    answers: Option<&mut mpsc::UnboundedReceiver<String>>,
) -> ApprovalDecision {
    let reject = |reason: &str| ApprovalDecision::Reject {
        approver: approver.to_string(),
        reason: reason.to_string(),
    };
    let Some(answers) = answers else {
        return reject("no approver available");
    };
    // Lines typed after an earlier prompt expired are not answers to this one.
    while answers.try_recv().is_ok() {}

    let question = format!(
        "{} [y/N] (expires {}): ",
        request.message,
        request.deadline.format("%Y-%m-%d %H:%M:%S UTC")
    );
    let mut stderr = tokio::io::stderr();
    if stderr.write_all(question.as_bytes()).await.is_err() || stderr.flush().await.is_err() {
        return reject("could not prompt for approval");
    }

    let remaining = (request.deadline - Utc::now()).to_std().unwrap_or_default();
    match tokio::time::timeout(remaining, answers.recv()).await {
        Ok(Some(answer)) if is_affirmative(&answer) => ApprovalDecision::Approve {
            approver: approver.to_string(),
        },
        Ok(Some(_)) => reject("declined at prompt"),
        Ok(None) => reject("stdin closed before an answer"),
        Err(_) => reject("no answer before the deadline"),
    }
}

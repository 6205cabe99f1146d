//! Batch summarization: active users -> turns -> summary -> embedding -> upsert

use crate::conversation_store::ConversationStore;
use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::summarizer::Summarizer;
use crate::summary_store::SummaryStore;
use crate::types::{SummaryRecord, TimeWindow, UserId};

use chrono::{DateTime, Duration, SubsecRound, Utc};
use std::sync::Arc;
use tracing::{info, warn};

/// Step at which a user's processing failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    FetchTurns,
    Summarize,
    Embed,
    Persist,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::FetchTurns => "fetch_turns",
            Stage::Summarize => "summarize",
            Stage::Embed => "embed",
            Stage::Persist => "persist",
        };
        f.write_str(s)
    }
}

/// What happened to one user in one cycle
#[derive(Debug, Clone, PartialEq)]
pub enum OutcomeStatus {
    /// A summary was written for the window
    Summarized { turns: usize, dimension: usize },
    /// No turns inside the window; nothing to do
    NoTurns,
    /// Skipped this cycle; the user is picked up again next cycle if still active
    Failed { stage: Stage, error: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserOutcome {
    pub user_id: UserId,
    pub status: OutcomeStatus,
}

/// Result of one [`BatchPipeline::run_cycle`]
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub window: TimeWindow,
    pub outcomes: Vec<UserOutcome>,
}

impl CycleReport {
    pub fn summarized(&self) -> usize {
        self.count(|s| matches!(s, OutcomeStatus::Summarized { .. }))
    }

    pub fn no_turns(&self) -> usize {
        self.count(|s| matches!(s, OutcomeStatus::NoTurns))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, OutcomeStatus::Failed { .. }))
    }

    pub fn outcome_for(&self, user_id: &str) -> Option<&OutcomeStatus> {
        self.outcomes
            .iter()
            .find(|o| o.user_id == user_id)
            .map(|o| &o.status)
    }

    fn count(&self, pred: impl Fn(&OutcomeStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }
}

/// Orchestrates one summarization pass over recently active users
#[derive(Clone)]
pub struct BatchPipeline {
    conversations: Arc<dyn ConversationStore>,
    summaries: Arc<dyn SummaryStore>,
    summarizer: Arc<dyn Summarizer>,
    embedder: Arc<dyn EmbeddingProvider>,
    window: Duration,
}

impl BatchPipeline {
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        summaries: Arc<dyn SummaryStore>,
        summarizer: Arc<dyn Summarizer>,
        embedder: Arc<dyn EmbeddingProvider>,
        window: Duration,
    ) -> Self {
        Self {
            conversations,
            summaries,
            summarizer,
            embedder,
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Run a cycle ending at the current time, truncated to whole seconds
    pub async fn run_cycle_now(&self) -> Result<CycleReport> {
        self.run_cycle(Utc::now().trunc_subsecs(0)).await
    }

    /// Summarize every user active in `[now - window, now]`.
    ///
    /// Only failing to list active users is an error; per-user failures are
    /// reported in the returned [`CycleReport`].
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleReport> {
        let window = TimeWindow::ending_at(now, self.window)?;

        let users = self.conversations.list_active_users(window.start).await?;
        info!(users = users.len(), %window, "Starting batch cycle");

        let mut outcomes = Vec::with_capacity(users.len());
        for user_id in users {
            let status = self.process_user(&user_id, window).await;
            match &status {
                OutcomeStatus::Summarized { turns, dimension } => {
                    info!(user_id = %user_id, turns, dimension, "Summarized conversations")
                }
                OutcomeStatus::NoTurns => {
                    info!(user_id = %user_id, "No conversations in window")
                }
                OutcomeStatus::Failed { stage, error } => {
                    warn!(user_id = %user_id, %stage, %error, "Skipping user this cycle")
                }
            }
            outcomes.push(UserOutcome { user_id, status });
        }

        let report = CycleReport { window, outcomes };
        info!(
            summarized = report.summarized(),
            no_turns = report.no_turns(),
            failed = report.failed(),
            "Batch cycle completed"
        );
        Ok(report)
    }

    async fn process_user(&self, user_id: &str, window: TimeWindow) -> OutcomeStatus {
        let turns = match self
            .conversations
            .list_turns(user_id, window.start, window.end)
            .await
        {
            Ok(turns) => turns,
            Err(e) => return failed(Stage::FetchTurns, e),
        };

        if turns.is_empty() {
            return OutcomeStatus::NoTurns;
        }

        let summary = match self.summarizer.summarize(&turns).await {
            Ok(summary) => summary,
            Err(e) => return failed(Stage::Summarize, e),
        };

        let vector = match self.embedder.embed_one(&summary).await {
            Ok(vector) => vector,
            Err(e) => return failed(Stage::Embed, e),
        };
        let dimension = vector.len();

        let record = SummaryRecord::new(user_id, summary, vector, window);
        if let Err(e) = self.summaries.upsert(&record).await {
            return failed(Stage::Persist, e);
        }

        OutcomeStatus::Summarized {
            turns: turns.len(),
            dimension,
        }
    }
}

fn failed(stage: Stage, error: impl std::fmt::Display) -> OutcomeStatus {
    OutcomeStatus::Failed {
        stage,
        error: error.to_string(),
    }
}

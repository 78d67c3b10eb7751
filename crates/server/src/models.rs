use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Poll {
    pub id: i64,
    pub question: String,
    pub publish_at: DateTime<Utc>,
    pub close_at: DateTime<Utc>,
}

impl Poll {
    /// A poll is visible once its publication time has passed.
    pub fn is_published(&self, now: DateTime<Utc>) -> bool {
        now >= self.publish_at
    }

    /// True when the poll went live within the last day.
    pub fn was_published_recently(&self, now: DateTime<Utc>) -> bool {
        now - Duration::days(1) <= self.publish_at && self.publish_at <= now
    }

    /// Voting is open inside [publish_at, close_at], both ends inclusive.
    pub fn can_vote(&self, now: DateTime<Utc>) -> bool {
        self.publish_at <= now && now <= self.close_at
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Choice {
    pub id: i64,
    pub poll_id: i64,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Vote {
    pub id: i64,
    pub user_id: i64,
    pub poll_id: i64,
    pub choice_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub password_hash: String,
}

// ===== Request / response payloads =====

#[derive(Debug, Deserialize)]
pub struct FlashParams {
    pub flash: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PollSummary {
    pub id: i64,
    pub question: String,
    pub publish_at: DateTime<Utc>,
    pub close_at: DateTime<Utc>,
    pub published: bool,
    pub recently_published: bool,
    pub open: bool,
}

impl PollSummary {
    pub fn new(poll: Poll, now: DateTime<Utc>) -> Self {
        let published = poll.is_published(now);
        let recently_published = poll.was_published_recently(now);
        let open = poll.can_vote(now);
        Self {
            id: poll.id,
            question: poll.question,
            publish_at: poll.publish_at,
            close_at: poll.close_at,
            published,
            recently_published,
            open,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PollList {
    pub polls: Vec<PollSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Poll page with its choices; doubles as the voting form, where `error`
/// carries the reason a submission was rejected.
#[derive(Debug, Serialize)]
pub struct PollDetail {
    #[serde(flatten)]
    pub poll: Poll,
    pub choices: Vec<Choice>,
    pub current_choice: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VoteForm {
    pub choice: Option<i64>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ChoiceTally {
    pub id: i64,
    pub text: String,
    pub votes: i64,
}

#[derive(Debug, Serialize)]
pub struct PollResults {
    pub id: i64,
    pub question: String,
    pub choices: Vec<ChoiceTally>,
    pub total_votes: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct StatsRow {
    pub poll_id: i64,
    pub question: String,
    pub choice_id: i64,
    pub choice_text: String,
    pub votes: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ExportedVote {
    pub username: String,
    pub poll_id: i64,
    pub question: String,
    pub choice_text: String,
    pub created_at: DateTime<Utc>,
}

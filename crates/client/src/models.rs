use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct PollSummary {
    pub id: i64,
    pub question: String,
    pub published: bool,
    pub recently_published: bool,
    pub open: bool,
}

#[derive(Debug, Deserialize)]
pub struct PollList {
    pub polls: Vec<PollSummary>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub id: i64,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct PollDetail {
    pub question: String,
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub current_choice: Option<i64>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceTally {
    pub text: String,
    pub votes: i64,
}

#[derive(Debug, Deserialize)]
pub struct PollResults {
    pub question: String,
    pub choices: Vec<ChoiceTally>,
    pub total_votes: i64,
}

#[derive(Debug, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub username: String,
    pub display_name: String,
}

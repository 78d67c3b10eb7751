//! Black-box tests for the voting flow. They need a live Postgres reachable
//! through DATABASE_URL, so every test is ignored by default:
//!
//!     DATABASE_URL=postgres://... cargo test -p polls -- --ignored

use std::{
    env,
    net::SocketAddr,
    sync::Mutex,
    time::{SystemTime, UNIX_EPOCH},
};

use chrono::{Duration, Utc};
use polls::{
    AppState, app,
    auth::{JwtKeys, hash_password, issue_token},
    models::User,
};
use reqwest::{StatusCode, header::AUTHORIZATION};
use sqlx::PgPool;

const JWT_SECRET: &[u8] = b"voting-suite-secret";

static INITIALIZED: Mutex<bool> = Mutex::new(false);

fn init_subscriber() {
    let mut init = INITIALIZED.lock().unwrap();
    if !*init {
        *init = true;
        tracing_subscriber::fmt::init();
    }
}

async fn serve() -> (SocketAddr, PgPool) {
    init_subscriber();
    let db_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set for the voting suite");
    let db = polls::connect_db(&db_url).await.unwrap();
    sqlx::migrate!("./migrations").run(&db).await.unwrap();

    let state = AppState {
        db: db.clone(),
        jwt: JwtKeys::from_secret(JWT_SECRET),
    };
    let router = app(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap()
    });
    (addr, db)
}

/// Reqwest follows redirects by default; assertions on Location need it off.
fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

fn unique(name: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{name}-{nanos}")
}

async fn create_user(db: &PgPool, username: &str, password: &str) -> i64 {
    let password_hash = hash_password(password).unwrap();
    sqlx::query_scalar(
        "INSERT INTO users (username, display_name, password_hash)
         VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(username)
    .bind("Minion")
    .bind(password_hash)
    .fetch_one(db)
    .await
    .unwrap()
}

/// Poll with `choices`, its window offset from now by whole days.
async fn create_poll(
    db: &PgPool,
    question: &str,
    publish_days: i64,
    close_days: i64,
    choices: &[&str],
) -> (i64, Vec<i64>) {
    let now = Utc::now();
    let poll_id: i64 = sqlx::query_scalar(
        "INSERT INTO polls (question, publish_at, close_at) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(question)
    .bind(now + Duration::days(publish_days))
    .bind(now + Duration::days(close_days))
    .fetch_one(db)
    .await
    .unwrap();

    let mut choice_ids = Vec::new();
    for text in choices {
        let id: i64 =
            sqlx::query_scalar("INSERT INTO choices (poll_id, text) VALUES ($1, $2) RETURNING id")
                .bind(poll_id)
                .bind(text)
                .fetch_one(db)
                .await
                .unwrap();
        choice_ids.push(id);
    }
    (poll_id, choice_ids)
}

fn token_for(user_id: i64, username: &str) -> String {
    let user = User {
        id: user_id,
        username: username.to_string(),
        display_name: String::new(),
        password_hash: String::new(),
    };
    issue_token(&JwtKeys::from_secret(JWT_SECRET), &user).unwrap()
}

async fn vote_row(db: &PgPool, user_id: i64, poll_id: i64) -> Option<(i64, i64)> {
    let choice: Option<i64> =
        sqlx::query_scalar("SELECT choice_id FROM votes WHERE user_id = $1 AND poll_id = $2")
            .bind(user_id)
            .bind(poll_id)
            .fetch_optional(db)
            .await
            .unwrap();
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM votes WHERE user_id = $1 AND poll_id = $2")
            .bind(user_id)
            .bind(poll_id)
            .fetch_one(db)
            .await
            .unwrap();
    choice.map(|choice_id| (choice_id, count))
}

async fn post_vote(
    addr: &SocketAddr,
    poll_id: i64,
    token: &str,
    choice: Option<i64>,
) -> reqwest::Response {
    let mut form: Vec<(&str, String)> = Vec::new();
    if let Some(choice) = choice {
        form.push(("choice", choice.to_string()));
    }
    client()
        .post(format!("http://{addr}/polls/{poll_id}/vote"))
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .form(&form)
        .send()
        .await
        .unwrap()
}

fn location(response: &reqwest::Response) -> &str {
    response
        .headers()
        .get("location")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("")
}

#[tokio::test]
#[ignore = "requires a live Postgres (set DATABASE_URL)"]
async fn first_vote_creates_a_single_row() {
    let (addr, db) = serve().await;
    let username = unique("voter");
    let user_id = create_user(&db, &username, "banana123").await;
    let (poll_id, choices) = create_poll(&db, &unique("Select a number"), 0, 7, &["1", "2"]).await;

    let response = post_vote(&addr, poll_id, &token_for(user_id, &username), Some(choices[0])).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), format!("/polls/{poll_id}/results"));

    let (choice_id, count) = vote_row(&db, user_id, poll_id).await.unwrap();
    assert_eq!(choice_id, choices[0]);
    assert_eq!(count, 1);
}

#[tokio::test]
#[ignore = "requires a live Postgres (set DATABASE_URL)"]
async fn revote_moves_the_same_row() {
    let (addr, db) = serve().await;
    let username = unique("voter");
    let user_id = create_user(&db, &username, "banana123").await;
    let (poll_id, choices) = create_poll(&db, &unique("Select a number"), 0, 7, &["1", "2"]).await;
    let token = token_for(user_id, &username);

    post_vote(&addr, poll_id, &token, Some(choices[0])).await;
    let response = post_vote(&addr, poll_id, &token, Some(choices[1])).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let (choice_id, count) = vote_row(&db, user_id, poll_id).await.unwrap();
    assert_eq!(choice_id, choices[1], "vote should follow the latest cast");
    assert_eq!(count, 1, "re-voting must not add a row");
}

#[tokio::test]
#[ignore = "requires a live Postgres (set DATABASE_URL)"]
async fn revote_for_the_same_choice_is_idempotent() {
    let (addr, db) = serve().await;
    let username = unique("voter");
    let user_id = create_user(&db, &username, "banana123").await;
    let (poll_id, choices) = create_poll(&db, &unique("Select a number"), 0, 7, &["1", "2"]).await;
    let token = token_for(user_id, &username);

    post_vote(&addr, poll_id, &token, Some(choices[0])).await;
    post_vote(&addr, poll_id, &token, Some(choices[0])).await;

    let (choice_id, count) = vote_row(&db, user_id, poll_id).await.unwrap();
    assert_eq!(choice_id, choices[0]);
    assert_eq!(count, 1);
}

#[tokio::test]
#[ignore = "requires a live Postgres (set DATABASE_URL)"]
async fn missing_choice_redisplays_the_form() {
    let (addr, db) = serve().await;
    let username = unique("voter");
    let user_id = create_user(&db, &username, "banana123").await;
    let (poll_id, _) = create_poll(&db, &unique("Select a number"), 0, 7, &["1", "2"]).await;

    let response = post_vote(&addr, poll_id, &token_for(user_id, &username), None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "You didn't select a choice");
    assert!(body["choices"].as_array().is_some_and(|c| c.len() == 2));

    assert!(vote_row(&db, user_id, poll_id).await.is_none());
}

#[tokio::test]
#[ignore = "requires a live Postgres (set DATABASE_URL)"]
async fn choice_from_another_poll_is_rejected() {
    let (addr, db) = serve().await;
    let username = unique("voter");
    let user_id = create_user(&db, &username, "banana123").await;
    let (poll_x, _) = create_poll(&db, &unique("Poll X"), 0, 7, &["1", "2"]).await;
    let (_, other_choices) = create_poll(&db, &unique("Poll Y"), 0, 7, &["a", "b"]).await;

    let response = post_vote(
        &addr,
        poll_x,
        &token_for(user_id, &username),
        Some(other_choices[0]),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "That choice is not part of this poll");
    assert!(vote_row(&db, user_id, poll_x).await.is_none());
}

#[tokio::test]
#[ignore = "requires a live Postgres (set DATABASE_URL)"]
async fn closed_poll_rejects_votes_with_a_redirect() {
    let (addr, db) = serve().await;
    let username = unique("voter");
    let user_id = create_user(&db, &username, "banana123").await;
    let (poll_id, choices) = create_poll(&db, &unique("Old poll"), -5, -2, &["1", "2"]).await;

    let response = post_vote(&addr, poll_id, &token_for(user_id, &username), Some(choices[0])).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with("/polls?flash="));
    assert!(vote_row(&db, user_id, poll_id).await.is_none());
}

#[tokio::test]
#[ignore = "requires a live Postgres (set DATABASE_URL)"]
async fn closed_and_future_polls_bounce_off_the_detail_page() {
    let (addr, db) = serve().await;
    let (closed, _) = create_poll(&db, &unique("Old poll"), -5, -2, &["1", "2"]).await;
    let (future, _) = create_poll(&db, &unique("Future poll"), 3, 5, &["1", "2"]).await;

    for poll_id in [closed, future] {
        let response = client()
            .get(format!("http://{addr}/polls/{poll_id}"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert!(location(&response).starts_with("/polls?flash="));
    }
}

#[tokio::test]
#[ignore = "requires a live Postgres (set DATABASE_URL)"]
async fn unknown_poll_redirects_to_the_list() {
    let (addr, _) = serve().await;
    let response = client()
        .get(format!("http://{addr}/polls/999999999"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with("/polls?flash="));
}

#[tokio::test]
#[ignore = "requires a live Postgres (set DATABASE_URL)"]
async fn unauthenticated_voting_redirects_to_login() {
    let (addr, db) = serve().await;
    let (poll_id, choices) = create_poll(&db, &unique("Select a number"), 0, 7, &["1", "2"]).await;

    let form_page = client()
        .get(format!("http://{addr}/polls/{poll_id}/vote"))
        .send()
        .await
        .unwrap();
    assert_eq!(form_page.status(), StatusCode::SEE_OTHER);
    assert!(location(&form_page).starts_with("/auth/login?flash="));

    let response = client()
        .post(format!("http://{addr}/polls/{poll_id}/vote"))
        .form(&[("choice", choices[0].to_string())])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with("/auth/login?flash="));
}

#[tokio::test]
#[ignore = "requires a live Postgres (set DATABASE_URL)"]
async fn login_issues_a_usable_token() {
    let (addr, db) = serve().await;
    let username = unique("minion12");
    create_user(&db, &username, "banana123").await;
    let (poll_id, _) = create_poll(&db, &unique("Select a number"), 0, 7, &["1", "2"]).await;

    let response = client()
        .post(format!("http://{addr}/auth/login"))
        .json(&serde_json::json!({ "username": username, "password": "banana123" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    let token = body["token"].as_str().unwrap();

    let form_page = client()
        .get(format!("http://{addr}/polls/{poll_id}/vote"))
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .send()
        .await
        .unwrap();
    assert_eq!(form_page.status(), StatusCode::OK);
    let body: serde_json::Value = form_page.json().await.unwrap();
    assert!(body["choices"].as_array().is_some_and(|c| c.len() == 2));
}

#[tokio::test]
#[ignore = "requires a live Postgres (set DATABASE_URL)"]
async fn bad_password_bounces_back_to_login() {
    let (addr, db) = serve().await;
    let username = unique("minion12");
    create_user(&db, &username, "banana123").await;

    let response = client()
        .post(format!("http://{addr}/auth/login"))
        .json(&serde_json::json!({ "username": username, "password": "banana124" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with("/auth/login?flash="));
}

#[tokio::test]
#[ignore = "requires a live Postgres (set DATABASE_URL)"]
async fn detail_page_reports_the_current_vote() {
    let (addr, db) = serve().await;
    let username = unique("voter");
    let user_id = create_user(&db, &username, "banana123").await;
    let (poll_id, choices) = create_poll(&db, &unique("Select a number"), 0, 7, &["1", "2"]).await;
    let token = token_for(user_id, &username);

    post_vote(&addr, poll_id, &token, Some(choices[1])).await;

    let response = client()
        .get(format!("http://{addr}/polls/{poll_id}"))
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["current_choice"], choices[1]);
}

#[tokio::test]
#[ignore = "requires a live Postgres (set DATABASE_URL)"]
async fn results_tally_votes_per_choice() {
    let (addr, db) = serve().await;
    let alice = unique("alice");
    let bob = unique("bob");
    let alice_id = create_user(&db, &alice, "banana123").await;
    let bob_id = create_user(&db, &bob, "banana123").await;
    let (poll_id, choices) = create_poll(&db, &unique("Select a number"), 0, 7, &["1", "2"]).await;

    post_vote(&addr, poll_id, &token_for(alice_id, &alice), Some(choices[0])).await;
    post_vote(&addr, poll_id, &token_for(bob_id, &bob), Some(choices[0])).await;

    let response = client()
        .get(format!("http://{addr}/polls/{poll_id}/results"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["total_votes"], 2);
    let tallies = body["choices"].as_array().unwrap();
    assert_eq!(tallies[0]["votes"], 2);
    assert_eq!(tallies[1]["votes"], 0);
}

#[tokio::test]
#[ignore = "requires a live Postgres (set DATABASE_URL)"]
async fn flash_messages_echo_on_the_list_page() {
    let (addr, _) = serve().await;
    let response = client()
        .get(format!("http://{addr}/polls?flash=You%20can%27t%20vote%20on%20this%20poll"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["message"], "You can't vote on this poll");
}

#[tokio::test]
#[ignore = "requires a live Postgres (set DATABASE_URL)"]
async fn list_orders_newest_publication_first() {
    let (addr, db) = serve().await;
    let (older, _) = create_poll(&db, &unique("Past question 1"), -5, 3, &["1", "2"]).await;
    let (newer, _) = create_poll(&db, &unique("Past question 2"), -4, 3, &["1", "2"]).await;

    let response = client()
        .get(format!("http://{addr}/polls"))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = response.json().await.unwrap();
    let ids: Vec<i64> = body["polls"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_i64().unwrap())
        .collect();

    let newer_pos = ids.iter().position(|&id| id == newer).unwrap();
    let older_pos = ids.iter().position(|&id| id == older).unwrap();
    assert!(newer_pos < older_pos, "newer publication must come first");
}

#[tokio::test]
#[ignore = "requires a live Postgres (set DATABASE_URL)"]
async fn anonymous_logout_is_fine() {
    let (addr, _) = serve().await;
    let response = client()
        .post(format!("http://{addr}/auth/logout"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

use std::env;

use chrono::{Duration, Utc};
use serde::Deserialize;

use polls::{auth::hash_password, connect_db};

#[derive(Debug, Deserialize)]
struct SeedFile {
    #[serde(default)]
    users: Vec<SeedUser>,
    #[serde(default)]
    polls: Vec<SeedPoll>,
}

#[derive(Debug, Deserialize)]
struct SeedUser {
    username: String,
    #[serde(default)]
    display_name: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct SeedPoll {
    question: String,
    /// Days from now until the poll opens; negative for already-open polls.
    publish_in_days: i64,
    /// Days from now until the poll closes.
    close_in_days: i64,
    choices: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let db = connect_db(&database_url).await?;
    sqlx::migrate!("./migrations").run(&db).await?;

    println!("Connected to database!");

    let path = env::args().nth(1).unwrap_or_else(|| "polls.json".to_string());
    let content = std::fs::read_to_string(&path)
        .expect("Failed to read the seed file - pass a path or provide polls.json");
    let seed: SeedFile = serde_json::from_str(&content)?;

    let mut count = 0;
    let mut skipped = 0;

    for user in &seed.users {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)")
                .bind(&user.username)
                .fetch_one(&db)
                .await?;

        if exists {
            println!("⊘ Skipped (existing user): {}", user.username);
            skipped += 1;
            continue;
        }

        let password_hash = hash_password(&user.password)?;
        sqlx::query("INSERT INTO users (username, display_name, password_hash) VALUES ($1, $2, $3)")
            .bind(&user.username)
            .bind(&user.display_name)
            .bind(&password_hash)
            .execute(&db)
            .await?;

        count += 1;
        println!("✓ Created user: {}", user.username);
    }

    for poll in &seed.polls {
        if poll.choices.len() < 2 {
            println!("⊘ Skipped (needs at least 2 choices): {}", poll.question);
            skipped += 1;
            continue;
        }
        if poll.close_in_days < poll.publish_in_days {
            println!("⊘ Skipped (closes before it opens): {}", poll.question);
            skipped += 1;
            continue;
        }

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM polls WHERE question = $1)")
                .bind(&poll.question)
                .fetch_one(&db)
                .await?;

        if exists {
            println!("⊘ Skipped (duplicate): {}", poll.question);
            skipped += 1;
            continue;
        }

        let now = Utc::now();
        let poll_id: i64 = sqlx::query_scalar(
            "INSERT INTO polls (question, publish_at, close_at) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(&poll.question)
        .bind(now + Duration::days(poll.publish_in_days))
        .bind(now + Duration::days(poll.close_in_days))
        .fetch_one(&db)
        .await?;

        for text in &poll.choices {
            sqlx::query("INSERT INTO choices (poll_id, text) VALUES ($1, $2)")
                .bind(poll_id)
                .bind(text)
                .execute(&db)
                .await?;
        }

        count += 1;
        println!("✓ Loaded: {}", poll.question);
    }

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✓ Successfully loaded {} new entries!", count);
    if skipped > 0 {
        println!("⊘ Skipped {} existing or invalid entries", skipped);
    }
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");

    Ok(())
}

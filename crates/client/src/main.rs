mod models;

use colored::*;
use models::*;
use std::env;
use std::io::{self, Write};

fn backend_url() -> String {
    env::var("BACKEND_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
}

// ===== Main =====

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    println!("{}", "=".repeat(60).bright_cyan());
    println!("{}", "    🗳️  POLLS 🗳️".bright_yellow().bold());
    println!("{}", "=".repeat(60).bright_cyan());
    println!();

    let client = reqwest::Client::new();

    let login = match authenticate(&client).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("{} {}", "❌ Login failed:".red().bold(), e);
            return Ok(());
        }
    };

    let name = if login.display_name.is_empty() {
        login.username.clone()
    } else {
        login.display_name.clone()
    };
    println!("{}", format!("✅ Welcome, {name}!").green().bold());
    println!();

    poll_loop(&client, &login.token).await?;

    logout(&client, &login.token).await;
    println!();
    println!("{}", "Thanks for voting! 👋".bright_cyan().bold());
    Ok(())
}

// ===== Authentication =====

async fn authenticate(client: &reqwest::Client) -> anyhow::Result<LoginResponse> {
    let username = prompt("Username: ")?;
    let password = prompt("Password: ")?;

    let response = client
        .post(format!("{}/auth/login", backend_url()))
        .json(&LoginRequest { username, password })
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await?;
        anyhow::bail!("API error ({}): {}", status, text);
    }

    // A failed login bounces to the login page payload instead of a token.
    let body: serde_json::Value = response.json().await?;
    if body.get("token").is_none() {
        let message = body["message"].as_str().unwrap_or("invalid credentials");
        anyhow::bail!("{message}");
    }

    Ok(serde_json::from_value(body)?)
}

async fn logout(client: &reqwest::Client, token: &str) {
    let _ = client
        .post(format!("{}/auth/logout", backend_url()))
        .header("Authorization", format!("Bearer {token}"))
        .send()
        .await;
}

// ===== Poll browsing =====

async fn poll_loop(client: &reqwest::Client, token: &str) -> anyhow::Result<()> {
    loop {
        let list = fetch_polls(client).await?;

        println!("{}", "━".repeat(60).bright_black());
        if let Some(message) = &list.message {
            println!("{}", message.yellow());
        }
        if list.polls.is_empty() {
            println!("{}", "No polls are available.".bright_black());
        }
        for (i, poll) in list.polls.iter().enumerate() {
            let status = if poll.open {
                "open".green()
            } else if !poll.published {
                "not yet published".bright_black()
            } else {
                "closed".red()
            };
            let marker = if poll.recently_published { " • new" } else { "" };
            println!(
                "{}. {} ({}){}",
                (i + 1).to_string().bright_cyan(),
                poll.question.bright_white().bold(),
                status,
                marker.bright_yellow()
            );
        }
        println!();
        println!("{}", "Pick a poll number, or [Q]uit".bright_black());

        let input = prompt(&"> ".bright_green().bold().to_string())?;
        match input.to_lowercase().as_str() {
            "q" | "quit" => return Ok(()),
            other => match other.parse::<usize>() {
                Ok(n) if n >= 1 && n <= list.polls.len() => {
                    poll_menu(client, token, &list.polls[n - 1]).await?;
                }
                _ => println!("{}", "Invalid choice. Please try again.".red()),
            },
        }
    }
}

async fn poll_menu(
    client: &reqwest::Client,
    token: &str,
    poll: &PollSummary,
) -> anyhow::Result<()> {
    loop {
        let Some(detail) = fetch_poll(client, token, poll.id).await? else {
            // Bounced back to the list; the loop above reprints the flash.
            return Ok(());
        };

        println!();
        println!("{}", detail.question.bright_yellow().bold());
        for (i, choice) in detail.choices.iter().enumerate() {
            let marker = if detail.current_choice == Some(choice.id) {
                "  ← your vote".green().to_string()
            } else {
                String::new()
            };
            println!(
                "  {}. {}{}",
                (i + 1).to_string().bright_cyan(),
                choice.text,
                marker
            );
        }
        println!();
        println!(
            "{}",
            "Pick a choice number to vote, [R]esults, [B]ack".bright_black()
        );

        let input = prompt(&"> ".bright_green().bold().to_string())?;
        match input.to_lowercase().as_str() {
            "b" | "back" => return Ok(()),
            "r" | "results" => {
                show_results(client, poll.id).await?;
            }
            other => match other.parse::<usize>() {
                Ok(n) if n >= 1 && n <= detail.choices.len() => {
                    submit_vote(client, token, poll.id, detail.choices[n - 1].id).await?;
                }
                _ => println!("{}", "Invalid choice. Please try again.".red()),
            },
        }
    }
}

// ===== API Calls =====

async fn fetch_polls(client: &reqwest::Client) -> anyhow::Result<PollList> {
    let response = client
        .get(format!("{}/polls", backend_url()))
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await?;
        anyhow::bail!("API error ({}): {}", status, text);
    }

    Ok(response.json().await?)
}

/// None when the server bounced the request back to the poll list (closed or
/// vanished poll).
async fn fetch_poll(
    client: &reqwest::Client,
    token: &str,
    poll_id: i64,
) -> anyhow::Result<Option<PollDetail>> {
    let response = client
        .get(format!("{}/polls/{}", backend_url(), poll_id))
        .header("Authorization", format!("Bearer {token}"))
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await?;
        anyhow::bail!("API error ({}): {}", status, text);
    }

    let body: serde_json::Value = response.json().await?;
    if body.get("polls").is_some() {
        if let Some(message) = body["message"].as_str() {
            println!("{}", message.yellow());
        }
        return Ok(None);
    }

    Ok(Some(serde_json::from_value(body)?))
}

async fn submit_vote(
    client: &reqwest::Client,
    token: &str,
    poll_id: i64,
    choice_id: i64,
) -> anyhow::Result<()> {
    let response = client
        .post(format!("{}/polls/{}/vote", backend_url(), poll_id))
        .header("Authorization", format!("Bearer {token}"))
        .form(&[("choice", choice_id.to_string())])
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await?;
        anyhow::bail!("Vote failed ({}): {}", status, text);
    }

    let body: serde_json::Value = response.json().await?;
    if let Some(error) = body["error"].as_str() {
        println!("{} {}", "✗".red(), error.red());
        return Ok(());
    }
    if body.get("polls").is_some() {
        // Bounced to the poll list instead; voting must have closed.
        if let Some(message) = body["message"].as_str() {
            println!("{}", message.yellow());
        }
        return Ok(());
    }

    // The redirect after the POST already landed on the results page.
    println!("{}", "✓ Vote recorded".green());
    print_results(&serde_json::from_value(body)?);
    Ok(())
}

async fn show_results(client: &reqwest::Client, poll_id: i64) -> anyhow::Result<()> {
    let response = client
        .get(format!("{}/polls/{}/results", backend_url(), poll_id))
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await?;
        anyhow::bail!("API error ({}): {}", status, text);
    }

    print_results(&response.json().await?);
    Ok(())
}

fn print_results(results: &PollResults) {
    println!();
    println!("{}", "=".repeat(60).bright_cyan());
    println!("{}", "    📊 RESULTS".bright_yellow().bold());
    println!("{}", "=".repeat(60).bright_cyan());
    println!("{}", results.question.bright_white().bold());
    for tally in &results.choices {
        println!(
            "  {} — {} {}",
            tally.text,
            tally.votes.to_string().yellow(),
            if tally.votes == 1 { "vote" } else { "votes" }
        );
    }
    println!(
        "{}",
        format!("  {} ballots in total", results.total_votes).bright_black()
    );
    println!();
}

// ===== Input =====

fn prompt(label: &str) -> anyhow::Result<String> {
    print!("{label}");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

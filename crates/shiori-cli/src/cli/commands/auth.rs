//! Session command handlers.

use std::io::BufRead;

use anyhow::{Context, Result};
use shiori_core::SessionClient;
use shiori_core::auth::{self, LoginOutcome};

pub async fn login(client: &SessionClient, email: &str, password: Option<String>) -> Result<()> {
    let password = match password {
        Some(password) => password,
        None => read_password()?,
    };

    match auth::login(client, email, &password).await.context("sign in")? {
        LoginOutcome::SignedIn => {
            println!("Signed in as {}", email.trim());
            Ok(())
        }
        LoginOutcome::InvalidCredentials => anyhow::bail!("Invalid email or password"),
        LoginOutcome::EmailNotVerified => anyhow::bail!("Email address is not verified yet"),
        LoginOutcome::Failed { status, message } => match message {
            Some(message) => anyhow::bail!("Sign-in failed (HTTP {status}): {message}"),
            None => anyhow::bail!("Sign-in failed (HTTP {status})"),
        },
    }
}

fn read_password() -> Result<String> {
    eprint!("Password: ");
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("read password from stdin")?;

    let password = line.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        anyhow::bail!("No password given");
    }
    Ok(password.to_string())
}

pub async fn whoami(client: &SessionClient) -> Result<()> {
    let user = auth::current_user(client)
        .await
        .context("fetch current user")?;
    match user {
        Some(user) => {
            println!("{} <{}>", user.name, user.email);
            println!("id: {}", user.id);
            Ok(())
        }
        None => anyhow::bail!("Not signed in"),
    }
}

pub async fn logout(client: &SessionClient) -> Result<()> {
    auth::logout(client).await.context("log out")?;
    println!("Logged out");
    Ok(())
}

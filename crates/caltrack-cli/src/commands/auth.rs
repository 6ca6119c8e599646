use caltrack_core::{StoredToken, TokenOrigin};
use chrono::{TimeZone, Utc};
use clap::Subcommand;

#[derive(Subcommand)]
pub enum AuthAction {
    /// Store a Google access token obtained elsewhere
    Login {
        /// OAuth access token with calendar read scope
        #[arg(long)]
        token: String,
        /// Seconds until the token expires
        #[arg(long)]
        expires_in: Option<i64>,
    },
    /// Remove the stored token
    Logout,
    /// Check authentication status
    Status,
}

pub fn run(action: AuthAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        AuthAction::Login { token, expires_in } => {
            let token = token.trim();
            if token.is_empty() {
                return Err("--token must not be empty".into());
            }
            StoredToken::new(token, expires_in).save()?;
            println!("Google token stored");
        }
        AuthAction::Logout => {
            StoredToken::delete()?;
            println!("Google token removed");
        }
        AuthAction::Status => match StoredToken::lookup()? {
            None => println!("not authenticated"),
            Some((token, origin)) => {
                let from = match origin {
                    TokenOrigin::Environment => "environment",
                    TokenOrigin::Keyring => "keyring",
                };
                let state = if token.is_expired() { "expired" } else { "authenticated" };
                match token.expires_at.and_then(|ts| Utc.timestamp_opt(ts, 0).single()) {
                    Some(at) => println!("{state} ({from}, expires {})", at.to_rfc3339()),
                    None => println!("{state} ({from})"),
                }
            }
        },
    }
    Ok(())
}

//! Session identity and token storage
//!
//! A session is token possession: the store trusts whoever presents a
//! valid bearer token for a user id. Tokens are issued out of band and
//! handed to `login`.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::Config;

/// Stored bearer token with optional expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    pub token: String,
    pub expires_at: Option<u64>,
}

impl StoredToken {
    pub fn new(token: String, expires_in_secs: Option<u64>) -> Self {
        let expires_at = expires_in_secs.map(|secs| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_secs()
                + secs
        });

        Self { token, expires_at }
    }

    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(exp) => {
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap()
                    .as_secs();
                // Consider expired if less than 5 minutes remaining
                now + 300 >= exp
            }
            None => false,
        }
    }
}

/// Store a session.
pub fn login(uid: &str, email: &str, token: &str, expires_in: Option<u64>) -> Result<()> {
    let mut config = Config::load()?;
    config.set_session(uid, email, token, expires_in);
    config.save()?;
    println!("Logged in as {} <{}>.", uid, email);
    Ok(())
}

/// Clear the stored session.
pub fn logout() -> Result<()> {
    let mut config = Config::load()?;
    config.clear_session();
    config.save()?;
    println!("Logged out.");
    Ok(())
}

/// Display current auth and device state.
pub fn status() -> Result<()> {
    let config = Config::load()?;

    match config.get_session_token() {
        Some(token) if !token.is_expired() => {
            println!("Session:      valid");
            if let Some(exp) = token.expires_at {
                println!("  expires_at: {}", exp);
            }
        }
        Some(_) => {
            println!("Session:      expired");
        }
        None => {
            println!("Session:      none");
        }
    }

    match (config.uid(), config.email()) {
        (Some(uid), Some(email)) => println!("User:         {} <{}>", uid, email),
        (Some(uid), None) => println!("User:         {}", uid),
        _ => println!("User:         none"),
    }

    match config.get_device_token() {
        Some(_) => println!("Device token: present"),
        None => println!("Device token: none"),
    }

    println!("Store:        {}", config.store_url());
    println!("Push gateway: {}", config.push_endpoint());

    if config.get_session_token().is_none() {
        println!("\nRun 'herald-cli login' to authenticate.");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_without_expiry_never_expires() {
        let token = StoredToken {
            token: "t".into(),
            expires_at: None,
        };
        assert!(!token.is_expired());
    }

    #[test]
    fn test_token_expiry_slack() {
        // Expires in 10 minutes: still valid.
        let token = StoredToken::new("t".into(), Some(600));
        assert!(!token.is_expired());

        // Expires in 1 minute: inside the 5-minute slack, treated expired.
        let token = StoredToken::new("t".into(), Some(60));
        assert!(token.is_expired());
    }
}

//! API key storage and lookup.
//!
//! The key is resolved from `GRAMFIX_API_KEY`, then `OPENAI_API_KEY`, then the
//! system keyring. A missing key is not fatal: sends fail later with a
//! configuration error instead.

use std::error::Error;
use std::fmt;
use std::io::{self, Write};

use keyring::Entry;
use ratatui::crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use ratatui::crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use tracing::warn;

use crate::core::constants::{API_KEY_ENV, FALLBACK_API_KEY_ENV};
use crate::core::keyring::KeyringAccessError;

const KEYRING_SERVICE: &str = "gramfix";
const KEYRING_USER: &str = "api-key";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Environment(&'static str),
    Keyring,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Environment(var) => write!(f, "environment ({var})"),
            CredentialSource::Keyring => write!(f, "system keyring"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub api_key: String,
    pub source: CredentialSource,
}

/// Look up the API key in the environment, skipping blank values.
pub fn credential_from_env(lookup: impl Fn(&str) -> Option<String>) -> Option<Credential> {
    [API_KEY_ENV, FALLBACK_API_KEY_ENV]
        .into_iter()
        .find_map(|var| {
            lookup(var)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .map(|api_key| Credential {
                    api_key,
                    source: CredentialSource::Environment(var),
                })
        })
}

pub struct AuthManager {
    use_keyring: bool,
}

impl AuthManager {
    pub fn new() -> Self {
        Self::new_with_keyring(true)
    }

    /// Construct an AuthManager, optionally disabling keyring access
    pub fn new_with_keyring(use_keyring: bool) -> Self {
        Self { use_keyring }
    }

    fn entry() -> Result<Entry, KeyringAccessError> {
        Ok(Entry::new(KEYRING_SERVICE, KEYRING_USER)?)
    }

    pub fn get_stored_key(&self) -> Result<Option<String>, KeyringAccessError> {
        if !self.use_keyring {
            return Ok(None);
        }
        match Self::entry()?.get_password() {
            Ok(key) => Ok(Some(key)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub fn store_key(&self, api_key: &str) -> Result<(), KeyringAccessError> {
        Self::entry()?.set_password(api_key)?;
        Ok(())
    }

    /// Returns `false` when no key was stored.
    pub fn remove_key(&self) -> Result<bool, KeyringAccessError> {
        match Self::entry()?.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Resolve the credential for this process.
    ///
    /// Keyring failures are logged and treated as "no key".
    pub fn resolve_credential(&self) -> Option<Credential> {
        if let Some(credential) = credential_from_env(|var| std::env::var(var).ok()) {
            return Some(credential);
        }

        match self.get_stored_key() {
            Ok(Some(api_key)) if !api_key.trim().is_empty() => Some(Credential {
                api_key: api_key.trim().to_string(),
                source: CredentialSource::Keyring,
            }),
            Ok(_) => None,
            Err(err) => {
                warn!(error = %err, "could not read API key from keyring");
                None
            }
        }
    }

    pub fn interactive_auth(&self) -> Result<(), Box<dyn Error>> {
        println!("gramfix authentication setup");
        println!();
        println!("Paste the API key for your OpenAI-compatible provider.");
        println!("It is stored in the system keyring, not in the config file.");

        let key = prompt_masked_input("API key: ")?;
        if key.is_empty() {
            return Err("API key cannot be empty".into());
        }
        self.store_key(&key)?;
        println!("✅ API key saved to the system keyring");
        Ok(())
    }

    pub fn interactive_deauth(&self) -> Result<(), Box<dyn Error>> {
        print!("Remove the stored API key? [y/N]: ");
        io::stdout().flush()?;
        let mut answer = String::new();
        io::stdin().read_line(&mut answer)?;
        if !parse_confirmation(&answer) {
            println!("Cancelled.");
            return Ok(());
        }

        if self.remove_key()? {
            println!("✅ API key removed from the system keyring");
        } else {
            println!("No stored API key found.");
        }
        Ok(())
    }
}

impl Default for AuthManager {
    fn default() -> Self {
        Self::new()
    }
}

/// `y`/`yes` (any case) confirms; anything else, including empty input, declines.
pub fn parse_confirmation(input: &str) -> bool {
    matches!(input.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Read a line in raw mode, echoing `*` for each character.
fn prompt_masked_input(prompt: &str) -> Result<String, Box<dyn Error>> {
    print!("{prompt}");
    io::stdout().flush()?;

    enable_raw_mode()?;
    let result = read_masked_line();
    disable_raw_mode()?;
    println!();
    result
}

fn read_masked_line() -> Result<String, Box<dyn Error>> {
    let mut value = String::new();
    loop {
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        match key.code {
            KeyCode::Enter => return Ok(value.trim().to_string()),
            KeyCode::Esc => return Err("cancelled".into()),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return Err("cancelled".into())
            }
            KeyCode::Backspace => {
                if value.pop().is_some() {
                    print!("\u{8} \u{8}");
                }
            }
            KeyCode::Char(ch) => {
                value.push(ch);
                print!("*");
            }
            _ => continue,
        }
        io::stdout().flush()?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_env_var_wins() {
        let credential = credential_from_env(|var| match var {
            API_KEY_ENV => Some("primary".into()),
            FALLBACK_API_KEY_ENV => Some("fallback".into()),
            _ => None,
        })
        .expect("credential");
        assert_eq!(credential.api_key, "primary");
        assert_eq!(credential.source, CredentialSource::Environment(API_KEY_ENV));
    }

    #[test]
    fn blank_primary_falls_back_to_openai_var() {
        let credential = credential_from_env(|var| match var {
            API_KEY_ENV => Some("   ".into()),
            FALLBACK_API_KEY_ENV => Some(" sk-test \n".into()),
            _ => None,
        })
        .expect("credential");
        assert_eq!(credential.api_key, "sk-test");
        assert_eq!(
            credential.source,
            CredentialSource::Environment(FALLBACK_API_KEY_ENV)
        );
    }

    #[test]
    fn no_env_vars_means_no_credential() {
        assert!(credential_from_env(|_| None).is_none());
    }

    #[test]
    fn disabled_keyring_reports_no_key() {
        let manager = AuthManager::new_with_keyring(false);
        assert!(matches!(manager.get_stored_key(), Ok(None)));
    }

    #[test]
    fn confirmation_parsing() {
        assert!(parse_confirmation("y"));
        assert!(parse_confirmation(" YES \n"));
        assert!(!parse_confirmation(""));
        assert!(!parse_confirmation("nope"));
    }

    #[test]
    fn credential_source_display() {
        assert_eq!(
            CredentialSource::Environment(API_KEY_ENV).to_string(),
            "environment (GRAMFIX_API_KEY)"
        );
        assert_eq!(CredentialSource::Keyring.to_string(), "system keyring");
    }
}

use crate::defense::CredentialVerifier;
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use std::{collections::HashMap, fs, path::Path};

/// In-memory credential store. Passwords stay wrapped in `SecretString`
/// and are only exposed for the comparison itself.
pub struct StaticUsers {
    users: HashMap<String, SecretString>,
}

impl StaticUsers {
    /// The built-in demo accounts, used when no user file is given.
    #[must_use]
    pub fn demo() -> Self {
        let users = [
            ("admin", "admin123"),
            ("user", "password"),
            ("test", "test123"),
            ("demo", "demo456"),
        ]
        .into_iter()
        .map(|(name, secret)| (name.to_string(), SecretString::from(secret)))
        .collect();

        Self { users }
    }

    /// Load accounts from a JSON object mapping username to password.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read users file {}", path.display()))?;
        let plain: HashMap<String, String> = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse users file {}", path.display()))?;

        let users = plain
            .into_iter()
            .map(|(name, secret)| (name, SecretString::from(secret)))
            .collect();

        Ok(Self { users })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl CredentialVerifier for StaticUsers {
    fn check(&self, account: &str, secret: &str) -> bool {
        self.users
            .get(account)
            .is_some_and(|stored| stored.expose_secret() == secret)
    }
}

use std::collections::HashMap;
use std::fmt;

use crate::error::AgentError;

/// Secrets looked up from the environment once, at startup.
#[derive(Clone, Default)]
pub struct Credentials {
    values: HashMap<String, String>,
}

impl Credentials {
    /// Read the named variables. Unset or blank variables are left out.
    pub fn from_env<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut values = HashMap::new();
        for name in names {
            let name = name.as_ref();
            if let Ok(value) = std::env::var(name) {
                if !value.trim().is_empty() {
                    values.insert(name.to_string(), value);
                }
            }
        }
        Self { values }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Fail with every missing name listed.
    pub fn require(&self, names: &[String]) -> Result<(), AgentError> {
        let missing: Vec<&str> = names
            .iter()
            .map(String::as_str)
            .filter(|n| self.get(n).is_none())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(AgentError::Configuration(format!(
                "Missing environment variable(s): {}. Please set them before running.",
                missing.join(", ")
            )))
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.values.keys().collect();
        keys.sort();
        f.debug_struct("Credentials").field("keys", &keys).finish()
    }
}

//! Per-user settings grouped by module.
//!
//! Hosts persist one JSON document per user; each module owns a scope
//! (`"Mail"`, `"Contacts"`, ...) with free-form keys.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Key-value settings scoped by module name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleSettings {
    scopes: BTreeMap<String, BTreeMap<String, serde_json::Value>>,
}

impl ModuleSettings {
    /// Creates empty settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads settings from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Serde`] if the document is not an object of
    /// objects.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes the settings to JSON.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Serde`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Reads a typed value. Missing keys yield `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Serde`] if the stored value has a different
    /// shape than `T`.
    pub fn get<T: DeserializeOwned>(&self, module: &str, key: &str) -> Result<Option<T>> {
        self.scopes
            .get(module)
            .and_then(|scope| scope.get(key))
            .map(|value| serde_json::from_value(value.clone()))
            .transpose()
            .map_err(Into::into)
    }

    /// Stores a typed value, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Serde`] if `value` cannot be represented as
    /// JSON.
    pub fn set<T: Serialize>(&mut self, module: &str, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.scopes
            .entry(module.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    /// Removes a key. Empty scopes are dropped.
    pub fn remove(&mut self, module: &str, key: &str) {
        if let Some(scope) = self.scopes.get_mut(module) {
            scope.remove(key);
            if scope.is_empty() {
                self.scopes.remove(module);
            }
        }
    }

    /// Returns true if the module has any settings.
    #[must_use]
    pub fn has_scope(&self, module: &str) -> bool {
        self.scopes.contains_key(module)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_get_set() {
        let mut settings = ModuleSettings::new();
        settings.set("Mail", "AlwaysShowImages", &true).unwrap();
        settings.set("Mail", "SignatureSuffixes", &vec![".asc", ".sig"]).unwrap();

        assert_eq!(settings.get::<bool>("Mail", "AlwaysShowImages").unwrap(), Some(true));
        assert_eq!(
            settings.get::<Vec<String>>("Mail", "SignatureSuffixes").unwrap(),
            Some(vec![".asc".to_string(), ".sig".to_string()])
        );
        assert_eq!(settings.get::<bool>("Contacts", "AlwaysShowImages").unwrap(), None);
    }

    #[test]
    fn test_wrong_shape_is_an_error() {
        let mut settings = ModuleSettings::new();
        settings.set("Mail", "BodyTextLimit", &"lots").unwrap();
        assert!(settings.get::<u32>("Mail", "BodyTextLimit").is_err());
    }

    #[test]
    fn test_json_layout() {
        let settings = ModuleSettings::from_json(r#"{"Mail":{"XMailer":"postern"}}"#).unwrap();
        assert_eq!(
            settings.get::<String>("Mail", "XMailer").unwrap().as_deref(),
            Some("postern")
        );
        assert_eq!(settings.to_json().unwrap(), r#"{"Mail":{"XMailer":"postern"}}"#);
    }

    #[test]
    fn test_remove_drops_empty_scope() {
        let mut settings = ModuleSettings::new();
        settings.set("Mail", "XMailer", &"postern").unwrap();
        settings.remove("Mail", "XMailer");
        assert!(!settings.has_scope("Mail"));
    }
}

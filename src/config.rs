//! Engine configuration.
//!
//! [`EngineConfig`] is passed explicitly into every session; there is no
//! process-wide state. [`EngineSettings`] is its serializable subset, read
//! from `.cascade.json` at the workspace root.

use crate::apply::HandlerRegistry;
use crate::cascade::PolicyRegistry;
use crate::error::{CascadeError, Result};
use crate::graph::TextSearch;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings file name inside a workspace directory.
pub const SETTINGS_FILE: &str = ".cascade.json";

/// Feature toggles and registries for a session.
#[derive(Debug)]
pub struct EngineConfig {
    /// Non-code search enabled for every session, on top of the request's own toggles.
    pub text_search: TextSearch,
    /// Validate new names against the language's identifier rules before applying.
    pub check_identifiers: bool,
    /// Treat overriders of a renamed field's accessors as overriding usages.
    pub accessor_overrides: bool,
    /// Cascade policies.
    pub policies: PolicyRegistry,
    /// Post-apply handlers.
    pub handlers: HandlerRegistry,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineSettings::default().into_config()
    }
}

/// Serializable engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSettings {
    /// Search comments and string literals by default.
    pub search_in_comments: bool,
    /// Search non-source files by default.
    pub search_text_occurrences: bool,
    /// Validate identifiers before applying.
    pub check_identifiers: bool,
    /// Report overriders of field accessors.
    pub accessor_overrides: bool,
    /// Enable the derived-name policy.
    pub rename_variables: bool,
    /// Enable the inheritor policy.
    pub rename_inheritors: bool,
    /// Rename files along with their top-level class.
    pub file_name_sync: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            search_in_comments: false,
            search_text_occurrences: false,
            check_identifiers: true,
            accessor_overrides: true,
            rename_variables: true,
            rename_inheritors: true,
            file_name_sync: true,
        }
    }
}

impl EngineSettings {
    /// Load settings from a workspace root.
    ///
    /// A missing file yields the defaults; an unreadable or malformed file is an error.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(SETTINGS_FILE);
        if !path.exists() {
            log::debug!("no {} in {}, using defaults", SETTINGS_FILE, root.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path).map_err(|e| CascadeError::io(&path, e))?;
        serde_json::from_str(&raw).map_err(|e| {
            CascadeError::Other(format!("Invalid settings file {}: {}", path.display(), e))
        })
    }

    /// Build the runtime configuration with the built-in registries.
    pub fn into_config(self) -> EngineConfig {
        let mut policies = PolicyRegistry::with_defaults();
        policies.set_enabled("rename_variables", self.rename_variables);
        policies.set_enabled("rename_inheritors", self.rename_inheritors);
        let handlers = if self.file_name_sync {
            HandlerRegistry::with_defaults()
        } else {
            HandlerRegistry::empty()
        };
        EngineConfig {
            text_search: TextSearch {
                comments_and_strings: self.search_in_comments,
                plain_text_files: self.search_text_occurrences,
            },
            check_identifiers: self.check_identifiers,
            accessor_overrides: self.accessor_overrides,
            policies,
            handlers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_settings_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = EngineSettings::load(dir.path()).unwrap();
        assert_eq!(settings, EngineSettings::default());
    }

    #[test]
    fn test_partial_settings_keep_other_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(SETTINGS_FILE),
            r#"{"search_in_comments": true, "rename_inheritors": false}"#,
        )
        .unwrap();
        let settings = EngineSettings::load(dir.path()).unwrap();
        assert!(settings.search_in_comments);
        assert!(!settings.rename_inheritors);
        assert!(settings.check_identifiers);

        let config = settings.into_config();
        let names: Vec<&str> = config.policies.enabled().map(|p| p.name()).collect();
        assert_eq!(names, vec!["accessors", "derived-names"]);
    }

    #[test]
    fn test_malformed_settings_are_an_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(SETTINGS_FILE), "{ not json").unwrap();
        assert!(EngineSettings::load(dir.path()).is_err());
    }
}

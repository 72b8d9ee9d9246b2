//! Custom query configuration files.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::custom_query::CustomQuery;

use super::validation::ConfigError;

/// A file of custom queries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomQueriesConfig {
    #[serde(default)]
    pub queries: Vec<CustomQuery>,
}

impl CustomQueriesConfig {
    /// Merge another CustomQueriesConfig into this one.
    #[must_use]
    pub fn merge(mut self, other: CustomQueriesConfig) -> Self {
        self.queries.extend(other.queries);
        self
    }

    /// Validate every query and require unique names.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen_names = HashSet::new();
        for query in &self.queries {
            query.validate().map_err(ConfigError::ValidationError)?;
            if !seen_names.insert(&query.name) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate custom query name: '{}'",
                    query.name
                )));
            }
        }
        Ok(())
    }

    /// Load custom queries from all YAML files in a directory.
    ///
    /// Files are read in name order so the resulting query order is stable.
    pub fn load_from_dir(dir_path: &str) -> Result<Self, ConfigError> {
        let dir = Path::new(dir_path);
        if !dir.exists() {
            return Err(ConfigError::ValidationError(format!(
                "custom_query_path '{}' does not exist",
                dir_path
            )));
        }
        if !dir.is_dir() {
            return Err(ConfigError::ValidationError(format!(
                "custom_query_path '{}' is not a directory",
                dir_path
            )));
        }

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            if ext == "yaml" || ext == "yml" {
                paths.push(path);
            }
        }
        paths.sort();

        let mut merged = Self::default();
        for path in paths {
            tracing::debug!("Loading custom queries from: {}", path.display());
            let content = std::fs::read_to_string(&path)?;
            let file_config: Self = serde_yaml::from_str(&content).map_err(|e| {
                ConfigError::ValidationError(format!("failed to parse '{}': {}", path.display(), e))
            })?;
            merged = merged.merge(file_config);
        }

        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(name: &str) -> CustomQuery {
        CustomQuery::new(name, "SELECT 1 AS n").with_metric_fields(["n"])
    }

    #[test]
    fn test_merge() {
        let merged = CustomQueriesConfig {
            queries: vec![query("a")],
        }
        .merge(CustomQueriesConfig {
            queries: vec![query("b"), query("c")],
        });
        assert_eq!(merged.queries.len(), 3);
    }

    #[test]
    fn test_validate_duplicate_names() {
        let config = CustomQueriesConfig {
            queries: vec![query("dup"), query("dup")],
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_validate_propagates_query_errors() {
        let config = CustomQueriesConfig {
            queries: vec![CustomQuery::new("empty", "SELECT 1")],
        };
        assert!(config.validate().unwrap_err().to_string().contains("metric field"));
    }

    #[test]
    fn test_load_from_dir_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("b.yml"),
            "queries:\n  - name: second\n    sql: SELECT 2 AS n\n    metric_fields: [n]\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("a.yaml"),
            "queries:\n  - name: first\n    sql: SELECT 1 AS n\n    metric_fields: [n]\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let config = CustomQueriesConfig::load_from_dir(dir.path().to_str().unwrap()).unwrap();
        let names: Vec<_> = config.queries.iter().map(|q| q.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn test_load_from_missing_dir() {
        let err = CustomQueriesConfig::load_from_dir("/nonexistent/queries").unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_load_from_dir_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.yaml"), "queries: [").unwrap();
        let err = CustomQueriesConfig::load_from_dir(dir.path().to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("failed to parse"));
    }
}

//! Trace-target configuration.
//!
//! The set of methods to instrument is described by a JSON document, `trace.json`,
//! located in the directory the `CLRTRACE_HOME` environment variable points at:
//!
//! ```json
//! {
//!   "instrumentation": [
//!     {
//!       "assemblyName": "MyApp",
//!       "className": "MyApp.Orders.OrderService",
//!       "methods": [
//!         { "methodName": "Submit", "paramsName": "System.String,System.Int32" }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! Configuration problems never abort the process: a missing or malformed document
//! degrades to an empty configuration with a warning, and the engine simply traces
//! nothing.

use std::path::Path;

use serde::Deserialize;

use crate::Result;

/// File name of the trace document inside the configuration home.
pub const TRACE_CONFIG_FILE: &str = "trace.json";

/// One method selected for tracing within a class entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceMethod {
    /// Simple method name, matched exactly
    pub method_name: String,
    /// Optional comma-separated parameter type names; empty matches any signature
    #[serde(default)]
    pub params_name: String,
}

impl TraceMethod {
    /// The configured parameter type names, or `None` when any signature matches.
    #[must_use]
    pub fn param_names(&self) -> Option<Vec<&str>> {
        if self.params_name.trim().is_empty() {
            None
        } else {
            Some(self.params_name.split(',').map(str::trim).collect())
        }
    }
}

/// One assembly/class entry with its selected methods.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceAssembly {
    /// Simple assembly name, matched exactly
    pub assembly_name: String,
    /// Namespace-qualified class name, matched exactly
    pub class_name: String,
    /// Methods to trace on that class
    #[serde(default)]
    pub methods: Vec<TraceMethod>,
}

/// The parsed trace-target document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceConfig {
    /// Entries in document order; evaluation is first-match-wins
    #[serde(default)]
    pub instrumentation: Vec<TraceAssembly>,
}

impl TraceConfig {
    /// Parses and normalizes a trace document.
    ///
    /// Entries without an assembly name, class name, or any usable method are
    /// dropped, as are methods without a name.
    ///
    /// # Errors
    /// Returns [`crate::Error::Json`] when the document is not valid JSON of the
    /// expected shape.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut config: TraceConfig = serde_json::from_str(json)?;

        config.instrumentation.retain_mut(|entry| {
            entry.methods.retain(|method| !method.method_name.is_empty());
            !entry.assembly_name.is_empty()
                && !entry.class_name.is_empty()
                && !entry.methods.is_empty()
        });

        Ok(config)
    }

    /// Loads `trace.json` from the configuration home, degrading to an empty
    /// configuration on any failure.
    #[must_use]
    pub fn load(home: &Path) -> Self {
        let path = home.join(TRACE_CONFIG_FILE);
        let json = match std::fs::read_to_string(&path) {
            Ok(json) => json,
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "trace config unreadable, tracing nothing");
                return TraceConfig::default();
            }
        };

        match TraceConfig::from_json(&json) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "trace config malformed, tracing nothing");
                TraceConfig::default()
            }
        }
    }

    /// Returns `true` when no targets are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instrumentation.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_document() {
        let json = r#"{
            "instrumentation": [
                {
                    "assemblyName": "MyApp",
                    "className": "MyApp.Orders.OrderService",
                    "methods": [
                        { "methodName": "Submit", "paramsName": "System.String,System.Int32" },
                        { "methodName": "Cancel" }
                    ]
                }
            ]
        }"#;

        let config = TraceConfig::from_json(json).unwrap();
        assert_eq!(config.instrumentation.len(), 1);
        let entry = &config.instrumentation[0];
        assert_eq!(entry.assembly_name, "MyApp");
        assert_eq!(entry.methods.len(), 2);
        assert_eq!(
            entry.methods[0].param_names(),
            Some(vec!["System.String", "System.Int32"])
        );
        assert_eq!(entry.methods[1].param_names(), None);
    }

    #[test]
    fn drops_unusable_entries() {
        let json = r#"{
            "instrumentation": [
                { "assemblyName": "", "className": "A.B", "methods": [{ "methodName": "M" }] },
                { "assemblyName": "App", "className": "A.B", "methods": [{ "methodName": "" }] },
                { "assemblyName": "App", "className": "A.B", "methods": [] },
                { "assemblyName": "App", "className": "A.C", "methods": [{ "methodName": "M" }] }
            ]
        }"#;

        let config = TraceConfig::from_json(json).unwrap();
        assert_eq!(config.instrumentation.len(), 1);
        assert_eq!(config.instrumentation[0].class_name, "A.C");
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(TraceConfig::from_json("{not json").is_err());
        assert!(TraceConfig::from_json(r#"{"instrumentation": 7}"#).is_err());
    }

    #[test]
    fn load_degrades_to_empty() {
        let config = TraceConfig::load(Path::new("/nonexistent/clrtrace-test"));
        assert!(config.is_empty());
    }

    #[test]
    fn empty_document_is_empty_config() {
        let config = TraceConfig::from_json("{}").unwrap();
        assert!(config.is_empty());
    }
}

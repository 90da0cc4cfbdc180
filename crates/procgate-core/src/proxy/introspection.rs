//! The allowlist and the introspection queries answered from it.

use crate::config::ProxyConfig;
use serde_json::{json, Value};
use std::collections::HashMap;

/// What introspection knows about one allow-listed method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo {
    pub params: &'static [&'static str],
}

/// Ordered set of remotely callable names, fixed at proxy construction.
#[derive(Debug, Clone, Default)]
pub struct Allowlist {
    names: Vec<String>,
    methods: HashMap<String, MethodInfo>,
}

impl Allowlist {
    pub(crate) fn new(names: Vec<String>, methods: HashMap<String, MethodInfo>) -> Self {
        Self { names, methods }
    }

    pub fn contains(&self, method: &str) -> bool {
        self.names.iter().any(|name| name == method)
    }

    /// The allowlist exactly as configured.
    pub fn list_methods(&self) -> &[String] {
        &self.names
    }

    /// Usage string for `method`. Only the example method has one.
    pub fn method_help(&self, method: &str) -> String {
        if method == ProxyConfig::EXAMPLE_METHOD {
            ProxyConfig::EXAMPLE_METHOD_HELP.to_string()
        } else {
            String::new()
        }
    }

    /// Declared parameter names for an allow-listed method.
    pub fn method_signature(&self, method: &str) -> Value {
        match self.methods.get(method) {
            Some(info) => json!(info.params),
            None => Value::String(ProxyConfig::SIGNATURES_NOT_SUPPORTED.to_string()),
        }
    }
}

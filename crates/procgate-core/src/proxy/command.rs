//! Command table: allow-listable names bound to typed handlers.
//!
//! Each entry declares its parameter schema next to the handler. The schema
//! decides which keyword overlay keys are accepted and how many positional
//! arguments a call may carry.

use crate::error::{ProcgateError, Result};
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Boxed future returned by every handler.
pub type HandlerFuture = BoxFuture<'static, Result<Value>>;

type Handler<C> = Arc<dyn Fn(Arc<C>, CallArgs) -> HandlerFuture + Send + Sync>;

/// A single callable entry.
pub struct Command<C> {
    name: String,
    params: &'static [&'static str],
    handler: Handler<C>,
}

impl<C: Send + Sync + 'static> Command<C> {
    /// Create a command from an async handler.
    pub fn new<F, Fut>(name: impl Into<String>, params: &'static [&'static str], handler: F) -> Self
    where
        F: Fn(Arc<C>, CallArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            params,
            handler: Arc::new(move |ctx, args| Box::pin(handler(ctx, args))),
        }
    }

    /// Create a command from a synchronous handler.
    pub fn from_fn<F>(name: impl Into<String>, params: &'static [&'static str], handler: F) -> Self
    where
        F: Fn(&C, CallArgs) -> Result<Value> + Send + Sync + 'static,
    {
        Self::new(name, params, move |ctx: Arc<C>, args| {
            futures::future::ready(handler(&ctx, args))
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared parameter names, in positional order.
    pub fn params(&self) -> &'static [&'static str] {
        self.params
    }

    /// Run the handler after checking the positional arity.
    pub async fn invoke(&self, ctx: Arc<C>, args: CallArgs) -> Result<Value> {
        if args.positional.len() > self.params.len() {
            return Err(ProcgateError::invalid_params(format!(
                "{}() takes {} arguments but {} were given",
                self.name,
                self.params.len(),
                args.positional.len()
            )));
        }
        (self.handler)(ctx, args).await
    }
}

impl<C> fmt::Debug for Command<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// Name-indexed set of commands over one context type.
pub struct CommandTable<C> {
    commands: HashMap<String, Command<C>>,
}

impl<C> CommandTable<C> {
    pub fn new() -> Self {
        Self {
            commands: HashMap::new(),
        }
    }

    /// Insert a command, replacing any earlier entry with the same name.
    pub fn insert(&mut self, command: Command<C>) -> &mut Self {
        self.commands.insert(command.name.clone(), command);
        self
    }

    /// Builder-style [`CommandTable::insert`].
    pub fn with(mut self, command: Command<C>) -> Self {
        self.insert(command);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Command<C>> {
        self.commands.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Command names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl<C> Default for CommandTable<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for CommandTable<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Arguments for one call after keyword overlay extraction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    pub positional: Vec<Value>,
    pub keywords: Map<String, Value>,
}

impl CallArgs {
    pub fn new(positional: Vec<Value>, keywords: Map<String, Value>) -> Self {
        Self {
            positional,
            keywords,
        }
    }

    /// Positional-only arguments.
    pub fn positional(positional: Vec<Value>) -> Self {
        Self::new(positional, Map::new())
    }

    /// Look up a parameter by keyword, falling back to its positional slot.
    ///
    /// Supplying a parameter both ways is an error.
    pub fn value(&self, index: usize, name: &str) -> Result<Option<&Value>> {
        match (self.keywords.get(name), self.positional.get(index)) {
            (Some(_), Some(_)) => Err(ProcgateError::invalid_params(format!(
                "got multiple values for argument '{}'",
                name
            ))),
            (Some(value), None) | (None, Some(value)) => Ok(Some(value)),
            (None, None) => Ok(None),
        }
    }

    pub fn required(&self, index: usize, name: &str) -> Result<&Value> {
        self.value(index, name)?.ok_or_else(|| {
            ProcgateError::invalid_params(format!("Missing required parameter: {}", name))
        })
    }

    pub fn required_str(&self, index: usize, name: &str) -> Result<&str> {
        let value = self.required(index, name)?;
        value.as_str().ok_or_else(|| wrong_type(name, "a string", value))
    }

    pub fn optional_str(&self, index: usize, name: &str) -> Result<Option<&str>> {
        match self.value(index, name)? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(wrong_type(name, "a string", other)),
        }
    }

    pub fn optional_i64(&self, index: usize, name: &str) -> Result<Option<i64>> {
        match self.value(index, name)? {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_i64()
                .map(Some)
                .ok_or_else(|| wrong_type(name, "an integer", value)),
        }
    }

    /// A list of strings; absent or null means empty.
    pub fn string_list(&self, index: usize, name: &str) -> Result<Vec<String>> {
        match self.value(index, name)? {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(String::from)
                        .ok_or_else(|| wrong_type(name, "a list of strings", item))
                })
                .collect(),
            Some(other) => Err(wrong_type(name, "a list of strings", other)),
        }
    }
}

/// Truthiness of a wire value: null, false, zero, and empty containers are false.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn wrong_type(name: &str, expected: &str, actual: &Value) -> ProcgateError {
    ProcgateError::invalid_params(format!(
        "Parameter {} must be {}, got {}",
        name, expected, actual
    ))
}

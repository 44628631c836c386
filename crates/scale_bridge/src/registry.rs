//! Command registry — the name → operation table built once at startup.
//!
//! Each command is an explicit `(name, parameters, invoker)` entry. Parameters
//! carry their own JSON decoder and optional default, so binding a request's
//! `data` object needs no knowledge of the target type. The first
//! registration under a name wins; later ones are logged and ignored.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::warn;

use scale_net::Response;

use crate::error::BindError;

type Decoder = Arc<dyn Fn(Value) -> Result<Box<dyn Any + Send>, serde_json::Error> + Send + Sync>;
type DefaultValue = Arc<dyn Fn() -> Box<dyn Any + Send> + Send + Sync>;

/// Runs a bound command against the target. `None` means no reply is owed.
pub type Invoker<T> = Arc<dyn Fn(&mut T, BoundArgs) -> Option<Response> + Send + Sync>;

// ── Parameters ──────────────────────────────────────────────────────────────

/// A formal parameter of a command.
#[derive(Clone)]
pub struct Param {
    name: &'static str,
    decode: Decoder,
    default: Option<DefaultValue>,
}

impl Param {
    /// A parameter that must be present in `data`.
    #[must_use]
    pub fn required<A>(name: &'static str) -> Self
    where
        A: DeserializeOwned + Send + 'static,
    {
        Self {
            name,
            decode: Arc::new(|value: Value| {
                serde_json::from_value::<A>(value).map(|a| Box::new(a) as Box<dyn Any + Send>)
            }),
            default: None,
        }
    }

    /// A parameter that falls back to `default` when absent.
    #[must_use]
    pub fn with_default<A>(name: &'static str, default: A) -> Self
    where
        A: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let mut param = Self::required::<A>(name);
        param.default = Some(Arc::new(move || {
            Box::new(default.clone()) as Box<dyn Any + Send>
        }));
        param
    }

    /// Parameter name, matched against `data` property names.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns `true` if the parameter may be omitted.
    #[must_use]
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }
}

impl std::fmt::Debug for Param {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Param")
            .field("name", &self.name)
            .field("has_default", &self.has_default())
            .finish()
    }
}

/// Arguments produced by binding, keyed by parameter name.
#[derive(Default)]
pub struct BoundArgs {
    values: HashMap<&'static str, Box<dyn Any + Send>>,
}

impl BoundArgs {
    /// Remove and return the argument bound to `name`.
    ///
    /// Returns `None` if nothing was bound under `name` or it was declared
    /// with a different type.
    pub fn take<A: 'static>(&mut self, name: &str) -> Option<A> {
        self.values
            .remove(name)?
            .downcast::<A>()
            .ok()
            .map(|value| *value)
    }

    /// Number of bound arguments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if nothing was bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl std::fmt::Debug for BoundArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

// ── Commands ────────────────────────────────────────────────────────────────

/// One registered command.
pub struct Command<T> {
    name: String,
    params: Vec<Param>,
    invoke: Invoker<T>,
}

impl<T> Command<T> {
    /// Command name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Formal parameters in declaration order.
    #[must_use]
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Returns the shared invoker.
    #[must_use]
    pub fn invoker(&self) -> Invoker<T> {
        Arc::clone(&self.invoke)
    }

    /// Bind a request's `data` to this command's parameters.
    ///
    /// Commands without parameters ignore `data` entirely. Otherwise `data`
    /// must be absent or an object; an absent `data` behaves like `{}`.
    ///
    /// # Errors
    ///
    /// Returns [`BindError`] naming the parameter that failed.
    pub fn bind(&self, data: Option<Value>) -> Result<BoundArgs, BindError> {
        let mut args = BoundArgs::default();
        if self.params.is_empty() {
            return Ok(args);
        }

        let mut object = match data {
            None => Map::new(),
            Some(Value::Object(object)) => object,
            Some(_) => return Err(BindError::DataNotObject),
        };

        for param in &self.params {
            let value = match object.remove(param.name) {
                Some(value) => (param.decode)(value).map_err(|source| BindError::ParameterParse {
                    name: param.name.to_string(),
                    source,
                })?,
                None => match &param.default {
                    Some(default) => default(),
                    None => {
                        return Err(BindError::MissingParameter {
                            name: param.name.to_string(),
                        });
                    }
                },
            };
            args.values.insert(param.name, value);
        }
        Ok(args)
    }
}

impl<T> Clone for Command<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            params: self.params.clone(),
            invoke: Arc::clone(&self.invoke),
        }
    }
}

impl<T> std::fmt::Debug for Command<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// Registry of every command a target answers.
pub struct CommandRegistry<T> {
    /// Commands in registration order.
    commands: Vec<Command<T>>,
    /// Name → index into `commands`.
    index: HashMap<String, usize>,
}

impl<T> CommandRegistry<T> {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register a command.
    ///
    /// Returns `false` and keeps the existing entry if `name` is taken.
    pub fn register<F>(&mut self, name: &str, params: Vec<Param>, invoke: F) -> bool
    where
        F: Fn(&mut T, BoundArgs) -> Option<Response> + Send + Sync + 'static,
    {
        if self.index.contains_key(name) {
            warn!(command = name, "duplicate command registration ignored");
            return false;
        }
        self.index.insert(name.to_string(), self.commands.len());
        self.commands.push(Command {
            name: name.to_string(),
            params,
            invoke: Arc::new(invoke),
        });
        true
    }

    /// Look up a command by exact name.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<&Command<T>> {
        self.index.get(name).map(|&i| &self.commands[i])
    }

    /// Returns an iterator over command names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().map(|c| c.name.as_str())
    }

    /// Returns the number of registered commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl<T> Default for CommandRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for CommandRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

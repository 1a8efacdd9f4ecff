use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use lazy_static::lazy_static;
use serde_json::Value;

use crate::engine::{read, Fields};

/// Key under which a [`Context`] stores a value that is logged as a field
/// of the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextKey(&'static str);

impl ContextKey {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub const fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

pub const SESSION_ID_KEY: ContextKey = ContextKey::new("LOG_SESSION_ID");
pub const SESSION_USER_KEY: ContextKey = ContextKey::new("LOG_USER");

/// Keys `with_context` always extracts, in this order.
pub const LOG_KEYS: [ContextKey; 2] = [SESSION_ID_KEY, SESSION_USER_KEY];

/// Session- or request-scoped values passed explicitly down a call chain.
///
/// Plain values are stored under a [`ContextKey`]; anything else can ride
/// along as a typed extension and be read back by a registered hook.
#[derive(Clone, Default)]
pub struct Context {
    values: HashMap<ContextKey, Value>,
    extensions: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, key: ContextKey, value: impl Into<Value>) -> Self {
        self.values.insert(key, value.into());
        self
    }

    /// A stored `null` reads as absent.
    pub fn value(&self, key: ContextKey) -> Option<&Value> {
        self.values.get(&key).filter(|v| !v.is_null())
    }

    pub fn with_extension<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.extensions.insert(TypeId::of::<T>(), Arc::new(value));
        self
    }

    pub fn extension<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("values", &self.values)
            .field("extensions", &self.extensions.len())
            .finish()
    }
}

/// Derives one field value from a context. An empty string means "no value".
pub type ContextHook = Arc<dyn Fn(&Context) -> String + Send + Sync>;

/// Field key to hook. Hooks are expected to target distinct keys; they run
/// in key order.
#[derive(Clone, Default)]
pub struct ContextHooks {
    hooks: BTreeMap<String, ContextHook>,
}

impl ContextHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `hook` for `key`, replacing any earlier hook for that key.
    pub fn register<F>(&mut self, key: impl Into<String>, hook: F)
    where
        F: Fn(&Context) -> String + Send + Sync + 'static,
    {
        self.hooks.insert(key.into(), Arc::new(hook));
    }

    pub fn with_hook<F>(mut self, key: impl Into<String>, hook: F) -> Self
    where
        F: Fn(&Context) -> String + Send + Sync + 'static,
    {
        self.register(key, hook);
        self
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub(crate) fn apply(&self, contexts: &[&Context], fields: &mut Fields) {
        for (key, hook) in &self.hooks {
            for ctx in contexts {
                let value = hook(ctx);
                if !value.is_empty() {
                    fields.insert(key.clone(), Value::String(value));
                }
            }
        }
    }
}

impl fmt::Debug for ContextHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.hooks.keys()).finish()
    }
}

lazy_static! {
    static ref CONTEXT_HOOKS: RwLock<ContextHooks> = RwLock::new(ContextHooks::new());
}

/// Registers a process-wide hook used by every `with_context` call.
///
/// Meant for process start-up, before logging begins. The registry is
/// lock-guarded, but hooks registered while other threads are logging may or
/// may not be seen by their in-flight calls.
pub fn register_log_context_hook<F>(key: impl Into<String>, hook: F)
where
    F: Fn(&Context) -> String + Send + Sync + 'static,
{
    CONTEXT_HOOKS
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .register(key, hook);
}

/// Extracts the well-known keys and then every process-wide hook's value
/// from `contexts`. Later contexts win for the same key.
pub fn context_to_fields(contexts: &[&Context]) -> Fields {
    let mut fields = Fields::new();
    if contexts.is_empty() {
        return fields;
    }

    for key in LOG_KEYS {
        for ctx in contexts {
            if let Some(value) = ctx.value(key) {
                fields.insert(key.as_str().to_string(), value.clone());
            }
        }
    }

    // Cloned so hooks run without holding the registry lock.
    let hooks = read(&*CONTEXT_HOOKS).clone();
    hooks.apply(contexts, &mut fields);
    fields
}

use crate::events::EventEmitter;
use crate::field::{FieldEvent, VirtualDefinition};
use crate::value::Value;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Read access to the values a virtual field computes from.
pub trait Scope {
    /// Current value of the named field, if it exists.
    fn get(&self, name: &str) -> Option<Value>;
}

impl Scope for BTreeMap<String, Value> {
    fn get(&self, name: &str) -> Option<Value> {
        BTreeMap::get(self, name).cloned()
    }
}

/// Value function of a virtual field.
pub type Compute = Arc<dyn Fn(&dyn Scope) -> Value + Send + Sync>;

/// A field whose value is computed from a scope.
///
/// With caching on (the default) the first read stores the result and later
/// reads return it until [`invalidate`](Self::invalidate) is called. Inside
/// an entity that happens whenever a declared dependency changes, or any
/// data field changes if no dependencies were declared.
pub struct VirtualField {
    name: String,
    hidden: bool,
    caching: bool,
    dependencies: Vec<String>,
    compute: Compute,
    scope: BTreeMap<String, Value>,
    cache: Mutex<Option<Value>>,
    events: EventEmitter<FieldEvent>,
}

impl VirtualField {
    pub(crate) fn from_definition(def: VirtualDefinition) -> Self {
        Self {
            name: def.name,
            hidden: def.hidden,
            caching: def.caching,
            dependencies: def.dependencies,
            compute: def.compute,
            scope: def.scope,
            cache: Mutex::new(None),
            events: EventEmitter::new(),
        }
    }

    /// Value computed against the field's own scope.
    pub fn value(&self) -> Value {
        self.value_in(&self.scope)
    }

    /// Value computed against `scope`.
    pub fn value_in(&self, scope: &dyn Scope) -> Value {
        if self.caching {
            if let Some(cached) = self.cache.lock().as_ref() {
                return cached.clone();
            }
        }
        let value = (self.compute)(scope);
        if self.caching {
            *self.cache.lock() = Some(value.clone());
        }
        value
    }

    /// Assignment is ignored; the value is always computed.
    pub fn set(&mut self, value: impl Into<Value>) {
        let _ = value.into();
        trace!(field = %self.name, "ignored assignment to virtual field");
    }

    /// Drops the cached value. Returns `true` if there was one.
    pub fn invalidate(&self) -> bool {
        let had_value = self.cache.lock().take().is_some();
        if had_value {
            self.events.emit(FieldEvent::CacheClear);
        }
        had_value
    }

    /// Cached value, if any.
    pub fn cached_value(&self) -> Option<Value> {
        self.cache.lock().clone()
    }

    /// Whether computed values are cached.
    pub fn is_caching(&self) -> bool {
        self.caching
    }

    /// Turns caching on or off. Turning it off drops the cache.
    pub fn set_caching(&mut self, value: bool) {
        self.caching = value;
        if !value {
            self.cache.lock().take();
        }
    }

    /// Whether a change to `field` should invalidate this field.
    pub fn depends_on(&self, field: &str) -> bool {
        self.dependencies.is_empty() || self.dependencies.iter().any(|d| d == field)
    }

    /// Declared dependencies.
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the field is excluded from serialized views.
    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Hides the field.
    pub fn hide(&mut self) -> bool {
        if self.hidden {
            return false;
        }
        self.hidden = true;
        self.events.emit(FieldEvent::Hidden);
        true
    }

    /// Unhides the field.
    pub fn unhide(&mut self) -> bool {
        if !self.hidden {
            return false;
        }
        self.hidden = false;
        self.events.emit(FieldEvent::Unhidden);
        true
    }

    /// Event emitter for this field.
    pub fn events(&self) -> &EventEmitter<FieldEvent> {
        &self.events
    }
}

impl fmt::Debug for VirtualField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualField")
            .field("name", &self.name)
            .field("hidden", &self.hidden)
            .field("caching", &self.caching)
            .field("dependencies", &self.dependencies)
            .field("cached", &self.cache.lock().is_some())
            .finish_non_exhaustive()
    }
}

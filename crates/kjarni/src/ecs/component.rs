//! # Components — registry and erased storage
//!
//! Any `Clone + Send + Sync + 'static` type is a component. The first time a
//! type is used (in a component set, a predicate, a bundle) the process-wide
//! [`ComponentRegistry`] hands it a small integer [`ComponentId`]. Ids are
//! dense, never reused, and index straight into a [`BitSet`](super::BitSet).
//!
//! Types that should survive a scene save/load round-trip additionally
//! register serde hooks:
//!
//! ```ignore
//! ComponentRegistry::register_serde::<Transform>();
//! ComponentRegistry::register_serde::<Health>();
//! ```
//!
//! Once start-up is over the registry can be frozen. After that, touching a
//! component type the registry has never seen panics at the call site rather
//! than silently growing the id space mid-game.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::bitset::MAX_COMPONENTS;

/// Marker for types that can be stored on an entity.
pub trait Component: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Component for T {}

/// Dense per-process identifier for a registered component type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(u16);

impl ComponentId {
    /// Id of `T`, registering it on first use.
    pub fn of<T: Component>() -> Self {
        ComponentRegistry::id_of::<T>()
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub(crate) const fn from_index(index: usize) -> Self {
        debug_assert!(index < MAX_COMPONENTS);
        Self(index as u16)
    }

    /// Full Rust type name of the registered type.
    pub fn type_name(self) -> &'static str {
        ComponentRegistry::type_name(self)
    }
}

impl fmt::Debug for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentId({})", self.0)
    }
}

// ── Erased storage ───────────────────────────────────────────────────────

/// Object-safe view of a component value.
pub(crate) trait ErasedComponent: Any + Send + Sync {
    fn clone_boxed(&self) -> Box<dyn ErasedComponent>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn type_name(&self) -> &'static str;
}

impl<T: Component> ErasedComponent for T {
    fn clone_boxed(&self) -> Box<dyn ErasedComponent> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

// ── Registry ─────────────────────────────────────────────────────────────

type SerializeFn = fn(&dyn Any) -> Option<serde_json::Value>;
pub(crate) type DeserializeFn =
    fn(serde_json::Value) -> Result<Box<dyn ErasedComponent>, serde_json::Error>;

#[derive(Clone, Copy)]
struct SerdeHooks {
    serialize: SerializeFn,
    deserialize: DeserializeFn,
}

/// What the registry knows about one component type.
#[derive(Debug, Clone)]
pub struct ComponentInfo {
    id: ComponentId,
    type_name: &'static str,
    short_name: String,
    serializable: bool,
}

impl ComponentInfo {
    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Name used as the key in scene files (`Transform`, `Vec<Tag>`).
    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    pub fn is_serializable(&self) -> bool {
        self.serializable
    }
}

#[derive(Default)]
pub(crate) struct Registry {
    by_type: HashMap<TypeId, ComponentId>,
    by_name: HashMap<String, ComponentId>,
    infos: Vec<ComponentInfo>,
    hooks: Vec<Option<SerdeHooks>>,
    frozen: bool,
}

impl Registry {
    fn lookup(&self, type_id: TypeId) -> Option<ComponentId> {
        self.by_type.get(&type_id).copied()
    }

    fn register_raw(&mut self, type_id: TypeId, type_name: &'static str) -> ComponentId {
        if let Some(id) = self.lookup(type_id) {
            return id;
        }
        if self.frozen {
            panic!(
                "component type `{type_name}` was first used after the component registry was frozen; \
                 register it during start-up"
            );
        }
        if self.infos.len() >= MAX_COMPONENTS {
            panic!("cannot register `{type_name}`: at most {MAX_COMPONENTS} component types are supported");
        }

        let id = ComponentId::from_index(self.infos.len());
        self.by_type.insert(type_id, id);
        self.infos.push(ComponentInfo {
            id,
            type_name,
            short_name: short_type_name(type_name),
            serializable: false,
        });
        self.hooks.push(None);
        log::trace!("registered component `{type_name}` as {id:?}");
        id
    }

    pub(crate) fn register<T: Component>(&mut self) -> ComponentId {
        self.register_raw(TypeId::of::<T>(), std::any::type_name::<T>())
    }

    pub(crate) fn register_serde<T>(&mut self) -> ComponentId
    where
        T: Component + Serialize + DeserializeOwned,
    {
        let id = self.register::<T>();
        self.hooks[id.index()] = Some(SerdeHooks {
            serialize: |any| serde_json::to_value(any.downcast_ref::<T>()?).ok(),
            deserialize: |json| {
                serde_json::from_value::<T>(json).map(|value| Box::new(value) as Box<dyn ErasedComponent>)
            },
        });

        let info = &mut self.infos[id.index()];
        info.serializable = true;
        let short = info.short_name.clone();
        if let Some(previous) = self.by_name.insert(short.clone(), id) {
            if previous != id {
                log::warn!(
                    "scene name `{short}` now maps to `{}` (was `{}`)",
                    self.infos[id.index()].type_name,
                    self.infos[previous.index()].type_name,
                );
            }
        }
        id
    }

    pub(crate) fn freeze(&mut self) {
        self.frozen = true;
    }

    pub(crate) fn len(&self) -> usize {
        self.infos.len()
    }
}

fn global() -> &'static RwLock<Registry> {
    static REGISTRY: OnceLock<RwLock<Registry>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(Registry::default()))
}

/// Process-wide component type registry.
///
/// All functions are associated; there is exactly one registry per process so
/// that ids agree between every [`World`](super::World) and every query.
pub struct ComponentRegistry;

impl ComponentRegistry {
    /// Id of `T`, registering it on first use.
    ///
    /// # Panics
    ///
    /// If `T` is new and the registry is frozen, or if `MAX_COMPONENTS`
    /// types are already registered.
    pub fn id_of<T: Component>() -> ComponentId {
        let known = global().read().lookup(TypeId::of::<T>());
        match known {
            Some(id) => id,
            None => global().write().register::<T>(),
        }
    }

    /// Explicit form of [`id_of`](Self::id_of), for start-up code.
    pub fn register<T: Component>() -> ComponentId {
        Self::id_of::<T>()
    }

    /// Register `T` together with JSON hooks so scenes can save and load it.
    pub fn register_serde<T>() -> ComponentId
    where
        T: Component + Serialize + DeserializeOwned,
    {
        global().write().register_serde::<T>()
    }

    /// Id of `T` if it has been registered, without registering it.
    pub fn lookup<T: Component>() -> Option<ComponentId> {
        global().read().lookup(TypeId::of::<T>())
    }

    /// Look up a serializable component by its scene name.
    pub fn id_by_name(name: &str) -> Option<ComponentId> {
        global().read().by_name.get(name).copied()
    }

    pub fn info(id: ComponentId) -> Option<ComponentInfo> {
        global().read().infos.get(id.index()).cloned()
    }

    pub fn type_name(id: ComponentId) -> &'static str {
        global()
            .read()
            .infos
            .get(id.index())
            .map_or("<unregistered>", |info| info.type_name)
    }

    /// Refuse any further new component types.
    pub fn freeze() {
        global().write().freeze();
        log::debug!("component registry frozen with {} types", Self::len());
    }

    pub fn is_frozen() -> bool {
        global().read().frozen
    }

    /// Number of registered component types.
    pub fn len() -> usize {
        global().read().len()
    }

    pub(crate) fn serialize(id: ComponentId, value: &dyn Any) -> Option<serde_json::Value> {
        let hooks = global().read().hooks.get(id.index()).copied().flatten()?;
        (hooks.serialize)(value)
    }

    /// Resolve a scene name to its id and decode hook.
    pub(crate) fn deserializer(name: &str) -> Option<(ComponentId, DeserializeFn)> {
        let registry = global().read();
        let id = *registry.by_name.get(name)?;
        let hooks = registry.hooks.get(id.index()).copied().flatten()?;
        Some((id, hooks.deserialize))
    }
}

/// `my_game::stats::Health` → `Health`, `alloc::vec::Vec<my_game::Tag>` → `Vec<Tag>`.
pub(crate) fn short_type_name(full: &str) -> String {
    let Some(open) = full.find('<') else {
        return full.rsplit("::").next().unwrap_or(full).to_string();
    };
    let head = short_type_name(&full[..open]);
    let inner = full[open + 1..].strip_suffix('>').unwrap_or(&full[open + 1..]);

    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in inner.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                args.push(short_type_name(inner[start..i].trim()));
                start = i + 1;
            }
            _ => {}
        }
    }
    args.push(short_type_name(inner[start..].trim()));
    format!("{head}<{}>", args.join(", "))
}

//! Resource Registry
//!
//! Every [`Context`](super::Context) owns an arena of the resources created
//! while it was current. Resources never point back at their context. Caller
//! handles carry the arena key and a shared tracker; the tracker's strong
//! count tells the garbage collector whether anyone outside the arena still
//! refers to a resource.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

use super::Current;
use crate::errors::{InteropError, Result};
use crate::resources::{Buffer, Resource, Texture};

new_key_type! {
    /// Arena key of a registered resource.
    pub struct ResourceKey;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Buffer,
    Texture,
    /// A caller-defined [`Resource`].
    Custom,
}

#[derive(Debug)]
struct ResourceTracker {
    context: u64,
    key: ResourceKey,
    kind: ResourceKind,
}

/// Untyped shared handle to a registered resource.
#[derive(Clone)]
pub struct ResourceHandle {
    tracker: Arc<ResourceTracker>,
}

impl ResourceHandle {
    #[inline]
    #[must_use]
    pub fn key(&self) -> ResourceKey {
        self.tracker.key
    }

    /// Id of the context that owns the resource.
    #[inline]
    #[must_use]
    pub fn context_id(&self) -> u64 {
        self.tracker.context
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.tracker.kind
    }
}

impl fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("context", &self.tracker.context)
            .field("key", &self.tracker.key)
            .field("kind", &self.tracker.kind)
            .finish()
    }
}

impl PartialEq for ResourceHandle {
    fn eq(&self, other: &Self) -> bool {
        self.tracker.context == other.tracker.context && self.tracker.key == other.tracker.key
    }
}

impl Eq for ResourceHandle {}

impl Hash for ResourceHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tracker.context.hash(state);
        self.tracker.key.hash(state);
    }
}

/// Typed shared handle to a registered [`Buffer`] or [`Texture`].
pub struct Handle<T> {
    inner: ResourceHandle,
    _marker: PhantomData<fn() -> T>,
}

pub type BufferHandle = Handle<Buffer>;
pub type TextureHandle = Handle<Texture>;

impl<T> Handle<T> {
    fn new(inner: ResourceHandle) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    #[inline]
    #[must_use]
    pub fn as_resource(&self) -> &ResourceHandle {
        &self.inner
    }

    #[inline]
    #[must_use]
    pub fn context_id(&self) -> u64 {
        self.inner.context_id()
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self::new(self.inner.clone())
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.hash(state);
    }
}

impl<T> From<Handle<T>> for ResourceHandle {
    fn from(handle: Handle<T>) -> Self {
        handle.inner
    }
}

// ============================================================================
// Arena Entries
// ============================================================================

pub(crate) enum ResourceEntry {
    Buffer(Arc<Mutex<Buffer>>),
    Texture(Arc<Mutex<Texture>>),
    Custom(Arc<Mutex<Box<dyn Resource>>>),
}

impl ResourceEntry {
    fn is_borrowed(&self) -> bool {
        match self {
            Self::Buffer(cell) => cell.is_locked(),
            Self::Texture(cell) => cell.is_locked(),
            Self::Custom(cell) => cell.is_locked(),
        }
    }

    /// Runs `f` on the resource unless it is already borrowed.
    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut dyn Resource) -> R) -> Result<R> {
        match self {
            Self::Buffer(cell) => cell
                .try_lock()
                .map(|mut r| f(&mut *r))
                .ok_or(InteropError::ResourceBusy),
            Self::Texture(cell) => cell
                .try_lock()
                .map(|mut r| f(&mut *r))
                .ok_or(InteropError::ResourceBusy),
            Self::Custom(cell) => cell
                .try_lock()
                .map(|mut r| f(&mut **r))
                .ok_or(InteropError::ResourceBusy),
        }
    }

    pub(crate) fn release(&self, cur: &Current<'_>) -> Result<()> {
        self.with(|resource| resource.release(cur))?
    }
}

impl Clone for ResourceEntry {
    fn clone(&self) -> Self {
        match self {
            Self::Buffer(cell) => Self::Buffer(Arc::clone(cell)),
            Self::Texture(cell) => Self::Texture(Arc::clone(cell)),
            Self::Custom(cell) => Self::Custom(Arc::clone(cell)),
        }
    }
}

/// Resource types with a typed arena slot.
pub(crate) trait Tracked: Resource + Sized + 'static {
    const KIND: ResourceKind;

    fn wrap(cell: Arc<Mutex<Self>>) -> ResourceEntry;
    fn cell(entry: &ResourceEntry) -> Option<&Arc<Mutex<Self>>>;
}

impl Tracked for Buffer {
    const KIND: ResourceKind = ResourceKind::Buffer;

    fn wrap(cell: Arc<Mutex<Self>>) -> ResourceEntry {
        ResourceEntry::Buffer(cell)
    }

    fn cell(entry: &ResourceEntry) -> Option<&Arc<Mutex<Self>>> {
        match entry {
            ResourceEntry::Buffer(cell) => Some(cell),
            _ => None,
        }
    }
}

impl Tracked for Texture {
    const KIND: ResourceKind = ResourceKind::Texture;

    fn wrap(cell: Arc<Mutex<Self>>) -> ResourceEntry {
        ResourceEntry::Texture(cell)
    }

    fn cell(entry: &ResourceEntry) -> Option<&Arc<Mutex<Self>>> {
        match entry {
            ResourceEntry::Texture(cell) => Some(cell),
            _ => None,
        }
    }
}

struct Slot {
    tracker: Arc<ResourceTracker>,
    entry: ResourceEntry,
}

// ============================================================================
// Registry
// ============================================================================

pub(crate) struct ResourceRegistry {
    context: u64,
    slots: Mutex<SlotMap<ResourceKey, Slot>>,
}

impl ResourceRegistry {
    pub(crate) fn new(context: u64) -> Self {
        Self {
            context,
            slots: Mutex::new(SlotMap::with_key()),
        }
    }

    fn insert_entry(&self, kind: ResourceKind, entry: ResourceEntry) -> ResourceHandle {
        let context = self.context;
        let mut slots = self.slots.lock();
        let key = slots.insert_with_key(|key| Slot {
            tracker: Arc::new(ResourceTracker { context, key, kind }),
            entry,
        });
        ResourceHandle {
            tracker: Arc::clone(&slots[key].tracker),
        }
    }

    pub(crate) fn insert<T: Tracked>(&self, resource: T) -> Handle<T> {
        Handle::new(self.insert_entry(T::KIND, T::wrap(Arc::new(Mutex::new(resource)))))
    }

    pub(crate) fn insert_custom(&self, resource: Box<dyn Resource>) -> ResourceHandle {
        self.insert_entry(ResourceKind::Custom, ResourceEntry::Custom(Arc::new(Mutex::new(resource))))
    }

    fn check_owner(&self, handle: &ResourceHandle) -> Result<()> {
        if handle.context_id() == self.context {
            Ok(())
        } else {
            Err(InteropError::ForeignResource {
                owner: handle.context_id(),
                used_with: self.context,
            })
        }
    }

    pub(crate) fn entry(&self, handle: &ResourceHandle) -> Result<ResourceEntry> {
        self.check_owner(handle)?;
        self.slots
            .lock()
            .get(handle.key())
            .map(|slot| slot.entry.clone())
            .ok_or(InteropError::ResourceReleased)
    }

    pub(crate) fn cell<T: Tracked>(&self, handle: &Handle<T>) -> Result<Arc<Mutex<T>>> {
        let entry = self.entry(handle.as_resource())?;
        T::cell(&entry)
            .cloned()
            .ok_or(InteropError::ResourceReleased)
    }

    pub(crate) fn remove(&self, handle: &ResourceHandle) -> Result<ResourceEntry> {
        self.check_owner(handle)?;
        self.slots
            .lock()
            .remove(handle.key())
            .map(|slot| slot.entry)
            .ok_or(InteropError::ResourceReleased)
    }

    #[must_use]
    pub(crate) fn contains(&self, handle: &ResourceHandle) -> bool {
        handle.context_id() == self.context && self.slots.lock().contains_key(handle.key())
    }

    /// Removes every resource no caller handle refers to any more.
    /// Resources borrowed through a guard are kept.
    pub(crate) fn take_unreferenced(&self) -> Vec<ResourceEntry> {
        let mut garbage = Vec::new();
        self.slots.lock().retain(|_, slot| {
            let unreferenced = Arc::strong_count(&slot.tracker) == 1 && !slot.entry.is_borrowed();
            if unreferenced {
                garbage.push(slot.entry.clone());
            }
            !unreferenced
        });
        garbage
    }

    /// Removes every resource. Fails with [`InteropError::ResourceBusy`] and
    /// leaves the arena untouched while any resource is borrowed.
    pub(crate) fn drain(&self) -> Result<Vec<ResourceEntry>> {
        let mut slots = self.slots.lock();
        if slots.values().any(|slot| slot.entry.is_borrowed()) {
            return Err(InteropError::ResourceBusy);
        }
        Ok(slots.drain().map(|(_, slot)| slot.entry).collect())
    }

    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.slots.lock().len()
    }
}

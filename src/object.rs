//! Spatial emitters.
//!
//! An [`Object`] is a handle to a positioned emitter living inside a
//! [`Context`](crate::Context). The object owns its playing sources through
//! two keyed multimaps (string names and integer indices) with identical
//! semantics; overlapping plays under one key are explicitly allowed. Every
//! operation takes the context's audio lock for its duration.

use std::collections::BTreeMap;
use std::sync::{Mutex, Weak};

use crate::context::ContextState;
use crate::events::SourceKey;
use crate::math::Vec3;
use crate::source::Source;

/// Keyed multimap of sources. Key order is the map order, insertion order
/// within a key — deterministic given the sequence of plays.
pub(crate) struct SourceMap<K: Ord> {
    map: BTreeMap<K, Vec<Source>>,
}

impl<K: Ord + Clone> SourceMap<K> {
    pub(crate) fn new() -> Self {
        Self {
            map: BTreeMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, key: K, source: Source) {
        self.map.entry(key).or_default().push(source);
    }

    pub(crate) fn playing(&self, key: &K) -> bool {
        self.map.get(key).map_or(false, |v| !v.is_empty())
    }

    pub(crate) fn fade_out(&mut self, key: &K, seconds: f32) {
        if let Some(sources) = self.map.get_mut(key) {
            for source in sources {
                source.begin_fade_out(seconds);
            }
        }
    }

    /// Zero fade destroys everything under the key immediately; a positive
    /// fade touches only looping sources and lets one-shots play out.
    pub(crate) fn cancel(&mut self, key: &K, fadeout: f32) {
        if fadeout == 0.0 {
            self.map.remove(key);
        } else if let Some(sources) = self.map.get_mut(key) {
            for source in sources.iter_mut().filter(|s| s.looped()) {
                source.begin_fade_out(fadeout);
            }
        }
    }

    /// The first source under the key gets the flag; the rest are un-looped
    /// so a transient retrigger cannot leave several instances looping.
    pub(crate) fn set_loop(&mut self, key: &K, looped: bool) {
        if let Some(sources) = self.map.get_mut(key) {
            for (i, source) in sources.iter_mut().enumerate() {
                source.set_looped(if i == 0 { looped } else { false });
            }
        }
    }

    pub(crate) fn get_loop(&self, key: &K) -> bool {
        self.map
            .get(key)
            .map_or(false, |v| v.iter().any(|s| s.looped()))
    }

    pub(crate) fn cancel_all(&mut self, force: bool, fadeout: f32) {
        if force {
            self.map.clear();
        } else {
            for source in self.map.values_mut().flatten().filter(|s| s.looped()) {
                source.begin_fade_out(fadeout);
            }
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.map.values().all(|v| v.is_empty())
    }

    pub(crate) fn for_each_mut(&mut self, mut f: impl FnMut(&K, &mut Source)) {
        for (key, sources) in self.map.iter_mut() {
            for source in sources {
                f(key, source);
            }
        }
    }

    /// Drops dead sources, reporting each removed key, and prunes empty
    /// entries.
    pub(crate) fn reap_dead(&mut self, mut on_removed: impl FnMut(&K)) {
        for (key, sources) in self.map.iter_mut() {
            sources.retain(|s| {
                if s.is_dead() {
                    on_removed(key);
                    false
                } else {
                    true
                }
            });
        }
        self.map.retain(|_, v| !v.is_empty());
    }
}

/// Mutable state of one emitter, owned by the context and serialized by the
/// audio lock.
pub(crate) struct ObjectState {
    pub(crate) position: Vec3,
    pub(crate) velocity: Vec3,
    pub(crate) direction: Vec3,
    pub(crate) named: SourceMap<String>,
    pub(crate) indexed: SourceMap<i32>,
    pub(crate) dead: bool,
}

impl ObjectState {
    pub(crate) fn new() -> Self {
        Self {
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            direction: Vec3::NEG_Z,
            named: SourceMap::new(),
            indexed: SourceMap::new(),
            dead: false,
        }
    }

    pub(crate) fn active(&self) -> bool {
        !self.named.is_empty() || !self.indexed.is_empty()
    }

    pub(crate) fn cancel_all(&mut self, force: bool, fadeout: f32) {
        self.indexed.cancel_all(force, fadeout);
        self.named.cancel_all(force, fadeout);
    }

    pub(crate) fn for_each_source_mut(&mut self, mut f: impl FnMut(SourceKey, &mut Source)) {
        self.named
            .for_each_mut(|key, source| f(SourceKey::Name(key.clone()), source));
        self.indexed
            .for_each_mut(|key, source| f(SourceKey::Index(*key), source));
    }

    pub(crate) fn reap_dead(&mut self, mut on_removed: impl FnMut(SourceKey)) {
        self.named
            .reap_dead(|key| on_removed(SourceKey::Name(key.clone())));
        self.indexed
            .reap_dead(|key| on_removed(SourceKey::Index(*key)));
    }
}

/// Handle to an emitter. Dropping the handle removes the object and its
/// sources from the scene unless [`autodelete`](Object::autodelete) handed
/// it over to the mixer first.
pub struct Object {
    pub(crate) id: u64,
    pub(crate) ctx: Weak<Mutex<ContextState>>,
    pub(crate) detached: bool,
}

impl Object {
    pub fn id(&self) -> u64 {
        self.id
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut ObjectState) -> R) -> Option<R> {
        let ctx = self.ctx.upgrade()?;
        let mut guard = ctx.lock().ok()?;
        guard.object_mut(self.id).map(f)
    }

    /// Sets position, velocity and facing in one locked critical section.
    pub fn update(&self, position: Vec3, velocity: Vec3, direction: Vec3) {
        self.with_state(|s| {
            s.position = position;
            s.velocity = velocity;
            s.direction = direction;
        });
    }

    pub fn set_position(&self, position: Vec3) {
        self.with_state(|s| s.position = position);
    }

    pub fn set_velocity(&self, velocity: Vec3) {
        self.with_state(|s| s.velocity = velocity);
    }

    pub fn set_direction(&self, direction: Vec3) {
        self.with_state(|s| s.direction = direction);
    }

    pub fn position(&self) -> Vec3 {
        self.with_state(|s| s.position).unwrap_or(Vec3::ZERO)
    }

    /// Starts a source under a name. Several sources may share the name.
    pub fn play(&self, name: &str, source: Source) {
        self.with_state(|s| s.named.insert(name.to_owned(), source));
    }

    pub fn play_indexed(&self, index: i32, source: Source) {
        self.with_state(|s| s.indexed.insert(index, source));
    }

    pub fn playing(&self, name: &str) -> bool {
        self.with_state(|s| s.named.playing(&name.to_owned()))
            .unwrap_or(false)
    }

    pub fn playing_indexed(&self, index: i32) -> bool {
        self.with_state(|s| s.indexed.playing(&index)).unwrap_or(false)
    }

    /// Fades out every source under the name.
    pub fn fade_out(&self, name: &str, seconds: f32) {
        self.with_state(|s| s.named.fade_out(&name.to_owned(), seconds));
    }

    pub fn fade_out_indexed(&self, index: i32, seconds: f32) {
        self.with_state(|s| s.indexed.fade_out(&index, seconds));
    }

    /// With `fadeout == 0` destroys every source under the name at once;
    /// otherwise fades the looping ones and leaves one-shots to finish.
    pub fn cancel(&self, name: &str, fadeout: f32) {
        self.with_state(|s| s.named.cancel(&name.to_owned(), fadeout));
    }

    pub fn cancel_indexed(&self, index: i32, fadeout: f32) {
        self.with_state(|s| s.indexed.cancel(&index, fadeout));
    }

    pub fn set_loop(&self, name: &str, looped: bool) {
        self.with_state(|s| s.named.set_loop(&name.to_owned(), looped));
    }

    pub fn set_loop_indexed(&self, index: i32, looped: bool) {
        self.with_state(|s| s.indexed.set_loop(&index, looped));
    }

    pub fn get_loop(&self, name: &str) -> bool {
        self.with_state(|s| s.named.get_loop(&name.to_owned()))
            .unwrap_or(false)
    }

    pub fn get_loop_indexed(&self, index: i32) -> bool {
        self.with_state(|s| s.indexed.get_loop(&index)).unwrap_or(false)
    }

    pub fn cancel_all(&self, force: bool, fadeout: f32) {
        self.with_state(|s| s.cancel_all(force, fadeout));
    }

    /// Whether any source is playing on this object.
    pub fn active(&self) -> bool {
        self.with_state(|s| s.active()).unwrap_or(false)
    }

    /// Cancels everything and hands the object to the mixer, which removes
    /// it on the next callback once no sources remain.
    pub fn autodelete(mut self) {
        self.with_state(|s| {
            s.cancel_all(false, 0.1);
            s.dead = true;
        });
        self.detached = true;
    }
}

impl Drop for Object {
    fn drop(&mut self) {
        if self.detached {
            return;
        }
        if let Some(ctx) = self.ctx.upgrade() {
            if let Ok(mut guard) = ctx.lock() {
                guard.remove_object(self.id);
            }
        }
    }
}

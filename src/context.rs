//! The mixing context.
//!
//! A [`Context`] owns the listener, the live objects, the sample registry,
//! the distance model and the HRTF table, all behind one audio lock. The API
//! side mutates scene state through short critical sections; the host audio
//! thread calls [`process`](Context::process) which holds the lock for the
//! whole callback, walks every (object, source) pair, and sums their HRTF
//! contributions into the output block.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::config::ContextDesc;
use crate::distance::DistanceModel;
use crate::error::{BinauraError, Result};
use crate::events::{BinauraEvent, SourceKey};
use crate::hrtf::HrtfDatabase;
use crate::math::{Direction, ListenerFrame, Vec3};
use crate::object::{Object, ObjectState};
use crate::sample::Sample;
use crate::source::{Source, SourceDesc};
use crate::stream::Stream;

/// Listener pose: position, velocity and a forward unit vector. The ear
/// axis is derived from forward and world-up.
#[derive(Debug, Clone, Copy)]
pub struct Listener {
    pub position: Vec3,
    pub velocity: Vec3,
    pub forward: Vec3,
}

impl Default for Listener {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            forward: Vec3::NEG_Z,
        }
    }
}

pub(crate) struct ObjectEntry {
    pub(crate) id: u64,
    pub(crate) state: ObjectState,
}

pub(crate) struct ContextState {
    listener: Listener,
    /// Insertion-ordered so the mix walk is deterministic.
    objects: Vec<ObjectEntry>,
    next_object_id: u64,
    samples: HashMap<String, Arc<Sample>>,
    distance: DistanceModel,
    master_gain: f32,
    hrtf: Arc<HrtfDatabase>,
    /// Interleaved f32 scratch for the i16 output path.
    mix_scratch: Vec<f32>,
    events: Sender<BinauraEvent>,
}

impl ContextState {
    pub(crate) fn object_mut(&mut self, id: u64) -> Option<&mut ObjectState> {
        self.objects
            .iter_mut()
            .find(|e| e.id == id)
            .map(|e| &mut e.state)
    }

    pub(crate) fn remove_object(&mut self, id: u64) {
        self.objects.retain(|e| e.id != id);
    }

    /// Mixes exactly one block of `desc.block_size` stereo frames.
    fn mix_block(&mut self, out: &mut [f32]) {
        out.fill(0.0);

        let listener = self.listener;
        let frame = ListenerFrame::from_forward(listener.forward);
        let distance = self.distance;
        let master = self.master_gain;
        let hrtf = &self.hrtf;
        let events = &self.events;

        for entry in self.objects.iter_mut() {
            let object_id = entry.id;
            let position = entry.state.position;
            let velocity = entry.state.velocity;

            let rel = position - listener.position;
            let pose_ok = rel.is_finite() && velocity.is_finite();

            entry.state.for_each_source_mut(|key, source| {
                if !pose_ok {
                    log::warn!("object {} has a non-finite pose, killing source", object_id);
                    source.kill();
                    return;
                }

                let (gain_d, pitch_d) = distance.evaluate(rel, listener.velocity, velocity);
                let local = frame.to_local(rel);
                let direction = if local.length_squared() < 1e-12 {
                    // An emitter at the listener sits on the median plane.
                    Direction {
                        azimuth_deg: 0.0,
                        elevation_deg: 0.0,
                    }
                } else {
                    Direction::from_local(local.normalize())
                };
                let bin = hrtf.bin_for(direction);

                source.render(out, gain_d * master, pitch_d, bin);

                if source.take_wrapped() {
                    let _ = events.send(BinauraEvent::SourceLooped {
                        object: object_id,
                        key,
                    });
                }
            });
        }

        self.reap(out);
    }

    fn reap(&mut self, out: &mut [f32]) {
        let events = &self.events;
        for entry in self.objects.iter_mut() {
            let object_id = entry.id;
            entry.state.reap_dead(|key: SourceKey| {
                let _ = events.send(BinauraEvent::SourceCompleted {
                    object: object_id,
                    key,
                });
            });
        }
        self.objects.retain(|e| {
            let keep = !(e.state.dead && !e.state.active());
            if !keep {
                log::debug!("reaping auto-deleted object {}", e.id);
                let _ = events.send(BinauraEvent::ObjectRemoved { object: e.id });
            }
            keep
        });

        for v in out.iter_mut() {
            *v = v.clamp(-1.0, 1.0);
        }
    }
}

/// The library entry point. Cheap to clone; clones share the same scene.
pub struct Context {
    desc: ContextDesc,
    state: Arc<Mutex<ContextState>>,
    events: Receiver<BinauraEvent>,
}

impl Clone for Context {
    fn clone(&self) -> Self {
        Self {
            desc: self.desc.clone(),
            state: self.state.clone(),
            events: self.events.clone(),
        }
    }
}

impl Context {
    /// Creates a context for the requested output format. Builds the HRTF
    /// table at the output rate, which is the expensive part of init.
    pub fn new(desc: ContextDesc) -> Result<Self> {
        desc.validate()?;
        let hrtf = Arc::new(HrtfDatabase::new(desc.sample_rate)?);
        let (sender, receiver) = unbounded();
        log::info!(
            "context ready: {} Hz, {} frames per block",
            desc.sample_rate,
            desc.block_size
        );
        let state = ContextState {
            listener: Listener::default(),
            objects: Vec::new(),
            next_object_id: 1,
            samples: HashMap::new(),
            distance: DistanceModel::default(),
            master_gain: 1.0,
            hrtf,
            mix_scratch: vec![0.0; desc.block_size * desc.channels as usize],
            events: sender,
        };
        Ok(Self {
            desc,
            state: Arc::new(Mutex::new(state)),
            events: receiver,
        })
    }

    pub fn desc(&self) -> &ContextDesc {
        &self.desc
    }

    /// Receiver for mixer lifecycle events.
    pub fn events(&self) -> &Receiver<BinauraEvent> {
        &self.events
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ContextState> {
        // A panic while holding the audio lock is unrecoverable for the
        // mixer anyway; keep serving the surviving state.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Creates an emitter at the origin and returns its handle.
    pub fn create_object(&self) -> Object {
        let mut state = self.lock();
        let id = state.next_object_id;
        state.next_object_id += 1;
        state.objects.push(ObjectEntry {
            id,
            state: ObjectState::new(),
        });
        log::debug!("created object {}", id);
        Object {
            id,
            ctx: Arc::downgrade(&self.state),
            detached: false,
        }
    }

    /// Registers an immutable sample under a name, replacing any previous
    /// entry. Sources borrow it read-only from here.
    pub fn register_sample(&self, name: impl Into<String>, sample: Sample) {
        let name = name.into();
        log::debug!(
            "registering sample {:?}: {} frames at {} Hz",
            name,
            sample.frames(),
            sample.sample_rate()
        );
        self.lock().samples.insert(name, Arc::new(sample));
    }

    /// Shared handle to a registered sample.
    pub fn sample(&self, name: &str) -> Result<Arc<Sample>> {
        self.lock()
            .samples
            .get(name)
            .cloned()
            .ok_or_else(|| BinauraError::NotFound(name.to_owned()))
    }

    /// Builds a source playing a registered sample.
    pub fn create_source(&self, sample_name: &str, desc: SourceDesc) -> Result<Source> {
        let (sample, hrtf) = {
            let state = self.lock();
            let sample = state
                .samples
                .get(sample_name)
                .cloned()
                .ok_or_else(|| BinauraError::NotFound(sample_name.to_owned()))?;
            (sample, state.hrtf.clone())
        };
        Source::with_sample(sample, desc, self.desc.sample_rate, self.desc.block_size, hrtf)
    }

    /// Builds a source pulling from a stream, taking ownership of it.
    pub fn create_stream_source(
        &self,
        stream: Box<dyn Stream>,
        desc: SourceDesc,
    ) -> Result<Source> {
        let hrtf = self.lock().hrtf.clone();
        Source::with_stream(stream, desc, self.desc.sample_rate, self.desc.block_size, hrtf)
    }

    pub fn set_listener(&self, position: Vec3, velocity: Vec3, forward: Vec3) {
        let mut state = self.lock();
        state.listener = Listener {
            position,
            velocity,
            forward,
        };
    }

    pub fn listener(&self) -> Listener {
        self.lock().listener
    }

    /// Master gain applied to every source.
    pub fn set_volume(&self, master: f32) {
        if master.is_finite() && master >= 0.0 {
            self.lock().master_gain = master;
        }
    }

    pub fn volume(&self) -> f32 {
        self.lock().master_gain
    }

    pub fn set_distance_model(&self, model: DistanceModel) {
        self.lock().distance = model;
    }

    pub fn distance_model(&self) -> DistanceModel {
        self.lock().distance
    }

    /// Fills `out` with interleaved stereo f32 in [-1, 1]. The buffer length
    /// must be a multiple of `2 * block_size`; a trailing partial chunk is
    /// zeroed rather than mixed.
    pub fn process(&self, out: &mut [f32]) {
        let chunk_len = self.desc.block_size * self.desc.channels as usize;
        let mut state = self.lock();
        for chunk in out.chunks_mut(chunk_len) {
            if chunk.len() == chunk_len {
                state.mix_block(chunk);
            } else {
                log::warn!(
                    "partial block of {} samples requested, substituting silence",
                    chunk.len()
                );
                chunk.fill(0.0);
            }
        }
    }

    /// Fills `out` with interleaved signed 16-bit stereo, clipping to the
    /// PCM range.
    pub fn process_i16(&self, out: &mut [i16]) {
        let chunk_len = self.desc.block_size * self.desc.channels as usize;
        let mut state = self.lock();
        for chunk in out.chunks_mut(chunk_len) {
            if chunk.len() != chunk_len {
                chunk.fill(0);
                continue;
            }
            let mut scratch = std::mem::take(&mut state.mix_scratch);
            state.mix_block(&mut scratch);
            for (dst, src) in chunk.iter_mut().zip(&scratch) {
                *dst = (src * 32767.0).round().clamp(-32768.0, 32767.0) as i16;
            }
            state.mix_scratch = scratch;
        }
    }
}

//! binaura - cross-platform 3D positional audio mixing.
//!
//! A scene of [`Object`]s positioned in three-space each emit one or more
//! [`Source`]s (predecoded [`Sample`]s or pull-based [`Stream`]s), heard by a
//! single listener. The mixer applies per-source HRTF panning, distance
//! attenuation, Doppler pitch shift, looping and fades, and sums everything
//! into interleaved stereo PCM on the audio callback.
//!
//! # Architecture
//!
//! - **API thread**: game code creates a [`Context`], registers samples,
//!   spawns objects and plays sources on them. Every call takes the context's
//!   audio lock for a short critical section.
//! - **Audio thread**: the host callback (the bundled cpal [`Engine`] or your
//!   own) calls [`Context::process`], which holds the same lock for the whole
//!   block.
//!
//! ```no_run
//! use binaura::{Context, ContextDesc, Sample, SourceDesc};
//! use binaura::math::Vec3;
//!
//! let ctx = Context::new(ContextDesc::new().sample_rate(44100).block_size(1024))?;
//! ctx.register_sample("engine", Sample::from_i16(&[0i16; 44100], 44100, 1)?);
//!
//! let car = ctx.create_object();
//! car.set_position(Vec3::new(4.0, 0.0, -10.0));
//! car.play("engine", ctx.create_source("engine", SourceDesc::new().looped(true))?);
//!
//! let mut engine = binaura::Engine::new(ctx.clone());
//! engine.start()?;
//! # Ok::<(), binaura::BinauraError>(())
//! ```

pub mod buffer;
pub mod config;
pub mod context;
pub mod distance;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod events;
pub mod hrtf;
pub mod loader;
pub mod math;
pub mod object;
pub mod sample;
pub mod source;
pub mod stream;

pub use buffer::Buffer;
pub use config::ContextDesc;
pub use context::{Context, Listener};
pub use distance::{AttenuationCurve, DistanceModel};
pub use engine::Engine;
pub use error::{BinauraError, Result};
pub use events::{BinauraEvent, SourceKey};
pub use loader::{load_sample, LoadOptions, MediaStream};
pub use object::Object;
pub use sample::{PcmFormat, Sample, SampleWidth};
pub use source::{Source, SourceDesc};
pub use stream::Stream;

//! Host audio output.
//!
//! Wires a [`Context`] to the default cpal output device: the device
//! callback pulls blocks through [`Context::process`] and converts them to
//! whatever sample format the device negotiated. Everything that can fail
//! fails in [`start`](Engine::start), before the stream runs; the callback
//! itself only fills buffers.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::context::Context;
use crate::error::{BinauraError, Result};

thread_local! {
    static MIX_BUFFER: RefCell<Vec<f32>> = RefCell::new(Vec::new());
}

/// Audio engine driving a context from the host output callback.
pub struct Engine {
    context: Context,
    stream: Option<cpal::Stream>,
    is_running: Arc<AtomicBool>,
    frames_processed: Arc<AtomicUsize>,
}

impl Engine {
    pub fn new(context: Context) -> Self {
        Self {
            context,
            stream: None,
            is_running: Arc::new(AtomicBool::new(false)),
            frames_processed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }

    /// Frames delivered to the device since `start`.
    pub fn frames_processed(&self) -> usize {
        self.frames_processed.load(Ordering::Relaxed)
    }

    /// Opens the default output device at the context's exact rate and block
    /// size and starts the stream.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }

        let (device, device_config) = Self::init_audio_device()?;
        let desc = self.context.desc().clone();
        log::info!(
            "starting output: {} Hz, {} frames per callback, device {:?}",
            desc.sample_rate,
            desc.block_size,
            device.name().unwrap_or_else(|_| "<unnamed>".into())
        );

        let buffer_size = Self::validate_buffer_size(&device_config, desc.block_size)?;
        let config = cpal::StreamConfig {
            channels: desc.channels,
            sample_rate: cpal::SampleRate(desc.sample_rate),
            buffer_size,
        };

        let stream = match device_config.sample_format() {
            cpal::SampleFormat::F32 => self.create_stream::<f32>(&device, &config)?,
            cpal::SampleFormat::I16 => self.create_stream::<i16>(&device, &config)?,
            cpal::SampleFormat::U16 => self.create_stream::<u16>(&device, &config)?,
            other => {
                return Err(BinauraError::AudioDevice(format!(
                    "unsupported device sample format {:?}",
                    other
                )));
            }
        };

        stream
            .play()
            .map_err(|e| BinauraError::AudioDevice(format!("failed to start stream: {}", e)))?;

        self.stream = Some(stream);
        self.is_running.store(true, Ordering::Relaxed);
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            self.is_running.store(false, Ordering::Relaxed);
            drop(stream);
        }
    }

    fn init_audio_device() -> Result<(cpal::Device, cpal::SupportedStreamConfig)> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| BinauraError::AudioDevice("no default output device".into()))?;
        let device_config = device.default_output_config().map_err(|e| {
            BinauraError::AudioDevice(format!("failed to query default config: {}", e))
        })?;
        Ok((device, device_config))
    }

    fn validate_buffer_size(
        device_config: &cpal::SupportedStreamConfig,
        block_size: usize,
    ) -> Result<cpal::BufferSize> {
        let requested = block_size as u32;
        match device_config.buffer_size() {
            cpal::SupportedBufferSize::Range { min, max } => {
                if requested < *min || requested > *max {
                    return Err(BinauraError::AudioDevice(format!(
                        "block size {} outside device range [{}, {}]",
                        requested, min, max
                    )));
                }
                Ok(cpal::BufferSize::Fixed(requested))
            }
            cpal::SupportedBufferSize::Unknown => {
                log::warn!(
                    "device buffer size range unknown, requesting {} frames",
                    requested
                );
                Ok(cpal::BufferSize::Fixed(requested))
            }
        }
    }

    fn create_stream<T>(
        &self,
        device: &cpal::Device,
        config: &cpal::StreamConfig,
    ) -> Result<cpal::Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let context = self.context.clone();
        let is_running = self.is_running.clone();
        let frames_processed = self.frames_processed.clone();
        let channels = config.channels as usize;

        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    if !is_running.load(Ordering::Relaxed) {
                        Self::fill_silence(data);
                        return;
                    }
                    MIX_BUFFER.with(|buf| {
                        let mut mix = buf.borrow_mut();
                        mix.resize(data.len(), 0.0);
                        context.process(&mut mix);
                        for (dst, src) in data.iter_mut().zip(mix.iter()) {
                            *dst = T::from_sample(*src);
                        }
                    });
                    frames_processed.fetch_add(data.len() / channels, Ordering::Relaxed);
                },
                move |err| {
                    log::error!("audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| BinauraError::AudioDevice(format!("failed to build stream: {}", e)))?;

        Ok(stream)
    }

    fn fill_silence<T>(data: &mut [T])
    where
        T: SizedSample + FromSample<f32>,
    {
        for sample in data.iter_mut() {
            *sample = T::from_sample(0.0f32);
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}

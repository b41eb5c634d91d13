//! `CpalHost`: drives the ring from a cpal input stream.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated priority.
//! It **must not** allocate, block or log in steady state. The callback here
//! only deinterleaves into planar scratch buffers allocated up front and
//! hands them to [`CycleHandler::process`].
//!
//! cpal has no block-size-changed notification; the callback detects a new
//! buffer length itself and calls [`CycleHandler::block_size_changed`] before
//! processing. That keeps resize and process on the same thread, which is
//! exactly the exclusivity the handler requires. Resizing allocates, but
//! only on that rare event.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS). `CpalHost` therefore must be created and dropped on the same thread.

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    BufferSize, Device, InputCallbackInfo, SampleFormat, SampleRate, Stream, StreamConfig,
    StreamInstant,
};
use tracing::{error, info, warn};

use crate::config::BridgeConfig;
use crate::engine::CycleHandler;
use crate::error::HostError;
use crate::host::{AudioHost, HostInfo};

/// Block size assumed until the first callback reports the real one.
const FALLBACK_BLOCK_FRAMES: u32 = 1024;

pub struct CpalHost {
    device: Option<Device>,
    config: Option<StreamConfig>,
    block_frames: u32,
    device_channels: u16,
    ports: Vec<String>,
    handler: Option<CycleHandler>,
    stream: Option<Stream>,
}

impl CpalHost {
    pub fn new() -> Self {
        Self {
            device: None,
            config: None,
            block_frames: FALLBACK_BLOCK_FRAMES,
            device_channels: 0,
            ports: Vec::new(),
            handler: None,
            stream: None,
        }
    }

    /// Preferred device by name, else the default input, else the first input.
    fn select_device(preferred: Option<&str>) -> Result<Device, HostError> {
        let host = cpal::default_host();

        if let Some(preferred_name) = preferred {
            match host.input_devices() {
                Ok(mut devices) => {
                    let found = devices.find(|device| {
                        device
                            .name()
                            .map(|name| name == preferred_name)
                            .unwrap_or(false)
                    });
                    if let Some(device) = found {
                        return Ok(device);
                    }
                    warn!(
                        "preferred input device '{}' not found, falling back",
                        preferred_name
                    );
                }
                Err(e) => {
                    warn!("failed to list input devices while resolving preference: {e}");
                }
            }
        }

        if let Some(default) = host.default_input_device() {
            return Ok(default);
        }

        let mut devices = host
            .input_devices()
            .map_err(|e| HostError::new(e.to_string()))?;
        let fallback = devices
            .next()
            .ok_or_else(|| HostError::new("no input device available"))?;
        warn!("no default input device, falling back to first available input");
        Ok(fallback)
    }
}

impl Default for CpalHost {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioHost for CpalHost {
    fn open(&mut self, config: &BridgeConfig) -> Result<HostInfo, HostError> {
        if config.start_server {
            warn!("cpal has no audio server to start; ignoring start_server");
        }

        let device = Self::select_device(config.preferred_device.as_deref())?;
        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening input device"
        );

        let supported = device
            .default_input_config()
            .map_err(|e| HostError::new(e.to_string()))?;
        if supported.sample_format() != SampleFormat::F32 {
            return Err(HostError::new(format!(
                "unsupported sample format: {:?} (only f32 is accepted)",
                supported.sample_format()
            )));
        }

        let sample_rate = supported.sample_rate().0;
        let (buffer_size, block_frames) = match config.block_frames {
            Some(frames) => (BufferSize::Fixed(frames), frames),
            None => (BufferSize::Default, FALLBACK_BLOCK_FRAMES),
        };

        self.device_channels = supported.channels();
        self.block_frames = block_frames;
        self.config = Some(StreamConfig {
            channels: supported.channels(),
            sample_rate: SampleRate(sample_rate),
            buffer_size,
        });
        self.device = Some(device);

        Ok(HostInfo {
            sample_rate,
            block_frames,
        })
    }

    fn register_input(&mut self, port_name: &str) -> Result<(), HostError> {
        if self.ports.len() >= self.device_channels as usize {
            return Err(HostError::new(format!(
                "device has only {} input channels",
                self.device_channels
            )));
        }
        self.ports.push(port_name.to_string());
        Ok(())
    }

    fn install_handler(&mut self, handler: CycleHandler) -> Result<(), HostError> {
        self.handler = Some(handler);
        Ok(())
    }

    fn activate(&mut self) -> Result<(), HostError> {
        let (Some(device), Some(mut config), Some(handler)) =
            (self.device.as_ref(), self.config.clone(), self.handler.clone())
        else {
            return Err(HostError::new("activate called before open/install"));
        };

        let ports = self.ports.len();
        if ports == 0 {
            return Err(HostError::new("no input ports registered"));
        }
        config.channels = ports as u16;

        let channels = ports;
        let mut current_frames = self.block_frames as usize;
        let mut planes: Vec<Vec<f32>> = vec![vec![0.0; current_frames]; channels];
        let mut origin: Option<StreamInstant> = None;

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], info: &InputCallbackInfo| {
                    let frames = data.len() / channels;
                    if frames == 0 {
                        return;
                    }
                    if frames != current_frames {
                        if handler.block_size_changed(frames as u32).is_err() {
                            return;
                        }
                        for plane in &mut planes {
                            plane.resize(frames, 0.0);
                        }
                        current_frames = frames;
                    }

                    for (f, frame) in data.chunks_exact(channels).enumerate() {
                        for (plane, sample) in planes.iter_mut().zip(frame) {
                            plane[f] = *sample;
                        }
                    }

                    let capture = info.timestamp().capture;
                    let start = *origin.get_or_insert(capture);
                    let host_time = capture
                        .duration_since(&start)
                        .map(|d| d.as_micros() as u64)
                        .unwrap_or(0);

                    handler.process(frames as u32, &planes, host_time);
                },
                |err| error!("audio stream error: {err}"),
                None,
            )
            .map_err(|e| HostError::new(e.to_string()))?;

        stream.play().map_err(|e| HostError::new(e.to_string()))?;
        self.stream = Some(stream);
        Ok(())
    }

    fn deactivate(&mut self) -> Result<(), HostError> {
        if let Some(stream) = self.stream.take() {
            let paused = stream.pause().map_err(|e| HostError::new(e.to_string()));
            // Dropping the stream joins cpal's callback thread.
            drop(stream);
            paused?;
        }
        Ok(())
    }

    fn unregister_inputs(&mut self) {
        self.ports.clear();
    }

    fn close(&mut self) {
        self.stream = None;
        self.handler = None;
        self.config = None;
        self.device = None;
    }
}

use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, StreamConfig};
use tokio::sync::mpsc;

use crate::media::{MediaBackend, MediaError, MediaStreams};
use crate::playback::PlaybackConsumer;

// Waits on the audio thread without stalling other tasks on a multi-threaded runtime.
fn wait_for_audio_thread<R>(f: impl FnOnce() -> R) -> R {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == tokio::runtime::RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

fn get_host() -> cpal::Host {
    cpal::default_host()
}

fn backend_error(description: String) -> MediaError {
    let lowered = description.to_lowercase();
    if lowered.contains("permission") || lowered.contains("denied") {
        MediaError::PermissionDenied(description)
    } else {
        MediaError::Stream(description)
    }
}

impl From<cpal::DevicesError> for MediaError {
    fn from(e: cpal::DevicesError) -> Self {
        MediaError::DeviceUnavailable(e.to_string())
    }
}

impl From<cpal::DefaultStreamConfigError> for MediaError {
    fn from(e: cpal::DefaultStreamConfigError) -> Self {
        match e {
            cpal::DefaultStreamConfigError::DeviceNotAvailable => {
                MediaError::DeviceUnavailable(e.to_string())
            }
            cpal::DefaultStreamConfigError::StreamTypeNotSupported => {
                MediaError::UnsupportedConfig(e.to_string())
            }
            cpal::DefaultStreamConfigError::BackendSpecific { err } => {
                backend_error(err.description)
            }
        }
    }
}

impl From<cpal::BuildStreamError> for MediaError {
    fn from(e: cpal::BuildStreamError) -> Self {
        match e {
            cpal::BuildStreamError::DeviceNotAvailable => {
                MediaError::DeviceUnavailable(e.to_string())
            }
            cpal::BuildStreamError::StreamConfigNotSupported
            | cpal::BuildStreamError::InvalidArgument => {
                MediaError::UnsupportedConfig(e.to_string())
            }
            cpal::BuildStreamError::BackendSpecific { err } => backend_error(err.description),
            other => MediaError::Stream(other.to_string()),
        }
    }
}

impl From<cpal::PlayStreamError> for MediaError {
    fn from(e: cpal::PlayStreamError) -> Self {
        match e {
            cpal::PlayStreamError::DeviceNotAvailable => {
                MediaError::DeviceUnavailable(e.to_string())
            }
            cpal::PlayStreamError::BackendSpecific { err } => backend_error(err.description),
        }
    }
}

pub fn get_or_default_input(device_name: Option<&str>) -> Result<Device, MediaError> {
    let host = get_host();
    tracing::debug!("Host: {:?}", host.id());
    match device_name {
        None => host
            .default_input_device()
            .ok_or_else(|| MediaError::DeviceUnavailable("no default input device".to_string())),
        Some(target) => host
            .input_devices()?
            .find(|device| device.name().is_ok_and(|name| name == target))
            .ok_or_else(|| MediaError::DeviceUnavailable(format!("no input device named {target}"))),
    }
}

pub fn get_or_default_output(device_name: Option<&str>) -> Result<Device, MediaError> {
    let host = get_host();
    match device_name {
        None => host
            .default_output_device()
            .ok_or_else(|| MediaError::DeviceUnavailable("no default output device".to_string())),
        Some(target) => host
            .output_devices()?
            .find(|device| device.name().is_ok_and(|name| name == target))
            .ok_or_else(|| {
                MediaError::DeviceUnavailable(format!("no output device named {target}"))
            }),
    }
}

fn describe(device: &Device, config: &cpal::SupportedStreamConfig, default_name: &str) -> String {
    let name = device.name().unwrap_or_else(|_| "<unnamed>".to_string());
    let mut line = format!(
        " * {}({}ch, {}hz)",
        name,
        config.channels(),
        config.sample_rate().0
    );
    if name == default_name {
        line.push_str(" [default]");
    }
    line
}

pub fn get_available_inputs() -> Result<String, MediaError> {
    for host in cpal::available_hosts() {
        tracing::debug!("Available host: {:?}", host);
    }

    let host = get_host();
    let default_device = host
        .default_input_device()
        .and_then(|device| device.name().ok())
        .unwrap_or_default();

    let mut device_names: Vec<String> = Vec::new();
    for device in host.input_devices()? {
        match device.default_input_config() {
            Ok(config) => device_names.push(describe(&device, &config, &default_device)),
            Err(e) => tracing::debug!("skipping input device without default config: {}", e),
        }
    }
    Ok(device_names.join("\n"))
}

pub fn get_available_outputs() -> Result<String, MediaError> {
    let host = get_host();
    let default_device = host
        .default_output_device()
        .and_then(|device| device.name().ok())
        .unwrap_or_default();

    let mut device_names: Vec<String> = Vec::new();
    for device in host.output_devices()? {
        match device.default_output_config() {
            Ok(config) => device_names.push(describe(&device, &config, &default_device)),
            Err(e) => tracing::debug!("skipping output device without default config: {}", e),
        }
    }
    Ok(device_names.join("\n"))
}

enum DeviceCommand {
    StopCapture,
    StopPlayback,
}

struct StartedStreams {
    input: cpal::Stream,
    output: cpal::Stream,
    capture_sample_rate: u32,
    playback_sample_rate: u32,
}

fn start_streams(
    input_name: Option<&str>,
    output_name: Option<&str>,
    mut playback: PlaybackConsumer,
    frames: mpsc::Sender<Vec<f32>>,
) -> Result<StartedStreams, MediaError> {
    let input = get_or_default_input(input_name)?;
    tracing::info!("Using input device: {:?}", input.name());
    let input_config = input.default_input_config()?;
    let input_config = StreamConfig {
        channels: input_config.channels(),
        sample_rate: input_config.sample_rate(),
        buffer_size: cpal::BufferSize::Default,
    };
    let input_channel_count = input_config.channels as usize;
    let SampleRate(capture_sample_rate) = input_config.sample_rate;
    tracing::info!("Input stream config: {:?}", &input_config);

    // Downmix to mono and hand the frame to the event loop without blocking.
    let input_data_fn = move |data: &[f32], _: &cpal::InputCallbackInfo| {
        let audio = if input_channel_count > 1 {
            data.chunks(input_channel_count)
                .map(|c| c.iter().sum::<f32>() / input_channel_count as f32)
                .collect::<Vec<f32>>()
        } else {
            data.to_vec()
        };
        if let Err(e) = frames.try_send(audio) {
            tracing::warn!("Dropping captured frame: {}", e);
        }
    };
    let input_stream = input.build_input_stream(
        &input_config,
        input_data_fn,
        move |err| tracing::error!("An error occurred on input stream: {}", err),
        None,
    )?;

    let output = get_or_default_output(output_name)?;
    tracing::info!("Using output device: {:?}", output.name());
    let output_config = output.default_output_config()?;
    let output_config = StreamConfig {
        channels: output_config.channels(),
        sample_rate: output_config.sample_rate(),
        buffer_size: cpal::BufferSize::Default,
    };
    let output_channel_count = (output_config.channels as usize).max(1);
    let SampleRate(playback_sample_rate) = output_config.sample_rate;
    tracing::info!("Output stream config: {:?}", &output_config);

    // Mono ring audio is copied to every output channel.
    let output_data_fn = move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        for frame in data.chunks_mut(output_channel_count) {
            let sample = playback.pull_sample();
            frame.fill(sample);
        }
    };
    let output_stream = output.build_output_stream(
        &output_config,
        output_data_fn,
        move |err| tracing::error!("An error occurred on output stream: {}", err),
        None,
    )?;

    input_stream.play()?;
    output_stream.play()?;

    Ok(StartedStreams {
        input: input_stream,
        output: output_stream,
        capture_sample_rate,
        playback_sample_rate,
    })
}

/// Media backend over the host's default (or named) audio devices.
#[derive(Debug, Clone, Default)]
pub struct CpalBackend {
    input_device: Option<String>,
    output_device: Option<String>,
}

impl CpalBackend {
    pub fn new(input_device: Option<String>, output_device: Option<String>) -> Self {
        Self {
            input_device,
            output_device,
        }
    }
}

impl MediaBackend for CpalBackend {
    fn open(
        &mut self,
        playback: PlaybackConsumer,
        frames: mpsc::Sender<Vec<f32>>,
    ) -> Result<Box<dyn MediaStreams>, MediaError> {
        let input_name = self.input_device.clone();
        let output_name = self.output_device.clone();
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<(u32, u32), MediaError>>();
        let (command_tx, command_rx) = std_mpsc::channel::<DeviceCommand>();

        // cpal streams are not Send, so they live and die on their own thread.
        let handle = std::thread::Builder::new()
            .name("adk-stream-audio".to_string())
            .spawn(move || {
                let started = match start_streams(
                    input_name.as_deref(),
                    output_name.as_deref(),
                    playback,
                    frames,
                ) {
                    Ok(started) => started,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let mut input = Some(started.input);
                let mut output = Some(started.output);
                let _ = ready_tx.send(Ok((
                    started.capture_sample_rate,
                    started.playback_sample_rate,
                )));

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DeviceCommand::StopCapture => {
                            drop(input.take());
                            tracing::debug!("input stream released");
                        }
                        DeviceCommand::StopPlayback => break,
                    }
                }
                drop(input.take());
                drop(output.take());
                tracing::debug!("output stream released");
            })
            .map_err(|e| MediaError::Stream(e.to_string()))?;

        let (capture_sample_rate, playback_sample_rate) = wait_for_audio_thread(|| ready_rx.recv())
            .map_err(|_| MediaError::Stream("audio thread exited during setup".to_string()))??;

        Ok(Box::new(CpalStreams {
            command_tx,
            handle: Some(handle),
            capture_sample_rate,
            playback_sample_rate,
        }))
    }
}

struct CpalStreams {
    command_tx: std_mpsc::Sender<DeviceCommand>,
    handle: Option<JoinHandle<()>>,
    capture_sample_rate: u32,
    playback_sample_rate: u32,
}

impl MediaStreams for CpalStreams {
    fn capture_sample_rate(&self) -> u32 {
        self.capture_sample_rate
    }

    fn playback_sample_rate(&self) -> u32 {
        self.playback_sample_rate
    }

    fn stop_capture(&mut self) {
        let _ = self.command_tx.send(DeviceCommand::StopCapture);
    }

    fn stop_playback(&mut self) {
        let _ = self.command_tx.send(DeviceCommand::StopPlayback);
        if let Some(handle) = self.handle.take() {
            if wait_for_audio_thread(|| handle.join()).is_err() {
                tracing::error!("audio thread panicked");
            }
        }
    }
}

impl Drop for CpalStreams {
    fn drop(&mut self) {
        self.stop_capture();
        self.stop_playback();
    }
}

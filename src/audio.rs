use futures_util::stream::StreamExt;
use log::{debug, info, warn};
use reqwest::header::CONTENT_TYPE;
use rodio::{OutputStreamHandle, Sink};
use std::io::{Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use symphonia::core::audio::{SampleBuffer, SignalSpec};
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;
use crate::playback::{DecoderEngine, EngineFactory, EngineListener};
use crate::stream::StreamTarget;

pub const USER_AGENT: &str = concat!("lotradio/", env!("CARGO_PKG_VERSION"));

const INITIAL_BUFFER_SIZE: usize = 64 * 1024; // Wait for 64KB before probing
const MAX_BUFFER_SIZE: usize = 8 * 1024 * 1024; // 8MB of unread data
const CLEANUP_THRESHOLD: usize = 2 * 1024 * 1024; // Drop consumed bytes after 2MB
const MAX_QUEUED_BUFFERS: usize = 64; // Decoded packets waiting in the sink

/// Network bytes shared between the fetch task and the decoder.
#[derive(Debug, Default)]
struct StreamBuffer {
    data: Vec<u8>,
    pos: usize,
    finished: bool,
}

impl StreamBuffer {
    fn unread(&self) -> usize {
        self.data.len() - self.pos
    }

    fn push(&mut self, chunk: &[u8]) {
        self.data.extend_from_slice(chunk);

        // Live stream: if the reader falls far behind, skip ahead instead of growing
        if self.unread() > MAX_BUFFER_SIZE {
            let drop_size = self.unread() / 4;
            self.pos += drop_size;
            debug!("Reader behind, skipped {}KB of stream data", drop_size / 1024);
        }
        if self.pos > CLEANUP_THRESHOLD {
            self.data.drain(..self.pos);
            self.pos = 0;
        }
    }

    fn read_into(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.unread());
        out[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        n
    }
}

type SharedBuffer = Arc<Mutex<StreamBuffer>>;

fn lock(buffer: &SharedBuffer) -> MutexGuard<'_, StreamBuffer> {
    buffer.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A wrapper so we can feed network chunks into Symphonia.
///
/// Reads block until data arrives; end of file is reported only once the
/// network stream has finished or the session is cancelled.
struct StreamingSource {
    buffer: SharedBuffer,
    cancel: CancellationToken,
}

impl Read for StreamingSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        loop {
            {
                let mut shared = lock(&self.buffer);
                if shared.unread() > 0 {
                    return Ok(shared.read_into(buf));
                }
                if shared.finished {
                    return Ok(0);
                }
            }
            if self.cancel.is_cancelled() {
                return Ok(0);
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}

impl Seek for StreamingSource {
    fn seek(&mut self, _: SeekFrom) -> std::io::Result<u64> {
        Err(std::io::Error::new(std::io::ErrorKind::Other, "seek not supported"))
    }
}

impl MediaSource for StreamingSource {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}

/// Builds [`StreamEngine`]s that render into the process' audio output.
pub struct StreamEngineFactory {
    stream_handle: OutputStreamHandle,
    client: reqwest::Client,
}

impl StreamEngineFactory {
    pub fn new(stream_handle: OutputStreamHandle) -> Result<Self, EngineError> {
        // No overall timeout: a live stream never finishes downloading
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            stream_handle,
            client,
        })
    }
}

impl EngineFactory for StreamEngineFactory {
    fn create(
        &self,
        target: StreamTarget,
        listener: Arc<dyn EngineListener>,
    ) -> Result<Box<dyn DecoderEngine>, EngineError> {
        let sink = Sink::try_new(&self.stream_handle).map_err(|e| EngineError::Output(e.to_string()))?;
        // Nothing is audible until the controller grants play intent
        sink.pause();

        Ok(Box::new(StreamEngine {
            url: target.uri(),
            client: self.client.clone(),
            sink: Arc::new(sink),
            listener,
            play_intent: false,
            session: None,
        }))
    }
}

/// Fetches the stream over HTTP, decodes it with Symphonia and plays it
/// through a rodio [`Sink`].
pub struct StreamEngine {
    url: &'static str,
    client: reqwest::Client,
    sink: Arc<Sink>,
    listener: Arc<dyn EngineListener>,
    play_intent: bool,
    session: Option<CancellationToken>,
}

impl DecoderEngine for StreamEngine {
    fn prepare(&mut self) {
        if let Some(previous) = self.session.take() {
            previous.cancel();
        }
        let cancel = CancellationToken::new();
        self.session = Some(cancel.clone());

        tokio::spawn(run_session(
            self.url,
            self.client.clone(),
            self.sink.clone(),
            self.listener.clone(),
            cancel,
        ));
    }

    fn set_play_intent(&mut self, play: bool) {
        self.play_intent = play;
        if play {
            self.sink.play();
        } else {
            self.sink.pause();
        }
    }

    fn play_intent(&self) -> bool {
        self.play_intent
    }

    fn set_volume(&mut self, volume: f32) {
        self.sink.set_volume(volume.clamp(0.0, 1.0));
    }

    fn release(&mut self) {
        if let Some(cancel) = self.session.take() {
            cancel.cancel();
        }
        self.play_intent = false;
        self.sink.stop();
    }
}

impl Drop for StreamEngine {
    fn drop(&mut self) {
        if let Some(cancel) = self.session.take() {
            cancel.cancel();
        }
    }
}

/// One prepare-to-teardown lifetime of an engine. Reports a terminal event
/// unless the session was cancelled by `release`.
async fn run_session(
    url: &'static str,
    client: reqwest::Client,
    sink: Arc<Sink>,
    listener: Arc<dyn EngineListener>,
    cancel: CancellationToken,
) {
    info!("Engine session started: {}", url);
    let result = stream_session(url, &client, sink, listener.clone(), &cancel).await;

    if cancel.is_cancelled() {
        debug!("Engine session cancelled");
    } else {
        match result {
            Ok(()) => listener.on_ended(),
            Err(e) => listener.on_error(e),
        }
    }
    info!("Engine session ended: {}", url);
}

async fn stream_session(
    url: &str,
    client: &reqwest::Client,
    sink: Arc<Sink>,
    listener: Arc<dyn EngineListener>,
    cancel: &CancellationToken,
) -> Result<(), EngineError> {
    debug!("Fetching stream from URL: {}", url);
    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(EngineError::Status(response.status()));
    }
    let mime = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string());

    let buffer = SharedBuffer::default();
    let fetch_cancel = cancel.child_token();
    let fetch = tokio::spawn(fetch_into(response, buffer.clone(), fetch_cancel.clone()));

    // Wait for some initial data before trying to decode
    loop {
        {
            let shared = lock(&buffer);
            if shared.unread() >= INITIAL_BUFFER_SIZE || shared.finished {
                break;
            }
        }
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(50)) => {},
            _ = cancel.cancelled() => return Ok(()),
        }
    }

    let source = StreamingSource {
        buffer: buffer.clone(),
        cancel: cancel.clone(),
    };
    let decode = {
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || decode_blocking(source, mime, sink, listener, cancel))
    };

    let decoded = decode
        .await
        .map_err(|e| EngineError::Decode(format!("decode task failed: {}", e)))?;
    fetch_cancel.cancel();
    let fetched = fetch
        .await
        .map_err(|e| EngineError::Decode(format!("fetch task failed: {}", e)))?;

    decoded.and(fetched)
}

async fn fetch_into(
    response: reqwest::Response,
    buffer: SharedBuffer,
    cancel: CancellationToken,
) -> Result<(), EngineError> {
    let mut stream = response.bytes_stream();
    let mut total_bytes = 0usize;

    let result = loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Network fetch cancelled");
                break Ok(());
            }
            next = stream.next() => next,
        };
        match next {
            Some(Ok(chunk)) => {
                total_bytes += chunk.len();
                lock(&buffer).push(&chunk);

                if total_bytes % (512 * 1024) < chunk.len() {
                    debug!("Network fetched {} KB so far", total_bytes / 1024);
                }
            }
            Some(Err(e)) => {
                warn!("Network stream failed: {}", e);
                break Err(EngineError::from(e));
            }
            None => break Ok(()),
        }
    };

    lock(&buffer).finished = true;
    debug!("Network stream ended, total bytes: {}KB", total_bytes / 1024);
    result
}

/// CPU-heavy blocking task: detect the format, decode and queue samples on the sink.
fn decode_blocking(
    source: StreamingSource,
    mime: Option<String>,
    sink: Arc<Sink>,
    listener: Arc<dyn EngineListener>,
    cancel: CancellationToken,
) -> Result<(), EngineError> {
    let mss = MediaSourceStream::new(
        Box::new(source) as Box<dyn MediaSource>,
        MediaSourceStreamOptions::default(),
    );

    let mut hint = Hint::new();
    if let Some(mime) = mime.as_deref() {
        hint.mime_type(mime);
    }
    let describe = || mime.clone().unwrap_or_else(|| "unknown stream format".to_string());

    let detected = get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| match e {
            SymphoniaError::Unsupported(_) => EngineError::NoDecoder { mime: describe() },
            other => EngineError::from(other),
        })?;
    let mut format = detected.format;

    let track = format
        .default_track()
        .ok_or_else(|| EngineError::NoDecoder { mime: describe() })?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let descriptor = get_codecs()
        .get_codec(codec_params.codec)
        .ok_or_else(|| EngineError::QueryingDecoders {
            codec: format!("{:?}", codec_params.codec),
        })?;
    let mut decoder = get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|_| EngineError::InstantiatingDecoder {
            name: descriptor.short_name.to_string(),
        })?;

    debug!(
        "Found audio track: codec={:?}, sample_rate={:?}, channels={:?}",
        codec_params.codec, codec_params.sample_rate, codec_params.channels
    );

    let mut samples: Option<(SignalSpec, SampleBuffer<f32>)> = None;
    let mut announced = false;

    loop {
        if cancel.is_cancelled() {
            debug!("Decode task cancelled");
            return Ok(());
        }

        // Don't run ahead of playback (the sink may be paused)
        while sink.len() > MAX_QUEUED_BUFFERS {
            if cancel.is_cancelled() {
                return Ok(());
            }
            std::thread::sleep(Duration::from_millis(20));
        }

        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                debug!("Stream exhausted");
                return Ok(());
            }
            Err(SymphoniaError::ResetRequired) => {
                warn!("Decoder reset required (unsupported)");
                return Err(EngineError::Decode("stream format changed mid-stream".to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                let needed = decoded.capacity() * spec.channels.count();
                let reuse = matches!(&samples, Some((s, buf)) if *s == spec && buf.capacity() >= needed);
                if !reuse {
                    samples = Some((spec, SampleBuffer::new(decoded.capacity() as u64, spec)));
                }
                let Some((_, buf)) = samples.as_mut() else {
                    continue;
                };
                buf.copy_interleaved_ref(decoded);

                sink.append(rodio::buffer::SamplesBuffer::new(
                    spec.channels.count() as u16,
                    spec.rate,
                    buf.samples().to_vec(),
                ));

                if !announced && !cancel.is_cancelled() {
                    announced = true;
                    listener.on_ready();
                }
            }
            Err(SymphoniaError::DecodeError(err)) => {
                // Non-fatal, skip bad frame
                debug!("Skipping undecodable frame: {}", err);
            }
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_drains_buffer() {
        let mut buffer = StreamBuffer::default();
        buffer.push(b"hello world");

        let mut out = [0u8; 5];
        assert_eq!(buffer.read_into(&mut out), 5);
        assert_eq!(&out, b"hello");
        assert_eq!(buffer.unread(), 6);
    }

    #[test]
    fn test_reader_far_behind_skips_ahead() {
        let mut buffer = StreamBuffer::default();
        let chunk = vec![0u8; 1024 * 1024];
        for _ in 0..9 {
            buffer.push(&chunk);
        }
        assert!(buffer.unread() <= MAX_BUFFER_SIZE);
    }

    #[test]
    fn test_consumed_bytes_are_dropped() {
        let mut buffer = StreamBuffer::default();
        let chunk = vec![1u8; CLEANUP_THRESHOLD + 1];
        buffer.push(&chunk);
        let mut out = vec![0u8; CLEANUP_THRESHOLD + 1];
        buffer.read_into(&mut out);

        buffer.push(b"next");
        assert_eq!(buffer.pos, 0);
        assert_eq!(buffer.data, b"next");
    }

    #[test]
    fn test_source_reports_eof_after_finish() {
        let shared = SharedBuffer::default();
        {
            let mut buffer = lock(&shared);
            buffer.push(b"abc");
            buffer.finished = true;
        }
        let mut source = StreamingSource {
            buffer: shared,
            cancel: CancellationToken::new(),
        };

        let mut out = [0u8; 8];
        assert_eq!(source.read(&mut out).unwrap(), 3);
        assert_eq!(source.read(&mut out).unwrap(), 0);
    }

    #[test]
    fn test_source_stops_waiting_when_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut source = StreamingSource {
            buffer: SharedBuffer::default(),
            cancel,
        };

        let mut out = [0u8; 8];
        assert_eq!(source.read(&mut out).unwrap(), 0);
    }

    #[test]
    fn test_user_agent_names_crate() {
        assert!(USER_AGENT.starts_with("lotradio/"));
    }
}

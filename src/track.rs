//! Track binding: turns the active local video track into a frame-capture handle.
//!
//! Video acquisition itself lives outside this crate and is consumed through
//! [`VideoSource`], [`LocalTrack`] and [`CaptureFactory`]. The [`TrackBinder`]
//! guarantees that at most one [`CaptureHandle`] is alive at any time.

use crate::error::{FacecueError, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Kind of a media track inside a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    Video,
    Audio,
}

/// A single raw track of a media stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTrack {
    pub id: String,
    pub kind: TrackKind,
}

impl MediaTrack {
    pub fn video(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: TrackKind::Video,
        }
    }

    pub fn audio(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: TrackKind::Audio,
        }
    }
}

/// The original media stream behind a local track.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaStream {
    tracks: Vec<MediaTrack>,
}

impl MediaStream {
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self { tracks }
    }

    /// The track frames are captured from: the first video track of the stream.
    pub fn first_video_track(&self) -> Option<&MediaTrack> {
        self.tracks.iter().find(|t| t.kind == TrackKind::Video)
    }
}

/// A local participant track as exposed by the conference layer.
pub trait LocalTrack: Send + Sync {
    fn id(&self) -> &str;

    /// The underlying stream, if the track is still attached to one.
    fn original_stream(&self) -> Option<MediaStream>;
}

/// Provider of the currently active local video track.
pub trait VideoSource: Send + Sync {
    fn active_local_video_track(&self) -> Option<Arc<dyn LocalTrack>>;
}

/// One captured video frame, ready to be submitted to the detection worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub track_id: String,
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Frame grabber bound to one video track.
pub trait CaptureHandle: Send {
    fn track_id(&self) -> &str;

    /// Grab the next frame from the bound track.
    fn grab_frame(&mut self) -> Result<Frame>;
}

/// Creates capture handles for video tracks.
pub trait CaptureFactory: Send + Sync {
    fn create(&self, track: &MediaTrack) -> Box<dyn CaptureHandle>;
}

/// Owns the single live capture handle.
pub struct TrackBinder {
    factory: Arc<dyn CaptureFactory>,
    handle: Option<Box<dyn CaptureHandle>>,
}

impl TrackBinder {
    pub fn new(factory: Arc<dyn CaptureFactory>) -> Self {
        Self {
            factory,
            handle: None,
        }
    }

    /// Bind to the currently active local video track.
    ///
    /// Returns `false` (and leaves no handle) if there is no such track.
    pub fn bind_active(&mut self, source: &dyn VideoSource) -> bool {
        match source.active_local_video_track() {
            Some(track) => self.bind(track.as_ref()),
            None => {
                self.release();
                tracing::debug!("no active local video track to bind");
                false
            }
        }
    }

    /// Replace the capture handle with one bound to `track`.
    ///
    /// The previous handle is dropped before the new one is created. Returns
    /// `false` if the track has no stream or the stream has no video track.
    pub fn bind(&mut self, track: &dyn LocalTrack) -> bool {
        self.release();

        let Some(stream) = track.original_stream() else {
            tracing::debug!(track = track.id(), "local track has no original stream");
            return false;
        };
        let Some(video) = stream.first_video_track() else {
            tracing::debug!(track = track.id(), "stream has no video track");
            return false;
        };

        self.handle = Some(self.factory.create(video));
        tracing::debug!(track = track.id(), video = %video.id, "capture bound");
        true
    }

    /// Drop the live handle, if any.
    pub fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            tracing::trace!(video = handle.track_id(), "capture released");
        }
    }

    pub fn is_bound(&self) -> bool {
        self.handle.is_some()
    }

    pub fn bound_track_id(&self) -> Option<&str> {
        self.handle.as_ref().map(|h| h.track_id())
    }

    /// Grab a frame through the live handle.
    pub fn grab_frame(&mut self) -> Result<Frame> {
        match self.handle.as_mut() {
            Some(handle) => handle.grab_frame(),
            None => Err(FacecueError::Capture {
                message: "no capture handle bound".to_string(),
            }),
        }
    }
}

/// Local track with a fixed stream.
#[derive(Debug, Clone)]
pub struct StaticTrack {
    id: String,
    stream: Option<MediaStream>,
}

impl StaticTrack {
    /// A track whose stream carries a single video track of the same id.
    pub fn video(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            stream: Some(MediaStream::new(vec![MediaTrack::video(id.clone())])),
            id,
        }
    }

    /// A track that has lost its original stream.
    pub fn detached(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            stream: None,
        }
    }

    pub fn with_stream(id: impl Into<String>, stream: MediaStream) -> Self {
        Self {
            id: id.into(),
            stream: Some(stream),
        }
    }
}

impl LocalTrack for StaticTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn original_stream(&self) -> Option<MediaStream> {
        self.stream.clone()
    }
}

/// Video source whose active track is set by the host.
#[derive(Default)]
pub struct StaticVideoSource {
    track: Mutex<Option<Arc<dyn LocalTrack>>>,
}

impl StaticVideoSource {
    pub fn new(track: Option<Arc<dyn LocalTrack>>) -> Self {
        Self {
            track: Mutex::new(track),
        }
    }

    pub fn set_track(&self, track: Option<Arc<dyn LocalTrack>>) {
        if let Ok(mut guard) = self.track.lock() {
            *guard = track;
        }
    }
}

impl VideoSource for StaticVideoSource {
    fn active_local_video_track(&self) -> Option<Arc<dyn LocalTrack>> {
        self.track.lock().ok().and_then(|guard| guard.clone())
    }
}

/// Capture factory producing blank frames of a fixed size.
///
/// Tracks how many of its handles are alive, which makes the
/// single-live-handle guarantee observable.
#[derive(Debug, Clone)]
pub struct SyntheticCaptureFactory {
    width: u32,
    height: u32,
    live: Arc<AtomicUsize>,
    created: Arc<AtomicUsize>,
}

impl SyntheticCaptureFactory {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            live: Arc::new(AtomicUsize::new(0)),
            created: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn live_handles(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn created_handles(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl Default for SyntheticCaptureFactory {
    fn default() -> Self {
        Self::new(4, 4)
    }
}

impl CaptureFactory for SyntheticCaptureFactory {
    fn create(&self, track: &MediaTrack) -> Box<dyn CaptureHandle> {
        self.live.fetch_add(1, Ordering::SeqCst);
        self.created.fetch_add(1, Ordering::SeqCst);
        Box::new(SyntheticCapture {
            track_id: track.id.clone(),
            width: self.width,
            height: self.height,
            sequence: 0,
            live: Arc::clone(&self.live),
        })
    }
}

struct SyntheticCapture {
    track_id: String,
    width: u32,
    height: u32,
    sequence: u64,
    live: Arc<AtomicUsize>,
}

impl CaptureHandle for SyntheticCapture {
    fn track_id(&self) -> &str {
        &self.track_id
    }

    fn grab_frame(&mut self) -> Result<Frame> {
        let sequence = self.sequence;
        self.sequence += 1;
        Ok(Frame {
            track_id: self.track_id.clone(),
            sequence,
            width: self.width,
            height: self.height,
            pixels: vec![0; (self.width * self.height * 4) as usize],
        })
    }
}

impl Drop for SyntheticCapture {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

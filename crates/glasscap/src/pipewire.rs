//! PipeWire stream playback through GStreamer.

use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use gstreamer::prelude::*;
use gstreamer_app::{AppSink, AppSinkCallbacks};
use gstreamer_video::{VideoCropMeta, VideoInfo, VideoMeta};
use tracing::{debug, trace, warn};

use glass_ipc::abi::BridgeStatus;

use crate::backend::StatusCell;
use crate::delivery::Feed;
use crate::error::{ModuleError, ModuleResult};

/// The part of a buffer handed to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    /// Byte offset of the first pixel from the start of the plane.
    pub offset: usize,
    pub width: u32,
    pub height: u32,
}

/// Region to deliver for a `width` x `height` frame with row `stride`.
///
/// A crop rectangle that differs from the nominal size selects a
/// sub-rectangle at the same stride. Returns `None` if the crop falls
/// outside the frame.
pub fn crop_region(
    width: u32,
    height: u32,
    stride: usize,
    crop: Option<(u32, u32, u32, u32)>,
) -> Option<Region> {
    match crop {
        Some((x, y, w, h)) if w > 0 && h > 0 && (w, h) != (width, height) => {
            if x.checked_add(w)? > width || y.checked_add(h)? > height {
                return None;
            }
            Some(Region {
                offset: x as usize * 4 + y as usize * stride,
                width: w,
                height: h,
            })
        }
        _ => Some(Region {
            offset: 0,
            width,
            height,
        }),
    }
}

/// A playing `pipewiresrc ! appsink` pipeline.
pub struct PipeWireStream {
    pipeline: gstreamer::Pipeline,
    watching: Arc<AtomicBool>,
}

impl PipeWireStream {
    pub fn start(
        fd: RawFd,
        node_id: u32,
        feed: Feed,
        status: Arc<StatusCell>,
    ) -> ModuleResult<Self> {
        gstreamer::init().map_err(|e| ModuleError::Pipeline(e.to_string()))?;

        let description = format!(
            "pipewiresrc fd={fd} path={node_id} do-timestamp=true \
             ! video/x-raw,format={{BGRx,BGRA}} \
             ! appsink name=sink max-buffers=2 drop=true sync=false"
        );
        debug!("GStreamer pipeline: {}", description);

        let pipeline = gstreamer::parse::launch(&description)
            .map_err(|e| ModuleError::Pipeline(e.to_string()))?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| ModuleError::Pipeline("expected a pipeline".into()))?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| ModuleError::Pipeline("appsink missing".into()))?
            .downcast::<AppSink>()
            .map_err(|_| ModuleError::Pipeline("sink is not an appsink".into()))?;

        appsink.set_callbacks(
            AppSinkCallbacks::builder()
                .new_sample(move |sink| {
                    let sample = sink.pull_sample().map_err(|_| gstreamer::FlowError::Eos)?;
                    deliver_sample(&sample, &feed);
                    Ok(gstreamer::FlowSuccess::Ok)
                })
                .build(),
        );

        let bus = pipeline
            .bus()
            .ok_or_else(|| ModuleError::Pipeline("pipeline has no bus".into()))?;
        let watching = Arc::new(AtomicBool::new(true));
        let still_watching = Arc::clone(&watching);
        thread::Builder::new()
            .name("glasscap-bus".into())
            .spawn(move || watch_bus(bus, still_watching, status))
            .map_err(|e| ModuleError::Thread(e.to_string()))?;

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| ModuleError::Pipeline(e.to_string()))?;

        Ok(Self { pipeline, watching })
    }

    pub fn stop(self) {
        self.watching.store(false, Ordering::SeqCst);
        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            warn!("Failed to stop pipeline: {}", e);
        }
        debug!("PipeWire stream stopped");
    }
}

fn watch_bus(bus: gstreamer::Bus, watching: Arc<AtomicBool>, status: Arc<StatusCell>) {
    while watching.load(Ordering::SeqCst) {
        let Some(message) = bus.timed_pop(gstreamer::ClockTime::from_mseconds(250)) else {
            continue;
        };

        match message.view() {
            gstreamer::MessageView::Eos(_) => {
                warn!("PipeWire stream ended");
                status.set(BridgeStatus::Failed);
                break;
            }
            gstreamer::MessageView::Error(e) => {
                warn!(error = %e.error(), "PipeWire stream error");
                status.set(BridgeStatus::Failed);
                break;
            }
            _ => {}
        }
    }
}

fn deliver_sample(sample: &gstreamer::SampleRef, feed: &Feed) {
    let (Some(buffer), Some(caps)) = (sample.buffer(), sample.caps()) else {
        return;
    };
    let Ok(info) = VideoInfo::from_caps(caps) else {
        warn!("Sample without video caps");
        return;
    };

    // Producers may pad rows beyond what the caps imply.
    let (stride, plane_offset) = buffer
        .meta::<VideoMeta>()
        .map(|meta| (meta.stride()[0], meta.offset()[0]))
        .unwrap_or((info.stride()[0], info.offset()[0]));
    let Ok(stride) = usize::try_from(stride) else {
        return;
    };

    let crop = buffer.meta::<VideoCropMeta>().map(|meta| meta.rect());
    let Some(region) = crop_region(info.width(), info.height(), stride, crop) else {
        warn!(?crop, "Crop region outside frame, dropping");
        return;
    };
    if region.width != info.width() || region.height != info.height() {
        trace!(
            width = region.width,
            height = region.height,
            "Delivering cropped frame"
        );
    }

    let Ok(map) = buffer.map_readable() else {
        return;
    };
    let Some(data) = map.as_slice().get(plane_offset + region.offset..) else {
        return;
    };

    feed.deliver(data, region.width, region.height, stride as u32);
}

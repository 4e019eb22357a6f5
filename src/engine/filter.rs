//! Filter stage: identity or filter graph between decoder and encoder

use tracing::{debug, warn};

use crate::error::TranscodeError;
use crate::ports::{CodecError, FilterGraph, MediaFrame, Receive};

/// Filtering stage for one transcoded stream.
///
/// Without a graph frames are forwarded untouched. With a graph, per-frame
/// failures drop the frame and are counted; they never abort the run.
pub struct FilterStage<G: FilterGraph> {
    stream_index: usize,
    graph: Option<G>,
    frames_dropped: u64,
    flushed: bool,
}

impl<G: FilterGraph> FilterStage<G> {
    /// Forward frames unchanged
    pub fn identity(stream_index: usize) -> Self {
        Self {
            stream_index,
            graph: None,
            frames_dropped: 0,
            flushed: false,
        }
    }

    pub fn with_graph(stream_index: usize, graph: G) -> Self {
        Self {
            stream_index,
            graph: Some(graph),
            frames_dropped: 0,
            flushed: false,
        }
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }

    /// Constrain audio output to fixed-size frames
    pub fn set_frame_size(&mut self, samples: u32) {
        if let Some(graph) = self.graph.as_mut() {
            graph.set_frame_size(samples);
        }
    }

    /// Push one frame and pull everything the graph produces for it
    pub fn apply(&mut self, frame: G::Frame) -> FilteredFrames<'_, G> {
        let Some(graph) = self.graph.as_mut() else {
            return FilteredFrames {
                stage: self,
                passthrough: Some(frame),
                finished: true,
            };
        };

        let finished = match graph.push(Some(&frame)) {
            Ok(()) => false,
            Err(e) => {
                self.drop_frame(&e);
                true
            }
        };
        FilteredFrames {
            stage: self,
            passthrough: None,
            finished,
        }
    }

    /// Signal end of input and pull the remaining frames
    pub fn flush(&mut self) -> FilteredFrames<'_, G> {
        let mut finished = true;
        if !self.flushed {
            self.flushed = true;
            if let Some(graph) = self.graph.as_mut() {
                debug!(stream = self.stream_index, "Flushing filter graph");
                match graph.push(None) {
                    Ok(()) => finished = false,
                    Err(e) => warn!(stream = self.stream_index, "{}", self.error(&e)),
                }
            }
        }
        FilteredFrames {
            stage: self,
            passthrough: None,
            finished,
        }
    }

    fn drop_frame(&mut self, e: &CodecError) {
        warn!(stream = self.stream_index, "{}", self.error(e));
        self.frames_dropped += 1;
    }

    fn error(&self, e: &CodecError) -> TranscodeError {
        TranscodeError::FilterError {
            stream_index: self.stream_index,
            message: e.to_string(),
        }
    }
}

/// Lazy sequence of frames leaving the filter stage. Frames carry the
/// graph sink's time base.
pub struct FilteredFrames<'a, G: FilterGraph> {
    stage: &'a mut FilterStage<G>,
    passthrough: Option<G::Frame>,
    finished: bool,
}

impl<'a, G: FilterGraph> Iterator for FilteredFrames<'a, G> {
    type Item = G::Frame;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(frame) = self.passthrough.take() {
            return Some(frame);
        }
        if self.finished {
            return None;
        }

        let stage = &mut *self.stage;
        let graph = stage.graph.as_mut()?;
        match graph.pull() {
            Ok(Receive::Ready(mut frame)) => {
                frame.set_time_base(graph.output_time_base());
                Some(frame)
            }
            Ok(Receive::NeedMoreInput) | Ok(Receive::EndOfStream) => {
                self.finished = true;
                None
            }
            Err(e) => {
                stage.drop_frame(&e);
                self.finished = true;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{StreamFormat, Timebase, VideoFormat};
    use crate::error::ErrorCategory;
    use crate::ports::CodecResult;

    struct StubFrame {
        pts: Option<i64>,
        time_base: Timebase,
    }

    impl MediaFrame for StubFrame {
        fn pts(&self) -> Option<i64> {
            self.pts
        }
        fn set_pts(&mut self, pts: Option<i64>) {
            self.pts = pts;
        }
        fn time_base(&self) -> Timebase {
            self.time_base
        }
        fn set_time_base(&mut self, time_base: Timebase) {
            self.time_base = time_base;
        }
        fn samples(&self) -> Option<i64> {
            None
        }
    }

    /// Refuses odd frames on push and fails the pull after every even one
    #[derive(Default)]
    struct FlakyGraph {
        pushed: usize,
        pending: Option<Option<i64>>,
    }

    impl FilterGraph for FlakyGraph {
        type Frame = StubFrame;

        fn push(&mut self, frame: Option<&StubFrame>) -> CodecResult<()> {
            let Some(frame) = frame else {
                return Err(CodecError::new("End of file"));
            };
            self.pushed += 1;
            if self.pushed % 2 == 1 {
                return Err(CodecError::new("Invalid argument"));
            }
            self.pending = Some(frame.pts);
            Ok(())
        }

        fn pull(&mut self) -> CodecResult<Receive<StubFrame>> {
            match self.pending.take() {
                Some(pts) => Ok(Receive::Ready(StubFrame {
                    pts,
                    time_base: Timebase::raw(0, 1),
                })),
                None => Err(CodecError::new("Resource temporarily unavailable")),
            }
        }

        fn output_time_base(&self) -> Timebase {
            Timebase::raw(1, 25)
        }

        fn output_format(&self) -> StreamFormat {
            StreamFormat::Video(VideoFormat {
                width: 320,
                height: 240,
                pixel_format: "yuv420p".to_string(),
                sample_aspect_ratio: Timebase::raw(1, 1),
                frame_rate: None,
            })
        }

        fn set_frame_size(&mut self, _samples: u32) {}
    }

    fn frame(pts: i64) -> StubFrame {
        StubFrame {
            pts: Some(pts),
            time_base: Timebase::raw(1, 90000),
        }
    }

    #[test]
    fn test_identity_forwards_frames() {
        let mut stage: FilterStage<FlakyGraph> = FilterStage::identity(0);
        let out: Vec<_> = stage.apply(frame(7)).collect();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].time_base(), Timebase::raw(1, 90000));
        assert_eq!(stage.flush().count(), 0);
    }

    #[test]
    fn test_push_and_pull_failures_drop_frames() {
        let mut stage = FilterStage::with_graph(3, FlakyGraph::default());

        // Refused on push
        assert_eq!(stage.apply(frame(0)).count(), 0);
        assert_eq!(stage.frames_dropped(), 1);

        // Accepted, one frame out, then the pull fails
        let out: Vec<_> = stage.apply(frame(1)).collect();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].pts(), Some(1));
        assert_eq!(out[0].time_base(), Timebase::raw(1, 25));
        assert_eq!(stage.frames_dropped(), 2);

        // A failed flush drops nothing and yields nothing
        assert_eq!(stage.flush().count(), 0);
        assert_eq!(stage.frames_dropped(), 2);
    }

    #[test]
    fn test_failures_reported_as_filter_errors() {
        let stage = FilterStage::with_graph(3, FlakyGraph::default());
        let error = stage.error(&CodecError::new("Invalid argument"));

        assert!(matches!(
            error,
            TranscodeError::FilterError { stream_index: 3, ref message } if message == "Invalid argument"
        ));
        assert_eq!(error.category(), ErrorCategory::Filter);
        assert!(!error.is_fatal());
    }
}

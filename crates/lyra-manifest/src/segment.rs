#![forbid(unsafe_code)]

use std::ops::Range;

use url::Url;

/// A time-bounded chunk of encoded media, or an initialization segment.
///
/// Times are in seconds; `timescale` is kept for collaborators that need the
/// original integer timing.
#[derive(Clone, Debug, PartialEq)]
pub struct Segment {
    pub id: String,
    pub is_init: bool,
    /// Start time in seconds.
    pub time: f64,
    /// Duration in seconds.
    pub duration: f64,
    /// End time in seconds (`time + duration`).
    pub end: f64,
    pub timescale: u64,
    /// Whether `duration` is authoritative (false for still-growing live segments).
    pub complete: bool,
    pub url: Option<Url>,
    pub byte_range: Option<Range<u64>>,
}

impl Segment {
    /// Media segment covering `[time, time + duration)`.
    pub fn media<S: Into<String>>(id: S, time: f64, duration: f64) -> Self {
        Self {
            id: id.into(),
            is_init: false,
            time,
            duration,
            end: time + duration,
            timescale: 1,
            complete: true,
            url: None,
            byte_range: None,
        }
    }

    /// Initialization segment (no media time).
    pub fn init<S: Into<String>>(id: S) -> Self {
        Self {
            id: id.into(),
            is_init: true,
            time: 0.0,
            duration: 0.0,
            end: 0.0,
            timescale: 1,
            complete: true,
            url: None,
            byte_range: None,
        }
    }

    pub fn with_url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    pub fn with_timescale(mut self, timescale: u64) -> Self {
        self.timescale = timescale;
        self
    }

    pub fn with_byte_range(mut self, range: Range<u64>) -> Self {
        self.byte_range = Some(range);
        self
    }

    pub fn incomplete(mut self) -> Self {
        self.complete = false;
        self
    }

    pub fn time_range(&self) -> Range<f64> {
        self.time..self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_segment_end_is_derived() {
        let seg = Segment::media("s1", 4.0, 2.0);
        assert_eq!(seg.end, 6.0);
        assert_eq!(seg.time_range(), 4.0..6.0);
        assert!(!seg.is_init);
        assert!(seg.complete);
    }

    #[test]
    fn init_segment_has_no_media_time() {
        let seg = Segment::init("init");
        assert!(seg.is_init);
        assert_eq!(seg.duration, 0.0);
    }
}

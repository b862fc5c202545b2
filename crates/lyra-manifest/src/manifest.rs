use std::sync::Arc;

use crate::{BufferType, Representation};

/// A track: one media type in one language/role, with its encodings.
#[derive(Debug)]
pub struct Adaptation {
    pub id: String,
    pub buffer_type: BufferType,
    pub language: Option<String>,
    pub representations: Vec<Arc<Representation>>,
}

impl Adaptation {
    pub fn new<S: Into<String>>(
        id: S,
        buffer_type: BufferType,
        representations: Vec<Arc<Representation>>,
    ) -> Self {
        Self {
            id: id.into(),
            buffer_type,
            language: None,
            representations,
        }
    }

    pub fn with_language<S: Into<String>>(mut self, language: S) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn representation(&self, id: &str) -> Option<&Arc<Representation>> {
        self.representations.iter().find(|r| r.id == id)
    }

    pub fn playable_representations(&self) -> Vec<Arc<Representation>> {
        self.representations
            .iter()
            .filter(|r| r.is_playable())
            .cloned()
            .collect()
    }
}

/// A time slice of the content with a fixed set of tracks.
#[derive(Debug)]
pub struct Period {
    pub id: String,
    pub start: f64,
    /// `None` while the end is unknown (live).
    pub end: Option<f64>,
    pub adaptations: Vec<Arc<Adaptation>>,
}

impl Period {
    pub fn new<S: Into<String>>(
        id: S,
        start: f64,
        end: Option<f64>,
        adaptations: Vec<Arc<Adaptation>>,
    ) -> Self {
        Self {
            id: id.into(),
            start,
            end,
            adaptations,
        }
    }

    pub fn adaptations_of(&self, buffer_type: BufferType) -> impl Iterator<Item = &Arc<Adaptation>> {
        self.adaptations
            .iter()
            .filter(move |a| a.buffer_type == buffer_type)
    }

    pub fn contains(&self, time: f64) -> bool {
        time >= self.start && self.end.is_none_or(|end| time < end)
    }
}

/// Normalized content description.
#[derive(Debug)]
pub struct Manifest {
    pub periods: Vec<Arc<Period>>,
    /// Live or otherwise still-growing content.
    pub is_dynamic: bool,
    pub is_last_period_known: bool,
}

impl Manifest {
    pub fn new(periods: Vec<Arc<Period>>, is_dynamic: bool) -> Self {
        Self {
            periods,
            is_dynamic,
            is_last_period_known: !is_dynamic,
        }
    }

    pub fn with_last_period_known(mut self, known: bool) -> Self {
        self.is_last_period_known = known;
        self
    }

    pub fn last_period(&self) -> Option<&Arc<Period>> {
        self.periods.last()
    }

    /// Whether `period` is known to be the final one.
    pub fn is_last_period(&self, period: &Period) -> bool {
        self.is_last_period_known && self.last_period().is_some_and(|p| p.id == period.id)
    }

    pub fn period_for_time(&self, time: f64) -> Option<&Arc<Period>> {
        self.periods.iter().find(|p| p.contains(time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(dynamic: bool) -> Manifest {
        Manifest::new(
            vec![
                Arc::new(Period::new("p0", 0.0, Some(10.0), vec![])),
                Arc::new(Period::new("p1", 10.0, None, vec![])),
            ],
            dynamic,
        )
    }

    #[test]
    fn last_period_requires_known_end() {
        let vod = manifest(false);
        assert!(vod.is_last_period(&vod.periods[1]));
        assert!(!vod.is_last_period(&vod.periods[0]));

        let live = manifest(true);
        assert!(!live.is_last_period(&live.periods[1]));
    }

    #[test]
    fn period_for_time_uses_half_open_bounds() {
        let m = manifest(false);
        assert_eq!(m.period_for_time(9.99).map(|p| p.id.as_str()), Some("p0"));
        assert_eq!(m.period_for_time(10.0).map(|p| p.id.as_str()), Some("p1"));
        assert_eq!(m.period_for_time(1_000.0).map(|p| p.id.as_str()), Some("p1"));
    }
}

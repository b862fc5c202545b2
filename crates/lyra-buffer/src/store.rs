//! One sink per buffer type, shared by every stream of that type.

use std::{collections::HashMap, fmt, ops::Range, sync::Arc};

use lyra_core::{CancelToken, CancellationError, SharedReference};
use lyra_events::{EventBus, SinkEvent};
use lyra_manifest::BufferType;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::{
    MediaSourceBackend, NativeSegmentSink, SegmentInventory, SegmentSink, SinkError, SinkFactory,
    SinkResult,
};

/// Where a buffer type stands.
#[derive(Clone)]
pub enum SinkStatus {
    Uninitialized,
    Disabled,
    Initialized(Arc<dyn SegmentSink>),
}

impl SinkStatus {
    pub fn is_uninitialized(&self) -> bool {
        matches!(self, Self::Uninitialized)
    }

    pub fn sink(&self) -> Option<&Arc<dyn SegmentSink>> {
        match self {
            Self::Initialized(sink) => Some(sink),
            _ => None,
        }
    }
}

impl fmt::Debug for SinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => f.write_str("Uninitialized"),
            Self::Disabled => f.write_str("Disabled"),
            Self::Initialized(sink) => f
                .debug_tuple("Initialized")
                .field(&sink.codec())
                .finish(),
        }
    }
}

/// Sink implementations for buffer types not decoded by the platform.
#[derive(Clone, Default)]
pub struct SinkStoreOptions {
    factories: HashMap<BufferType, Arc<dyn SinkFactory>>,
}

impl SinkStoreOptions {
    pub fn with_sink_factory(mut self, buffer_type: BufferType, factory: Arc<dyn SinkFactory>) -> Self {
        self.factories.insert(buffer_type, factory);
        self
    }

    pub fn has_factory(&self, buffer_type: BufferType) -> bool {
        self.factories.contains_key(&buffer_type)
    }
}

impl fmt::Debug for SinkStoreOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkStoreOptions")
            .field("factories", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Read-only snapshot of one sink.
#[derive(Clone, Debug)]
pub struct SinkMetrics {
    pub buffer_type: BufferType,
    pub codec: Option<String>,
    pub inventory: SegmentInventory,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct NativeReadiness {
    uninitialized: usize,
    initialized: usize,
}

impl NativeReadiness {
    fn is_usable(self) -> bool {
        self.uninitialized == 0 && self.initialized > 0
    }
}

#[derive(Clone)]
enum Slot {
    Disabled,
    Initialized(Arc<dyn SegmentSink>),
}

/// Creates, memoizes and disposes sinks.
///
/// Native buffer types are backed by the platform and must all be created
/// or disabled before any of them is usable.
pub struct BufferSinkStore {
    media_source: Arc<dyn MediaSourceBackend>,
    native_types: Vec<BufferType>,
    options: SinkStoreOptions,
    bus: EventBus,
    slots: Mutex<HashMap<BufferType, Slot>>,
    readiness: SharedReference<NativeReadiness>,
}

impl BufferSinkStore {
    pub fn new(
        media_source: Arc<dyn MediaSourceBackend>,
        has_video: bool,
        options: SinkStoreOptions,
        bus: EventBus,
    ) -> Self {
        let native_types = if has_video {
            vec![BufferType::Video, BufferType::Audio]
        } else {
            vec![BufferType::Audio]
        };
        let readiness = SharedReference::new(NativeReadiness {
            uninitialized: native_types.len(),
            initialized: 0,
        });
        Self {
            media_source,
            native_types,
            options,
            bus,
            slots: Mutex::new(HashMap::new()),
            readiness,
        }
    }

    /// Platform-backed types: video and audio with video content, audio
    /// only otherwise.
    pub fn get_native_buffer_types(&self) -> &[BufferType] {
        &self.native_types
    }

    pub fn is_native(&self, buffer_type: BufferType) -> bool {
        self.native_types.contains(&buffer_type)
    }

    pub fn get_status(&self, buffer_type: BufferType) -> SinkStatus {
        match self.slots.lock().get(&buffer_type) {
            None => SinkStatus::Uninitialized,
            Some(Slot::Disabled) => SinkStatus::Disabled,
            Some(Slot::Initialized(sink)) => SinkStatus::Initialized(Arc::clone(sink)),
        }
    }

    /// Sink for `buffer_type`, created on first call.
    ///
    /// An existing sink is returned as-is even if `codec` differs. A codec
    /// mismatch on a native sink is reported: platform buffers cannot be
    /// recreated mid-playback.
    pub fn create_segment_sink(
        &self,
        buffer_type: BufferType,
        codec: &str,
    ) -> SinkResult<Arc<dyn SegmentSink>> {
        let native = self.is_native(buffer_type);
        let mut slots = self.slots.lock();

        let existing = match slots.get(&buffer_type) {
            Some(Slot::Disabled) => return Err(SinkError::Disabled(buffer_type)),
            Some(Slot::Initialized(sink)) => Some(Arc::clone(sink)),
            None => None,
        };
        if let Some(existing) = existing {
            drop(slots);
            let current = existing.codec().unwrap_or_default();
            if current != codec && native {
                warn!(
                    %buffer_type,
                    current = %current,
                    requested = codec,
                    "sink store: codec mismatch on existing native sink"
                );
                self.bus.publish(SinkEvent::CodecMismatch {
                    buffer_type,
                    current,
                    requested: codec.to_string(),
                });
            } else if current != codec {
                debug!(%buffer_type, current = %current, requested = codec, "sink store: reusing custom sink");
            }
            return Ok(existing);
        }

        let sink: Arc<dyn SegmentSink> = if native {
            let backend = self
                .media_source
                .add_source_buffer(buffer_type, codec)
                .map_err(|e| SinkError::from_platform(buffer_type, e))?;
            Arc::new(NativeSegmentSink::new(buffer_type, codec, backend))
        } else {
            let Some(factory) = self.options.factories.get(&buffer_type) else {
                return Err(SinkError::UnsupportedType(buffer_type));
            };
            factory.create(buffer_type, codec)?
        };

        info!(%buffer_type, codec, native, "sink store: sink created");
        slots.insert(buffer_type, Slot::Initialized(Arc::clone(&sink)));
        self.refresh_readiness(&slots);
        drop(slots);
        self.bus.publish(SinkEvent::Created {
            buffer_type,
            codec: codec.to_string(),
        });
        Ok(sink)
    }

    /// Mark `buffer_type` as deliberately unused.
    pub fn disable_segment_sink(&self, buffer_type: BufferType) -> SinkResult<()> {
        let mut slots = self.slots.lock();
        match slots.get(&buffer_type) {
            Some(Slot::Initialized(_)) => return Err(SinkError::AlreadyCreated(buffer_type)),
            Some(Slot::Disabled) => return Ok(()),
            None => {}
        }
        debug!(%buffer_type, "sink store: sink disabled");
        slots.insert(buffer_type, Slot::Disabled);
        self.refresh_readiness(&slots);
        drop(slots);
        self.bus.publish(SinkEvent::Disabled { buffer_type });
        Ok(())
    }

    /// Resolve once every native type is created or disabled and at least
    /// one is created. Never resolves if all of them end up disabled.
    pub async fn wait_for_usable_buffers(&self, cancel: &CancelToken) -> Result<(), CancellationError> {
        self.readiness
            .wait_until(|r| r.is_usable(), cancel)
            .await
            .map(|_| ())
    }

    pub fn is_usable(&self) -> bool {
        self.readiness.get().is_usable()
    }

    /// Release the sink of `buffer_type`. The type goes back to uninitialized.
    pub fn dispose_segment_sink(&self, buffer_type: BufferType) {
        let mut slots = self.slots.lock();
        let Some(Slot::Initialized(sink)) = slots.get(&buffer_type).cloned() else {
            warn!(%buffer_type, "sink store: disposing a sink that was never created");
            return;
        };
        slots.remove(&buffer_type);
        self.refresh_readiness(&slots);
        drop(slots);
        self.release(buffer_type, &sink);
    }

    pub fn dispose_all(&self) {
        let drained: Vec<_> = {
            let mut slots = self.slots.lock();
            let drained = slots.drain().collect();
            self.refresh_readiness(&slots);
            drained
        };
        for (buffer_type, slot) in drained {
            if let Slot::Initialized(sink) = slot {
                self.release(buffer_type, &sink);
            }
        }
    }

    /// Codec and inventory of every created sink.
    pub fn metrics(&self) -> Vec<SinkMetrics> {
        let mut metrics: Vec<_> = self
            .slots
            .lock()
            .iter()
            .filter_map(|(buffer_type, slot)| match slot {
                Slot::Initialized(sink) => Some(SinkMetrics {
                    buffer_type: *buffer_type,
                    codec: sink.codec(),
                    inventory: sink.inventory(),
                }),
                Slot::Disabled => None,
            })
            .collect();
        metrics.sort_by_key(|m| m.buffer_type);
        metrics
    }

    /// Buffered ranges of the `buffer_type` sink; empty without one.
    pub fn buffered_ranges(&self, buffer_type: BufferType) -> Vec<Range<f64>> {
        self.get_status(buffer_type)
            .sink()
            .map(|s| s.buffered())
            .unwrap_or_default()
    }

    fn release(&self, buffer_type: BufferType, sink: &Arc<dyn SegmentSink>) {
        sink.dispose();
        if self.is_native(buffer_type) {
            self.media_source.remove_source_buffer(buffer_type);
        }
        info!(%buffer_type, "sink store: sink disposed");
        self.bus.publish(SinkEvent::Disposed { buffer_type });
    }

    fn refresh_readiness(&self, slots: &HashMap<BufferType, Slot>) {
        let mut readiness = NativeReadiness::default();
        for buffer_type in &self.native_types {
            match slots.get(buffer_type) {
                None => readiness.uninitialized += 1,
                Some(Slot::Initialized(_)) => readiness.initialized += 1,
                Some(Slot::Disabled) => {}
            }
        }
        let was_usable = self.readiness.get().is_usable();
        self.readiness.set_if_changed(readiness);
        if !was_usable && readiness.is_usable() {
            debug!("sink store: native buffers usable");
            self.bus.publish(SinkEvent::NativeBuffersUsable);
        }
    }
}

impl fmt::Debug for BufferSinkStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferSinkStore")
            .field("native_types", &self.native_types)
            .field("readiness", &self.readiness.get())
            .finish_non_exhaustive()
    }
}

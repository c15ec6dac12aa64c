//! Optional post-strategy enrichment passes.
//!
//! Each overlay consumes a record and hands back a (possibly) updated one.
//! Overlays own their failures: whatever goes wrong inside is logged and the
//! incoming record is returned untouched.

mod registry;
mod venv;

use async_trait::async_trait;
use log::debug;

use crate::record::MetadataRecord;

pub use registry::RegistryOverlay;
pub use venv::{VenvOverlay, diff_snapshots, snapshot_dir};

#[async_trait]
pub trait Overlay: Send + Sync {
    fn name(&self) -> &'static str;
    async fn apply(&self, record: MetadataRecord) -> MetadataRecord;
}

/// Overlays applied in insertion order.
#[derive(Default)]
pub struct OverlayPipeline {
    overlays: Vec<Box<dyn Overlay>>,
}

impl OverlayPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, overlay: Box<dyn Overlay>) {
        self.overlays.push(overlay);
    }

    pub fn len(&self) -> usize {
        self.overlays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overlays.is_empty()
    }

    pub async fn run(&self, mut record: MetadataRecord) -> MetadataRecord {
        for overlay in &self.overlays {
            debug!("Applying {} overlay to {}", overlay.name(), record.name);
            record = overlay.apply(record).await;
        }
        record
    }
}

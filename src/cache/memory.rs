//! In-memory tier of the photo cache.
//!
//! A least-recently-used table keyed by photo id, bounded by two
//! independent limits: entry count and aggregate decoded-image cost.
//! Losing this tier never loses data - the disk tier is authoritative.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use image::DynamicImage;
use uuid::Uuid;

/// Maximum number of decoded images held in memory.
pub const MAX_ENTRIES: usize = 50;

/// Maximum aggregate decoded cost in bytes (100 MiB).
pub const MAX_COST_BYTES: usize = 100 * 1024 * 1024;

/// Decoded cost of an image: width x height x 4 bytes per pixel.
pub fn image_cost(image: &DynamicImage) -> usize {
    image.width() as usize * image.height() as usize * 4
}

pub struct MemoryCache {
    entries: HashMap<Uuid, Arc<DynamicImage>>,
    /// Recency order, front = least recently used.
    order: VecDeque<Uuid>,
    total_cost: usize,
    max_entries: usize,
    max_cost: usize,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_limits(MAX_ENTRIES, MAX_COST_BYTES)
    }

    pub fn with_limits(max_entries: usize, max_cost: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            total_cost: 0,
            max_entries,
            max_cost,
        }
    }

    /// Insert an image, evicting least-recently-used entries until both
    /// limits hold again. An image too large to ever fit is evicted
    /// immediately rather than left to blow the bound.
    pub fn insert(&mut self, id: Uuid, image: Arc<DynamicImage>) {
        self.remove(id);

        self.total_cost += image_cost(&image);
        self.entries.insert(id, image);
        self.order.push_back(id);

        while self.entries.len() > self.max_entries || self.total_cost > self.max_cost {
            let Some(victim) = self.order.pop_front() else {
                break;
            };
            if let Some(evicted) = self.entries.remove(&victim) {
                self.total_cost -= image_cost(&evicted);
            }
        }
    }

    /// Look up an image, refreshing its recency on hit.
    pub fn get(&mut self, id: Uuid) -> Option<Arc<DynamicImage>> {
        let image = self.entries.get(&id).cloned()?;
        if let Some(pos) = self.order.iter().position(|&i| i == id) {
            self.order.remove(pos);
            self.order.push_back(id);
        }
        Some(image)
    }

    pub fn remove(&mut self, id: Uuid) {
        if let Some(removed) = self.entries.remove(&id) {
            self.total_cost -= image_cost(&removed);
        }
        if let Some(pos) = self.order.iter().position(|&i| i == id) {
            self.order.remove(pos);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.total_cost = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_cost(&self) -> usize {
        self.total_cost
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

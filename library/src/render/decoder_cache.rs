//! Process-wide cache of opened media decoders, keyed by source id.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use log::debug;
use lru::LruCache;

use crate::error::LibraryError;
use crate::media::DecoderPtr;

const DEFAULT_DECODER_CACHE_SIZE: usize = 128;

pub struct DecoderCache {
  decoders: Mutex<LruCache<String, DecoderPtr>>,
}

impl DecoderCache {
  pub fn new() -> Self {
    Self::with_capacity(DEFAULT_DECODER_CACHE_SIZE)
  }

  pub fn with_capacity(capacity: usize) -> Self {
    let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
    Self {
      decoders: Mutex::new(LruCache::new(capacity)),
    }
  }

  /// Get the decoder handle for a source, opening on first use.
  ///
  /// Same publish-once contract as the shader cache: one lock spans lookup
  /// and insert, entries are immutable once published, and eviction only
  /// drops the cache's reference.
  pub fn get_or_create<F>(&self, source_id: &str, open: F) -> Result<DecoderPtr, LibraryError>
  where
    F: FnOnce() -> Result<DecoderPtr, LibraryError>,
  {
    let mut decoders = self.decoders.lock().unwrap();
    if let Some(decoder) = decoders.get(source_id) {
      return Ok(Arc::clone(decoder));
    }
    debug!("opening decoder for source {:?}", source_id);
    let decoder = open()?;
    decoders.put(source_id.to_string(), Arc::clone(&decoder));
    Ok(decoder)
  }

  pub fn len(&self) -> usize {
    self.decoders.lock().unwrap().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl Default for DecoderCache {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::media;

  #[test]
  fn test_open_once_per_source() {
    let cache = DecoderCache::new();
    let a = cache
      .get_or_create("clip.mov", || media::open_source("clip.mov"))
      .unwrap();
    let b = cache
      .get_or_create("clip.mov", || panic!("must not reopen"))
      .unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(cache.len(), 1);
  }

  #[test]
  fn test_failed_open_is_not_published() {
    let cache = DecoderCache::new();
    assert!(
      cache
        .get_or_create("missing:x.mov", || media::open_source("missing:x.mov"))
        .is_err()
    );
    assert!(cache.is_empty());
  }
}

//! Process-wide cache of compiled GPU programs, keyed by node type id.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use log::debug;
use lru::LruCache;

use crate::error::LibraryError;

const DEFAULT_SHADER_CACHE_SIZE: usize = 64;

pub type ShaderProgramPtr = Arc<ShaderProgram>;

/// GPU-program descriptor returned by shader-capable nodes.
#[derive(Clone, Debug, PartialEq)]
pub struct ShaderCode {
  pub id: String,
  pub source: String,
}

impl ShaderCode {
  pub fn new(id: &str, source: &str) -> Self {
    Self {
      id: id.to_string(),
      source: source.to_string(),
    }
  }
}

/// A compiled program handle. Immutable once published.
#[derive(Debug)]
pub struct ShaderProgram {
  pub node_type: String,
  pub source_hash: u64,
}

pub struct ShaderCache {
  programs: Mutex<LruCache<String, ShaderProgramPtr>>,
  compile_count: AtomicU64,
}

impl ShaderCache {
  pub fn new() -> Self {
    Self::with_capacity(DEFAULT_SHADER_CACHE_SIZE)
  }

  pub fn with_capacity(capacity: usize) -> Self {
    let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
    Self {
      programs: Mutex::new(LruCache::new(capacity)),
      compile_count: AtomicU64::new(0),
    }
  }

  /// Get the compiled program for a node type, compiling on first use.
  ///
  /// Lookup and publish happen under one lock, so racing workers converge
  /// on a single published entry. Entries are `Arc`s; LRU eviction only
  /// drops the cache's own reference, leaving in-flight handles valid.
  pub fn get_or_create<F>(&self, node_type_id: &str, compile: F) -> Result<ShaderProgramPtr, LibraryError>
  where
    F: FnOnce() -> Result<ShaderProgram, LibraryError>,
  {
    let mut programs = self.programs.lock().unwrap();
    if let Some(program) = programs.get(node_type_id) {
      return Ok(Arc::clone(program));
    }
    debug!("compiling shader for node type {:?}", node_type_id);
    let program = Arc::new(compile()?);
    self.compile_count.fetch_add(1, Ordering::Relaxed);
    programs.put(node_type_id.to_string(), Arc::clone(&program));
    Ok(program)
  }

  /// Number of compilations performed so far.
  pub fn compile_count(&self) -> u64 {
    self.compile_count.load(Ordering::Relaxed)
  }
}

impl Default for ShaderCache {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_second_lookup_hits() {
    let cache = ShaderCache::new();
    let a = cache
      .get_or_create("merge", || {
        Ok(ShaderProgram {
          node_type: "merge".into(),
          source_hash: 7,
        })
      })
      .unwrap();
    let b = cache
      .get_or_create("merge", || panic!("must not recompile"))
      .unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(cache.compile_count(), 1);
  }

  #[test]
  fn test_failed_compile_is_not_published() {
    let cache = ShaderCache::new();
    assert!(
      cache
        .get_or_create("broken", || Err(LibraryError::render("syntax error")))
        .is_err()
    );
    assert_eq!(cache.compile_count(), 0);
    // A later good compile still publishes.
    assert!(
      cache
        .get_or_create("broken", || {
          Ok(ShaderProgram {
            node_type: "broken".into(),
            source_hash: 1,
          })
        })
        .is_ok()
    );
  }
}

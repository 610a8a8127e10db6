//! Lazy cache with an explicit dirty flag.

/// A value fetched from the camera on first use and kept until invalidated.
#[derive(Debug, Clone)]
pub struct Cached<T> {
    value: Option<T>,
    dirty: bool,
}

impl<T: Copy> Cached<T> {
    /// An empty, dirty cache.
    pub fn new() -> Self {
        Self {
            value: None,
            dirty: true,
        }
    }

    /// Force the next [`Cached::get_or_refresh`] to fetch again.
    pub fn invalidate(&mut self) {
        self.dirty = true;
    }

    /// Whether the next read will fetch.
    pub fn is_dirty(&self) -> bool {
        self.dirty || self.value.is_none()
    }

    /// Return the cached value, calling `fetch` first if it is dirty.
    ///
    /// A failed fetch leaves the cache dirty.
    pub fn get_or_refresh<E>(&mut self, fetch: impl FnOnce() -> Result<T, E>) -> Result<T, E> {
        match self.value {
            Some(value) if !self.dirty => Ok(value),
            _ => {
                let value = fetch()?;
                self.value = Some(value);
                self.dirty = false;
                Ok(value)
            }
        }
    }
}

impl<T: Copy> Default for Cached<T> {
    fn default() -> Self {
        Self::new()
    }
}

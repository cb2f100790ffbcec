//! Container configuration

/// Default cap on the number of items a container holds
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 10_000;

/// Container configuration options
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    /// Items beyond this bound are evicted oldest-first
    pub max_queue_size: usize,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
        }
    }
}

impl ContainerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the item cap
    pub fn max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = size;
        self
    }
}

//! Collector configuration.
//!
//! The defaults size the registries for on the order of 10⁵ live
//! handles and allocations so that registration stays O(1) without
//! reallocation churn.

/// Configuration for the process-wide graph.
///
/// Install with [`Graph::init`](crate::Graph::init) before the first
/// handle or allocation is created; after that point the default
/// configuration is already live and installation fails.
///
/// # Example
///
/// ```ignore
/// use graph_gc::{Graph, GraphConfig};
///
/// Graph::init(GraphConfig {
///     verbose: false,
///     ..Default::default()
/// })?;
/// ```
#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// Initial capacity of the handle registries.
    ///
    /// Attach and detach stay O(1) without reallocation up to this
    /// many live handles of each kind.
    ///
    /// Default: 100_000
    pub handle_capacity: usize,

    /// Initial capacity of the allocation range directory.
    ///
    /// Default: 100_000
    pub range_capacity: usize,

    /// Emit the advisory per-collection diagnostic lines on stderr:
    /// one when a collection is rejected because another is in
    /// flight, one when a collection completes.
    ///
    /// Default: true
    pub verbose: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            handle_capacity: 100_000,
            range_capacity: 100_000,
            verbose: true,
        }
    }
}

impl GraphConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.handle_capacity == 0 {
            return Err(ConfigError::ZeroHandleCapacity);
        }
        if self.range_capacity == 0 {
            return Err(ConfigError::ZeroRangeCapacity);
        }
        Ok(())
    }
}

/// Configuration and installation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// The handle registry capacity must be at least 1.
    ZeroHandleCapacity,
    /// The range directory capacity must be at least 1.
    ZeroRangeCapacity,
    /// The process-wide graph was already initialised.
    AlreadyInitialized,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ZeroHandleCapacity => {
                write!(f, "handle capacity must be at least 1")
            }
            ConfigError::ZeroRangeCapacity => {
                write!(f, "range capacity must be at least 1")
            }
            ConfigError::AlreadyInitialized => {
                write!(f, "the graph was already initialised")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(GraphConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_handle_capacity_rejected() {
        let config = GraphConfig {
            handle_capacity: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroHandleCapacity));
    }

    #[test]
    fn test_zero_range_capacity_rejected() {
        let config = GraphConfig {
            range_capacity: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroRangeCapacity));
    }

    #[test]
    fn test_error_display() {
        let message = ConfigError::AlreadyInitialized.to_string();
        assert!(message.contains("already initialised"));
    }
}

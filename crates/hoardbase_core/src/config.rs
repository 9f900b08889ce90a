//! Database configuration.

/// Configuration for opening a database.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether to create the database file if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to error if the database file already exists.
    pub error_if_exists: bool,

    /// Whether to sync the file after every write step (safer but slower).
    pub sync_on_write: bool,

    /// Smallest free remainder, in bytes, worth splitting off a reused slot.
    pub min_split_size: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            error_if_exists: false,
            sync_on_write: true,
            min_split_size: 64,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the database if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to error if the database exists.
    #[must_use]
    pub const fn error_if_exists(mut self, value: bool) -> Self {
        self.error_if_exists = value;
        self
    }

    /// Sets whether to sync after every write step.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Sets the minimum split size for reused slots.
    #[must_use]
    pub const fn min_split_size(mut self, size: u32) -> Self {
        self.min_split_size = size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.create_if_missing);
        assert!(!config.error_if_exists);
        assert!(config.sync_on_write);
        assert_eq!(config.min_split_size, 64);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .create_if_missing(false)
            .sync_on_write(false)
            .min_split_size(128);

        assert!(!config.create_if_missing);
        assert!(!config.sync_on_write);
        assert_eq!(config.min_split_size, 128);
    }
}

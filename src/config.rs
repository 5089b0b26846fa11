use std::sync::OnceLock;

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Process-wide tunables.
///
/// Defaults match the traditional values; `install` may be called once,
/// before any event loop is created.
#[derive(Debug, Clone)]
pub struct Config {
    /// Backlog passed to `listen(2)`.
    pub listen_backlog: i32,
    /// Maximum accepted connections per readiness dispatch.
    pub listen_starvation_limit: usize,
    /// Bytes read per dispatch before a handler re-arms itself.
    pub read_starvation_limit: usize,
    /// Bytes written per dispatch before a handler re-arms itself.
    pub write_starvation_limit: usize,
    /// Maximum stacked timer callbacks delivered per firing.
    pub interval_occurrences_limit: u64,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            listen_backlog: 128,
            listen_starvation_limit: 50,
            read_starvation_limit: 1_048_576,
            write_starvation_limit: 1_048_576,
            interval_occurrences_limit: 10,
        }
    }
}

impl Config {
    /// Installs `self` as the process-wide configuration.
    ///
    /// # Panics
    ///
    /// Panics if a configuration has already been installed or read.
    pub fn install(self) {
        if CONFIG.set(self).is_err() {
            panic!("config already installed");
        }
    }

    /// The installed configuration, or the defaults.
    pub fn global() -> &'static Config {
        CONFIG.get_or_init(Config::default)
    }
}

#[cfg(test)]
mod test {
    use super::Config;

    #[test]
    fn defaults() {
        let config = Config::default();

        assert_eq!(config.listen_backlog, 128);
        assert_eq!(config.listen_starvation_limit, 50);
        assert_eq!(config.read_starvation_limit, 1_048_576);
        assert_eq!(config.write_starvation_limit, 1_048_576);
        assert_eq!(config.interval_occurrences_limit, 10);
    }
}

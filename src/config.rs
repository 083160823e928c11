//! Process-wide configuration.
//!
//! The configuration is installed at most once per process. Until something
//! is installed explicitly, the first read installs [`Config::from_env`].
//!
//! # Environment Variables
//!
//! - `CARRIER_DIAGNOSTICS` - set to `0`, `off` or `false` to disable the
//!   dropped-payload tally of [`DiagnosticInfo`](crate::DiagnosticInfo).
//!
//! # Examples
//!
//! ```
//! use carrier::config::Config;
//!
//! Config::new().diagnostics(false).install().expect("failed to install config");
//! assert!(!Config::current().diagnostics_enabled());
//!
//! // A second installation is rejected and hands the config back.
//! let rejected = Config::new().install().unwrap_err();
//! assert!(rejected.0.diagnostics_enabled());
//! ```

use std::ffi::OsStr;

use spin::Once;

static CONFIG: Once<Config> = Once::new();

/// Settings of the payload transport.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Config {
    diagnostics: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

/// Error returned when attempting to install a configuration when one is
/// already installed.
///
/// Contains the configuration that was rejected.
#[derive(Copy, Clone)]
pub struct ConfigAlreadyInstalledError(pub Config);

impl core::fmt::Debug for ConfigAlreadyInstalledError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ConfigAlreadyInstalledError").finish()
    }
}

impl core::fmt::Display for ConfigAlreadyInstalledError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "a configuration is already installed globally")
    }
}

impl core::error::Error for ConfigAlreadyInstalledError {}

impl Config {
    /// Creates the default configuration, with diagnostics enabled.
    #[must_use]
    pub const fn new() -> Self {
        Self { diagnostics: true }
    }

    /// Creates the default configuration, adjusted by the environment
    /// variables listed in the [module documentation](self).
    #[must_use]
    pub fn from_env() -> Self {
        Self::new().with_diagnostics_var(std::env::var_os("CARRIER_DIAGNOSTICS").as_deref())
    }

    /// Applies a value of `CARRIER_DIAGNOSTICS`.
    fn with_diagnostics_var(mut self, var: Option<&OsStr>) -> Self {
        if let Some(var) = var {
            let var = var.to_string_lossy();
            let var = var.trim();
            if var == "0" || var.eq_ignore_ascii_case("off") || var.eq_ignore_ascii_case("false") {
                self.diagnostics = false;
            }
        }
        self
    }

    /// Enables or disables the dropped-payload tally.
    #[must_use]
    pub const fn diagnostics(mut self, enabled: bool) -> Self {
        self.diagnostics = enabled;
        self
    }

    /// Whether the dropped-payload tally is enabled.
    #[must_use]
    pub const fn diagnostics_enabled(&self) -> bool {
        self.diagnostics
    }

    /// Installs the configuration globally.
    ///
    /// If a configuration is already installed, explicitly or by an earlier
    /// call to [`current`](Self::current), returns a
    /// [`ConfigAlreadyInstalledError`] containing `self`.
    pub fn install(self) -> Result<(), ConfigAlreadyInstalledError> {
        let mut candidate = Some(self);
        CONFIG.call_once(|| candidate.take().unwrap_or_default());
        match candidate {
            None => {
                tracing::debug!(target: "carrier", config = ?self, "installed configuration");
                Ok(())
            }
            Some(rejected) => Err(ConfigAlreadyInstalledError(rejected)),
        }
    }

    /// The installed configuration, installing [`from_env`](Self::from_env)
    /// if nothing has been installed yet.
    #[must_use]
    pub fn current() -> Self {
        *CONFIG.call_once(Self::from_env)
    }
}

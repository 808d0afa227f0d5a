//! Locating and opening the capture module.

use std::env;
use std::ffi::c_void;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::BridgeError;

/// Base name of the capture module, without platform prefix or suffix.
pub const MODULE_NAME: &str = "glasscap";

/// Environment variable overriding the module path.
pub const MODULE_PATH_ENV: &str = "GLASSCAP_MODULE";

/// An opened capture module.
pub trait BridgeLibrary: Send + Sync {
    /// Address of an exported symbol, if present.
    fn symbol(&self, name: &str) -> Option<*const c_void>;
}

/// Opens the capture module.
pub trait LibraryLoader: Send + Sync {
    fn open(&self) -> Result<Box<dyn BridgeLibrary>, BridgeError>;
}

/// Loads the module from disk with `libloading`.
pub struct DynamicLoader {
    candidates: Vec<PathBuf>,
}

impl DynamicLoader {
    /// Try exactly one path.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            candidates: vec![path.into()],
        }
    }

    /// Paths tried in order: the override variable, next to the executable,
    /// then the platform's library search path.
    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }
}

impl Default for DynamicLoader {
    fn default() -> Self {
        let file_name = PathBuf::from(libloading::library_filename(MODULE_NAME));
        let mut candidates = Vec::new();

        if let Some(path) = env::var_os(MODULE_PATH_ENV) {
            candidates.push(PathBuf::from(path));
        }
        if let Some(dir) = env::current_exe()
            .ok()
            .as_deref()
            .and_then(Path::parent)
        {
            candidates.push(dir.join(&file_name));
        }
        candidates.push(file_name);

        Self { candidates }
    }
}

impl LibraryLoader for DynamicLoader {
    fn open(&self) -> Result<Box<dyn BridgeLibrary>, BridgeError> {
        let _guard = ErrorModeGuard::suppress();
        let mut last_error = String::from("no candidate paths");

        for path in &self.candidates {
            // SAFETY: loading runs the module's initialisers; the module is
            // ours and has none with side effects beyond its own statics.
            match unsafe { libloading::Library::new(path) } {
                Ok(library) => {
                    info!(path = %path.display(), "Loaded capture module");
                    return Ok(Box::new(DynamicLibrary(library)));
                }
                Err(e) => {
                    debug!(path = %path.display(), "Capture module not loadable: {}", e);
                    last_error = e.to_string();
                }
            }
        }

        Err(BridgeError::ModuleNotFound(last_error))
    }
}

struct DynamicLibrary(libloading::Library);

impl BridgeLibrary for DynamicLibrary {
    fn symbol(&self, name: &str) -> Option<*const c_void> {
        // SAFETY: only the address is read; callers cast it to the
        // matching signature from `glass_ipc::abi`.
        unsafe {
            self.0
                .get::<*const c_void>(name.as_bytes())
                .ok()
                .map(|symbol| *symbol)
                .filter(|address| !address.is_null())
        }
    }
}

/// Suppresses loader error dialogs on the current thread while alive.
#[cfg(windows)]
struct ErrorModeGuard(windows::Win32::System::Diagnostics::Debug::THREAD_ERROR_MODE);

#[cfg(windows)]
impl ErrorModeGuard {
    fn suppress() -> Self {
        use windows::Win32::System::Diagnostics::Debug::{
            SetThreadErrorMode, SEM_FAILCRITICALERRORS, SEM_NOGPFAULTERRORBOX,
            SEM_NOOPENFILEERRORBOX, THREAD_ERROR_MODE,
        };

        let mut previous = THREAD_ERROR_MODE::default();
        unsafe {
            let _ = SetThreadErrorMode(
                SEM_FAILCRITICALERRORS | SEM_NOGPFAULTERRORBOX | SEM_NOOPENFILEERRORBOX,
                Some(std::ptr::addr_of_mut!(previous).cast_const()),
            );
        }
        Self(previous)
    }
}

#[cfg(windows)]
impl Drop for ErrorModeGuard {
    fn drop(&mut self) {
        unsafe {
            let _ = windows::Win32::System::Diagnostics::Debug::SetThreadErrorMode(self.0, None);
        }
    }
}

#[cfg(not(windows))]
struct ErrorModeGuard;

#[cfg(not(windows))]
impl ErrorModeGuard {
    fn suppress() -> Self {
        Self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_module_reported() {
        let loader = DynamicLoader::with_path("/nonexistent/dir/libnot_a_module.so");
        let result = loader.open();
        assert!(matches!(result, Err(BridgeError::ModuleNotFound(_))));
    }

    #[test]
    fn test_default_candidates_end_with_bare_name() {
        let loader = DynamicLoader::default();
        let last = loader.candidates().last().unwrap();
        assert_eq!(
            last.as_os_str(),
            libloading::library_filename(MODULE_NAME).as_os_str()
        );
    }
}

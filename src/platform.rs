//! Platform detection for engine layout selection

use std::fmt;

/// Operating systems the engine can be supervised on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    /// macOS runs the Windows build of the engine through Wine.
    MacOs,
    Linux,
}

impl Platform {
    /// Platform this binary was compiled for.
    pub const fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }

    /// Folder under `engine/` holding the engine build for this platform.
    pub fn engine_folder(&self) -> &'static str {
        match self {
            Platform::Windows | Platform::MacOs => "win32",
            Platform::Linux => "linux",
        }
    }

    /// Engine executable inside [`Self::engine_folder`].
    pub fn engine_executable(&self) -> &'static str {
        match self {
            Platform::Windows | Platform::MacOs => "ace_console.exe",
            Platform::Linux => "acestreamengine",
        }
    }

    /// Whether the engine must be started through the compatibility layer.
    pub fn needs_compat_layer(&self) -> bool {
        matches!(self, Platform::MacOs)
    }

    /// Process names the fallback sweep is allowed to kill.
    pub fn engine_process_names(&self) -> &'static [&'static str] {
        match self {
            Platform::Windows => &["ace_console.exe", "ace_engine.exe"],
            Platform::MacOs => &["ace_console.exe", "ace_engine.exe"],
            Platform::Linux => &["acestreamengine", "start-engine"],
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Platform::Windows => "windows",
            Platform::MacOs => "macos",
            Platform::Linux => "linux",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macos_reuses_windows_build() {
        assert_eq!(Platform::MacOs.engine_folder(), Platform::Windows.engine_folder());
        assert_eq!(
            Platform::MacOs.engine_executable(),
            Platform::Windows.engine_executable()
        );
        assert!(Platform::MacOs.needs_compat_layer());
        assert!(!Platform::Windows.needs_compat_layer());
        assert!(!Platform::Linux.needs_compat_layer());
    }
}

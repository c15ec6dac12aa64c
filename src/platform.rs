/// Target platform used to evaluate environment markers.
#[derive(Debug, Clone, PartialEq)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    /// Detect the current platform
    pub fn detect() -> Self {
        Self {
            os: Self::detect_os(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }

    pub fn linux() -> Self {
        Self {
            os: "linux".to_string(),
            arch: "x86_64".to_string(),
        }
    }

    fn detect_os() -> String {
        #[cfg(target_os = "macos")]
        {
            "macos".to_string()
        }
        #[cfg(target_os = "linux")]
        {
            "linux".to_string()
        }
        #[cfg(target_os = "windows")]
        {
            "windows".to_string()
        }
        #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
        {
            std::env::consts::OS.to_string()
        }
    }

    pub fn is_windows(&self) -> bool {
        self.os == "windows"
    }

    /// Value of the `sys_platform` marker variable.
    pub fn sys_platform(&self) -> &str {
        match self.os.as_str() {
            "windows" => "win32",
            "macos" => "darwin",
            other => other,
        }
    }

    /// Value of the `platform_system` marker variable.
    pub fn platform_system(&self) -> &str {
        match self.os.as_str() {
            "windows" => "Windows",
            "macos" => "Darwin",
            "linux" => "Linux",
            other => other,
        }
    }

    /// Value of the `os_name` marker variable.
    pub fn os_name(&self) -> &str {
        if self.is_windows() { "nt" } else { "posix" }
    }

    pub fn platform_machine(&self) -> &str {
        &self.arch
    }
}

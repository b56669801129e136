//! Description of the machine the orchestration layer runs on.

/// Operating system family and address width of a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    /// OS family as reported by `std::env::consts::OS` (e.g., "linux").
    pub os: String,
    /// Pointer width in bits.
    pub pointer_width: u32,
}

impl HostInfo {
    /// The host this process is running on.
    pub fn current() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            pointer_width: usize::BITS,
        }
    }

    /// Construct an arbitrary host description.
    pub fn new(os: impl Into<String>, pointer_width: u32) -> Self {
        Self {
            os: os.into(),
            pointer_width,
        }
    }

    pub fn is_linux(&self) -> bool {
        self.os == "linux"
    }

    pub fn is_64bit(&self) -> bool {
        self.pointer_width == 64
    }

    /// Native word size in bits.
    pub fn word_size(&self) -> u32 {
        self.pointer_width
    }
}

use crate::error::{Error, Result};
use crate::host::PreviewMode;
use std::path::PathBuf;

/// Element count used when none is given on the command line.
pub const DEFAULT_ELEMENT_COUNT: usize = 16_777_216;

pub const DEFAULT_KERNEL_PATH: &str = "kernels/vector_ops.wgsl";

pub const DEFAULT_ENTRY_POINT: &str = "vector_add";

#[derive(Debug, Clone)]
pub struct Config {
    pub element_count: usize,
    pub kernel_path: PathBuf,
    pub entry_point: String,
    pub backends: wgpu::Backends,
    pub preview: PreviewMode,
    pub seed: Option<u64>,
    pub iterations: u32,
    pub verify: bool,
    pub report_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            element_count: DEFAULT_ELEMENT_COUNT,
            kernel_path: PathBuf::from(DEFAULT_KERNEL_PATH),
            entry_point: DEFAULT_ENTRY_POINT.to_string(),
            backends: wgpu::Backends::from_env().unwrap_or(wgpu::Backends::all()),
            preview: PreviewMode::default(),
            seed: None,
            iterations: 1,
            verify: false,
            report_path: None,
        }
    }
}

impl Config {
    /// Starts from the defaults.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Checks counts are in range and the entry point and backend set are non-empty.
    pub fn validate(&self) -> Result<()> {
        if self.element_count == 0 {
            return Err(Error::config("element_count must be > 0"));
        }
        // The element count reaches the kernel as a 32-bit scalar.
        if self.element_count > u32::MAX as usize {
            return Err(Error::config(format!(
                "element_count too large (max {})",
                u32::MAX
            )));
        }

        if self.entry_point.trim().is_empty() {
            return Err(Error::config("entry_point must not be empty"));
        }

        if self.iterations == 0 {
            return Err(Error::config("iterations must be > 0"));
        }

        if self.backends.is_empty() {
            return Err(Error::config("at least one backend must be enabled"));
        }

        Ok(())
    }
}

/// Builder for [`Config`]. `build` runs [`Config::validate`].
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Number of elements in each array.
    pub fn element_count(mut self, n: usize) -> Self {
        self.config.element_count = n;
        self
    }

    /// Path of the WGSL source to compile.
    pub fn kernel_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.kernel_path = path.into();
        self
    }

    /// Entry point to create the kernel from.
    pub fn entry_point<S: Into<String>>(mut self, name: S) -> Self {
        self.config.entry_point = name.into();
        self
    }

    /// Backends the adapter search may use.
    pub fn backends(mut self, backends: wgpu::Backends) -> Self {
        self.config.backends = backends;
        self
    }

    /// Parses a `WGPU_BACKEND`-style list such as `"vulkan,gl"`.
    pub fn backend_list(mut self, list: &str) -> Self {
        self.config.backends = wgpu::Backends::from_comma_list(list);
        self
    }

    /// How much of the arrays to print.
    pub fn preview(mut self, mode: PreviewMode) -> Self {
        self.config.preview = mode;
        self
    }

    /// Seed for reproducible input arrays.
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Number of timed dispatches.
    pub fn iterations(mut self, n: u32) -> Self {
        self.config.iterations = n;
        self
    }

    /// Check the output against a host-side sum.
    pub fn verify(mut self, verify: bool) -> Self {
        self.config.verify = verify;
        self
    }

    /// Write a JSON run report to `path`.
    pub fn report_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.report_path = Some(path.into());
        self
    }

    /// Validates and returns the configuration.
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

//! Run report export.

use super::metrics::TimingSummary;
use crate::error::{Error, Result};
use crate::gpu::DeviceClass;
use serde::Serialize;
use std::path::PathBuf;

/// Summary of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub device_name: String,
    pub device_class: DeviceClass,
    pub backend: String,
    pub kernel_path: String,
    pub entry_point: String,
    pub element_count: usize,
    /// Time of the first dispatch.
    pub kernel_time_ms: f64,
    pub timings: TimingSummary,
    /// `None` when verification was not requested.
    pub verified: Option<bool>,
}

/// Trait for writing run reports to different sinks.
pub trait ReportExporter {
    fn export(&self, report: &RunReport) -> Result<()>;
}

/// Writes the report as pretty-printed JSON.
#[derive(Debug, Clone)]
pub struct JsonExporter {
    output_path: PathBuf,
}

impl JsonExporter {
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
        }
    }
}

impl ReportExporter for JsonExporter {
    fn export(&self, report: &RunReport) -> Result<()> {
        let json = serde_json::to_string_pretty(report)
            .map_err(|e| Error::report(format!("JSON serialization failed: {e}")))?;

        std::fs::write(&self.output_path, json).map_err(|e| {
            Error::report(format!(
                "couldn't write {}: {e}",
                self.output_path.display()
            ))
        })?;

        tracing::info!("wrote run report to {}", self.output_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report() -> RunReport {
        RunReport {
            device_name: "llvmpipe".to_string(),
            device_class: DeviceClass::Cpu,
            backend: "Vulkan".to_string(),
            kernel_path: "kernels/vector_ops.wgsl".to_string(),
            entry_point: "vector_add".to_string(),
            element_count: 1024,
            kernel_time_ms: 0.25,
            timings: TimingSummary {
                iterations: 1,
                min_ms: 0.25,
                mean_ms: 0.25,
                p50_ms: 0.25,
                p99_ms: 0.25,
                max_ms: 0.25,
            },
            verified: Some(true),
        }
    }

    #[test]
    fn test_json_exporter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");

        JsonExporter::new(&path).export(&sample_report()).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["device_class"], "Cpu");
        assert_eq!(written["element_count"], 1024);
        assert_eq!(written["timings"]["iterations"], 1);
        assert_eq!(written["verified"], true);
    }

    #[test]
    fn test_unwritable_path_is_a_report_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("report.json");

        let result = JsonExporter::new(path).export(&sample_report());
        assert!(matches!(result, Err(Error::Report(_))));
    }
}

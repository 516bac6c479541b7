//! Shared test infrastructure for integration tests.
//!
//! Builds a throwaway sweep layout where `/bin/sh` scripts stand in for the
//! geometry tool and the solver batch pipeline.

use cfd_sweep::config::{ParameterSpace, SweepConfig, TemplatePaths, ToolSpec};
use cfd_sweep::paths::ScratchLayout;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const TEMPLATE: &str = "pitch = __PITCH_DEG__\nrpm = __RPM__\nmass_flow = __MASS_FLOW__\n";

/// Writes artifacts into scratch unless the staged rpm matches `$3`.
/// With `$4` set to `noartifacts` it exits cleanly without writing anything.
const SOLVER_SCRIPT: &str = r#"rendered="$1"
scratch="$2"
fail_rpm="$3"
mode="$4"
rpm=$(sed -n 's/^rpm = //p' "$rendered")
echo "solving rpm=$rpm"
if [ "$rpm" = "$fail_rpm" ]; then
  echo "solver diverged" >&2
  exit 7
fi
if [ "$mode" = "noartifacts" ]; then
  exit 0
fi
if [ "$mode" = "hang" ]; then
  sleep 10
fi
mkdir -p "$scratch/report_files"
echo "output $rpm" > "$scratch/case_001.out"
echo "result $rpm" > "$scratch/case_001.res"
printf 'Summary\nTotal Pressure Ratio   1.%se+00 (dimensionless)\n' "$rpm" > "$scratch/report.txt"
echo png > "$scratch/report_files/fig1.png"
"#;

/// Fails when the requested pitch matches `$2`.
const GEOMETRY_SCRIPT: &str = r#"pitch="$1"
fail_pitch="$2"
echo "apply_pitch($pitch)"
if [ "$pitch" = "$fail_pitch" ]; then
  echo "geometry update failed" >&2
  exit 1
fi
echo "$pitch" > applied_pitch.txt
"#;

pub struct SweepFixture {
    pub dir: TempDir,
    pub config: SweepConfig,
}

impl SweepFixture {
    /// One pitch angle paired with the given (rpm, mass flow) list.
    pub fn new(pitch_deg: Vec<f64>, rpm: Vec<u32>, mass_flow: Vec<f64>) -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = dir.path();
        for sub in ["base_case", "work", "geometry", "scratch", "bin"] {
            fs::create_dir_all(root.join(sub)).expect("create fixture dir");
        }
        fs::write(root.join("base_case/case.pre"), TEMPLATE).expect("write template");
        fs::write(root.join("bin/solver.sh"), SOLVER_SCRIPT).expect("write solver");
        fs::write(root.join("bin/geometry.sh"), GEOMETRY_SCRIPT).expect("write geometry");

        let rendered = root.join("work/case.pre");
        let scratch = root.join("scratch");
        let config = SweepConfig {
            schema_version: cfd_sweep::config::CONFIG_SCHEMA_VERSION,
            parameters: ParameterSpace {
                pitch_deg,
                rpm,
                mass_flow,
            },
            template: TemplatePaths {
                path: root.join("base_case/case.pre"),
                rendered_path: rendered.clone(),
            },
            results_root: root.join("results"),
            scratch: ScratchLayout {
                dir: scratch.clone(),
                output_file: "case_001.out".to_string(),
                result_file: "case_001.res".to_string(),
                report_file: "report.txt".to_string(),
                photos_dir: "report_files".to_string(),
            },
            geometry: ToolSpec {
                program: "/bin/sh".to_string(),
                args: vec![
                    path_arg(&root.join("bin/geometry.sh")),
                    "{pitch_deg}".to_string(),
                    "none".to_string(),
                ],
                workdir: root.join("geometry"),
                timeout_seconds: None,
            },
            solver: ToolSpec {
                program: "/bin/sh".to_string(),
                args: vec![
                    path_arg(&root.join("bin/solver.sh")),
                    path_arg(&rendered),
                    path_arg(&scratch),
                    "none".to_string(),
                    "normal".to_string(),
                ],
                workdir: root.join("work"),
                timeout_seconds: None,
            },
        };
        Self { dir, config }
    }

    /// Make the solver exit non-zero for this rpm.
    pub fn fail_solver_at_rpm(&mut self, rpm: u32) {
        self.config.solver.args[3] = rpm.to_string();
    }

    /// Make the geometry tool exit non-zero for this pitch text.
    pub fn fail_geometry_at_pitch(&mut self, pitch: &str) {
        self.config.geometry.args[2] = pitch.to_string();
    }

    pub fn solver_mode(&mut self, mode: &str) {
        self.config.solver.args[4] = mode.to_string();
    }

    pub fn results_root(&self) -> PathBuf {
        self.config.results_root.clone()
    }

    pub fn csv_text(&self) -> String {
        fs::read_to_string(self.config.archive_paths().results_csv_path()).expect("read csv")
    }

    pub fn data_rows(&self) -> Vec<String> {
        self.csv_text().lines().skip(1).map(str::to_string).collect()
    }
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

//! Sweep configuration loading and validation.
//!
//! Every machine-specific path lives in the config file so the pipeline
//! itself carries no hardcoded locations.
use crate::error::{SweepError, SweepResult};
use crate::invoke::Invocation;
use crate::paths::{ArchivePaths, ScratchLayout};
use crate::run_config::{enumerate_sweep, RunConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SweepConfig {
    pub schema_version: u32,
    pub parameters: ParameterSpace,
    pub template: TemplatePaths,
    pub results_root: PathBuf,
    pub scratch: ScratchLayout,
    pub geometry: ToolSpec,
    pub solver: ToolSpec,
}

/// Parallel parameter arrays; `rpm` and `mass_flow` pair by index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParameterSpace {
    pub pitch_deg: Vec<f64>,
    pub rpm: Vec<u32>,
    pub mass_flow: Vec<f64>,
}

impl ParameterSpace {
    pub fn enumerate(&self) -> SweepResult<Vec<RunConfig>> {
        enumerate_sweep(&self.pitch_deg, &self.rpm, &self.mass_flow)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplatePaths {
    /// Pristine template containing the placeholder tokens.
    pub path: PathBuf,
    /// Staged solver input, overwritten for every run.
    pub rendered_path: PathBuf,
}

/// An external tool and how to call it.
///
/// `args` may contain `{pitch_deg}`, `{rpm}`, `{mass_flow}`, and `{run_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub workdir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

impl ToolSpec {
    /// Expand argument placeholders for one run.
    pub fn invocation(&self, tool: &str, config: &RunConfig) -> Invocation {
        let args = self
            .args
            .iter()
            .map(|arg| {
                arg.replace("{pitch_deg}", &config.pitch_deg.to_string())
                    .replace("{rpm}", &config.rpm.to_string())
                    .replace("{mass_flow}", &config.mass_flow.to_string())
                    .replace("{run_id}", &config.run_id)
            })
            .collect();
        Invocation {
            tool: tool.to_string(),
            program: self.program.clone(),
            args,
            workdir: self.workdir.clone(),
            timeout: self.timeout_seconds.map(Duration::from_secs),
        }
    }
}

impl SweepConfig {
    pub fn archive_paths(&self) -> ArchivePaths {
        ArchivePaths::new(self.results_root.clone())
    }

    /// Make every relative path absolute against `base`.
    fn resolve_relative(&mut self, base: &Path) {
        let join = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        join(&mut self.template.path);
        join(&mut self.template.rendered_path);
        join(&mut self.results_root);
        join(&mut self.scratch.dir);
        for tool in [&mut self.geometry, &mut self.solver] {
            join(&mut tool.workdir);
            let program = Path::new(&tool.program);
            if program.is_relative() && has_separator(&tool.program) {
                tool.program = base.join(program).display().to_string();
            }
        }
    }
}

/// Build the default config written by `init`.
pub fn default_config() -> SweepConfig {
    SweepConfig {
        schema_version: CONFIG_SCHEMA_VERSION,
        parameters: ParameterSpace {
            pitch_deg: vec![0.0, 2.0, 4.0, 6.0],
            rpm: vec![9000, 10000, 12500, 15000, 17500],
            mass_flow: vec![0.2232, 0.2480, 0.3100, 0.3720, 0.4340],
        },
        template: TemplatePaths {
            path: PathBuf::from("base_case/case.pre"),
            rendered_path: PathBuf::from("work/case.pre"),
        },
        results_root: PathBuf::from("results"),
        scratch: ScratchLayout {
            dir: PathBuf::from("scratch"),
            output_file: "case_001.out".to_string(),
            result_file: "case_001.res".to_string(),
            report_file: "report.txt".to_string(),
            photos_dir: "report_files".to_string(),
        },
        geometry: ToolSpec {
            program: "matlab".to_string(),
            args: vec![
                "-batch".to_string(),
                "try, apply_pitch({pitch_deg}); catch ME, disp(getReport(ME,'extended')); exit(1); end; exit(0);"
                    .to_string(),
            ],
            workdir: PathBuf::from("geometry"),
            timeout_seconds: None,
        },
        solver: ToolSpec {
            program: "./run_pipeline.sh".to_string(),
            args: Vec::new(),
            workdir: PathBuf::from("work"),
            timeout_seconds: None,
        },
    }
}

/// Render a pretty JSON config stub.
pub fn config_stub() -> SweepResult<String> {
    serde_json::to_string_pretty(&default_config())
        .map_err(|err| SweepError::configuration(format!("serialize config stub: {err}")))
}

/// Load, resolve, and validate a config file.
pub fn load_config(path: &Path) -> SweepResult<SweepConfig> {
    let bytes = fs::read(path).map_err(|err| {
        SweepError::configuration(format!("read config {}: {err}", path.display()))
    })?;
    let mut config: SweepConfig = serde_json::from_slice(&bytes).map_err(|err| {
        SweepError::configuration(format!("parse config {}: {err}", path.display()))
    })?;
    let base = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    config.resolve_relative(base);
    validate_config(&config)?;
    Ok(config)
}

/// Check structural constraints that do not touch the filesystem.
pub fn validate_config(config: &SweepConfig) -> SweepResult<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(SweepError::configuration(format!(
            "unsupported schema_version {} (expected {CONFIG_SCHEMA_VERSION})",
            config.schema_version
        )));
    }
    if config.template.path == config.template.rendered_path {
        return Err(SweepError::configuration(
            "template.rendered_path must differ from template.path",
        ));
    }
    for (label, tool) in [("geometry", &config.geometry), ("solver", &config.solver)] {
        if tool.program.trim().is_empty() {
            return Err(SweepError::configuration(format!(
                "{label}.program must be non-empty"
            )));
        }
        if tool.timeout_seconds == Some(0) {
            return Err(SweepError::configuration(format!(
                "{label}.timeout_seconds must be positive when set"
            )));
        }
    }

    let scratch = &config.scratch;
    let names = [
        ("scratch.output_file", &scratch.output_file),
        ("scratch.result_file", &scratch.result_file),
        ("scratch.report_file", &scratch.report_file),
        ("scratch.photos_dir", &scratch.photos_dir),
    ];
    let mut seen = BTreeSet::new();
    for (label, name) in names {
        if name.trim().is_empty() || has_separator(name) || name == "." || name == ".." {
            return Err(SweepError::configuration(format!(
                "{label} must be a plain file name (got {name:?})"
            )));
        }
        if !seen.insert(name.as_str()) {
            return Err(SweepError::configuration(format!(
                "{label} duplicates another scratch artifact name ({name:?})"
            )));
        }
    }

    let archive = config.archive_paths();
    let mut archived = BTreeSet::new();
    for name in [&scratch.output_file, &scratch.result_file, &scratch.report_file] {
        if !archived.insert(archive.archived_artifact("run", name)) {
            return Err(SweepError::configuration(format!(
                "scratch artifacts must have distinct extensions; {name:?} collides once renamed"
            )));
        }
    }

    config.parameters.enumerate()?;
    Ok(())
}

/// Resolve each tool program so a typo fails before any case starts.
pub fn check_tools(config: &SweepConfig) -> SweepResult<()> {
    for (label, tool) in [("geometry", &config.geometry), ("solver", &config.solver)] {
        if has_separator(&tool.program) {
            if !Path::new(&tool.program).is_file() {
                return Err(SweepError::configuration(format!(
                    "{label}.program {} does not exist",
                    tool.program
                )));
            }
            continue;
        }
        let resolved = which::which(&tool.program).map_err(|err| {
            SweepError::configuration(format!(
                "{label}.program {:?} not found on PATH: {err}",
                tool.program
            ))
        })?;
        tracing::debug!(tool = label, program = %resolved.display(), "resolved tool");
    }
    Ok(())
}

fn has_separator(value: &str) -> bool {
    value.contains('/') || value.contains('\\')
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn stub_round_trips_and_validates() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("sweep.json");
        fs::write(&path, config_stub().expect("stub")).expect("write stub");

        let config = load_config(&path).expect("load stub");

        assert_eq!(config.parameters.enumerate().expect("enumerate").len(), 20);
        assert_eq!(config.results_root, dir.path().join("results"));
        assert_eq!(config.scratch.dir, dir.path().join("scratch"));
        assert_eq!(
            config.solver.program,
            dir.path().join("./run_pipeline.sh").display().to_string()
        );
        assert_eq!(config.geometry.program, "matlab");
    }

    #[test]
    fn rejects_colliding_artifact_extensions() {
        let mut config = default_config();
        config.scratch.report_file = "summary.res".to_string();
        let err = validate_config(&config).expect_err("collision");
        assert!(err.to_string().contains("distinct extensions"), "{err}");
    }

    #[test]
    fn rejects_artifact_names_with_separators() {
        let mut config = default_config();
        config.scratch.output_file = "nested/case.out".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn rejects_mismatched_parameter_arrays() {
        let mut config = default_config();
        config.parameters.mass_flow.pop();
        let err = validate_config(&config).expect_err("mismatch");
        assert!(matches!(err, SweepError::Configuration(_)));
    }

    #[test]
    fn rejects_unknown_fields() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("sweep.json");
        let mut value = serde_json::to_value(default_config()).expect("to value");
        value["surprise"] = serde_json::json!(true);
        fs::write(&path, value.to_string()).expect("write");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn tool_args_expand_run_placeholders() {
        let config = default_config();
        let run = RunConfig::new(4.0, 12500, 0.31);
        let invocation = config.geometry.invocation("geometry", &run);
        assert_eq!(invocation.args[0], "-batch");
        assert!(invocation.args[1].starts_with("try, apply_pitch(4);"));

        let spec = ToolSpec {
            program: "solver".to_string(),
            args: vec!["--case={run_id}".to_string(), "{rpm}:{mass_flow}".to_string()],
            workdir: PathBuf::from("/tmp"),
            timeout_seconds: Some(60),
        };
        let invocation = spec.invocation("solver", &run);
        assert_eq!(invocation.args[0], format!("--case={}", run.run_id));
        assert_eq!(invocation.args[1], "12500:0.31");
        assert_eq!(invocation.timeout, Some(Duration::from_secs(60)));
    }

    fn configuration_message(config: &SweepConfig) -> String {
        match validate_config(config) {
            Err(SweepError::Configuration(message)) => message,
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unsupported_schema_version() {
        let mut config = default_config();
        config.schema_version = CONFIG_SCHEMA_VERSION + 1;
        assert!(configuration_message(&config).contains("unsupported schema_version"));
    }

    #[test]
    fn rejects_zero_timeout() {
        let mut config = default_config();
        config.solver.timeout_seconds = Some(0);
        let message = configuration_message(&config);
        assert!(message.contains("solver.timeout_seconds"), "{message}");
    }

    #[test]
    fn rejects_empty_program() {
        let mut config = default_config();
        config.geometry.program = "  ".to_string();
        let message = configuration_message(&config);
        assert!(message.contains("geometry.program"), "{message}");
    }

    #[test]
    fn rejects_rendering_over_the_template() {
        let mut config = default_config();
        config.template.rendered_path = config.template.path.clone();
        let message = configuration_message(&config);
        assert!(message.contains("rendered_path"), "{message}");
    }

    #[cfg(unix)]
    #[test]
    fn bare_program_missing_from_path_is_reported() {
        let mut config = default_config();
        config.geometry.program = "/bin/sh".to_string();
        config.solver.program = "cfdsweep-no-such-solver".to_string();
        let err = check_tools(&config).expect_err("not on PATH");
        assert!(matches!(err, SweepError::Configuration(_)));
        assert!(err.to_string().contains("not found on PATH"), "{err}");
    }

    #[test]
    fn missing_tool_program_is_reported() {
        let mut config = default_config();
        config.solver.program = "/definitely/not/here/run.sh".to_string();
        config.geometry.program = "/definitely/not/here/geometry".to_string();
        let err = check_tools(&config).expect_err("missing");
        assert!(err.to_string().contains("does not exist"), "{err}");
    }
}

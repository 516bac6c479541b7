//! Solver input rendering by placeholder substitution.
use crate::error::{SweepError, SweepResult};
use crate::run_config::RunConfig;
use std::fs;
use std::path::Path;

pub const PITCH_TOKEN: &str = "__PITCH_DEG__";
pub const RPM_TOKEN: &str = "__RPM__";
pub const MASS_FLOW_TOKEN: &str = "__MASS_FLOW__";

/// Render `template_path` into `output_path` for one run configuration.
///
/// The template itself is never written. Invalid UTF-8 in the template is
/// dropped rather than treated as an error.
pub fn render(template_path: &Path, output_path: &Path, config: &RunConfig) -> SweepResult<()> {
    if template_path == output_path {
        return Err(SweepError::configuration(format!(
            "rendered input {} would overwrite its template",
            output_path.display()
        )));
    }
    let bytes = fs::read(template_path).map_err(|source| SweepError::TemplateIo {
        path: template_path.to_path_buf(),
        source,
    })?;
    let rendered = substitute(&decode_lossy(&bytes), config);

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| SweepError::TemplateIo {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(output_path, rendered.as_bytes()).map_err(|source| SweepError::TemplateIo {
        path: output_path.to_path_buf(),
        source,
    })?;
    tracing::debug!(
        template = %template_path.display(),
        output = %output_path.display(),
        "rendered solver input"
    );
    Ok(())
}

/// Replace the three parameter placeholders with their default text form.
pub fn substitute(text: &str, config: &RunConfig) -> String {
    text.replace(PITCH_TOKEN, &config.pitch_deg.to_string())
        .replace(RPM_TOKEN, &config.rpm.to_string())
        .replace(MASS_FLOW_TOKEN, &config.mass_flow.to_string())
}

fn decode_lossy(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        text.push_str(chunk.valid());
    }
    text
}

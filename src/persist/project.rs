//! Project files: a timeline plus the settings needed to reopen it, as one binary dictionary.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write as _};
use std::path::Path;
use std::sync::Arc;

use crate::automation::parameter::ParameterTable;
use crate::foundation::error::{ReelError, ReelResult};
use crate::persist::data::DataDict;
use crate::render::content::ContentRegistry;
use crate::timeline::timeline::{Timeline, TimelineSettings};

pub const PROJECT_VERSION: i32 = 1;

/// Root dictionary of a project file.
pub fn project_dict(timeline: &Timeline) -> DataDict {
    let (width, height) = timeline.resolution();
    let mut root = DataDict::new();
    root.set("Version", PROJECT_VERSION);
    root.set("Width", i64::from(width));
    root.set("Height", i64::from(height));
    let mut td = DataDict::new();
    timeline.write(&mut td);
    root.set("Timeline", td);
    root
}

/// Rebuild a timeline from [`project_dict`] output, resolving parameters through the
/// process-wide table.
pub fn timeline_from_dict(root: &DataDict, registry: &ContentRegistry) -> ReelResult<Timeline> {
    let version = root.get_i32("Version")?;
    if version != PROJECT_VERSION {
        return Err(ReelError::serde(format!(
            "unsupported project version {version}"
        )));
    }
    let dim = |key: &str| -> ReelResult<u32> {
        let v = root.get_i64(key)?;
        u32::try_from(v)
            .ok()
            .filter(|v| *v > 0)
            .ok_or_else(|| ReelError::serde(format!("invalid project {key} {v}")))
    };
    let settings = TimelineSettings {
        resolution: (dim("Width")?, dim("Height")?),
        ..TimelineSettings::default()
    };
    Timeline::read(
        root.get_dict("Timeline")?,
        settings,
        Arc::clone(ParameterTable::global()),
        registry,
    )
}

pub fn save_project(path: &Path, timeline: &Timeline) -> ReelResult<()> {
    let mut w = BufWriter::new(File::create(path)?);
    project_dict(timeline).write_to(&mut w)?;
    w.flush()?;
    Ok(())
}

pub fn load_project_dict(path: &Path) -> ReelResult<DataDict> {
    let mut r = BufReader::new(File::open(path)?);
    DataDict::read_from(&mut r)
}

pub fn load_project(path: &Path, registry: &ContentRegistry) -> ReelResult<Timeline> {
    timeline_from_dict(&load_project_dict(path)?, registry)
}

#[cfg(test)]
#[path = "../../tests/unit/persist/project.rs"]
mod tests;

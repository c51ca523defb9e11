//! Parameter collection: dialog state, range clamping and confirmation.

use std::{fmt, path::PathBuf, str::FromStr};

use thiserror::Error;

use crate::host::{DatasetReference, Project};

pub mod envs;

pub use envs::{list_environments, Discovery, EnvironmentProbe, PythonEnv};

pub const VIS_RANGE: (f64, f64) = (-1e9, 1e9);
pub const GRID_CELL_RANGE: (f64, f64) = (0.001, 1000.0);
pub const DEGREE_RANGE: (i64, i64) = (0, 10_000);
pub const ALTITUDE_RANGE: (f64, f64) = (-9_999_999.0, 9_999_999.0);

/// Decimal places kept on floating inputs.
pub const DECIMALS: i32 = 3;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParameterError {
    #[error("No Python interpreter selected")]
    MissingInterpreter,

    #[error("No layer selected")]
    MissingDataset,

    #[error("Layer '{0}' is not a polygon layer")]
    NotPolygon(String),

    #[error("L min ({l_min}) is greater than L max ({l_max})")]
    DegreeBoundsInverted { l_min: u32, l_max: u32 },

    #[error("Unknown field component '{0}' (expected Br, By or Bz)")]
    UnknownFieldComponent(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldComponent {
    #[default]
    Br,
    By,
    Bz,
}

impl FieldComponent {
    pub const ALL: [FieldComponent; 3] = [FieldComponent::Br, FieldComponent::By, FieldComponent::Bz];

    pub fn as_str(self) -> &'static str {
        match self {
            FieldComponent::Br => "Br",
            FieldComponent::By => "By",
            FieldComponent::Bz => "Bz",
        }
    }
}

impl fmt::Display for FieldComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldComponent {
    type Err = ParameterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldComponent::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParameterError::UnknownFieldComponent(s.to_string()))
    }
}

/// Confirmed parameters for exactly one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSet {
    interpreter_path: PathBuf,
    vis: f64,
    grid_cell_size: f64,
    l_max: u32,
    l_min: u32,
    altitude: f64,
    field_component: FieldComponent,
}

impl ParameterSet {
    pub fn interpreter_path(&self) -> &PathBuf {
        &self.interpreter_path
    }

    pub fn vis(&self) -> f64 {
        self.vis
    }

    pub fn grid_cell_size(&self) -> f64 {
        self.grid_cell_size
    }

    pub fn l_max(&self) -> u32 {
        self.l_max
    }

    pub fn l_min(&self) -> u32 {
        self.l_min
    }

    pub fn altitude(&self) -> f64 {
        self.altitude
    }

    pub fn field_component(&self) -> FieldComponent {
        self.field_component
    }

    /// Positional worker arguments following the input and output paths.
    pub fn worker_args(&self) -> Vec<String> {
        vec![
            format_decimal(self.vis),
            format_decimal(self.grid_cell_size),
            self.l_max.to_string(),
            self.l_min.to_string(),
            format_decimal(self.altitude),
            self.field_component.to_string(),
        ]
    }
}

/// Shortest round-trip decimal form, always with a fractional part (`1.0`).
pub fn format_decimal(x: f64) -> String {
    format!("{:?}", x)
}

fn clamp_rounded(value: f64, (lo, hi): (f64, f64)) -> f64 {
    let scale = 10f64.powi(DECIMALS);
    ((value * scale).round() / scale).clamp(lo, hi)
}

/// Dialog state. Every setter clamps into the field's fixed range, the way a
/// spin box would; relationships between fields are only checked on confirm.
#[derive(Debug, Clone)]
pub struct ParameterForm {
    interpreter: Option<PathBuf>,
    dataset: Option<DatasetReference>,
    vis: f64,
    grid_cell_size: f64,
    l_max: u32,
    l_min: u32,
    altitude: f64,
    field_component: FieldComponent,
}

impl Default for ParameterForm {
    fn default() -> Self {
        Self {
            interpreter: None,
            dataset: None,
            vis: 1.0,
            grid_cell_size: 1.0,
            l_max: 100,
            l_min: 0,
            altitude: 0.0,
            field_component: FieldComponent::Br,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Run,
    Cancel,
}

#[derive(Debug, Clone)]
pub enum Confirmation {
    Run {
        params: ParameterSet,
        dataset: DatasetReference,
    },
    Cancelled,
}

impl ParameterForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_interpreter(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.interpreter = Some(path.into());
        self
    }

    pub fn set_dataset(&mut self, dataset: DatasetReference) -> &mut Self {
        self.dataset = Some(dataset);
        self
    }

    pub fn set_vis(&mut self, v: f64) -> &mut Self {
        if !v.is_nan() {
            self.vis = clamp_rounded(v, VIS_RANGE);
        }
        self
    }

    pub fn set_grid_cell_size(&mut self, v: f64) -> &mut Self {
        if !v.is_nan() {
            self.grid_cell_size = clamp_rounded(v, GRID_CELL_RANGE);
        }
        self
    }

    pub fn set_l_max(&mut self, v: i64) -> &mut Self {
        self.l_max = v.clamp(DEGREE_RANGE.0, DEGREE_RANGE.1) as u32;
        self
    }

    pub fn set_l_min(&mut self, v: i64) -> &mut Self {
        self.l_min = v.clamp(DEGREE_RANGE.0, DEGREE_RANGE.1) as u32;
        self
    }

    pub fn set_altitude(&mut self, v: f64) -> &mut Self {
        if !v.is_nan() {
            self.altitude = clamp_rounded(v, ALTITUDE_RANGE);
        }
        self
    }

    pub fn set_field_component(&mut self, c: FieldComponent) -> &mut Self {
        self.field_component = c;
        self
    }

    pub fn interpreter(&self) -> Option<&PathBuf> {
        self.interpreter.as_ref()
    }

    pub fn dataset(&self) -> Option<&DatasetReference> {
        self.dataset.as_ref()
    }

    /// Markdown summary shown before the user decides.
    pub fn summary(&self) -> String {
        let interpreter = self
            .interpreter
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none)".to_string());
        let layer = self
            .dataset
            .as_ref()
            .map(|d| format!("{} ({})", d.name, d.crs))
            .unwrap_or_else(|| "(none)".to_string());
        format!(
            "| Parameter | Value |\n|---|---|\n\
             | Python Interpreter | `{}` |\n\
             | Polygon Layer | {} |\n\
             | VIS | {} |\n\
             | Grid Cell Size | {} |\n\
             | L max | {} |\n\
             | L min | {} |\n\
             | Altitude | {} |\n\
             | Field Component | {} |\n",
            interpreter,
            layer,
            format_decimal(self.vis),
            format_decimal(self.grid_cell_size),
            self.l_max,
            self.l_min,
            format_decimal(self.altitude),
            self.field_component,
        )
    }

    pub fn confirm(self, decision: Decision) -> Result<Confirmation, ParameterError> {
        if decision == Decision::Cancel {
            return Ok(Confirmation::Cancelled);
        }
        let interpreter_path = self.interpreter.ok_or(ParameterError::MissingInterpreter)?;
        let dataset = self.dataset.ok_or(ParameterError::MissingDataset)?;
        if !dataset.is_polygon() {
            return Err(ParameterError::NotPolygon(dataset.name.clone()));
        }
        if self.l_min > self.l_max {
            return Err(ParameterError::DegreeBoundsInverted {
                l_min: self.l_min,
                l_max: self.l_max,
            });
        }
        Ok(Confirmation::Run {
            params: ParameterSet {
                interpreter_path,
                vis: self.vis,
                grid_cell_size: self.grid_cell_size,
                l_max: self.l_max,
                l_min: self.l_min,
                altitude: self.altitude,
                field_component: self.field_component,
            },
            dataset,
        })
    }
}

/// Polygon vector layers currently loaded in the project.
pub fn list_candidate_datasets(project: &Project) -> Vec<DatasetReference> {
    project
        .vector_layers()
        .filter(|d| d.is_polygon())
        .cloned()
        .collect()
}

//! Placeholder worker honouring the positional argv contract.
//!
//! It checks the polygon input, builds a regular lat/lon grid and fills it
//! with an axial-dipole stand-in instead of a spherical harmonic synthesis,
//! then writes the grid and the run parameters to a NetCDF file.

use std::path::PathBuf;

use thiserror::Error;

use crate::{
    collector::{format_decimal, FieldComponent, ParameterError},
    host::{GeoJsonError, GeometryType, VectorLayer},
};

pub const USAGE: &str = "Usage: geomag-worker input_geojson output_nc vis grid_cell_size l_max l_min altitude field_component";

/// Program name plus eight positional arguments.
pub const EXPECTED_ARGS: usize = 9;

/// Largest grid the placeholder will allocate.
pub const MAX_CELLS: usize = 25_000_000;

/// Reference radius in km used for altitude attenuation.
const EARTH_RADIUS_KM: f64 = 6371.2;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("expected {} arguments, received {received}", EXPECTED_ARGS)]
    Usage { received: usize },

    #[error("invalid value for {name}: '{value}'")]
    InvalidNumber { name: &'static str, value: String },

    #[error(transparent)]
    FieldComponent(#[from] ParameterError),

    #[error("cannot read input: {0}")]
    Input(#[from] GeoJsonError),

    #[error("input layer has {0} geometry, expected polygons")]
    NotPolygon(GeometryType),

    #[error("grid of {cells} cells exceeds the limit of {}", MAX_CELLS)]
    GridTooLarge { cells: usize },

    #[error("cannot write output: {0}")]
    Output(#[from] netcdf::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerArgs {
    pub input: PathBuf,
    pub output: PathBuf,
    pub vis: f64,
    pub grid_cell_size: f64,
    pub l_max: i32,
    pub l_min: i32,
    pub altitude: f64,
    pub field_component: FieldComponent,
}

fn parse_f64(name: &'static str, value: &str) -> Result<f64, WorkerError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| WorkerError::InvalidNumber {
            name,
            value: value.to_string(),
        })
}

/// Degrees may arrive as decimals ("100.0"); the fraction is dropped.
fn parse_degree(name: &'static str, value: &str) -> Result<i32, WorkerError> {
    let v = parse_f64(name, value)?.trunc();
    if v < 0.0 || v > i32::MAX as f64 {
        return Err(WorkerError::InvalidNumber {
            name,
            value: value.to_string(),
        });
    }
    Ok(v as i32)
}

impl WorkerArgs {
    pub fn parse(argv: &[String]) -> Result<Self, WorkerError> {
        if argv.len() != EXPECTED_ARGS {
            return Err(WorkerError::Usage {
                received: argv.len(),
            });
        }
        let grid_cell_size = parse_f64("grid_cell_size", &argv[4])?;
        if grid_cell_size <= 0.0 {
            return Err(WorkerError::InvalidNumber {
                name: "grid_cell_size",
                value: argv[4].clone(),
            });
        }
        Ok(Self {
            input: PathBuf::from(&argv[1]),
            output: PathBuf::from(&argv[2]),
            vis: parse_f64("vis", &argv[3])?,
            grid_cell_size,
            l_max: parse_degree("l_max", &argv[5])?,
            l_min: parse_degree("l_min", &argv[6])?,
            altitude: parse_f64("altitude", &argv[7])?,
            field_component: argv[8].parse()?,
        })
    }

    pub fn summary(&self) -> String {
        format!(
            "Processing with parameters:\n  Input: {}\n  Output: {}\n  VIS: {}\n  Grid cell size: {}\n  L max: {}\n  L min: {}\n  Altitude: {}\n  Field component: {}",
            self.input.display(),
            self.output.display(),
            format_decimal(self.vis),
            format_decimal(self.grid_cell_size),
            self.l_max,
            self.l_min,
            format_decimal(self.altitude),
            self.field_component,
        )
    }
}

/// `start, start + step, ...` strictly below `stop`.
fn arange(start: f64, stop: f64, step: f64) -> Vec<f64> {
    let n = ((stop - start) / step).ceil().max(0.0) as usize;
    (0..n).map(|i| start + i as f64 * step).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    pub lat: Vec<f64>,
    pub lon: Vec<f64>,
    /// Row-major over (lat, lon).
    pub values: Vec<f64>,
}

pub fn synthesize(args: &WorkerArgs) -> Result<Grid, WorkerError> {
    let step = args.grid_cell_size;
    let n_lat = (180.0 / step).ceil();
    let n_lon = (360.0 / step).ceil();
    let cells = n_lat * n_lon;
    if cells > MAX_CELLS as f64 {
        return Err(WorkerError::GridTooLarge {
            cells: cells.min(usize::MAX as f64) as usize,
        });
    }

    let lat = arange(-90.0, 90.0, step);
    let lon = arange(-180.0, 180.0, step);

    let radius = EARTH_RADIUS_KM + args.altitude;
    let attenuation = if radius > 0.0 {
        (EARTH_RADIUS_KM / radius).powi(3)
    } else {
        0.0
    };
    let amplitude = args.vis * attenuation;

    let mut values = Vec::with_capacity(lat.len() * lon.len());
    for phi in &lat {
        let s = phi.to_radians().sin();
        let v = match args.field_component {
            FieldComponent::Br => 2.0 * amplitude * s,
            FieldComponent::By => 0.0,
            FieldComponent::Bz => -2.0 * amplitude * s,
        };
        values.extend(std::iter::repeat(v).take(lon.len()));
    }

    Ok(Grid { lat, lon, values })
}

pub fn write_output(args: &WorkerArgs, grid: Grid) -> Result<(), WorkerError> {
    let mut file = netcdf::create(&args.output)?;
    file.add_dimension("lat", grid.lat.len())?;
    file.add_dimension("lon", grid.lon.len())?;

    file.add_attribute("Conventions", "CF-1.8")?;
    file.add_attribute("vis", args.vis)?;
    file.add_attribute("l_max", args.l_max)?;
    file.add_attribute("l_min", args.l_min)?;
    file.add_attribute("altitude", args.altitude)?;
    file.add_attribute("field_component", args.field_component.as_str())?;

    {
        let mut lat = file.add_variable::<f64>("lat", &["lat"])?;
        lat.put_values(&grid.lat, ..)?;
        lat.put_attribute("units", "degrees_north")?;
    }
    {
        let mut lon = file.add_variable::<f64>("lon", &["lon"])?;
        lon.put_values(&grid.lon, ..)?;
        lon.put_attribute("units", "degrees_east")?;
    }
    let mut field = file.add_variable::<f64>(args.field_component.as_str(), &["lat", "lon"])?;
    field.put_values(&grid.values, ..)?;
    field.put_attribute(
        "long_name",
        format!("{} placeholder field", args.field_component).as_str(),
    )?;
    Ok(())
}

pub fn execute(args: &WorkerArgs) -> Result<(), WorkerError> {
    let layer = VectorLayer::read(&args.input)?;
    if layer.geometry_type != GeometryType::Polygon {
        return Err(WorkerError::NotPolygon(layer.geometry_type));
    }
    let grid = synthesize(args)?;
    write_output(args, grid)
}

/// Entry point; returns the process exit status.
pub fn run(argv: &[String]) -> u8 {
    let args = match WorkerArgs::parse(argv) {
        Ok(args) => args,
        Err(WorkerError::Usage { received }) => {
            println!("{}", USAGE);
            println!("Received {} arguments: {:?}", received, argv);
            return 1;
        }
        Err(e) => {
            eprintln!("error: {}", e);
            return 1;
        }
    };

    println!("{}", args.summary());
    match execute(&args) {
        Ok(()) => {
            println!("Created output file: {}", args.output.display());
            0
        }
        Err(e) => {
            eprintln!("error: {}", e);
            1
        }
    }
}

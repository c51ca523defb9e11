//! Host project: the layers a run can read from and the raster layers it adds.

use std::{
    fs, io,
    ops::Deref,
    path::{Path, PathBuf},
    sync::Arc,
};

use thiserror::Error;
use tracing::{debug, warn};

use crate::artifact::{self, AttrValue, Attribute, Format, NetCdfError};

pub mod geojson;

pub use geojson::{Crs, GeoJsonError, GeometryType, VectorLayer};

/// Read-only handle to a vector layer owned by the project.
#[derive(Debug, Clone)]
pub struct DatasetReference(Arc<VectorLayer>);

impl DatasetReference {
    pub fn new(layer: VectorLayer) -> Self {
        Self(Arc::new(layer))
    }

    pub fn is_polygon(&self) -> bool {
        self.0.geometry_type == GeometryType::Polygon
    }
}

impl Deref for DatasetReference {
    type Target = VectorLayer;

    fn deref(&self) -> &VectorLayer {
        &self.0
    }
}

/// A two-dimensional (or higher) variable found in a raster artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct GridInfo {
    pub name: String,
    pub dims: Vec<String>,
    pub shape: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RasterLayer {
    pub name: String,
    pub source: PathBuf,
    pub format: Format,
    pub grids: Vec<GridInfo>,
    pub attributes: Vec<Attribute>,
}

impl RasterLayer {
    pub fn grid(&self, name: &str) -> Option<&GridInfo> {
        self.grids.iter().find(|g| g.name == name)
    }

    pub fn attribute(&self, name: &str) -> Option<&AttrValue> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| &a.value)
    }
}

#[derive(Debug, Clone)]
pub enum Layer {
    Vector(DatasetReference),
    Raster(RasterLayer),
}

impl Layer {
    pub fn name(&self) -> &str {
        match self {
            Layer::Vector(v) => &v.name,
            Layer::Raster(r) => &r.name,
        }
    }
}

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("{}: {source}", .path.display())]
    NetCdf {
        path: PathBuf,
        #[source]
        source: NetCdfError,
    },

    #[error("{}: no two-dimensional variable to display", .path.display())]
    NoGrid { path: PathBuf },
}

/// Where a finished invocation hands its raster artifact.
pub trait LayerHost {
    fn add_raster_layer(&mut self, path: &Path, name: &str) -> Result<RasterLayer, LoadError>;
}

/// Open a NetCDF file and describe it as a raster layer without adding it
/// anywhere. The file must hold at least one variable of rank two or more.
pub fn load_raster(path: &Path, name: &str) -> Result<RasterLayer, LoadError> {
    let summary = artifact::describe(path).map_err(|source| LoadError::NetCdf {
        path: path.to_path_buf(),
        source,
    })?;

    let grids: Vec<GridInfo> = summary
        .variables
        .into_iter()
        .filter(|v| v.dims.len() >= 2)
        .map(|v| GridInfo {
            name: v.name,
            dims: v.dims,
            shape: v.shape,
        })
        .collect();

    if grids.is_empty() {
        return Err(LoadError::NoGrid {
            path: path.to_path_buf(),
        });
    }

    Ok(RasterLayer {
        name: name.to_string(),
        source: path.to_path_buf(),
        format: summary.format,
        grids,
        attributes: summary.attributes,
    })
}

#[derive(Debug, Default)]
pub struct Project {
    root: PathBuf,
    layers: Vec<Layer>,
}

impl Project {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            layers: Vec::new(),
        }
    }

    /// Load every GeoJSON and NetCDF file directly inside `dir`, in name order.
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let mut project = Self::new(dir);
        let mut paths: Vec<PathBuf> = fs::read_dir(&project.root)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        paths.sort();

        for p in paths {
            let ext = p
                .extension()
                .and_then(|s| s.to_str())
                .unwrap_or("")
                .to_ascii_lowercase();
            match ext.as_str() {
                "geojson" | "json" => {
                    if let Err(e) = project.add_vector_file(&p) {
                        warn!(path = %p.display(), error = %e, "skipping vector file");
                    }
                }
                "nc" => {
                    let name = p
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    match load_raster(&p, &name) {
                        Ok(layer) => project.layers.push(Layer::Raster(layer)),
                        Err(e) => warn!(error = %e, "skipping raster file"),
                    }
                }
                _ => {}
            }
        }
        debug!(root = %project.root.display(), layers = project.layers.len(), "project opened");
        Ok(project)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn add_vector_layer(&mut self, layer: VectorLayer) -> DatasetReference {
        let dataset = DatasetReference::new(layer);
        self.layers.push(Layer::Vector(dataset.clone()));
        dataset
    }

    pub fn add_vector_file(&mut self, path: &Path) -> Result<DatasetReference, GeoJsonError> {
        let layer = VectorLayer::read(path)?;
        Ok(self.add_vector_layer(layer))
    }

    pub fn vector_layers(&self) -> impl Iterator<Item = &DatasetReference> {
        self.layers.iter().filter_map(|l| match l {
            Layer::Vector(v) => Some(v),
            Layer::Raster(_) => None,
        })
    }

    pub fn raster_layers(&self) -> impl Iterator<Item = &RasterLayer> {
        self.layers.iter().filter_map(|l| match l {
            Layer::Raster(r) => Some(r),
            Layer::Vector(_) => None,
        })
    }
}

impl LayerHost for Project {
    fn add_raster_layer(&mut self, path: &Path, name: &str) -> Result<RasterLayer, LoadError> {
        let layer = load_raster(path, name)?;
        self.layers.push(Layer::Raster(layer.clone()));
        Ok(layer)
    }
}

//! GeoJSON vector layers: reading project files and writing the interchange
//! copy handed to the worker.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// CRS assumed when a document carries no `crs` member (RFC 7946 default).
pub const DEFAULT_CRS: &str = "urn:ogc:def:crs:OGC:1.3:CRS84";

#[derive(Error, Debug)]
pub enum GeoJsonError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid GeoJSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported GeoJSON object type: {0}")]
    UnsupportedType(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub coordinates: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometries: Option<Vec<Geometry>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type", default = "feature_kind")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default)]
    pub properties: Option<Map<String, Value>>,
    #[serde(default)]
    pub geometry: Option<Geometry>,
}

fn feature_kind() -> String {
    "Feature".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CrsProperties {
    name: String,
}

/// Legacy named CRS member, still written by desktop GIS exporters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CrsMember {
    #[serde(rename = "type")]
    kind: String,
    properties: CrsProperties,
}

#[derive(Debug, Serialize, Deserialize)]
struct FeatureCollection {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    crs: Option<CrsMember>,
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Crs(String);

impl Crs {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Default for Crs {
    fn default() -> Self {
        Self(DEFAULT_CRS.to_string())
    }
}

impl std::fmt::Display for Crs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryType {
    Point,
    Line,
    Polygon,
    Mixed,
    NoGeometry,
}

impl std::fmt::Display for GeometryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GeometryType::Point => "point",
            GeometryType::Line => "line",
            GeometryType::Polygon => "polygon",
            GeometryType::Mixed => "mixed",
            GeometryType::NoGeometry => "none",
        };
        f.write_str(s)
    }
}

fn geometry_class(g: &Geometry) -> GeometryType {
    match g.kind.as_str() {
        "Point" | "MultiPoint" => GeometryType::Point,
        "LineString" | "MultiLineString" => GeometryType::Line,
        "Polygon" | "MultiPolygon" => GeometryType::Polygon,
        "GeometryCollection" => g
            .geometries
            .as_deref()
            .map(|members| combine(members.iter().map(geometry_class)))
            .unwrap_or(GeometryType::NoGeometry),
        _ => GeometryType::Mixed,
    }
}

fn combine(classes: impl Iterator<Item = GeometryType>) -> GeometryType {
    classes.fold(GeometryType::NoGeometry, |acc, c| match (acc, c) {
        (GeometryType::NoGeometry, c) => c,
        (acc, GeometryType::NoGeometry) => acc,
        (a, b) if a == b => a,
        _ => GeometryType::Mixed,
    })
}

/// A vector layer as held by the host project.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorLayer {
    pub name: String,
    pub crs: Crs,
    pub geometry_type: GeometryType,
    pub features: Vec<Feature>,
}

impl VectorLayer {
    pub fn new(name: impl Into<String>, crs: Crs, features: Vec<Feature>) -> Self {
        let geometry_type = combine(
            features
                .iter()
                .map(|f| f.geometry.as_ref().map(geometry_class).unwrap_or(GeometryType::NoGeometry)),
        );
        Self {
            name: name.into(),
            crs,
            geometry_type,
            features,
        }
    }

    /// Parse a GeoJSON document: a FeatureCollection, a Feature or a bare geometry.
    pub fn parse(name: &str, text: &str) -> Result<Self, GeoJsonError> {
        let value: Value = serde_json::from_str(text)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        match kind.as_str() {
            "FeatureCollection" => {
                let fc: FeatureCollection = serde_json::from_value(value)?;
                let crs = fc
                    .crs
                    .map(|c| Crs::new(c.properties.name))
                    .unwrap_or_default();
                Ok(Self::new(fc.name.unwrap_or_else(|| name.to_string()), crs, fc.features))
            }
            "Feature" => {
                let feature: Feature = serde_json::from_value(value)?;
                Ok(Self::new(name, Crs::default(), vec![feature]))
            }
            "Point" | "MultiPoint" | "LineString" | "MultiLineString" | "Polygon"
            | "MultiPolygon" | "GeometryCollection" => {
                let geometry: Geometry = serde_json::from_value(value)?;
                let feature = Feature {
                    kind: feature_kind(),
                    id: None,
                    properties: None,
                    geometry: Some(geometry),
                };
                Ok(Self::new(name, Crs::default(), vec![feature]))
            }
            other => Err(GeoJsonError::UnsupportedType(other.to_string())),
        }
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, GeoJsonError> {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let text = fs::read_to_string(path)?;
        Self::parse(&name, &text)
    }

    /// Write geometry and CRS as a FeatureCollection; the layer is not modified.
    pub fn write_interchange<P: AsRef<Path>>(&self, path: P) -> Result<(), GeoJsonError> {
        let fc = FeatureCollection {
            kind: "FeatureCollection".to_string(),
            name: Some(self.name.clone()),
            crs: Some(CrsMember {
                kind: "name".to_string(),
                properties: CrsProperties {
                    name: self.crs.name().to_string(),
                },
            }),
            features: self.features.clone(),
        };
        let bytes = serde_json::to_vec(&fc)?;
        fs::write(path, bytes)?;
        Ok(())
    }
}

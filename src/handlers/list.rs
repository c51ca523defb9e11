//! `--list-envs` and `--list-layers`.

use anyhow::{Context, Result};
use owo_colors::OwoColorize;

use geomag::{
    collector::list_environments,
    config::Config,
    host::{Layer, Project},
};

pub fn environments(cfg: &Config) {
    let envs = list_environments(cfg);
    if envs.is_empty() {
        println!("{}", "No Python environments found".yellow());
        return;
    }
    for env in envs {
        println!("{}  {}", env.display_name.cyan(), env.interpreter_path.display());
    }
}

pub fn layers(project: &Project) {
    if project.layers().is_empty() {
        println!(
            "{}",
            format!("No layers in {}", project.root().display()).yellow()
        );
        return;
    }
    for layer in project.layers() {
        match layer {
            Layer::Vector(v) => println!(
                "{}  vector  {} ({} features, {})",
                v.name.cyan(),
                v.geometry_type,
                v.features.len(),
                v.crs
            ),
            Layer::Raster(r) => {
                let grids: Vec<&str> = r.grids.iter().map(|g| g.name.as_str()).collect();
                println!(
                    "{}  raster  {} [{}]",
                    r.name.cyan(),
                    r.format,
                    grids.join(", ")
                );
            }
        }
    }
}

pub fn open_project(cfg: &Config, dir: Option<&std::path::Path>) -> Result<Project> {
    let dir = dir.map(|d| d.to_path_buf()).unwrap_or_else(|| cfg.project_dir());
    Project::open(dir.clone()).with_context(|| format!("cannot open project directory {}", dir.display()))
}

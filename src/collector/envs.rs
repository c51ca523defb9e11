//! Discovery of local Python installations that can run the worker.
//!
//! Probing is best-effort: candidates that do not exist are skipped and no
//! attempt is made to check that an interpreter actually starts.

use std::{
    collections::HashSet,
    env,
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};

use directories::BaseDirs;
use tracing::debug;

use crate::config::Config;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PythonEnv {
    pub display_name: String,
    pub interpreter_path: PathBuf,
}

pub trait EnvironmentProbe {
    fn probe(&self) -> Vec<PythonEnv>;
}

#[cfg(windows)]
const PYTHON_NAMES: &[&str] = &["python.exe"];
#[cfg(not(windows))]
const PYTHON_NAMES: &[&str] = &["python3", "python"];

#[cfg(windows)]
const ENV_PYTHON: &str = "python.exe";
#[cfg(not(windows))]
const ENV_PYTHON: &str = "bin/python";

/// The interpreter the host itself would use: an explicit path, otherwise the
/// first Python found on `PATH`.
pub struct HostRuntimeProbe {
    explicit: Option<PathBuf>,
    search_path: Option<OsString>,
}

impl HostRuntimeProbe {
    pub fn new(explicit: Option<PathBuf>, search_path: Option<OsString>) -> Self {
        Self { explicit, search_path }
    }

    pub fn from_env(cfg: &Config) -> Self {
        Self::new(cfg.host_python(), env::var_os("PATH"))
    }

    fn locate(&self) -> Option<PathBuf> {
        if let Some(p) = &self.explicit {
            return p.is_file().then(|| p.clone());
        }
        let paths = self.search_path.as_ref()?;
        env::split_paths(paths).find_map(|dir| {
            PYTHON_NAMES
                .iter()
                .map(|name| dir.join(name))
                .find(|candidate| candidate.is_file())
        })
    }
}

impl EnvironmentProbe for HostRuntimeProbe {
    fn probe(&self) -> Vec<PythonEnv> {
        self.locate()
            .map(|p| PythonEnv {
                display_name: "Host Python".to_string(),
                interpreter_path: p,
            })
            .into_iter()
            .collect()
    }
}

/// Well-known absolute install locations.
pub struct FixedPathProbe {
    label: String,
    candidates: Vec<PathBuf>,
}

impl FixedPathProbe {
    pub fn new(label: impl Into<String>, candidates: Vec<PathBuf>) -> Self {
        Self {
            label: label.into(),
            candidates,
        }
    }

    pub fn system() -> Self {
        #[cfg(windows)]
        let candidates: Vec<PathBuf> = ["39", "310", "311", "312"]
            .iter()
            .map(|v| PathBuf::from(format!("C:\\Python{}\\python.exe", v)))
            .collect();
        #[cfg(not(windows))]
        let candidates = vec![
            PathBuf::from("/usr/bin/python3"),
            PathBuf::from("/usr/local/bin/python3"),
        ];
        Self::new("System", candidates)
    }
}

impl EnvironmentProbe for FixedPathProbe {
    fn probe(&self) -> Vec<PythonEnv> {
        self.candidates
            .iter()
            .filter(|p| p.is_file())
            .map(|p| PythonEnv {
                display_name: format!("{}: {}", self.label, p.display()),
                interpreter_path: p.clone(),
            })
            .collect()
    }
}

/// Environment-manager roots (conda `envs` directories) whose subdirectories
/// each hold an interpreter at a fixed relative path.
pub struct DirectoryProbe {
    label: String,
    roots: Vec<PathBuf>,
    relative_exe: PathBuf,
}

impl DirectoryProbe {
    pub fn new(label: impl Into<String>, roots: Vec<PathBuf>, relative_exe: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            roots,
            relative_exe: relative_exe.into(),
        }
    }

    pub fn conda(cfg: &Config) -> Self {
        let mut roots = Vec::new();
        if let Some(home) = BaseDirs::new().map(|b| b.home_dir().to_path_buf()) {
            roots.push(home.join("anaconda3").join("envs"));
            roots.push(home.join("miniconda3").join("envs"));
        }
        #[cfg(windows)]
        roots.push(PathBuf::from("C:\\ProgramData\\anaconda3\\envs"));
        #[cfg(not(windows))]
        {
            roots.push(PathBuf::from("/opt/anaconda3/envs"));
            roots.push(PathBuf::from("/opt/miniconda3/envs"));
        }
        roots.extend(cfg.conda_roots());
        Self::new("Conda", roots, ENV_PYTHON)
    }

    fn probe_root(&self, root: &Path) -> Vec<PythonEnv> {
        let Ok(entries) = fs::read_dir(root) else {
            return Vec::new();
        };
        let mut names: Vec<OsString> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name())
            .collect();
        names.sort();

        names
            .into_iter()
            .filter_map(|name| {
                let exe = root.join(&name).join(&self.relative_exe);
                exe.is_file().then(|| PythonEnv {
                    display_name: format!("{}: {}", self.label, name.to_string_lossy()),
                    interpreter_path: exe,
                })
            })
            .collect()
    }
}

impl EnvironmentProbe for DirectoryProbe {
    fn probe(&self) -> Vec<PythonEnv> {
        self.roots.iter().flat_map(|r| self.probe_root(r)).collect()
    }
}

/// Ordered set of probes; results keep probe order and drop repeated paths.
#[derive(Default)]
pub struct Discovery {
    probes: Vec<Box<dyn EnvironmentProbe>>,
}

impl Discovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_probe(mut self, probe: impl EnvironmentProbe + 'static) -> Self {
        self.probes.push(Box::new(probe));
        self
    }

    pub fn platform_defaults(cfg: &Config) -> Self {
        Self::new()
            .with_probe(HostRuntimeProbe::from_env(cfg))
            .with_probe(FixedPathProbe::system())
            .with_probe(DirectoryProbe::conda(cfg))
    }

    pub fn list(&self) -> Vec<PythonEnv> {
        let mut seen = HashSet::new();
        let envs: Vec<PythonEnv> = self
            .probes
            .iter()
            .flat_map(|p| p.probe())
            .filter(|e| seen.insert(e.interpreter_path.clone()))
            .collect();
        debug!(count = envs.len(), "python environments discovered");
        envs
    }
}

pub fn list_environments(cfg: &Config) -> Vec<PythonEnv> {
    Discovery::platform_defaults(cfg).list()
}

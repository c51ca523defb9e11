use std::{
    collections::HashMap,
    env,
    fs,
    io::{BufRead, BufReader},
    path::PathBuf,
    time::Duration,
};

use directories::BaseDirs;

/// Fixed upper bound on a single worker run.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Worker script file name, resolved next to the running executable.
pub const DEFAULT_WORKER_SCRIPT: &str = "process_script.py";

#[derive(Debug, Clone)]
pub struct Config {
    inner: HashMap<String, String>,
    pub config_path: PathBuf,
}

impl Config {
    pub fn load() -> Self {
        let mut map = default_map();
        let config_path = default_config_path();

        // Read .geomagrc if exists
        if config_path.exists() {
            if let Ok(file) = fs::File::open(&config_path) {
                let reader = BufReader::new(file);
                for line in reader.lines().map_while(Result::ok) {
                    let line = line.trim();
                    if line.is_empty() || line.starts_with('#') {
                        continue;
                    }
                    if let Some((k, v)) = line.split_once('=') {
                        map.insert(k.trim().to_string(), v.trim().to_string());
                    }
                }
            }
        }

        // Overlay environment variables (take precedence)
        for (k, v) in env::vars() {
            if is_config_key(&k) {
                map.insert(k, v);
            }
        }

        Self { inner: map, config_path }
    }

    /// Build a config from defaults plus explicit overrides, ignoring the rc
    /// file and the process environment.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut map = default_map();
        for (k, v) in pairs {
            map.insert(k.into(), v.into());
        }
        Self { inner: map, config_path: default_config_path() }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key).cloned()
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.parse::<u64>().ok())
    }

    pub fn get_path(&self, key: &str) -> Option<PathBuf> {
        self.get(key).filter(|v| !v.is_empty()).map(PathBuf::from)
    }

    /// Comma separated list, blanks dropped.
    pub fn get_list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn project_dir(&self) -> PathBuf {
        self.get_path("GEOMAG_PROJECT_DIR")
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.get_path("GEOMAG_TEMP_DIR").unwrap_or_else(env::temp_dir)
    }

    pub fn timeout(&self) -> Duration {
        let secs = self
            .get_u64("GEOMAG_TIMEOUT_SECS")
            .filter(|s| *s > 0)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        Duration::from_secs(secs)
    }

    /// Worker script path; defaults to a file beside the current executable.
    pub fn worker_script(&self) -> PathBuf {
        if let Some(p) = self.get_path("GEOMAG_WORKER_SCRIPT") {
            return p;
        }
        env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|d| d.join(DEFAULT_WORKER_SCRIPT)))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_WORKER_SCRIPT))
    }

    /// Variables removed from the worker environment.
    pub fn stripped_env(&self) -> Vec<String> {
        self.get_list("GEOMAG_STRIP_ENV")
    }

    pub fn host_python(&self) -> Option<PathBuf> {
        self.get_path("GEOMAG_HOST_PYTHON")
    }

    pub fn conda_roots(&self) -> Vec<PathBuf> {
        self.get_list("GEOMAG_CONDA_ROOTS")
            .into_iter()
            .map(PathBuf::from)
            .collect()
    }
}

fn is_config_key(k: &str) -> bool {
    const KEYS: &[&str] = &["PRETTIFY_MARKDOWN"];

    KEYS.contains(&k) || k.starts_with("GEOMAG_")
}

fn default_config_path() -> PathBuf {
    let base = BaseDirs::new()
        .map(|b| b.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.config"));
    base.join("geomag").join(".geomagrc")
}

fn default_map() -> HashMap<String, String> {
    let mut m = HashMap::new();

    m.insert("GEOMAG_TIMEOUT_SECS".into(), DEFAULT_TIMEOUT_SECS.to_string());
    m.insert("GEOMAG_STRIP_ENV".into(), "PYTHONHOME,PYTHONPATH".into());
    m.insert("PRETTIFY_MARKDOWN".into(), "true".into());

    m
}

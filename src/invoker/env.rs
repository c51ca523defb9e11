//! Worker environment: inherit everything except a deny-list.

use tokio::process::Command;

use crate::config::Config;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvPolicy {
    remove: Vec<String>,
}

impl EnvPolicy {
    pub fn deny<I, S>(vars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            remove: vars.into_iter().map(Into::into).collect(),
        }
    }

    /// Inherit the environment unchanged.
    pub fn inherit() -> Self {
        Self { remove: Vec::new() }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::deny(cfg.stripped_env())
    }

    pub fn removed(&self) -> &[String] {
        &self.remove
    }

    pub fn is_removed(&self, key: &str) -> bool {
        self.remove.iter().any(|r| {
            if cfg!(windows) {
                r.eq_ignore_ascii_case(key)
            } else {
                r == key
            }
        })
    }

    pub fn apply(&self, cmd: &mut Command) {
        for key in &self.remove {
            cmd.env_remove(key);
        }
    }

    /// The variables a worker would see given `vars` as the parent environment.
    pub fn filter<I>(&self, vars: I) -> Vec<(String, String)>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        vars.into_iter()
            .filter(|(k, _)| !self.is_removed(k))
            .collect()
    }
}

impl Default for EnvPolicy {
    fn default() -> Self {
        Self::deny(["PYTHONHOME", "PYTHONPATH"])
    }
}

//! Computation invoker: hands a dataset to an external worker process and
//! ingests the raster it produces.
//!
//! One call to [`Invoker::invoke`] is one invocation:
//!
//! 1. derive unique input/output paths in the temp directory,
//! 2. write the dataset as GeoJSON,
//! 3. run `interpreter worker_script input output <params...>` with the
//!    deny-listed variables removed and a hard time limit,
//! 4. classify the outcome and, on success, load the output into the host.
//!
//! The input copy is removed after a successful load. The output file is never
//! removed here: once loaded it belongs to the host, and after a failure it is
//! left for inspection.

use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
    time::Duration,
};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::{
    collector::{FieldComponent, ParameterSet},
    config::Config,
    host::{DatasetReference, GeoJsonError, LayerHost, RasterLayer},
};

pub mod env;
mod error;
pub mod process;

pub use env::EnvPolicy;
pub use error::InvocationError;
pub use process::{run_with_timeout, ProcessOutput, RunOutcome};

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Time-based identifier, unique within a process and across concurrent ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InvocationId(String);

impl InvocationId {
    pub fn generate() -> Self {
        let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        Self(format!(
            "{}_{}_{}",
            Utc::now().format("%Y%m%d%H%M%S%6f"),
            std::process::id(),
            seq
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InvocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationRequest {
    pub id: InvocationId,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
}

impl InvocationRequest {
    pub fn new(temp_dir: &Path) -> Self {
        let id = InvocationId::generate();
        Self {
            input_path: temp_dir.join(format!("input_polygon_{}.geojson", id)),
            output_path: temp_dir.join(format!("output_result_{}.nc", id)),
            id,
        }
    }

    pub fn layer_name(&self, component: FieldComponent) -> String {
        format!("GeoMag_{}_{}", component, self.id)
    }
}

#[derive(Debug, Clone)]
pub struct InvokerSettings {
    pub worker_script: PathBuf,
    pub temp_dir: PathBuf,
    pub timeout: Duration,
    pub env: EnvPolicy,
}

impl InvokerSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            worker_script: cfg.worker_script(),
            temp_dir: cfg.temp_dir(),
            timeout: cfg.timeout(),
            env: EnvPolicy::from_config(cfg),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InvocationSuccess {
    pub request: InvocationRequest,
    pub layer: RasterLayer,
    pub stdout: String,
}

pub type InvocationResult = Result<InvocationSuccess, InvocationError>;

struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Invoker {
    settings: InvokerSettings,
    in_flight: AtomicBool,
}

impl Invoker {
    pub fn new(settings: InvokerSettings) -> Self {
        Self {
            settings,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &InvokerSettings {
        &self.settings
    }

    /// Full argument vector, interpreter first.
    pub fn argv(&self, request: &InvocationRequest, params: &ParameterSet) -> Vec<OsString> {
        let mut argv: Vec<OsString> = vec![
            params.interpreter_path().into(),
            self.settings.worker_script.clone().into(),
            request.input_path.clone().into(),
            request.output_path.clone().into(),
        ];
        argv.extend(params.worker_args().into_iter().map(OsString::from));
        argv
    }

    /// Run one invocation. A second call while one is in flight is rejected
    /// with [`InvocationError::AlreadyRunning`].
    pub async fn invoke<H: LayerHost>(
        &self,
        host: &mut H,
        params: &ParameterSet,
        dataset: &DatasetReference,
    ) -> InvocationResult {
        let _guard = InFlight::acquire(&self.in_flight).ok_or(InvocationError::AlreadyRunning)?;
        let request = InvocationRequest::new(&self.settings.temp_dir);
        info!(id = %request.id, layer = %dataset.name, "starting invocation");

        let result = self.run(host, params, dataset, request).await;
        if let Err(e) = &result {
            warn!(error = %e, "invocation failed");
        }
        result
    }

    async fn run<H: LayerHost>(
        &self,
        host: &mut H,
        params: &ParameterSet,
        dataset: &DatasetReference,
        request: InvocationRequest,
    ) -> InvocationResult {
        let serialized = fs::create_dir_all(&self.settings.temp_dir)
            .map_err(GeoJsonError::from)
            .and_then(|_| dataset.write_interchange(&request.input_path));
        if let Err(source) = serialized {
            return Err(InvocationError::Serialization {
                path: request.input_path,
                source,
            });
        }

        let argv = self.argv(&request, params);
        debug!(command = ?argv, "launching worker");
        let program = params.interpreter_path();

        let outcome = run_with_timeout(program, &argv[1..], &self.settings.env, self.settings.timeout)
            .await
            .map_err(|source| InvocationError::Launch {
                program: program.clone(),
                source,
            })?;

        let output = match outcome {
            RunOutcome::TimedOut => {
                return Err(InvocationError::Timeout {
                    limit: self.settings.timeout,
                })
            }
            RunOutcome::Exited(out) if !out.success => {
                return Err(InvocationError::WorkerFailure {
                    exit_code: out.exit_code,
                    stdout: out.stdout,
                    stderr: out.stderr,
                })
            }
            RunOutcome::Exited(out) => out,
        };
        if !output.stdout.is_empty() {
            debug!(stdout = %output.stdout, "worker output");
        }

        if !request.output_path.is_file() {
            return Err(InvocationError::ArtifactMissing {
                path: request.output_path,
            });
        }

        let name = request.layer_name(params.field_component());
        let layer = host
            .add_raster_layer(&request.output_path, &name)
            .map_err(|source| InvocationError::ArtifactInvalid {
                path: request.output_path.clone(),
                source,
            })?;

        if let Err(e) = fs::remove_file(&request.input_path) {
            warn!(path = %request.input_path.display(), error = %e, "could not remove temp input file");
        }
        info!(id = %request.id, layer = %layer.name, "invocation finished");

        Ok(InvocationSuccess {
            request,
            layer,
            stdout: output.stdout,
        })
    }
}

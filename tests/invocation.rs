#![cfg(unix)]

use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
    time::{Duration, Instant},
};

use geomag::{
    collector::{Confirmation, Decision, FieldComponent, ParameterForm, ParameterSet},
    host::{DatasetReference, Project, VectorLayer},
    invoker::{EnvPolicy, InvocationError, Invoker, InvokerSettings},
};
use tempfile::TempDir;

const WORKER: &str = env!("CARGO_BIN_EXE_geomag-worker");

const SQUARE: &str = r#"{
  "type": "FeatureCollection",
  "features": [{
    "type": "Feature",
    "properties": {"name": "area"},
    "geometry": {"type": "Polygon", "coordinates": [[[10,40],[20,40],[20,50],[10,50],[10,40]]]}
  }]
}"#;

struct Fixture {
    dir: TempDir,
    project: Project,
    dataset: DatasetReference,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut project = Project::new(dir.path());
        let dataset = project.add_vector_layer(VectorLayer::parse("area", SQUARE).unwrap());
        Self { dir, project, dataset }
    }

    fn temp(&self) -> PathBuf {
        self.dir.path().join("tmp")
    }

    /// A shell script run as `/bin/sh script input output <params...>`.
    fn script(&self, name: &str, body: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, body).unwrap();
        path
    }

    fn invoker(&self, script: &Path, timeout: Duration) -> Invoker {
        self.invoker_in(script, self.temp(), timeout)
    }

    fn invoker_in(&self, script: &Path, temp_dir: PathBuf, timeout: Duration) -> Invoker {
        Invoker::new(InvokerSettings {
            worker_script: script.to_path_buf(),
            temp_dir,
            timeout,
            env: EnvPolicy::default(),
        })
    }

    fn params(&self, interpreter: &str) -> ParameterSet {
        let mut form = ParameterForm::new();
        form.set_interpreter(interpreter)
            .set_dataset(self.dataset.clone())
            .set_vis(1.0)
            .set_grid_cell_size(1.0)
            .set_l_max(100)
            .set_l_min(0)
            .set_altitude(0.0)
            .set_field_component(FieldComponent::Br);
        match form.confirm(Decision::Run).unwrap() {
            Confirmation::Run { params, .. } => params,
            Confirmation::Cancelled => unreachable!(),
        }
    }

    fn temp_files(&self, prefix: &str) -> Vec<PathBuf> {
        fs::read_dir(self.temp())
            .map(|rd| {
                rd.filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .filter(|p| {
                        p.file_name()
                            .map(|n| n.to_string_lossy().starts_with(prefix))
                            .unwrap_or(false)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn exec_worker() -> String {
    format!("exec \"{}\" \"$@\"\n", WORKER)
}

#[tokio::test]
async fn successful_run_adds_the_grid_and_cleans_the_input() {
    let mut fx = Fixture::new();
    let script = fx.script("worker.sh", &exec_worker());
    let invoker = fx.invoker(&script, Duration::from_secs(60));
    let params = fx.params("/bin/sh");
    let dataset = fx.dataset.clone();

    let success = invoker.invoke(&mut fx.project, &params, &dataset).await.unwrap();

    assert!(success.layer.name.starts_with("GeoMag_Br_"));
    assert!(success.stdout.contains("Created output file"));
    let grid = success.layer.grid("Br").unwrap();
    assert_eq!(grid.dims, vec!["lat", "lon"]);
    assert_eq!(grid.shape, vec![180, 360]);
    assert_eq!(success.layer.attribute("l_max").and_then(|v| v.as_f64()), Some(100.0));
    assert_eq!(success.layer.attribute("l_min").and_then(|v| v.as_f64()), Some(0.0));
    assert_eq!(success.layer.attribute("altitude").and_then(|v| v.as_f64()), Some(0.0));

    assert!(!success.request.input_path.exists());
    assert!(success.request.output_path.is_file());
    assert_eq!(fx.project.raster_layers().count(), 1);
}

#[tokio::test]
async fn worker_failure_carries_exit_code_and_stderr() {
    let mut fx = Fixture::new();
    let script = fx.script(
        "broken.sh",
        "echo \"ModuleNotFoundError: No module named 'xarray'\" >&2\nexit 1\n",
    );
    let invoker = fx.invoker(&script, Duration::from_secs(60));
    let params = fx.params("/bin/sh");
    let dataset = fx.dataset.clone();

    let err = invoker.invoke(&mut fx.project, &params, &dataset).await.unwrap_err();
    match &err {
        InvocationError::WorkerFailure { exit_code, stderr, stdout } => {
            assert_eq!(*exit_code, Some(1));
            assert!(stderr.contains("ModuleNotFoundError"));
            assert!(stdout.is_empty());
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.report().starts_with("Script failed with return code 1"));
    assert_eq!(fx.project.raster_layers().count(), 0);
}

#[tokio::test]
async fn timeout_kills_the_worker() {
    let mut fx = Fixture::new();
    let pidfile = fx.dir.path().join("worker.pid");
    let script = fx.script(
        "slow.sh",
        &format!("echo $$ > \"{}\"\nexec sleep 30\n", pidfile.display()),
    );
    let invoker = fx.invoker(&script, Duration::from_millis(500));
    let params = fx.params("/bin/sh");
    let dataset = fx.dataset.clone();

    let err = invoker.invoke(&mut fx.project, &params, &dataset).await.unwrap_err();
    assert!(matches!(err, InvocationError::Timeout { .. }));

    let pid = fs::read_to_string(&pidfile).unwrap();
    if Path::new("/proc/self").exists() {
        assert!(!Path::new("/proc").join(pid.trim()).exists());
    }
    assert_eq!(fx.project.raster_layers().count(), 0);
}

#[tokio::test]
async fn background_process_holding_pipes_cannot_stretch_the_timeout() {
    let mut fx = Fixture::new();
    let script = fx.script("detach.sh", "sleep 8 &\nexit 0\n");
    let invoker = fx.invoker(&script, Duration::from_secs(1));
    let params = fx.params("/bin/sh");
    let dataset = fx.dataset.clone();

    let started = Instant::now();
    let err = invoker.invoke(&mut fx.project, &params, &dataset).await.unwrap_err();
    assert!(matches!(err, InvocationError::Timeout { .. }));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn clean_exit_without_output_is_artifact_missing() {
    let mut fx = Fixture::new();
    let script = fx.script("noop.sh", "exit 0\n");
    let invoker = fx.invoker(&script, Duration::from_secs(60));
    let params = fx.params("/bin/sh");
    let dataset = fx.dataset.clone();

    let err = invoker.invoke(&mut fx.project, &params, &dataset).await.unwrap_err();
    assert!(matches!(err, InvocationError::ArtifactMissing { .. }));
    assert!(err.report().starts_with("Output file not created"));
}

#[tokio::test]
async fn unreadable_output_is_left_in_place() {
    let mut fx = Fixture::new();
    let script = fx.script("garbage.sh", "echo 'not netcdf' > \"$2\"\nexit 0\n");
    let invoker = fx.invoker(&script, Duration::from_secs(60));
    let params = fx.params("/bin/sh");
    let dataset = fx.dataset.clone();

    let err = invoker.invoke(&mut fx.project, &params, &dataset).await.unwrap_err();
    let InvocationError::ArtifactInvalid { path, .. } = &err else {
        panic!("unexpected error: {err:?}");
    };
    assert!(path.is_file());
    assert!(err.report().starts_with("Failed to load NetCDF"));
    assert_eq!(fx.project.raster_layers().count(), 0);
}

#[tokio::test]
async fn corrupt_hdf5_output_is_artifact_invalid() {
    let mut fx = Fixture::new();
    let script = fx.script(
        "hdf_garbage.sh",
        "printf '\\211HDF\\r\\n\\032\\ngarbage' > \"$2\"\nexit 0\n",
    );
    let invoker = fx.invoker(&script, Duration::from_secs(60));
    let params = fx.params("/bin/sh");
    let dataset = fx.dataset.clone();

    let err = invoker.invoke(&mut fx.project, &params, &dataset).await.unwrap_err();
    let InvocationError::ArtifactInvalid { path, .. } = &err else {
        panic!("unexpected error: {err:?}");
    };
    assert!(fs::read(path).unwrap().starts_with(b"\x89HDF"));
    assert_eq!(fx.project.raster_layers().count(), 0);
}

#[tokio::test]
async fn partial_output_survives_worker_failure() {
    let mut fx = Fixture::new();
    let script = fx.script("partial.sh", "echo partial > \"$2\"\nexit 1\n");
    let invoker = fx.invoker(&script, Duration::from_secs(60));
    let params = fx.params("/bin/sh");
    let dataset = fx.dataset.clone();

    let err = invoker.invoke(&mut fx.project, &params, &dataset).await.unwrap_err();
    assert!(matches!(
        err,
        InvocationError::WorkerFailure { exit_code: Some(1), .. }
    ));
    let outputs = fx.temp_files("output_result_");
    assert_eq!(outputs.len(), 1);
    assert_eq!(fs::read_to_string(&outputs[0]).unwrap(), "partial\n");
}

#[tokio::test]
async fn unwritable_temp_dir_fails_before_launch() {
    let mut fx = Fixture::new();
    let marker = fx.dir.path().join("worker_ran");
    let script = fx.script(
        "marker.sh",
        &format!("touch \"{}\"\n{}", marker.display(), exec_worker()),
    );
    let blocked = fx.dir.path().join("blocked");
    fs::write(&blocked, "a regular file").unwrap();
    let invoker = fx.invoker_in(&script, blocked, Duration::from_secs(60));
    let params = fx.params("/bin/sh");
    let dataset = fx.dataset.clone();

    let err = invoker.invoke(&mut fx.project, &params, &dataset).await.unwrap_err();
    assert!(matches!(err, InvocationError::Serialization { .. }));
    assert!(err.report().starts_with("Execution failed:"));
    assert!(!marker.exists());
}

#[tokio::test]
async fn missing_interpreter_is_a_launch_error() {
    let mut fx = Fixture::new();
    let script = fx.script("worker.sh", &exec_worker());
    let invoker = fx.invoker(&script, Duration::from_secs(60));
    let params = fx.params("/nonexistent/bin/python3");
    let dataset = fx.dataset.clone();

    let err = invoker.invoke(&mut fx.project, &params, &dataset).await.unwrap_err();
    assert!(matches!(err, InvocationError::Launch { .. }));
    assert!(err.report().starts_with("Execution failed:"));
}

#[tokio::test]
async fn second_trigger_while_running_is_rejected() {
    let fx = Fixture::new();
    let script = fx.script("slow_worker.sh", &format!("sleep 1\n{}", exec_worker()));
    let invoker = fx.invoker(&script, Duration::from_secs(60));
    let params = fx.params("/bin/sh");

    let mut first_host = Project::new(fx.dir.path());
    let mut second_host = Project::new(fx.dir.path());
    let (first, second) = tokio::join!(
        invoker.invoke(&mut first_host, &params, &fx.dataset),
        invoker.invoke(&mut second_host, &params, &fx.dataset),
    );

    assert!(first.is_ok());
    assert!(matches!(second, Err(InvocationError::AlreadyRunning)));
    assert_eq!(second_host.raster_layers().count(), 0);
    assert_eq!(fx.temp_files("input_polygon_").len(), 0);
    assert_eq!(fx.temp_files("output_result_").len(), 1);
}

#[tokio::test]
async fn sequential_runs_use_distinct_files() {
    let mut fx = Fixture::new();
    let script = fx.script("worker.sh", &exec_worker());
    let invoker = fx.invoker(&script, Duration::from_secs(60));
    let mut form = ParameterForm::new();
    form.set_interpreter("/bin/sh")
        .set_dataset(fx.dataset.clone())
        .set_grid_cell_size(10.0);
    let Confirmation::Run { params, dataset } = form.confirm(Decision::Run).unwrap() else {
        unreachable!()
    };

    let a = invoker.invoke(&mut fx.project, &params, &dataset).await.unwrap();
    let b = invoker.invoke(&mut fx.project, &params, &dataset).await.unwrap();
    assert_ne!(a.request.output_path, b.request.output_path);
    assert_ne!(a.layer.name, b.layer.name);
    assert_eq!(fx.temp_files("output_result_").len(), 2);
    assert_eq!(fx.project.raster_layers().count(), 2);
}

#[test]
fn worker_rejects_wrong_arity() {
    let out = Command::new(WORKER).args(["a.geojson", "b.nc"]).output().unwrap();
    assert_eq!(out.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("Usage:"));
    assert!(stdout.contains("Received 3 arguments"));
}

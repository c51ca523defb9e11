//! Collect parameters, confirm, invoke the worker and report the outcome.

use std::{
    io::{self, BufRead, Write},
    time::Duration,
};

use anyhow::{anyhow, bail, Result};
use is_terminal::IsTerminal;
use tracing::debug;

use geomag::{
    collector::{list_candidate_datasets, list_environments, Confirmation, Decision, ParameterForm},
    config::Config,
    host::{DatasetReference, Project},
    invoker::{Invoker, InvokerSettings},
};

use crate::{
    cli::Cli,
    printer::{status, MarkdownPrinter, Status},
};

const PROMPT: &str = "[R]un, [C]ancel: ";

/// Ask until the answer is recognisable. End of input cancels.
pub fn read_decision<R: BufRead, W: Write>(mut input: R, mut output: W) -> io::Result<Decision> {
    loop {
        write!(output, "{}", PROMPT)?;
        output.flush()?;
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(Decision::Cancel);
        }
        match line.trim().to_lowercase().as_str() {
            "r" | "run" | "y" | "yes" => return Ok(Decision::Run),
            "" | "c" | "cancel" | "n" | "no" => return Ok(Decision::Cancel),
            _ => continue,
        }
    }
}

fn choose_dataset(project: &Project, wanted: Option<&str>) -> Result<DatasetReference> {
    match wanted {
        Some(name) => project
            .vector_layers()
            .find(|d| d.name == name)
            .cloned()
            .ok_or_else(|| anyhow!("no vector layer named '{}' in {}", name, project.root().display())),
        None => list_candidate_datasets(project).into_iter().next().ok_or_else(|| {
            anyhow!("no polygon layers in {}", project.root().display())
        }),
    }
}

fn build_form(cli: &Cli, cfg: &Config, dataset: DatasetReference) -> ParameterForm {
    let mut form = ParameterForm::new();
    let interpreter = cli
        .python
        .clone()
        .or_else(|| list_environments(cfg).into_iter().next().map(|e| e.interpreter_path));
    if let Some(path) = interpreter {
        form.set_interpreter(path);
    }
    form.set_dataset(dataset)
        .set_vis(cli.vis)
        .set_grid_cell_size(cli.grid_cell_size)
        .set_l_max(cli.l_max)
        .set_l_min(cli.l_min)
        .set_altitude(cli.altitude)
        .set_field_component(cli.field_component);
    form
}

pub async fn run(cli: &Cli, cfg: &Config, mut project: Project, md: bool) -> Result<()> {
    let printer = MarkdownPrinter::new(md);
    let dataset = choose_dataset(&project, cli.layer.as_deref())?;
    let form = build_form(cli, cfg, dataset);
    printer.print(&form.summary());

    let decision = if cli.yes {
        Decision::Run
    } else if io::stdin().is_terminal() {
        read_decision(io::stdin().lock(), io::stdout())?
    } else {
        status(Status::Warn, "stdin is not a terminal; pass --yes to run without confirmation");
        Decision::Cancel
    };

    let (params, dataset) = match form.confirm(decision)? {
        Confirmation::Run { params, dataset } => (params, dataset),
        Confirmation::Cancelled => {
            status(Status::Warn, "Cancelled");
            return Ok(());
        }
    };

    let mut settings = InvokerSettings::from_config(cfg);
    if let Some(secs) = cli.timeout.filter(|s| *s > 0) {
        settings.timeout = Duration::from_secs(secs);
    }
    debug!(?settings, "invoker settings");
    let invoker = Invoker::new(settings);

    status(Status::Info, &format!("Running worker on '{}'...", dataset.name));
    match invoker.invoke(&mut project, &params, &dataset).await {
        Ok(success) => {
            status(
                Status::Ok,
                &format!(
                    "Layer {} added from {}",
                    success.layer.name,
                    success.request.output_path.display()
                ),
            );
            for grid in &success.layer.grids {
                println!("  {} {:?} {:?}", grid.name, grid.dims, grid.shape);
            }
            Ok(())
        }
        Err(e) => {
            status(Status::Error, e.title());
            printer.print(&e.report());
            bail!(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn decide(input: &str) -> (Decision, String) {
        let mut out = Vec::new();
        let d = read_decision(Cursor::new(input), &mut out).unwrap();
        (d, String::from_utf8(out).unwrap())
    }

    #[test]
    fn run_and_cancel_answers() {
        assert_eq!(decide("r\n").0, Decision::Run);
        assert_eq!(decide("Run\n").0, Decision::Run);
        assert_eq!(decide("c\n").0, Decision::Cancel);
        assert_eq!(decide("\n").0, Decision::Cancel);
    }

    #[test]
    fn end_of_input_cancels() {
        assert_eq!(decide("").0, Decision::Cancel);
    }

    #[test]
    fn unrecognised_answer_asks_again() {
        let (d, out) = decide("maybe\nr\n");
        assert_eq!(d, Decision::Run);
        assert_eq!(out.matches(PROMPT).count(), 2);
    }

    #[test]
    fn named_layer_is_chosen_over_first_polygon() {
        let mut project = Project::new("/tmp");
        let square = r#"{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]}"#;
        project.add_vector_layer(geomag::host::VectorLayer::parse("first", square).unwrap());
        project.add_vector_layer(geomag::host::VectorLayer::parse("second", square).unwrap());

        assert_eq!(choose_dataset(&project, None).unwrap().name, "first");
        assert_eq!(choose_dataset(&project, Some("second")).unwrap().name, "second");
        assert!(choose_dataset(&project, Some("missing")).is_err());
        assert!(choose_dataset(&Project::new("/tmp"), None).is_err());
    }
}

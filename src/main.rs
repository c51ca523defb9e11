mod cli;
mod handlers;
mod printer;

use anyhow::Result;
use geomag::config::Config;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Cli::parse();
    let cfg = Config::load();

    let md = if args.no_md {
        false
    } else {
        cfg.get_bool("PRETTIFY_MARKDOWN")
    };

    if args.list_envs || args.list_layers {
        if args.list_envs {
            handlers::list::environments(&cfg);
        }
        if args.list_layers {
            let project = handlers::list::open_project(&cfg, args.project.as_deref())?;
            handlers::list::layers(&project);
        }
        return Ok(());
    }

    let project = handlers::list::open_project(&cfg, args.project.as_deref())?;
    handlers::run::run(&args, &cfg, project, md).await
}

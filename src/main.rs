mod cli;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands, FrameArgs, MergesArgs, NextArgs, ServerArgs, StatesArgs};
use ledgerbox::config::Config;
use ledgerbox::ledger::{Criteria, Datetime, MergeOptions, RecordHandler};
use ledgerbox::service::{self, ServiceState};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[tokio::main]
async fn main() -> Result<(), AnyError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Server(args) => run_server(args).await?,
        Commands::Next(args) => run_next(args)?,
        Commands::States(args) => run_states(args)?,
        Commands::Merges(args) => run_merges(args)?,
        Commands::Frame(args) => run_frame(args)?,
    }

    Ok(())
}

async fn run_server(args: ServerArgs) -> Result<(), AnyError> {
    let config = match args.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    let address = args.address.unwrap_or(config.server.bind_addr);
    let ledger_dir = args
        .ledger_dir
        .unwrap_or_else(|| config.server.ledger_dir.clone());
    let state = ServiceState::new(
        ledger_dir,
        config.ledger.clone(),
        config.server.accepted_clients.clone(),
    );
    service::run(address, state).await
}

fn run_next(args: NextArgs) -> Result<(), AnyError> {
    let mut handler = RecordHandler::load(args.path)?;
    match handler.next_record(args.state.as_deref()) {
        Some(record) => {
            println!("{record}");
            if let Some(position) = handler.position() {
                eprintln!("{position}");
            }
        }
        None => {
            let wanted = args
                .state
                .unwrap_or_else(|| handler.mark_open().to_owned());
            println!(
                "no record with state '{}' in {}",
                wanted,
                handler.path().display()
            );
        }
    }
    Ok(())
}

fn run_states(args: StatesArgs) -> Result<(), AnyError> {
    let mut handler = RecordHandler::load(args.path)?;
    let mut criteria = Vec::new();
    if let Some(state) = args.state {
        criteria.push(Criteria::state(state));
    }
    if let Some(text) = args.text {
        criteria.push(Criteria::text_in(text, args.text_field));
    }
    if args.from.is_some() || args.to.is_some() {
        let datetime = Datetime::builder()
            .maybe_field(args.dt_field)
            .maybe_format(args.dt_format)
            .maybe_from(args.from)
            .maybe_to(args.to)
            .build()?;
        criteria.push(datetime.into());
    }
    let count = handler.states(
        &criteria,
        args.set_state.as_deref(),
        !args.apply,
        args.verbose,
    )?;
    println!("{count}");
    Ok(())
}

fn run_merges(args: MergesArgs) -> Result<(), AnyError> {
    let mut handler = RecordHandler::load(args.path)?;
    let options = MergeOptions {
        require_state: args.require_state,
        ignore_state: if args.no_ignore {
            None
        } else {
            Some(args.ignore_state)
        },
        append_unknown: !args.no_append,
        dry_run: !args.apply,
        verbose: args.verbose,
    };
    let outcome = handler.merges_path(args.other, &options)?;
    println!("{outcome}");
    Ok(())
}

fn run_frame(args: FrameArgs) -> Result<(), AnyError> {
    let handler = RecordHandler::load(args.path)?;
    let out_path = handler.frame(
        args.start,
        Some(args.size),
        Some(&args.mark),
        args.sort_by.as_deref(),
    )?;
    println!("{}", out_path.display());
    Ok(())
}

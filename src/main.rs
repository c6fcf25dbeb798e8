use std::io;
use std::process;
use std::sync::Arc;

use anyhow::Result;
use tracing::error;

use jdkstrap::cancel::CancellationToken;
use jdkstrap::environment::{PipelineCommandPublisher, ProcessEnvironment};
use jdkstrap::executor::RealCommandExecutor;
use jdkstrap::platform::Platform;
use jdkstrap::{Runtime, cli, privilege};

fn main() -> Result<()> {
    let args = cli::parse_args()?;
    jdkstrap::init_logging(args.command.log_level())?;

    let result = match &args.command {
        cli::Commands::Install(opts) => {
            let cancel = CancellationToken::new();
            cancel.register_signals()?;
            let runtime = Runtime {
                platform: Platform::current(),
                executor: Arc::new(RealCommandExecutor),
                variables: Arc::new(ProcessEnvironment),
                publisher: Arc::new(PipelineCommandPublisher::new(io::stdout())),
                cancel,
                privileged: privilege::running_as_root(),
            };
            jdkstrap::run_install(opts, &runtime).map(|_| ())
        }
        cli::Commands::Validate(opts) => jdkstrap::run_validate(opts),
        cli::Commands::Completions(opts) => jdkstrap::run_completions(opts, &mut io::stdout()),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        process::exit(1);
    }

    Ok(())
}

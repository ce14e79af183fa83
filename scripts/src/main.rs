use clap::Parser;
use deploy_scripts::{cli::Cli, errors::ScriptError};

#[tokio::main]
async fn main() -> Result<(), ScriptError> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().pretty().with_max_level(cli.log_level()).init();

    let Cli {
        priv_key,
        rpc_url,
        command,
        ..
    } = cli;

    command.run(priv_key.as_deref(), &rpc_url).await
}

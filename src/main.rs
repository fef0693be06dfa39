use clap::Parser;
use prodmatch::Opts;
use prodmatch::cli::SubCommandExtend;
use prodmatch::config::SubCommand;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let opts = Opts::parse();

    match &opts.subcmd {
        SubCommand::Add(cmd) => cmd.run(&opts).await,
        SubCommand::Import(cmd) => cmd.run(&opts).await,
        SubCommand::Update(cmd) => cmd.run(&opts).await,
        SubCommand::Remove(cmd) => cmd.run(&opts).await,
        SubCommand::List(cmd) => cmd.run(&opts).await,
        SubCommand::Identify(cmd) => cmd.run(&opts).await,
        SubCommand::Reindex(cmd) => cmd.run(&opts).await,
        SubCommand::Match(cmd) => cmd.run(&opts).await,
        SubCommand::Show(cmd) => cmd.run(&opts).await,
        SubCommand::Server(cmd) => cmd.run(&opts).await,
    }
}

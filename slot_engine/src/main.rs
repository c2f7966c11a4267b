use anyhow::Result;

mod cli;
mod engine;
mod hooks;
mod pool;
mod report;
mod runtime;
mod scenario;
mod scene;
mod scheduler;

fn main() -> Result<()> {
    env_logger::init();
    let args = cli::parse()?;
    runtime::execute(args)
}

//! The kube-supervise CLI.

use anyhow::Result;
use structopt::StructOpt;

use kube_supervise::Supervise;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Supervise::from_args();
    cli.run().await
}

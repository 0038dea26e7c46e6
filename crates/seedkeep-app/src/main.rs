#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! `seedkeep` binary: submits every source given on the command line and runs until ctrl-c.

use seedkeep_app::run_app;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    run_app(std::env::args().skip(1).collect()).await?;
    Ok(())
}

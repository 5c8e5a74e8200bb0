mod cli;
mod link;
mod logging;
mod peers;
mod router;

use clap::Parser;
use log::{error, info};

use cli::Cli;
use router::RouterContext;

fn main() {
    let cli = Cli::parse();
    logging::init(cli.debug);

    info!("starting mipd, local MIP address {}", cli.mip_addr);

    let mut ctx = match RouterContext::new(cli.mip_addr, &cli.socket_upper) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("failed to initialize router: {e:#}");
            std::process::exit(1);
        }
    };

    info!(
        "bound to {} interface(s), listening on {}",
        ctx.interfaces.len(),
        cli.socket_upper.display()
    );

    if let Err(e) = ctx.run() {
        error!("router event loop terminated: {e:#}");
        std::process::exit(1);
    }
}

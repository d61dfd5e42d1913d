mod config;
mod dns;
mod repository;

use clap::Parser;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

fn init_logs() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{fmt, registry, EnvFilter};

    let _ = registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=debug", env!("CARGO_PKG_NAME")).into()),
        )
        .with(fmt::layer().with_ansi(cfg!(debug_assertions)))
        .try_init();
}

/// Iterative DNS resolver that walks the hierarchy from the root name servers
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on for client queries
    #[arg(long, env = "DNS_BIND", default_value = "0.0.0.0:53")]
    bind: SocketAddr,
    /// Comma separated root server addresses to start every walk from
    #[arg(long, env = "DNS_ROOTS", value_delimiter = ',')]
    roots: Option<Vec<Ipv4Addr>>,
}

impl Args {
    fn into_config(self) -> config::Config {
        config::Config {
            bind: self.bind,
            roots: self
                .roots
                .unwrap_or_else(|| config::ROOT_SERVERS.to_vec()),
        }
    }
}

#[tokio::main]
async fn main() {
    init_logs();

    let config = Args::parse().into_config();
    tracing::info!("starting dns resolver on {}", config.bind);

    let lookup = repository::lookup::Config::default().build();
    let resolver = repository::resolver::Config::new(config.roots).build(Arc::new(lookup));
    let handler = dns::handler::DnsHandler::new(Arc::new(resolver));

    let server = taproot_server::UdpServer::new(config.bind, handler);
    tokio::select! {
        result = server.run() => {
            if let Err(error) = result {
                tracing::error!("unable to run udp server: {error}");
                std::process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received interrupt, shutting down");
        }
    }
}

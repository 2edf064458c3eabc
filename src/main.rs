use live_poll_server::config::Config;
use live_poll_server::{api, logging, PollServer};

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    logging::init(&config.logging);

    let poll_server = PollServer::new(config.poll.tick_interval());
    let routes = api::routes(poll_server, &config.server.static_dir);

    let (ip, port) = config.bind_address();
    tracing::info!(
        host = %config.server.host,
        port,
        static_dir = %config.server.static_dir,
        tick_interval_ms = config.poll.tick_interval_ms,
        "Server running on port {}",
        port
    );

    warp::serve(routes).run((ip, port)).await;
}

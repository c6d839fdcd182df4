use launch_relay::{relay_error, relay_log, Relay, RelayConfig};

#[tokio::main]
async fn main() {
    relay_log::init();

    let cfg = match RelayConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            relay_error!("{}", e);
            std::process::exit(1);
        }
    };

    let termination = Relay::new(cfg).run().await;
    std::process::exit(termination.exit_code());
}

use streamhub::{cli, config, telemetry};

fn main() {
    let cli = cli::parse_from(std::env::args_os());

    let config = match cli::load_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("config load failed, using defaults: {err}");
            let mut config = config::Config::default();
            config::apply_env_overrides(&mut config);
            config
        }
    };

    telemetry::init(&config.logging);

    if let Err(err) = cli::run(cli, config) {
        tracing::error!("error: {err}");
        std::process::exit(1);
    }
}

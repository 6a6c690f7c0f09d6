use argparse::{ArgumentParser, Store};
use common::{config::Config, system::System};
use std::env;

fn main() {
    let mut config_path =
        env::var("CONFIG").unwrap_or_else(|_| String::from("./config/notifier.toml"));

    {
        let mut ap = ArgumentParser::new();
        ap.set_description("Alarm notification consumer");
        ap.refer(&mut config_path).add_option(
            &["-c", "--config"],
            Store,
            "Config file location, (default: ./config/notifier.toml)",
        );
        ap.parse_args_or_exit();
    }

    let config = Config::parse(&config_path);

    System::start("notifier", &config);
}

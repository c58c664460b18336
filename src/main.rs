use vitrine::cli::CliOverrides;
use vitrine::run_with_overrides;

fn main() {
    let cli = match CliOverrides::parse_from_env() {
        Ok(parsed) => parsed,
        Err(err) => {
            eprintln!("[cli] {err}");
            std::process::exit(2);
        }
    };
    let config_path = cli.config_path().to_string();
    let overrides = cli.into_config_overrides();
    if let Err(err) = pollster::block_on(run_with_overrides(&config_path, &overrides)) {
        eprintln!("Application error: {err:?}");
    }
}

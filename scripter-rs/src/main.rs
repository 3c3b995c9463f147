use scripter::cli::{self, ConfigFile};
use scripter::config::Config;
use scripter::host::Host;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_env("SCRIPTER_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .with(filter)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("scripter: {e}");
            eprintln!("{}", cli::USAGE);
            std::process::exit(1);
        }
    };

    init_tracing(args.debug);

    // ── Load user config ──────────────────────────────────────────────────────
    let config_path = match &args.config {
        ConfigFile::Skip => None,
        ConfigFile::Explicit(path) => Some(path.clone()),
        ConfigFile::Search => cli::find_user_config(),
    };
    let mut config = Config::new();
    if let Some(path) = config_path {
        match Config::load_file(&path) {
            Ok((c, errors)) => {
                for e in errors {
                    eprintln!("scripter: {}: {e}", path.display());
                }
                config = c;
            }
            Err(e) => {
                eprintln!("scripter: {}: {e}", path.display());
                std::process::exit(1);
            }
        }
    }
    if let Some(ms) = args.interval_ms {
        config.tick = std::time::Duration::from_millis(ms.max(1));
    }
    if let Some(n) = args.ticks {
        config.ticks = (n > 0).then_some(n);
    }

    let mut host = Host::new(&config);

    // ── Startup scripts ───────────────────────────────────────────────────────
    for path in &config.loads {
        if let Err(e) = host.load_script_file(path) {
            eprintln!("scripter: {e}");
        }
    }

    let mut failed = false;
    if let Some(cmd) = &args.command {
        if let Err(e) = host.run_command(cmd, args.quiet) {
            eprintln!("scripter: {e}");
            failed = true;
        }
    }
    for path in &args.scripts {
        if let Err(e) = host.load_script_file(path) {
            eprintln!("scripter: {e}");
            failed = true;
        }
    }

    // ── Tick loop ─────────────────────────────────────────────────────────────
    host.run(config.ticks).await;

    if failed {
        std::process::exit(1);
    }
}

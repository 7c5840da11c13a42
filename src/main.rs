use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use manager_ami::{AmiClient, AmiConfig, AmiError};
use manager_api::ManagerClient;
use tdd_relay::config::{EnvConfig, SessionOptions, DEFAULT_REFRESH_INTERVAL};
use tdd_relay::core::output::Console;
use tdd_relay::lifecycle::{RelaySession, SessionEnd};
use tdd_relay::platform::{install_panic_hook, install_signal_handlers, ProcessTerminal};
use tdd_relay::session::ShutdownReason;
use tdd_relay::{logging, RelayError};
use thiserror::Error;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "tdd-relay", version)]
#[command(about = "Virtual TDD/TTY for Asterisk channels")]
struct Args {
    /// Channel to converse on; prompts for a selection when omitted
    #[arg(short = 'c', long)]
    channel: Option<String>,

    /// AMI host
    #[arg(short = 'l', long, default_value = manager_ami::config::DEFAULT_AMI_HOST)]
    host: String,

    /// AMI port
    #[arg(long, default_value_t = manager_ami::config::DEFAULT_AMI_PORT)]
    port: u16,

    /// AMI username
    #[arg(short = 'u', long)]
    username: String,

    /// AMI password; autodetected from manager.conf for local hosts
    #[arg(short = 'p', long)]
    password: Option<String>,

    /// manager.conf used for password autodetection
    #[arg(long, value_name = "PATH")]
    manager_conf: Option<PathBuf>,

    /// Refresh the channel list periodically, not only on channel events
    #[arg(short = 'r', long)]
    refresh: bool,

    /// Interval for --refresh, in milliseconds
    #[arg(long, value_name = "MS")]
    refresh_interval_ms: Option<u64>,
}

impl Args {
    fn ami_config(&self) -> AmiConfig {
        let mut config = AmiConfig::new(self.username.as_str())
            .with_host(self.host.as_str())
            .with_port(self.port);
        if let Some(password) = &self.password {
            config = config.with_password(password.as_str());
        }
        if let Some(path) = &self.manager_conf {
            config = config.with_manager_conf(path.clone());
        }
        config
    }

    fn session_options(&self) -> SessionOptions {
        let mut options = SessionOptions::new();
        if let Some(channel) = &self.channel {
            options = options.with_channel(channel.as_str());
        }
        if self.refresh || self.refresh_interval_ms.is_some() {
            let interval = self
                .refresh_interval_ms
                .map_or(DEFAULT_REFRESH_INTERVAL, Duration::from_millis);
            options = options.with_refresh_interval(interval);
        }
        options
    }
}

#[derive(Debug, Error)]
enum Failure {
    #[error(transparent)]
    Manager(#[from] AmiError),
    #[error(transparent)]
    Relay(#[from] RelayError),
}

fn run(args: &Args) -> Result<SessionEnd, Failure> {
    let ami_config = args.ami_config();
    let password = ami_config.resolve_password()?;
    let (client, notices) = AmiClient::connect(&ami_config)?;
    client.login(&ami_config.username, &password)?;
    info!(host = %ami_config.address(), user = %ami_config.username, "logged in");

    let client: Arc<dyn ManagerClient> = Arc::new(client);
    let terminal = ProcessTerminal::new();
    let restore = terminal.restore_handle();
    let console = Arc::new(Console::stdout());

    let relay_session = RelaySession::new(
        Arc::clone(&client),
        terminal,
        Arc::clone(&console),
        args.session_options(),
    );

    let _panic_guard = install_panic_hook(move || {
        let _ = restore.restore();
    });
    let shutdown = relay_session.shutdown();
    let _signal_guard = install_signal_handlers(move |_| {
        shutdown.trigger(ShutdownReason::Interrupted);
    })
    .map_err(RelayError::Terminal)?;

    let relay = relay_session
        .event_relay()
        .spawn(notices)
        .map_err(RelayError::Terminal)?;

    let result = relay_session.run().map_err(Failure::from);

    // The client is disconnected by now, which closes the notice queue.
    if relay.join().is_err() {
        error!("event relay thread panicked");
    }
    result
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(err) = logging::init(&EnvConfig::from_env()) {
        eprintln!("Failed to open log file: {err}");
    }

    match run(&args) {
        Ok(SessionEnd::Quit | SessionEnd::EndOfInput) => {
            eprintln!("\nExiting...");
            ExitCode::SUCCESS
        }
        Ok(SessionEnd::Interrupted) => {
            eprintln!("\nInterrupted, exiting...");
            ExitCode::FAILURE
        }
        Err(err) => {
            error!(error = %err, "tdd-relay failed");
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

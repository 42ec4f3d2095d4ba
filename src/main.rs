use bernt_monitor::api::{Api, HttpApi};
use bernt_monitor::config::Config;
use bernt_monitor::dashboard::{Dashboard, DashboardView};
use bernt_monitor::notice::{LogNotifier, Notice, Notifier};
use bernt_monitor::session::{CredentialFile, SessionGate, SessionStore};
use bernt_monitor::window::Horizon;
use clap::{Parser, Subcommand};
use log::{debug, error};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(about = "Watch the sensor data of your BERNT devices")]
struct Cli {

    /// JSON configuration file
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an account
    Register { email: String, password: String },
    /// Log in and remember the session
    Login { email: String, password: String },
    /// Forget the session
    Logout,
    /// List claimed devices
    Devices,
    /// Claim a device with its key
    Claim { device_id: String, device_key: String },
    /// Release a claimed device
    Unclaim { device_id: String },
    /// Poll sensor data until interrupted
    Watch {
        /// Readings per chart: 20, 200 or 2000
        #[arg(long)]
        horizon: Option<usize>,
    },
    /// Download the sensor data as CSV
    Export {
        /// Export the latest readings instead of the server's full history
        #[arg(long)]
        local: bool,
        /// Directory to write the file into
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            error!("{}", msg);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let config = Config::read_from_file(&cli.config).map_err(|err| err.to_string())?;
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
    let api: Arc<dyn Api> = Arc::new(HttpApi::new(&config.api_base_url, config.network_timeout()));
    let session = Arc::new(SessionStore::new(
        api.clone(), CredentialFile::new(&config.credential_file), notifier.clone()));
    let dashboard = Dashboard::new(api, session.clone(), notifier.clone(),
        config.poll_interval(), &config.export_file_name);

    if !matches!(cli.command, Command::Register { .. } | Command::Login { .. } | Command::Logout)
        && !session.is_valid()
    {
        return Err("not logged in; run `login` first".to_string());
    }

    match cli.command {
        Command::Register { email, password } =>
            session.register(&email, &password).map_err(|err| err.to_string()),

        Command::Login { email, password } =>
            session.login(&email, &password).map(|_| ()).map_err(|err| err.to_string()),

        Command::Logout => {
            session.logout();
            Ok(())
        }

        Command::Devices => {
            let devices = dashboard.registry().list().map_err(|err| err.to_string())?;
            if devices.is_empty() {
                println!("No devices claimed.");
            }
            for device in devices.iter() {
                println!("{}", device.id);
            }
            Ok(())
        }

        Command::Claim { device_id, device_key } =>
            dashboard.registry().claim(&device_id, &device_key).map_err(|err| err.to_string()),

        Command::Unclaim { device_id } =>
            dashboard.registry().unclaim(&device_id).map_err(|err| err.to_string()),

        Command::Watch { horizon } => {
            let horizon = match horizon {
                Some(count) => Horizon::from_count(count)
                    .ok_or_else(|| format!("horizon must be 20, 200 or 2000, not {}", count))?,
                None => config.horizon().map_err(|err| err.to_string())?,
            };
            runtime()?.block_on(dashboard.watch(horizon, print_view, async {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    error!("Ctrl-C can not be awaited: {}", err);
                    std::future::pending::<()>().await;
                }
            }));
            Ok(())
        }

        Command::Export { local, out } => {
            let export = if local {
                let buffer = runtime()?.block_on(dashboard.poller().fetch_once())
                    .map_err(|err| err.to_string())?;
                dashboard.exporter().export_local(&buffer)
            } else {
                dashboard.exporter().export_csv()
            }.map_err(|err| err.to_string())?;
            let path = export.save_in(&out).map_err(|err| err.to_string())?;
            notifier.notify(&Notice::ExportSaved(path.display().to_string()));
            Ok(())
        }
    }
}

/// The poller's runtime: one thread, tasks interleaved at network calls
fn runtime() -> Result<tokio::runtime::Runtime, String> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| format!("runtime can not be started: {}", err))
}

fn print_view(view: &DashboardView) {
    debug!("{} devices, {} readings charted", view.devices.len(), view.watts.labels.len());
    match &view.latest {
        None => println!("No sensor data available."),
        Some(latest) => println!(
            "{} {}  {:.1}°C  {:.1}V  {:.3}A  {:.1}W  status={}  session {:.3}Wh",
            latest.device_id,
            latest.timestamp,
            latest.temperature,
            latest.voltage,
            latest.current,
            latest.watts,
            latest.status_code.map_or_else(|| "-".to_string(), |code| code.to_string()),
            view.session_energy_wh,
        ),
    }
    if let (Some(first), Some(last)) = (view.watts.labels.first(), view.watts.labels.last()) {
        let watts = &view.watts.datasets[0].values;
        let peak = watts.iter().cloned().fold(f64::MIN, f64::max);
        println!("  {} readings {}..{}, peak {:.1}W", watts.len(), first, last, peak);
    }
}

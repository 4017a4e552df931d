use anyhow::Context;
use folderwatchd::daemon::{DaemonConfig, DaemonRuntime};
use folderwatchd::dbus_api::{DBUS_INTERFACE_WATCH, DBUS_NAME_WATCH, DBUS_OBJECT_PATH_WATCH};
use zbus::{Connection, Proxy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CliMode {
    Run,
    ListWatches,
    Help,
}

fn parse_cli_mode<I>(args: I) -> anyhow::Result<CliMode>
where
    I: IntoIterator<Item = String>,
{
    let mut mode = CliMode::Run;
    for arg in args.into_iter().skip(1) {
        match arg.as_str() {
            "--list-watches" => mode = CliMode::ListWatches,
            "--help" | "-h" => mode = CliMode::Help,
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    Ok(mode)
}

fn init_tracing() {
    let filter = std::env::var("FOLDERWATCH_LOG")
        .ok()
        .and_then(|value| tracing_subscriber::EnvFilter::try_new(value).ok())
        .or_else(|| tracing_subscriber::EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| "folderwatchd=info".into());

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Asks a running daemon for its mappings and prints one line per folder.
async fn list_watches() -> anyhow::Result<()> {
    let connection = Connection::session()
        .await
        .context("failed to connect to session D-Bus for Watch1")?;
    let proxy = Proxy::new(
        &connection,
        DBUS_NAME_WATCH,
        DBUS_OBJECT_PATH_WATCH,
        DBUS_INTERFACE_WATCH,
    )
    .await
    .context("failed to create Watch1 proxy")?;
    let watches: Vec<(String, String, String, u32, u32)> = proxy
        .call("ListWatches", &())
        .await
        .context("ListWatches failed")?;

    if watches.is_empty() {
        println!("no watched folders");
    }
    for (folder_path, root_name, strategy, synced, ignored) in watches {
        println!("{folder_path}\t{root_name}\t{strategy}\tsynced={synced}\tignored={ignored}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    match parse_cli_mode(std::env::args())? {
        CliMode::ListWatches => return list_watches().await,
        CliMode::Help => {
            println!("Usage: folderwatchd [--list-watches]");
            println!("  --list-watches   Print the folders watched by a running daemon and exit");
            return Ok(());
        }
        CliMode::Run => {}
    }
    init_tracing();
    let config = DaemonConfig::from_env()?;
    let daemon = DaemonRuntime::bootstrap(config).await?;
    daemon.run().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_cli_mode_defaults_to_run() {
        let mode = parse_cli_mode(vec!["folderwatchd".to_string()]).unwrap();
        assert_eq!(mode, CliMode::Run);
    }

    #[test]
    fn parse_cli_mode_supports_list_watches() {
        let mode = parse_cli_mode(vec![
            "folderwatchd".to_string(),
            "--list-watches".to_string(),
        ])
        .unwrap();
        assert_eq!(mode, CliMode::ListWatches);
    }

    #[test]
    fn parse_cli_mode_supports_help() {
        let mode = parse_cli_mode(vec!["folderwatchd".to_string(), "-h".to_string()]).unwrap();
        assert_eq!(mode, CliMode::Help);
    }

    #[test]
    fn parse_cli_mode_rejects_unknown_flags() {
        let err = parse_cli_mode(vec!["folderwatchd".to_string(), "--bogus".to_string()])
            .unwrap_err();
        assert!(err.to_string().contains("--bogus"));
    }
}

use std::{path::PathBuf, sync::Arc};

use dialoguer::{theme::ColorfulTheme, Confirm};

use super::{output, CliError, Command, OAUTH_TOKEN_ENV};
use crate::{
    catalog::SnapshotInfo,
    codec::FORMAT_VERSION,
    config::{model::app_data_dir, Config, ConfigManager},
    database::CURRENT_SCHEMA_VERSION,
    oauth::{AuthorizationState, StaticTokenAuthorizer},
    service::BackupService,
    storage::StorageBackendKind,
    utils::build_info,
};

struct Context {
    service: BackupService,
    config: Config,
    home: PathBuf,
}

fn open_context() -> Result<Context, CliError> {
    let manager = ConfigManager::with_base_dir(app_data_dir())?;
    let config = manager.load()?;
    let authorizer = Arc::new(StaticTokenAuthorizer::new(std::env::var(OAUTH_TOKEN_ENV).ok()));
    let service = BackupService::open(&config, manager.home(), authorizer)?;
    Ok(Context {
        service,
        config,
        home: manager.home().to_path_buf(),
    })
}

pub async fn dispatch(command: Command) -> Result<(), CliError> {
    if let Command::Version = command {
        cmd_version();
        return Ok(());
    }

    let context = open_context()?;
    match command {
        Command::Save { backend } => cmd_save(&context, backend).await,
        Command::List { backend } => cmd_list(&context, backend).await,
        Command::Restore {
            backend,
            snapshot,
            yes,
        } => cmd_restore(&context, backend, &snapshot, yes).await,
        Command::Delete {
            backend,
            snapshot,
            yes,
        } => cmd_delete(&context, backend, &snapshot, yes).await,
        Command::Prune { backend, keep, yes } => cmd_prune(&context, backend, keep, yes).await,
        Command::Connect => cmd_connect(&context).await,
        Command::Disconnect => {
            context.service.sign_out();
            output::success("Disconnected from the cloud service.");
            Ok(())
        }
        Command::Status => {
            cmd_status(&context);
            Ok(())
        }
        Command::Add { title } => {
            let record = context.service.store().add(title).await?;
            output::success(format!("Added `{}`.", record.title));
            Ok(())
        }
        Command::Records => cmd_records(&context).await,
        Command::Version => Ok(()),
    }
}

async fn cmd_save(context: &Context, backend: StorageBackendKind) -> Result<(), CliError> {
    output::info(format!("Saving backup to {backend}..."));
    let id = context.service.save(backend).await?;
    output::success(format!("Backup saved as {id}"));
    Ok(())
}

async fn cmd_list(context: &Context, backend: StorageBackendKind) -> Result<(), CliError> {
    let snapshots = context.service.list(backend).await?;
    if snapshots.is_empty() {
        output::warning(format!("No backups found on {backend}."));
        return Ok(());
    }
    output::section(format!("Backups on {backend}"));
    output::line(format!("{:<36}  {:<20}  {:>10}", "NAME", "CREATED (UTC)", "SIZE"));
    for info in &snapshots {
        output::line(render_row(info));
    }
    Ok(())
}

async fn cmd_restore(
    context: &Context,
    backend: StorageBackendKind,
    snapshot: &str,
    yes: bool,
) -> Result<(), CliError> {
    let prompt = format!(
        "Replace the live database with `{snapshot}` from {backend}? Current data will be overwritten."
    );
    if !confirm(&prompt, yes)? {
        output::info("Restore cancelled.");
        return Ok(());
    }
    context.service.restore(backend, snapshot).await?;
    let count = context.service.store().records().await.len();
    output::success(format!("Restored {snapshot} from {backend} ({count} records)."));
    Ok(())
}

async fn cmd_delete(
    context: &Context,
    backend: StorageBackendKind,
    snapshot: &str,
    yes: bool,
) -> Result<(), CliError> {
    if !confirm(&format!("Delete `{snapshot}` from {backend}?"), yes)? {
        output::info("Delete cancelled.");
        return Ok(());
    }
    context.service.delete(backend, snapshot).await?;
    output::success(format!("Deleted {snapshot}."));
    Ok(())
}

async fn cmd_prune(
    context: &Context,
    backend: StorageBackendKind,
    keep: usize,
    yes: bool,
) -> Result<(), CliError> {
    let prompt = format!("Delete all but the newest {keep} backups on {backend}?");
    if !confirm(&prompt, yes)? {
        output::info("Prune cancelled.");
        return Ok(());
    }
    let removed = context.service.prune(backend, keep).await?;
    if removed.is_empty() {
        output::info("Nothing to prune.");
    } else {
        for name in &removed {
            output::info(format!("Removed {name}"));
        }
        output::success(format!("Pruned {} backups.", removed.len()));
    }
    Ok(())
}

async fn cmd_connect(context: &Context) -> Result<(), CliError> {
    context.service.authorize().await?;
    output::success("Connected to the cloud service.");
    Ok(())
}

fn cmd_status(context: &Context) {
    let config = &context.config;
    let home = &context.home;
    output::section("Backup Core status");
    output::line(format!(
        "  Database     : {}",
        config.resolve_database_path(home).display()
    ));
    output::line(format!(
        "  Local        : {}",
        config.resolve_local_backup_dir(home).display()
    ));
    output::line(format!(
        "  Cloud sync   : {}",
        config.resolve_cloud_sync_dir().display()
    ));
    let state = context.service.current_state();
    let detail = match &state {
        AuthorizationState::Authenticated(token) => format!(
            "{} since {}",
            state.label(),
            token.authorized_at.format("%Y-%m-%d %H:%M UTC")
        ),
        _ => state.label().to_string(),
    };
    output::line(format!("  OAuth cloud  : {detail}"));
    output::line(format!(
        "  Restore      : {}",
        context.service.restore_coordinator().current_stage()
    ));
}

async fn cmd_records(context: &Context) -> Result<(), CliError> {
    let records = context.service.store().records().await;
    if records.is_empty() {
        output::warning("No records.");
        return Ok(());
    }
    for record in records {
        let mark = if record.done { "x" } else { " " };
        output::line(format!("[{mark}] {}", record.title));
    }
    Ok(())
}

fn cmd_version() {
    let meta = build_info::current();
    output::section(format!("Backup Core {}", meta.version));
    output::line(format!("  Snapshot fmt : v{FORMAT_VERSION}"));
    output::line(format!("  Schema ver   : v{CURRENT_SCHEMA_VERSION}"));
    output::line(format!(
        "  Build hash   : {} ({})",
        meta.git_hash, meta.git_status
    ));
    output::line(format!("  Built at     : {}", meta.timestamp));
    output::line(format!("  Target       : {}", meta.target));
    output::line(format!("  Rustc        : {}", meta.rustc));
}

fn confirm(prompt: &str, assume_yes: bool) -> Result<bool, CliError> {
    if assume_yes {
        return Ok(true);
    }
    Ok(Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(false)
        .interact()?)
}

fn render_row(info: &SnapshotInfo) -> String {
    format!(
        "{:<36}  {:<20}  {:>10}",
        info.identifier,
        info.created_at.format("%Y-%m-%d %H:%M:%S"),
        format_size(info.size_bytes)
    )
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_use_binary_units() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024 + 512 * 1024), "5.5 MB");
    }
}

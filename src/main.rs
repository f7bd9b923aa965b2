use std::path::Path;

use taskdesk::config::AppConfig;
use taskdesk::state::AppState;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: taskdesk [export <archive.zip> | import <archive.zip|data.json|store.db>]";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "taskdesk=debug".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::new_from_env();
    let (mut state, stats) = AppState::bootstrap(config).await?;
    if !stats.is_noop() {
        info!(
            "Imported {} projects, {} modules, {} tasks from legacy files",
            stats.projects_imported, stats.modules_imported, stats.tasks_imported
        );
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [cmd, path] if cmd == "export" => {
            let backup = state.backup();
            let summary = backup
                .export_bundle(state.tracker.store(), Path::new(path))
                .await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        [cmd, path] if cmd == "import" => {
            let backup = state.backup();
            let summary = backup
                .import_file(state.tracker.store(), Path::new(path))
                .await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        [] => {
            let projects = state.tracker.list_projects().await?;
            info!("{} projects in store", projects.len());
            for project in projects {
                let pending = state
                    .tracker
                    .store()
                    .get_pending_task_count(&project.id)
                    .await?;
                println!("{}\t{}\t{} pending", project.id, project.name, pending);
            }
        }
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    }

    state.tracker.into_store().close().await?;
    Ok(())
}

//! Schema-apply CLI: connects to each store and runs its idempotent
//! schema, so deploys can migrate ahead of rolling out a new binary.

use clap::Parser;
use gc_infra_db::{StoreRole, TursoClient};
use gc_registry_api::config::Settings;
use tracing::info;

#[derive(Parser, Debug)]
#[command(about = "Apply schema to the registry's write, read, and event stores")]
struct Args {
    /// Only migrate the named store (write, read, event). Default: all three.
    #[arg(long)]
    store: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().init();

    let args = Args::parse();
    let settings = Settings::from_env()?;

    let targets: Vec<&str> = match args.store.as_deref() {
        Some(one) => vec![one],
        None => vec!["write", "read", "event"],
    };

    for target in targets {
        match target {
            "write" => {
                TursoClient::connect(&settings.write_database_url, settings.write_database_token.clone(), StoreRole::Write)
                    .await?;
                info!("write store migrated");
            }
            "read" => {
                TursoClient::connect(&settings.read_database_url, settings.read_database_token.clone(), StoreRole::Read)
                    .await?;
                info!("read store migrated");
            }
            "event" => {
                TursoClient::connect(&settings.event_database_url, settings.event_database_token.clone(), StoreRole::Event)
                    .await?;
                info!("event store migrated");
            }
            other => return Err(anyhow::anyhow!("unknown store target {other}")),
        }
    }

    Ok(())
}

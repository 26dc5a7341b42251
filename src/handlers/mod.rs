//! NATS message handlers

pub mod import;
pub mod ping;

use std::sync::Arc;

use anyhow::Result;
use async_nats::Client;
use tokio::select;
use tracing::{error, info};

use crate::services::directory::DirectoryService;
use crate::services::importer::Importer;
use crate::types::ContactTypeTable;

pub const SUBJECT_PING: &str = "userimport.ping";
pub const SUBJECT_IMPORT: &str = "userimport.import";

/// Start all message handlers
pub async fn start_handlers(
    client: Client,
    directory: Arc<dyn DirectoryService>,
    contact_types: ContactTypeTable,
) -> Result<()> {
    info!("Starting message handlers...");

    let directory_name = directory.name();
    let importer = Arc::new(Importer::new(directory, contact_types));
    info!("Importer initialized with directory: {}", directory_name);

    let ping_sub = client.subscribe(SUBJECT_PING).await?;
    let import_sub = client.subscribe(SUBJECT_IMPORT).await?;

    info!("Subscribed to {}, {}", SUBJECT_PING, SUBJECT_IMPORT);

    let client_ping = client.clone();
    let client_import = client.clone();

    let ping_handle = tokio::spawn(async move {
        ping::handle_ping(client_ping, ping_sub, directory_name).await
    });

    let import_handle = tokio::spawn(async move {
        import::handle_import(client_import, import_sub, importer).await
    });

    info!("All handlers started, waiting for messages...");

    select! {
        result = ping_handle => {
            error!("Ping handler finished: {:?}", result);
        }
        result = import_handle => {
            error!("Import handler finished: {:?}", result);
        }
    }

    Ok(())
}

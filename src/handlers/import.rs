//! Import request handler

use std::sync::Arc;

use anyhow::Result;
use async_nats::{Client, Subscriber};
use futures::StreamExt;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::services::importer::Importer;
use crate::types::{ErrorResponse, ImportRequest, ImportRun, Request, SuccessResponse};

/// Error code replied when the whole run stopped before any record was processed
pub const IMPORT_ABORTED: &str = "IMPORT_ABORTED";

/// Handle userimport.import requests. Each import runs in its own task so a
/// long import does not hold up the next request.
pub async fn handle_import(
    client: Client,
    mut subscriber: Subscriber,
    importer: Arc<Importer>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received import message");

        let reply = match msg.reply {
            Some(ref r) => r.clone(),
            None => {
                error!("Import message without reply subject");
                continue;
            }
        };

        let request: Request<ImportRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse import request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        let client = client.clone();
        let importer = Arc::clone(&importer);
        tokio::spawn(async move {
            info!("Import request {} with {} users", request.id, request.payload.users.len());
            let run = importer.run(request.payload).await;
            match reply_payload(request.id, run) {
                Ok(bytes) => {
                    if let Err(e) = client.publish(reply, bytes.into()).await {
                        error!("Failed to publish import reply for {}: {}", request.id, e);
                    }
                }
                Err(e) => error!("Failed to serialize import reply for {}: {}", request.id, e),
            }
        });
    }

    Ok(())
}

/// Success envelope for a fully reported run, error envelope carrying the
/// report for an aborted one
pub fn reply_payload(request_id: Uuid, run: ImportRun) -> Result<Vec<u8>> {
    if run.aborted {
        let message = run
            .outcome
            .error
            .clone()
            .unwrap_or_else(|| run.outcome.message.clone());
        let details = serde_json::to_value(&run.outcome)?;
        let error = ErrorResponse::new(request_id, IMPORT_ABORTED, message).with_details(details);
        Ok(serde_json::to_vec(&error)?)
    } else {
        Ok(serde_json::to_vec(&SuccessResponse::new(request_id, run.outcome))?)
    }
}

//! Apply an update to a room.

use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;
use sync_client::{ClientConfig, SyncClient, Transport, WebSocketTransport};

use crate::store::{store_path, FileStore};

/// Run the send command.
///
/// The update is persisted locally first, so it survives whether or not the
/// host can be reached.
pub async fn run(
    data_dir: &Path,
    url: &str,
    room: &str,
    payload: &[u8],
    offline: bool,
) -> Result<()> {
    let store = FileStore::open(store_path(data_dir)).await?;
    let client = SyncClient::new(ClientConfig::new(url), store, WebSocketTransport::new());

    let seq = client
        .update(room, payload)
        .await
        .context("Failed to persist update")?;
    println!(
        "Stored update for '{room}' at sequence {seq} ({} bytes)",
        payload.len()
    );

    if offline {
        println!("Offline mode: the update will sync on the next connected run.");
        return Ok(());
    }

    match client.connect().await {
        Ok(()) => {
            println!("Connected to {url}, syncing...");
            wait_for_confirmation(&client, room).await?;
            client.close().await;
        }
        Err(e) => {
            println!("Could not reach {url}: {e}");
            println!("The update is durable and will sync when a host is reachable.");
        }
    }

    Ok(())
}

/// Wait (bounded) for the host's confirmed offset to cover everything we
/// have queued for the room.
async fn wait_for_confirmation<T: Transport + 'static>(
    client: &SyncClient<T>,
    room: &str,
) -> Result<()> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while tokio::time::Instant::now() < deadline {
        if !client.is_connected() {
            println!("Connection lost before the host confirmed; will retry next run.");
            return Ok(());
        }
        let meta = client.room_meta(room).await?;
        if meta.confirmed >= meta.seq {
            println!("Host confirmed through offset {}.", meta.confirmed);
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    println!("Host did not confirm in time; the update stays queued.");
    Ok(())
}

//! Follow a room's events live.

use anyhow::Result;
use std::path::Path;
use sync_client::{ClientConfig, RoomEvent, SyncClient, WebSocketTransport};

use crate::store::{store_path, FileStore};

/// Run the watch command. Streams room events until Ctrl-C.
pub async fn run(data_dir: &Path, url: &str, room: &str) -> Result<()> {
    let store = FileStore::open(store_path(data_dir)).await?;
    let client = SyncClient::new(ClientConfig::new(url), store, WebSocketTransport::new());

    let mut sub = client.subscribe(room).await?;
    println!("Watching '{room}' ({} bytes locally)", sub.data().len());

    if let Err(e) = client.connect().await {
        println!("Offline ({e}); showing local activity only.");
    }

    loop {
        tokio::select! {
            event = sub.recv() => match event {
                Some(RoomEvent::Update(payload)) => {
                    println!("update  {:>6} bytes  {}", payload.len(), preview(&payload));
                }
                Some(RoomEvent::Reset(data)) => {
                    println!("reset   room is now {} bytes", data.len());
                }
                Some(RoomEvent::Lagged(missed)) => {
                    println!("lagged  missed {missed} events, re-reading room");
                    let data = client.room_data(room).await?;
                    println!("reset   room is now {} bytes", data.len());
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    client.close().await;
    Ok(())
}

/// Render a payload for terminal output, falling back to hex for binary.
fn preview(payload: &[u8]) -> String {
    const MAX_CHARS: usize = 64;
    match std::str::from_utf8(payload) {
        Ok(text) if !text.chars().any(char::is_control) => {
            if text.chars().count() > MAX_CHARS {
                let head: String = text.chars().take(MAX_CHARS).collect();
                format!("{head}...")
            } else {
                text.to_string()
            }
        }
        _ => format!("0x{}", hex::encode(&payload[..payload.len().min(16)])),
    }
}

//! Show per-room sync state.

use anyhow::Result;
use std::path::Path;
use sync_client::RoomTxn;

use crate::store::{store_path, FileStore};

/// Run the status command.
pub async fn run(data_dir: &Path) -> Result<()> {
    let store = FileStore::open(store_path(data_dir)).await?;
    let mut txn = RoomTxn::begin(&store).await?;

    let rooms = txn.rooms().await?;
    if rooms.is_empty() {
        println!("No rooms yet.");
        println!();
        println!("Run 'roomsync send <room> <message>' to create one.");
        return Ok(());
    }

    println!("=== roomsync status ===");
    println!();

    for room in rooms {
        let meta = txn.room_meta(&room).await?;
        let pending = txn.pending_updates(&room).await?;
        let data = txn.room_data(&room).await?;

        println!("{room}:");
        println!("  data:      {} bytes", data.len());
        println!("  confirmed: offset {}", meta.confirmed);
        match meta.epoch {
            Some(epoch) => println!("  epoch:     {epoch}"),
            None => println!("  epoch:     never subscribed"),
        }
        if pending.is_empty() {
            println!("  queued:    none");
        } else {
            println!("  queued:    {} update(s) awaiting confirmation", pending.len());
        }
        println!();
    }

    Ok(())
}

//! List locally known rooms.

use anyhow::Result;
use std::path::Path;
use sync_client::RoomTxn;

use crate::store::{store_path, FileStore};

/// Run the rooms command.
pub async fn run(data_dir: &Path) -> Result<()> {
    let store = FileStore::open(store_path(data_dir)).await?;
    let mut txn = RoomTxn::begin(&store).await?;

    let rooms = txn.rooms().await?;
    if rooms.is_empty() {
        println!("No rooms yet. Run 'roomsync send <room> <message>' to create one.");
        return Ok(());
    }

    for room in rooms {
        println!("{room}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn rooms_without_store_succeeds() {
        let dir = tempdir().unwrap();
        run(dir.path()).await.unwrap();
    }

    #[tokio::test]
    async fn rooms_after_send_succeeds() {
        let dir = tempdir().unwrap();
        crate::commands::send::run(dir.path(), "ws://unused", "notes", b"hi", true)
            .await
            .unwrap();

        run(dir.path()).await.unwrap();
    }
}

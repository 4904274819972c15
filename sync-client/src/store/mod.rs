//! Durable room storage.
//!
//! Everything the client must not lose across restarts lives here: room
//! metadata (epoch, confirmed offset, sequence counter), the host snapshot,
//! host updates that arrived but are not yet confirmed, and locally produced
//! updates awaiting host confirmation.
//!
//! The layer is split in two. [`StoreBackend`] and [`StoreTxn`] form a
//! minimal ordered key-value transaction interface that backends implement
//! ([`MemoryStore`] here, a file-backed store in the CLI). [`RoomTxn`] sits
//! on top and maps room operations onto keys, so every backend gets
//! identical record layouts. One transaction covers one inbound frame or
//! one local mutation; dropping it without commit discards all staged
//! writes.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sync_core::pending::PendingUpdate;
use sync_wire::{Offset, Reader, RoomEpoch, RoomName, Writer};

/// Storage layer errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted record does not parse.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// Room metadata failed to serialize.
    #[error("metadata encoding failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// Room metadata failed to deserialize.
    #[error("metadata decoding failed: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// One writer transaction over the backing key-value store.
///
/// Writes are staged and become visible to other transactions only at
/// [`commit`](StoreTxn::commit); reads observe the transaction's own staged
/// writes. Dropping the transaction without committing rolls it back.
#[async_trait]
pub trait StoreTxn: Send {
    /// Read the value at `key`.
    async fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Stage a write of `value` at `key`.
    fn put(&mut self, key: Vec<u8>, value: Vec<u8>);

    /// Stage a delete of `key`.
    fn delete(&mut self, key: Vec<u8>);

    /// Read every live pair whose key starts with `prefix`, in key order.
    async fn scan(&mut self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError>;

    /// Atomically apply all staged writes.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// A transactional key-value store with single-writer semantics.
///
/// `begin` returns only once no other transaction is open, so concurrent
/// writers serialize through the store rather than through shared memory.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Open a transaction, waiting for any current writer to finish.
    async fn begin(&self) -> Result<Box<dyn StoreTxn>, StoreError>;
}

/// Per-room durable metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoomMeta {
    /// Host incarnation of the room from the last subscription confirmation.
    pub epoch: Option<RoomEpoch>,
    /// Highest host offset confirmed durably applied.
    pub confirmed: Offset,
    /// Last locally allocated client sequence number.
    pub seq: Offset,
}

// Record key layout: a one-byte table tag, the varint-length-prefixed room
// name, and for per-offset records the offset as 8 big-endian bytes so key
// order is offset order. The length prefix keeps one room's records from
// matching another room's prefix.
const TABLE_META: u8 = 0x01;
const TABLE_SNAPSHOT: u8 = 0x02;
const TABLE_HOST: u8 = 0x03;
const TABLE_PENDING: u8 = 0x04;

fn room_key(table: u8, room: &RoomName) -> Vec<u8> {
    let mut writer = Writer::with_capacity(2 + room.len());
    writer.put_u8(table);
    writer.put_string(room.as_str());
    writer.into_bytes()
}

fn offset_key(table: u8, room: &RoomName, offset: Offset) -> Vec<u8> {
    let mut key = room_key(table, room);
    key.extend_from_slice(&offset.value().to_be_bytes());
    key
}

fn offset_from_key(key: &[u8]) -> Result<Offset, StoreError> {
    let suffix: [u8; 8] = key[key.len().saturating_sub(8)..]
        .try_into()
        .map_err(|_| StoreError::Corrupt(format!("offset key too short: {} bytes", key.len())))?;
    Ok(Offset::new(u64::from_be_bytes(suffix)))
}

fn room_from_key(key: &[u8]) -> Result<RoomName, StoreError> {
    let mut reader = Reader::new(key);
    reader
        .get_u8()
        .and_then(|_| reader.get_string())
        .map(RoomName::from)
        .map_err(|e| StoreError::Corrupt(format!("bad room key: {e}")))
}

/// Typed room operations over one open [`StoreTxn`].
///
/// One `RoomTxn` spans one unit of atomicity: all records touched while
/// handling a single inbound frame, or a single local mutation, commit
/// together or not at all.
pub struct RoomTxn {
    txn: Box<dyn StoreTxn>,
}

impl RoomTxn {
    /// Open a transaction on `store`.
    pub async fn begin(store: &dyn StoreBackend) -> Result<Self, StoreError> {
        Ok(Self {
            txn: store.begin().await?,
        })
    }

    /// Commit every staged write.
    pub async fn commit(self) -> Result<(), StoreError> {
        self.txn.commit().await
    }

    /// Read a room's metadata, defaulting for rooms never seen.
    pub async fn room_meta(&mut self, room: &RoomName) -> Result<RoomMeta, StoreError> {
        match self.txn.get(&room_key(TABLE_META, room)).await? {
            Some(bytes) => Ok(rmp_serde::from_slice(&bytes)?),
            None => Ok(RoomMeta::default()),
        }
    }

    fn put_meta(&mut self, room: &RoomName, meta: &RoomMeta) -> Result<(), StoreError> {
        let bytes = rmp_serde::to_vec(meta)?;
        self.txn.put(room_key(TABLE_META, room), bytes);
        Ok(())
    }

    /// Persist a locally produced update and allocate its sequence number.
    ///
    /// The sequence is taken past both the previous allocation and the
    /// confirmed host offset: host offsets and client sequences share one
    /// number line, so a cumulative confirmation can always reach it.
    pub async fn write_client_unconfirmed(
        &mut self,
        room: &RoomName,
        payload: &[u8],
    ) -> Result<Offset, StoreError> {
        let mut meta = self.room_meta(room).await?;
        let seq = meta.seq.max(meta.confirmed).next();
        meta.seq = seq;
        self.txn
            .put(offset_key(TABLE_PENDING, room, seq), payload.to_vec());
        self.put_meta(room, &meta)?;
        Ok(seq)
    }

    /// Persist an update received from the host at `offset`.
    ///
    /// Does not advance the confirmed offset; only an explicit confirmation
    /// does that.
    pub async fn write_host_unconfirmed(
        &mut self,
        room: &RoomName,
        offset: Offset,
        payload: &[u8],
    ) -> Result<(), StoreError> {
        let meta = self.room_meta(room).await?;
        self.txn
            .put(offset_key(TABLE_HOST, room, offset), payload.to_vec());
        self.put_meta(room, &meta)?;
        Ok(())
    }

    /// Record a subscription confirmation.
    ///
    /// Same epoch: buffered host updates and the carried payload are folded
    /// into the snapshot, which afterwards covers everything up to `offset`.
    /// New epoch: the payload replaces all host-derived data and `offset`
    /// becomes the confirmed offset even when it regresses. Unconfirmed
    /// client updates survive either way.
    pub async fn confirm_subscription(
        &mut self,
        room: &RoomName,
        epoch: RoomEpoch,
        offset: Offset,
        payload: &[u8],
    ) -> Result<(), StoreError> {
        let mut meta = self.room_meta(room).await?;
        let host_records = self.txn.scan(&room_key(TABLE_HOST, room)).await?;

        let snapshot = if meta.epoch == Some(epoch) {
            let mut snapshot = self
                .txn
                .get(&room_key(TABLE_SNAPSHOT, room))
                .await?
                .unwrap_or_default();
            for (_, value) in &host_records {
                snapshot.extend_from_slice(value);
            }
            snapshot.extend_from_slice(payload);
            meta.confirmed = meta.confirmed.max(offset);
            snapshot
        } else {
            meta.epoch = Some(epoch);
            meta.confirmed = offset;
            payload.to_vec()
        };

        for (key, _) in host_records {
            self.txn.delete(key);
        }
        self.txn.put(room_key(TABLE_SNAPSHOT, room), snapshot);
        self.put_meta(room, &meta)?;
        Ok(())
    }

    /// Advance the confirmed host offset and fold covered records into the
    /// snapshot.
    ///
    /// Confirmations are cumulative: every buffered host update and every
    /// unconfirmed client update at or below `offset` leaves its queue and
    /// joins the snapshot in offset order, host entry before client entry
    /// where both carry the same offset. The host never replays a client's
    /// own confirmed updates; the snapshot is where their bytes survive.
    /// A stale offset is a no-op.
    pub async fn write_confirmed_by_host(
        &mut self,
        room: &RoomName,
        offset: Offset,
    ) -> Result<(), StoreError> {
        let mut meta = self.room_meta(room).await?;
        if offset <= meta.confirmed {
            return Ok(());
        }
        meta.confirmed = offset;

        let mut covered: Vec<(Offset, Vec<u8>)> = Vec::new();
        for table in [TABLE_HOST, TABLE_PENDING] {
            for (key, value) in self.txn.scan(&room_key(table, room)).await? {
                let at = offset_from_key(&key)?;
                if at > offset {
                    break;
                }
                covered.push((at, value));
                self.txn.delete(key);
            }
        }
        if !covered.is_empty() {
            // Stable sort: host entries were pushed first and stay first
            // at equal offsets.
            covered.sort_by_key(|(at, _)| *at);
            let mut snapshot = self
                .txn
                .get(&room_key(TABLE_SNAPSHOT, room))
                .await?
                .unwrap_or_default();
            for (_, value) in covered {
                snapshot.extend_from_slice(&value);
            }
            self.txn.put(room_key(TABLE_SNAPSHOT, room), snapshot);
        }
        self.put_meta(room, &meta)?;
        Ok(())
    }

    /// Assemble the full locally known room data: snapshot, then host
    /// updates, then unconfirmed client updates, each in offset order.
    pub async fn room_data(&mut self, room: &RoomName) -> Result<Vec<u8>, StoreError> {
        let mut data = self
            .txn
            .get(&room_key(TABLE_SNAPSHOT, room))
            .await?
            .unwrap_or_default();
        for (_, value) in self.txn.scan(&room_key(TABLE_HOST, room)).await? {
            data.extend_from_slice(&value);
        }
        for (_, value) in self.txn.scan(&room_key(TABLE_PENDING, room)).await? {
            data.extend_from_slice(&value);
        }
        Ok(data)
    }

    /// All unconfirmed client updates for a room, in sequence order.
    pub async fn pending_updates(
        &mut self,
        room: &RoomName,
    ) -> Result<Vec<PendingUpdate>, StoreError> {
        let mut updates = Vec::new();
        for (key, value) in self.txn.scan(&room_key(TABLE_PENDING, room)).await? {
            updates.push(PendingUpdate::new(offset_from_key(&key)?, value));
        }
        Ok(updates)
    }

    /// Every room the store has metadata for.
    pub async fn rooms(&mut self) -> Result<Vec<RoomName>, StoreError> {
        let mut rooms = Vec::new();
        for (key, _) in self.txn.scan(&[TABLE_META]).await? {
            rooms.push(room_from_key(&key)?);
        }
        Ok(rooms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(name: &str) -> RoomName {
        RoomName::from(name)
    }

    async fn txn(store: &MemoryStore) -> RoomTxn {
        RoomTxn::begin(store).await.unwrap()
    }

    // ===========================================
    // Sequence Allocation Tests
    // ===========================================

    #[tokio::test]
    async fn sequences_start_at_one_and_increase() {
        let store = MemoryStore::new();
        let mut t = txn(&store).await;

        let s1 = t.write_client_unconfirmed(&room("doc1"), b"a").await.unwrap();
        let s2 = t.write_client_unconfirmed(&room("doc1"), b"b").await.unwrap();
        t.commit().await.unwrap();

        assert_eq!(s1, Offset::new(1));
        assert_eq!(s2, Offset::new(2));

        // Counter survives the transaction boundary.
        let mut t = txn(&store).await;
        let s3 = t.write_client_unconfirmed(&room("doc1"), b"c").await.unwrap();
        assert_eq!(s3, Offset::new(3));
    }

    #[tokio::test]
    async fn sequences_jump_past_confirmed_offset() {
        let store = MemoryStore::new();
        let mut t = txn(&store).await;

        // Other clients advanced the host to offset 50 before our first write.
        t.confirm_subscription(&room("doc1"), RoomEpoch::new(1), Offset::new(50), b"data")
            .await
            .unwrap();
        let seq = t.write_client_unconfirmed(&room("doc1"), b"x").await.unwrap();

        assert_eq!(seq, Offset::new(51));
    }

    #[tokio::test]
    async fn sequences_are_per_room() {
        let store = MemoryStore::new();
        let mut t = txn(&store).await;

        let a = t.write_client_unconfirmed(&room("a"), b"1").await.unwrap();
        let b = t.write_client_unconfirmed(&room("b"), b"1").await.unwrap();

        assert_eq!(a, Offset::new(1));
        assert_eq!(b, Offset::new(1));
    }

    // ===========================================
    // Confirmation Tests
    // ===========================================

    #[tokio::test]
    async fn confirmation_prunes_covered_updates_cumulatively() {
        let store = MemoryStore::new();
        let mut t = txn(&store).await;
        for payload in [b"1", b"2", b"3", b"4"] {
            t.write_client_unconfirmed(&room("doc1"), payload).await.unwrap();
        }
        t.commit().await.unwrap();

        let mut t = txn(&store).await;
        t.write_confirmed_by_host(&room("doc1"), Offset::new(2))
            .await
            .unwrap();
        t.commit().await.unwrap();

        let mut t = txn(&store).await;
        let pending = t.pending_updates(&room("doc1")).await.unwrap();
        let seqs: Vec<u64> = pending.iter().map(|p| p.seq.value()).collect();
        assert_eq!(seqs, vec![3, 4]);
        assert_eq!(
            t.room_meta(&room("doc1")).await.unwrap().confirmed,
            Offset::new(2)
        );
        // The confirmed bytes moved to the snapshot; nothing is lost.
        assert_eq!(t.room_data(&room("doc1")).await.unwrap(), b"1234");
    }

    #[tokio::test]
    async fn confirmation_folds_host_and_client_records_in_offset_order() {
        let store = MemoryStore::new();
        let mut t = txn(&store).await;
        t.confirm_subscription(&room("doc1"), RoomEpoch::new(1), Offset::new(1), b"s")
            .await
            .unwrap();
        let seq = t.write_client_unconfirmed(&room("doc1"), b"c2").await.unwrap();
        assert_eq!(seq, Offset::new(2));
        t.write_host_unconfirmed(&room("doc1"), Offset::new(3), b"h3")
            .await
            .unwrap();
        t.write_host_unconfirmed(&room("doc1"), Offset::new(9), b"h9")
            .await
            .unwrap();
        t.commit().await.unwrap();

        let mut t = txn(&store).await;
        t.write_confirmed_by_host(&room("doc1"), Offset::new(3))
            .await
            .unwrap();
        t.commit().await.unwrap();

        // Records through offset 3 merged into the snapshot; the host
        // update at 9 stays buffered past it.
        let mut t = txn(&store).await;
        assert_eq!(t.room_data(&room("doc1")).await.unwrap(), b"sc2h3h9");
        assert!(t.pending_updates(&room("doc1")).await.unwrap().is_empty());

        t.write_confirmed_by_host(&room("doc1"), Offset::new(9))
            .await
            .unwrap();
        assert_eq!(t.room_data(&room("doc1")).await.unwrap(), b"sc2h3h9");
        assert_eq!(
            t.room_meta(&room("doc1")).await.unwrap().confirmed,
            Offset::new(9)
        );
    }

    #[tokio::test]
    async fn stale_confirmation_is_a_no_op() {
        let store = MemoryStore::new();
        let mut t = txn(&store).await;
        t.write_client_unconfirmed(&room("doc1"), b"1").await.unwrap();
        t.write_confirmed_by_host(&room("doc1"), Offset::new(1))
            .await
            .unwrap();
        t.commit().await.unwrap();

        let mut t = txn(&store).await;
        t.write_confirmed_by_host(&room("doc1"), Offset::new(1))
            .await
            .unwrap();
        t.write_confirmed_by_host(&room("doc1"), Offset::zero())
            .await
            .unwrap();
        t.commit().await.unwrap();

        let mut t = txn(&store).await;
        let meta = t.room_meta(&room("doc1")).await.unwrap();
        assert_eq!(meta.confirmed, Offset::new(1));
    }

    #[tokio::test]
    async fn confirmation_for_unknown_room_records_offset() {
        let store = MemoryStore::new();
        let mut t = txn(&store).await;
        t.write_confirmed_by_host(&room("fresh"), Offset::new(4))
            .await
            .unwrap();
        t.commit().await.unwrap();

        let mut t = txn(&store).await;
        let meta = t.room_meta(&room("fresh")).await.unwrap();
        assert_eq!(meta.confirmed, Offset::new(4));
        assert!(t.rooms().await.unwrap().contains(&room("fresh")));
    }

    // ===========================================
    // Subscription Confirmation Tests
    // ===========================================

    #[tokio::test]
    async fn fresh_subscription_stores_snapshot() {
        let store = MemoryStore::new();
        let mut t = txn(&store).await;
        t.confirm_subscription(&room("doc1"), RoomEpoch::new(7), Offset::new(3), b"base")
            .await
            .unwrap();
        t.commit().await.unwrap();

        let mut t = txn(&store).await;
        assert_eq!(t.room_data(&room("doc1")).await.unwrap(), b"base");
        let meta = t.room_meta(&room("doc1")).await.unwrap();
        assert_eq!(meta.epoch, Some(RoomEpoch::new(7)));
        assert_eq!(meta.confirmed, Offset::new(3));
    }

    #[tokio::test]
    async fn resumed_subscription_folds_host_updates_into_snapshot() {
        let store = MemoryStore::new();

        let mut t = txn(&store).await;
        t.confirm_subscription(&room("doc1"), RoomEpoch::new(1), Offset::new(2), b"aa")
            .await
            .unwrap();
        t.write_host_unconfirmed(&room("doc1"), Offset::new(3), b"bb")
            .await
            .unwrap();
        t.commit().await.unwrap();

        // Reconnect with the same epoch carries the bytes past our resume
        // point; buffered host updates collapse into the snapshot.
        let mut t = txn(&store).await;
        t.confirm_subscription(&room("doc1"), RoomEpoch::new(1), Offset::new(4), b"cc")
            .await
            .unwrap();
        t.commit().await.unwrap();

        let mut t = txn(&store).await;
        assert_eq!(t.room_data(&room("doc1")).await.unwrap(), b"aabbcc");
        let meta = t.room_meta(&room("doc1")).await.unwrap();
        assert_eq!(meta.confirmed, Offset::new(4));
    }

    #[tokio::test]
    async fn epoch_change_replaces_host_data_and_keeps_pending() {
        let store = MemoryStore::new();

        let mut t = txn(&store).await;
        t.confirm_subscription(&room("doc1"), RoomEpoch::new(1), Offset::new(9), b"old")
            .await
            .unwrap();
        t.write_host_unconfirmed(&room("doc1"), Offset::new(10), b"old2")
            .await
            .unwrap();
        let seq = t.write_client_unconfirmed(&room("doc1"), b"mine").await.unwrap();
        t.commit().await.unwrap();

        let mut t = txn(&store).await;
        t.confirm_subscription(&room("doc1"), RoomEpoch::new(2), Offset::new(1), b"new")
            .await
            .unwrap();
        t.commit().await.unwrap();

        let mut t = txn(&store).await;
        // Host data replaced, local unconfirmed update still layered on top.
        assert_eq!(t.room_data(&room("doc1")).await.unwrap(), b"newmine");
        let meta = t.room_meta(&room("doc1")).await.unwrap();
        assert_eq!(meta.epoch, Some(RoomEpoch::new(2)));
        assert_eq!(meta.confirmed, Offset::new(1));
        let pending = t.pending_updates(&room("doc1")).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].seq, seq);
    }

    #[tokio::test]
    async fn same_frame_host_update_folds_on_confirmation() {
        // An Update and a SubscriptionConfirmation can share one frame and
        // therefore one transaction; the fold must see the staged record.
        let store = MemoryStore::new();
        let mut t = txn(&store).await;
        t.confirm_subscription(&room("doc1"), RoomEpoch::new(1), Offset::new(1), b"a")
            .await
            .unwrap();
        t.write_host_unconfirmed(&room("doc1"), Offset::new(2), b"b")
            .await
            .unwrap();
        t.confirm_subscription(&room("doc1"), RoomEpoch::new(1), Offset::new(2), b"")
            .await
            .unwrap();
        t.commit().await.unwrap();

        let mut t = txn(&store).await;
        assert_eq!(t.room_data(&room("doc1")).await.unwrap(), b"ab");
    }

    // ===========================================
    // Room Data Assembly Tests
    // ===========================================

    #[tokio::test]
    async fn room_data_layers_snapshot_host_then_pending() {
        let store = MemoryStore::new();
        let mut t = txn(&store).await;
        t.confirm_subscription(&room("doc1"), RoomEpoch::new(1), Offset::new(1), b"snap-")
            .await
            .unwrap();
        t.write_host_unconfirmed(&room("doc1"), Offset::new(2), b"host-")
            .await
            .unwrap();
        t.write_client_unconfirmed(&room("doc1"), b"mine").await.unwrap();

        assert_eq!(t.room_data(&room("doc1")).await.unwrap(), b"snap-host-mine");
    }

    #[tokio::test]
    async fn room_data_for_unknown_room_is_empty() {
        let store = MemoryStore::new();
        let mut t = txn(&store).await;
        assert!(t.room_data(&room("nope")).await.unwrap().is_empty());
    }

    // ===========================================
    // Durability Scope Tests
    // ===========================================

    #[tokio::test]
    async fn dropped_transaction_discards_writes() {
        let store = MemoryStore::new();
        let mut t = txn(&store).await;
        t.write_client_unconfirmed(&room("doc1"), b"x").await.unwrap();
        drop(t);

        let mut t = txn(&store).await;
        assert!(t.rooms().await.unwrap().is_empty());
        assert!(t.pending_updates(&room("doc1")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rooms_lists_every_room_with_metadata() {
        let store = MemoryStore::new();
        let mut t = txn(&store).await;
        t.write_client_unconfirmed(&room("b"), b"1").await.unwrap();
        t.write_host_unconfirmed(&room("a"), Offset::new(1), b"1")
            .await
            .unwrap();
        t.commit().await.unwrap();

        let mut t = txn(&store).await;
        assert_eq!(t.rooms().await.unwrap(), vec![room("a"), room("b")]);
    }

    #[tokio::test]
    async fn rooms_with_shared_name_prefix_stay_separate() {
        let store = MemoryStore::new();
        let mut t = txn(&store).await;
        t.write_client_unconfirmed(&room("doc"), b"short").await.unwrap();
        t.write_client_unconfirmed(&room("doc1"), b"long").await.unwrap();

        assert_eq!(t.room_data(&room("doc")).await.unwrap(), b"short");
        assert_eq!(t.room_data(&room("doc1")).await.unwrap(), b"long");
    }
}

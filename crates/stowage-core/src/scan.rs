use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

use stowage_types::blob::BlobHandle;
use stowage_types::error::{Result, StowageError};
use stowage_types::pack_id::PackId;

use crate::repo::pack::{read_pack_manifest, ManifestEntry};
use crate::storage::StorageBackend;

/// Counters accumulated while the inventory is built.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScanStats {
    pub packs_scanned: u64,
    pub packs_unreadable: u64,
    pub blobs_seen: u64,
    /// Distinct blob handles stored in more than one place.
    pub duplicate_blobs: u64,
    /// Bytes occupied by the redundant copies (all copies past the first).
    pub duplicate_bytes: u64,
}

/// Everything the scan learned about the repository's packs: each readable
/// pack's manifest, plus a global occurrence counter per blob handle.
///
/// Built once per prune run and discarded afterwards. Packs whose manifest
/// could not be read are absent; their blobs are invisible to all
/// downstream decisions.
#[derive(Debug, Default)]
pub struct Inventory {
    packs: HashMap<PackId, Vec<ManifestEntry>>,
    occurrences: HashMap<BlobHandle, u32>,
}

impl Inventory {
    /// Fold one pack's manifest into the inventory.
    fn record(&mut self, pack_id: PackId, entries: Vec<ManifestEntry>, stats: &mut ScanStats) {
        for entry in &entries {
            stats.blobs_seen += 1;
            let count = self.occurrences.entry(entry.handle).or_insert(0);
            *count += 1;
            if *count == 2 {
                stats.duplicate_blobs += 1;
            }
            if *count >= 2 {
                stats.duplicate_bytes += entry.length as u64;
            }
        }
        self.packs.insert(pack_id, entries);
    }

    /// Whether any readable pack contains this handle.
    pub fn contains(&self, handle: &BlobHandle) -> bool {
        self.occurrences.contains_key(handle)
    }

    /// How many packs contain this handle.
    pub fn occurrences(&self, handle: &BlobHandle) -> u32 {
        self.occurrences.get(handle).copied().unwrap_or(0)
    }

    pub fn manifest(&self, pack_id: &PackId) -> Option<&[ManifestEntry]> {
        self.packs.get(pack_id).map(Vec::as_slice)
    }

    pub fn packs(&self) -> impl Iterator<Item = (&PackId, &[ManifestEntry])> {
        self.packs.iter().map(|(id, entries)| (id, entries.as_slice()))
    }

    pub fn pack_count(&self) -> usize {
        self.packs.len()
    }

    /// Handles stored in more than one pack, with their occurrence counts.
    pub fn duplicates(&self) -> impl Iterator<Item = (&BlobHandle, u32)> {
        self.occurrences
            .iter()
            .filter(|(_, &n)| n > 1)
            .map(|(h, &n)| (h, n))
    }
}

/// One result record per submitted pack.
enum ScanMessage {
    Ok(PackId, Vec<ManifestEntry>),
    Failed(PackId, StowageError),
}

/// Read every pack's manifest through a bounded worker pool and build the
/// inventory.
///
/// Guarantees: every submitted pack yields exactly one result; results may
/// arrive in any order; one pack's read failure never stops the pool (it is
/// logged, counted, and the pack is excluded from the inventory); setting
/// the shutdown flag makes workers stop picking up jobs and the call return
/// `Err(Interrupted)` once in-flight results have drained.
pub fn scan_packs(
    storage: &dyn StorageBackend,
    pack_ids: &[PackId],
    workers: usize,
    shutdown: Option<&AtomicBool>,
) -> Result<(Inventory, ScanStats)> {
    let workers = workers.max(1);
    let mut inventory = Inventory::default();
    let mut stats = ScanStats::default();

    std::thread::scope(|s| -> Result<()> {
        let (work_tx, work_rx) = crossbeam_channel::bounded::<PackId>(workers * 2);
        let (result_tx, result_rx) = crossbeam_channel::bounded::<ScanMessage>(workers * 2);

        // Feeder: pack listing is already in memory, so this thread exists
        // only to keep the bounded channel topped up while the consumer
        // below folds results.
        s.spawn(move || {
            for pack_id in pack_ids {
                if shutdown.is_some_and(|f| f.load(Ordering::Relaxed)) {
                    return;
                }
                if work_tx.send(*pack_id).is_err() {
                    return;
                }
            }
            // work_tx drops here; workers drain the queue and exit.
        });

        for _ in 0..workers {
            let rx = work_rx.clone();
            let tx = result_tx.clone();
            s.spawn(move || {
                for pack_id in rx {
                    if shutdown.is_some_and(|f| f.load(Ordering::Relaxed)) {
                        return;
                    }
                    let msg = match read_pack_manifest(storage, &pack_id) {
                        Ok(entries) => ScanMessage::Ok(pack_id, entries),
                        Err(e) => ScanMessage::Failed(pack_id, e),
                    };
                    if tx.send(msg).is_err() {
                        return; // Consumer gone.
                    }
                }
            });
        }
        // Drop originals so the channels close when all clones drop.
        drop(work_rx);
        drop(result_tx);

        // Consumer: the single mutation point for inventory and counters.
        for msg in result_rx {
            match msg {
                ScanMessage::Ok(pack_id, entries) => {
                    inventory.record(pack_id, entries, &mut stats);
                    stats.packs_scanned += 1;
                }
                ScanMessage::Failed(pack_id, err) => {
                    warn!(pack = %pack_id, error = %err,
                        "unable to read pack manifest, excluding pack from this run");
                    stats.packs_unreadable += 1;
                }
            }
        }

        if shutdown.is_some_and(|f| f.load(Ordering::Relaxed)) {
            return Err(StowageError::Interrupted);
        }
        Ok(())
    })?;

    Ok((inventory, stats))
}

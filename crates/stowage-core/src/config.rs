/// Tunables for a prune/repack run.
#[derive(Debug, Clone)]
pub struct PruneOptions {
    /// Worker threads for the pack scan. `0` means pick a default from the
    /// machine's parallelism.
    pub workers: usize,
    /// Plan and report only; write and delete nothing.
    pub dry_run: bool,
}

impl Default for PruneOptions {
    fn default() -> Self {
        Self {
            workers: 0,
            dry_run: false,
        }
    }
}

/// Default scan worker count.
///
/// Manifest reads are I/O bound; past a handful of workers the backend is
/// the bottleneck, so the default is capped.
pub fn default_scan_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .min(8)
}

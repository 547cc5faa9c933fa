//! Aggregation of manual and fetched keys
//!
//! Produces the final desired key list for one job. Manual keys come
//! first, fetched keys follow in source-declaration order. Duplicates are
//! kept; the writer is idempotent, so installing the same key twice is
//! harmless and the list faithfully reflects what was declared.

use common::ssh::is_valid_key_line;
use tracing::warn;

/// Merge manually declared keys with fetched ones.
///
/// With `validate` set, manual entries that are blank or fail the key
/// grammar are dropped with a warning; fetched keys were already validated
/// at parse time. An empty result means the job has nothing to reconcile
/// and is skipped upstream.
pub fn aggregate(manual_keys: &[String], fetched_keys: Vec<String>, validate: bool) -> Vec<String> {
    let mut keys: Vec<String> = Vec::with_capacity(manual_keys.len() + fetched_keys.len());

    for (position, key) in manual_keys.iter().enumerate() {
        if !validate {
            keys.push(key.clone());
            continue;
        }
        let trimmed = key.trim();
        if trimmed.is_empty() {
            warn!("Skipping empty manual key at position {position}");
            continue;
        }
        if !is_valid_key_line(trimmed) {
            warn!("Skipping invalid manual key at position {position}");
            continue;
        }
        keys.push(trimmed.to_string());
    }

    keys.extend(fetched_keys);
    keys
}

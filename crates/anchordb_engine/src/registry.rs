//! Process-wide registry of open stores.
//!
//! Every session opened on the same identity shares one [`Store`], so
//! they observe the same published snapshots and contend for the same
//! writer gate. The registry holds weak references; a store closes when
//! its last session is dropped.

use crate::error::{EngineError, EngineResult};
use crate::store::{key_fingerprint, Identity, Store, StoreOptions};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, Weak};
use tracing::trace;

fn registry() -> &'static Mutex<HashMap<Identity, Weak<Store>>> {
    static STORES: OnceLock<Mutex<HashMap<Identity, Weak<Store>>>> = OnceLock::new();
    STORES.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Returns the open store for `identity`, opening it if needed.
///
/// # Errors
///
/// Returns [`EngineError::FileAccess`] if the store is already open with
/// a different sealing key, or if the journal cannot be opened.
pub fn open_store(identity: &Identity, options: &StoreOptions) -> EngineResult<Arc<Store>> {
    let mut stores = registry().lock();
    stores.retain(|_, store| store.strong_count() > 0);

    if let Some(store) = stores.get(identity).and_then(Weak::upgrade) {
        if store.key_fingerprint() != key_fingerprint(options.sealing_key.as_ref()) {
            return Err(EngineError::file_access(
                identity,
                "already open with a different encryption key",
            ));
        }
        trace!(identity = %identity, "reusing open store");
        return Ok(store);
    }

    let store = Arc::new(Store::open(identity.clone(), options)?);
    stores.insert(identity.clone(), Arc::downgrade(&store));
    Ok(store)
}

/// Returns true if some session currently holds `identity` open.
#[must_use]
pub fn is_open(identity: &Identity) -> bool {
    registry()
        .lock()
        .get(identity)
        .is_some_and(|store| store.strong_count() > 0)
}

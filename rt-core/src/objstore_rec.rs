//! spec.md §3 "Object-store record".

use crate::ids::ObjStoreId;

#[derive(Debug, Clone)]
pub struct ObjStoreRecord {
    pub objstore_id: ObjStoreId,
    pub objstore_address: String,
}

mod batch_tombstone_reuse;
mod insert_remove;
mod properties;

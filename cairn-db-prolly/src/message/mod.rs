//! Node wire formats: leaf blobs and interior address maps.

pub mod address_map;
pub mod blob;

pub use address_map::AddressMapSerializer;
pub use blob::BlobSerializer;

/// Magic/version byte for leaf blob nodes.
pub const BLOB_MAGIC: u8 = 0xCB;

/// Magic/version byte for interior address-map nodes.
pub const ADDRESS_MAP_MAGIC: u8 = 0xCA;

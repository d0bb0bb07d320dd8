use std::io::Cursor;

use murmur3::*;

pub fn hash_code(v: &[u8]) -> std::io::Result<u32> {
    let mut cursor = Cursor::new(v);
    murmur3_32(&mut cursor, 0x19264330)
}

/// Stable owner slot of a partition key among `buckets` workers.
pub fn partition_slot(partition_key: &str, buckets: usize) -> usize {
    // murmur3 over an in-memory cursor cannot fail
    let code = hash_code(partition_key.as_bytes()).unwrap_or(0);
    code as usize % buckets.max(1)
}

#[cfg(test)]
mod tests {
    use crate::utils::hash::{hash_code, partition_slot};

    #[test]
    pub fn hash_code_stable_test() {
        assert_eq!(
            hash_code(b"sensor-1").unwrap(),
            hash_code(b"sensor-1").unwrap()
        );
    }

    #[test]
    pub fn partition_slot_test() {
        for n in 0..100 {
            let key = format!("key-{}", n);
            let slot = partition_slot(key.as_str(), 4);
            assert!(slot < 4);
            assert_eq!(slot, partition_slot(key.as_str(), 4));
        }
        assert_eq!(partition_slot("any", 1), 0);
    }
}

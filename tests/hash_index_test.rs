//! Integration tests for the extendible hash index

use std::sync::Arc;
use std::thread;

use strata::buffer::BufferPoolManager;
use strata::common::{PageId, RecordId, SlotId, BUCKET_ARRAY_SIZE};
use strata::index::{DefaultKeyHasher, ExtendibleHashIndex, IdentityKeyHasher, KeyHasher};
use strata::storage::disk::DiskManager;
use tempfile::NamedTempFile;

fn rid(n: u64) -> RecordId {
    RecordId::new(PageId::new(n as u32), SlotId::new((n % 1000) as u16))
}

fn create_index(
    pool_size: usize,
    hasher: Box<dyn KeyHasher>,
) -> (ExtendibleHashIndex, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let bpm = Arc::new(BufferPoolManager::new(pool_size, dm));
    (ExtendibleHashIndex::new(bpm, hasher).unwrap(), temp_file)
}

#[test]
fn test_insert_lookup_remove_at_scale() {
    let (index, _temp) = create_index(50, Box::new(DefaultKeyHasher));
    let n = 992u64;

    for i in 0..n {
        assert!(index.insert(i, rid(i)).unwrap(), "insert {i}");
    }
    index.verify_integrity().unwrap();
    for i in 0..n {
        assert_eq!(index.get_value(i).unwrap(), vec![rid(i)], "lookup {i}");
    }

    // Re-inserting every existing pair must be refused.
    for i in 0..n {
        assert!(!index.insert(i, rid(i)).unwrap(), "re-insert {i}");
    }

    for i in 0..n {
        assert!(index.remove(i, rid(i)).unwrap(), "remove {i}");
        assert!(index.get_value(i).unwrap().is_empty(), "post-remove lookup {i}");
    }
    assert_eq!(index.global_depth().unwrap(), 0);
}

#[test]
fn test_directory_growth_under_skewed_keys() {
    // Keys share their low four hash bits, so the directory must grow past
    // depth 4 before the first overflowing bucket can split usefully.
    let (index, _temp) = create_index(50, Box::new(IdentityKeyHasher));
    let n = BUCKET_ARRAY_SIZE as u64 + 1;

    for i in 0..n {
        assert!(index.insert(i << 4, rid(i)).unwrap(), "insert {i}");
    }

    assert!(index.global_depth().unwrap() >= 5);
    index.verify_integrity().unwrap();
    for i in 0..n {
        assert_eq!(index.get_value(i << 4).unwrap(), vec![rid(i)], "lookup {i}");
    }
}

#[test]
fn test_duplicate_values_under_one_key() {
    let (index, _temp) = create_index(16, Box::new(DefaultKeyHasher));

    assert!(index.insert(7, rid(1)).unwrap());
    assert!(index.insert(7, rid(2)).unwrap());
    assert!(index.insert(7, rid(3)).unwrap());
    assert!(!index.insert(7, rid(2)).unwrap());

    let mut values = index.get_value(7).unwrap();
    values.sort();
    assert_eq!(values, vec![rid(1), rid(2), rid(3)]);

    assert!(index.remove(7, rid(2)).unwrap());
    assert_eq!(index.get_value(7).unwrap().len(), 2);
}

#[test]
fn test_interleaved_inserts_and_removes() {
    let (index, _temp) = create_index(50, Box::new(DefaultKeyHasher));

    // Two full waves of insert-all / remove-half, verifying the survivors
    // after each wave.
    for wave in 0..2u64 {
        let base = wave * 10_000;
        for i in 0..600 {
            assert!(index.insert(base + i, rid(i)).unwrap());
        }
        for i in (0..600).step_by(2) {
            assert!(index.remove(base + i, rid(i)).unwrap());
        }
        for i in 0..600 {
            let expect: &[RecordId] = if i % 2 == 0 { &[] } else { &[rid(i)] };
            assert_eq!(index.get_value(base + i).unwrap(), expect);
        }
        index.verify_integrity().unwrap();
    }
}

#[test]
fn test_random_order_drain_reaches_depth_zero() {
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    let (index, _temp) = create_index(50, Box::new(DefaultKeyHasher));
    let mut rng = rand::rngs::StdRng::seed_from_u64(42);

    let mut keys: Vec<u64> = (0..800).collect();
    for &k in &keys {
        assert!(index.insert(k, rid(k)).unwrap());
    }

    // Buckets empty in an arbitrary order; merges must still cascade all
    // the way back to an empty directory.
    keys.shuffle(&mut rng);
    for &k in &keys {
        assert!(index.remove(k, rid(k)).unwrap());
    }
    assert_eq!(index.global_depth().unwrap(), 0);
    index.verify_integrity().unwrap();
}

#[test]
fn test_concurrent_readers_and_writers() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let bpm = Arc::new(BufferPoolManager::new(64, dm));
    let index = Arc::new(
        ExtendibleHashIndex::new(bpm, Box::new(DefaultKeyHasher)).unwrap(),
    );

    let writers: Vec<_> = (0..4u64)
        .map(|t| {
            let index = Arc::clone(&index);
            thread::spawn(move || {
                for i in 0..250 {
                    let key = t * 1000 + i;
                    assert!(index.insert(key, rid(key)).unwrap());
                }
            })
        })
        .collect();
    for w in writers {
        w.join().unwrap();
    }

    let readers: Vec<_> = (0..4u64)
        .map(|t| {
            let index = Arc::clone(&index);
            thread::spawn(move || {
                for i in 0..250 {
                    let key = t * 1000 + i;
                    assert_eq!(index.get_value(key).unwrap(), vec![rid(key)]);
                }
            })
        })
        .collect();
    for r in readers {
        r.join().unwrap();
    }

    index.verify_integrity().unwrap();
}

use super::*;

// -------------------- Insert / Contains --------------------

#[test]
fn added_key_is_found() {
    let mut f = KeyFilter::new();
    f.add(b"hello");
    assert!(f.contains(b"hello"));
}

#[test]
fn missing_key_is_not_found() {
    let f = KeyFilter::new();
    assert!(!f.contains(b"hello"));
}

#[test]
fn no_false_negatives() {
    let mut f = KeyFilter::new();
    for i in 0..1000u64 {
        f.add(&i.to_le_bytes());
    }
    for i in 0..1000u64 {
        assert!(
            f.contains(&i.to_le_bytes()),
            "key {} should be found",
            i
        );
    }
}

#[test]
fn false_positive_rate_is_reasonable() {
    let n = 1000u64;
    let mut f = KeyFilter::new();
    for i in 0..n {
        f.add(&i.to_le_bytes());
    }

    // Test keys that were NOT added. With 10k bits, 3 hashes and 1000 keys
    // the expected rate is under 2%; allow generous statistical slack.
    let mut false_positives = 0;
    let test_count = 10_000u64;
    for i in n..(n + test_count) {
        if f.contains(&i.to_le_bytes()) {
            false_positives += 1;
        }
    }

    let rate = false_positives as f64 / test_count as f64;
    assert!(rate < 0.10, "false positive rate too high: {:.4}", rate);
}

#[test]
fn empty_key() {
    let mut f = KeyFilter::new();
    f.add(b"");
    assert!(f.contains(b""));
}

#[test]
fn binary_key() {
    let mut f = KeyFilter::new();
    let key = vec![0u8, 1, 2, 255, 254, 253];
    f.add(&key);
    assert!(f.contains(&key));
}

// -------------------- Clear --------------------

#[test]
fn clear_forgets_all_keys() {
    let mut f = KeyFilter::new();
    for i in 0..100u64 {
        f.add(&i.to_le_bytes());
    }
    f.clear();
    for i in 0..100u64 {
        assert!(!f.contains(&i.to_le_bytes()));
    }
}

#[test]
fn usable_again_after_clear() {
    let mut f = KeyFilter::new();
    f.add(b"a");
    f.clear();
    f.add(b"b");
    assert!(f.contains(b"b"));
    assert!(!f.contains(b"a"));
}

// -------------------- Debug --------------------

#[test]
fn debug_impl_works() {
    let mut f = KeyFilter::new();
    f.add(b"x");
    let debug = format!("{:?}", f);
    assert!(debug.contains("KeyFilter"));
    assert!(debug.contains("set_bits"));
}

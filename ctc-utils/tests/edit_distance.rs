use ctc_utils::{edit_distance, EditCounts};

#[test]
fn test_identical_sequences() {
    let counts = edit_distance(&[1usize, 2, 3], &[1, 2, 3]);
    assert_eq!(counts, EditCounts::default());
    assert_eq!(counts.total(), 0);
}

#[test]
fn test_empty_sequences() {
    assert_eq!(edit_distance::<usize>(&[], &[]).total(), 0);
    let all_del = edit_distance(&[1usize, 2, 3], &[]);
    assert_eq!(all_del.deletions, 3);
    assert_eq!(all_del.total(), 3);
    let all_ins = edit_distance(&[], &[1usize, 2]);
    assert_eq!(all_ins.insertions, 2);
    assert_eq!(all_ins.total(), 2);
}

#[test]
fn test_single_substitution() {
    let counts = edit_distance(&[1usize, 2, 3, 4, 5], &[1, 2, 9, 4, 5]);
    assert_eq!(counts.substitutions, 1);
    assert_eq!(counts.total(), 1);
}

#[test]
fn test_insertion_and_deletion() {
    let counts = edit_distance(&[1usize, 2, 3], &[1, 2, 3, 4]);
    assert_eq!(counts.insertions, 1);
    assert_eq!(counts.total(), 1);

    let counts = edit_distance(&[1usize, 2, 3], &[1, 3]);
    assert_eq!(counts.deletions, 1);
    assert_eq!(counts.total(), 1);
}

#[test]
fn test_mixed_errors() {
    // kitten -> sitting: 2 substitutions + 1 insertion
    let reference: Vec<char> = "kitten".chars().collect();
    let hypothesis: Vec<char> = "sitting".chars().collect();
    let counts = edit_distance(&reference, &hypothesis);
    assert_eq!(counts.total(), 3);
    assert_eq!(counts.substitutions, 2);
    assert_eq!(counts.insertions, 1);
}

#[test]
fn test_disjoint_sequences() {
    let counts = edit_distance(&[1usize, 2], &[3, 4]);
    assert_eq!(counts.substitutions, 2);
    assert_eq!(counts.total(), 2);
}

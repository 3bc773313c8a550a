use super::*;

#[test]
fn region_contains_is_half_open() {
    let r = TileRegion::new(3, 4, 2, 1);
    assert!(r.contains(3, 4));
    assert!(r.contains(4, 4));
    assert!(!r.contains(5, 4));
    assert!(!r.contains(3, 5));
    assert!(!r.contains(2, 4));
}

#[test]
fn region_cells_are_column_major() {
    let cells: Vec<_> = TileRegion::new(1, 1, 2, 2).cells().collect();
    assert_eq!(cells, vec![(1, 1), (1, 2), (2, 1), (2, 2)]);
    assert_eq!(TileRegion::new(0, 0, 0, 3).cells().count(), 0);
}

#[test]
fn region_cells_stop_at_i32_range() {
    let r = TileRegion::new(i32::MAX - 1, 0, 4, 1);
    assert_eq!(r.cells().count(), 2);
}

#[test]
fn region_intersect_clips_to_overlap() {
    let map = TileRegion::full(10, 10);
    assert_eq!(
        TileRegion::new(8, 9, 4, 3).intersect(map),
        TileRegion::new(8, 9, 2, 1)
    );
    assert_eq!(
        TileRegion::new(-2, -2, 3, 3).intersect(map),
        TileRegion::new(0, 0, 1, 1)
    );
    assert!(TileRegion::new(12, 0, 2, 2).intersect(map).is_empty());
}

#[test]
fn region_pixel_size_checks_overflow() {
    assert_eq!(TileRegion::full(2, 3).pixel_size(16).unwrap(), (32, 48));
    assert!(TileRegion::full(u32::MAX, 1).pixel_size(2).is_err());
}

#[test]
fn cancel_token_is_shared_between_clones() {
    let a = CancelToken::new();
    let b = a.clone();
    assert!(!b.is_cancelled());
    a.cancel();
    assert!(b.is_cancelled());
}

#[test]
fn child_token_follows_parent_but_not_reverse() {
    let parent = CancelToken::new();
    let child = parent.child();
    let grandchild = child.child();

    child.cancel();
    assert!(child.is_cancelled());
    assert!(grandchild.is_cancelled());
    assert!(!parent.is_cancelled());

    let parent = CancelToken::new();
    let child = parent.child();
    parent.cancel();
    assert!(child.is_cancelled());
}

#[test]
fn preview_truncates_on_char_boundary() {
    let long = "é".repeat(40);
    assert_eq!(preview(&long).chars().count(), 32);
    assert_eq!(preview("short"), "short");
}

#[test]
fn timestamp_is_positive() {
    assert!(unix_timestamp() > 0);
}

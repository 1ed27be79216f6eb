use brushbsp::box_::FBox;
use brushbsp::math::FVector;

#[test]
fn box_new_test() {
    let box_ = FBox::new();

    assert!(!box_.is_valid);
    assert_eq!(FVector::new(0.0, 0.0, 0.0), box_.min);
    assert_eq!(FVector::new(0.0, 0.0, 0.0), box_.max);
}

#[test]
fn box_new_from_min_max_test() {
    let box_ = FBox::new_from_min_max(FVector::new(1.0, 2.0, 3.0), FVector::new(4.0, 5.0, 6.0));

    assert!(box_.is_valid);
    assert_eq!(FVector::new(1.0, 2.0, 3.0), box_.min);
    assert_eq!(FVector::new(4.0, 5.0, 6.0), box_.max);
}

#[test]
fn box_new_from_points_test() {
    let points = [
        FVector::new(1.0, 5.0, 3.0),
        FVector::new(4.0, 2.0, 6.0),
        FVector::new(7.0, 8.0, 0.0),
    ];

    let box_ = FBox::new_from_points(&points);

    assert!(box_.is_valid);
    assert_eq!(FVector::new(1.0, 2.0, 0.0), box_.min);
    assert_eq!(FVector::new(7.0, 8.0, 6.0), box_.max);
}

#[test]
fn box_new_from_empty_points_test() {
    let box_ = FBox::new_from_points(&[]);

    assert!(!box_.is_valid);
}

#[test]
fn box_center_test() {
    let box_ = FBox::new_from_min_max(FVector::new(1.0, 2.0, 3.0), FVector::new(4.0, 5.0, 6.0));

    assert_eq!(FVector::new(2.5, 3.5, 4.5), box_.center());
}

#[test]
fn box_extent_test() {
    let box_ = FBox::new_from_min_max(FVector::new(1.0, 2.0, 3.0), FVector::new(4.0, 5.0, 6.0));

    assert_eq!(FVector::new(1.5, 1.5, 1.5), box_.extent());
}

#[test]
fn box_add_point_to_invalid_box_test() {
    let mut box_ = FBox::new();

    box_.add_point(&FVector::new(1.0, 2.0, 3.0));

    assert!(box_.is_valid);
    assert_eq!(FVector::new(1.0, 2.0, 3.0), box_.min);
    assert_eq!(FVector::new(1.0, 2.0, 3.0), box_.max);
}

#[test]
fn box_add_point_grows_bounds_test() {
    let mut box_ = FBox::new_from_min_max(FVector::new(0.0, 0.0, 0.0), FVector::new(1.0, 1.0, 1.0));

    box_.add_point(&FVector::new(-1.0, 0.5, 2.0));

    assert_eq!(FVector::new(-1.0, 0.0, 0.0), box_.min);
    assert_eq!(FVector::new(1.0, 1.0, 2.0), box_.max);
}

#[test]
fn box_add_box_test() {
    let mut box_ = FBox::new_from_min_max(FVector::new(0.0, 0.0, 0.0), FVector::new(1.0, 1.0, 1.0));
    let other = FBox::new_from_min_max(FVector::new(-1.0, -1.0, -1.0), FVector::new(0.5, 0.5, 2.0));

    box_.add_box(&other);

    assert_eq!(FVector::new(-1.0, -1.0, -1.0), box_.min);
    assert_eq!(FVector::new(1.0, 1.0, 2.0), box_.max);
}

#[test]
fn box_add_box_to_invalid_box_test() {
    let mut box_ = FBox::new();
    let other = FBox::new_from_min_max(FVector::new(1.0, 2.0, 3.0), FVector::new(4.0, 5.0, 6.0));

    box_.add_box(&other);

    assert_eq!(other, box_);
}

#[test]
fn box_add_invalid_box_is_noop_test() {
    let mut box_ = FBox::new_from_min_max(FVector::new(0.0, 0.0, 0.0), FVector::new(1.0, 1.0, 1.0));
    let original = box_;

    box_.add_box(&FBox::new());

    assert_eq!(original, box_);
}

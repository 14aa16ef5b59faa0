use bagframes::copier::SUMMARY_FILE;
use bagframes::filter::{self, FilterOptions, FILTERED_DIR, INVERSE_DIR};
use bagframes::{Error, Range};
use std::fs;
use std::path::Path;

fn populate(dir: &Path, count: usize) {
    for i in 0..count {
        fs::write(dir.join(format!("frame_{i:02}.jpg")), format!("{i}")).unwrap();
    }
}

fn options(dir: &Path, ranges: Vec<[f64; 2]>) -> FilterOptions {
    FilterOptions {
        source_dir: dir.to_path_buf(),
        ranges,
        rate: None,
        min_gap: Some(2),
        make_video: false,
        fps: None,
        show_progress: false,
    }
}

fn listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name != SUMMARY_FILE)
        .collect();
    names.sort();
    names
}

fn names(indices: impl IntoIterator<Item = usize>) -> Vec<String> {
    indices
        .into_iter()
        .map(|i| format!("frame_{i:02}.jpg"))
        .collect()
}

#[test]
fn splits_listing_into_kept_and_inverse_sides() {
    let dir = tempfile::tempdir().unwrap();
    populate(dir.path(), 15);

    let report = filter::run(&options(dir.path(), vec![[0.0, 5.0], [10.0, 12.0]])).unwrap();
    assert_eq!(report.total_items, 15);
    assert_eq!(report.kept.copied, 7);
    assert_eq!(
        report.inverse.ranges.ranges(),
        &[Range::new(5, 10), Range::new(12, 15)]
    );

    let kept = dir.path().join(FILTERED_DIR);
    let inverse = dir.path().join(INVERSE_DIR);
    assert_eq!(listing(&kept), names((0..5).chain(10..12)));
    assert_eq!(listing(&inverse), names((5..10).chain(12..15)));
    assert_eq!(fs::read_to_string(kept.join(SUMMARY_FILE)).unwrap(), "7");
    assert_eq!(fs::read_to_string(inverse.join(SUMMARY_FILE)).unwrap(), "8");
    assert_eq!(fs::read_to_string(kept.join("frame_11.jpg")).unwrap(), "11");
}

#[test]
fn short_trailing_gap_is_left_out() {
    let dir = tempfile::tempdir().unwrap();
    populate(dir.path(), 15);
    let mut opts = options(dir.path(), vec![[0.0, 5.0], [10.0, 12.0]]);
    opts.min_gap = Some(4);

    let report = filter::run(&opts).unwrap();
    assert_eq!(report.inverse.copied, 5);
    assert_eq!(listing(&dir.path().join(INVERSE_DIR)), names(5..10));
}

#[test]
fn rerun_replaces_previous_output() {
    let dir = tempfile::tempdir().unwrap();
    populate(dir.path(), 6);

    filter::run(&options(dir.path(), vec![[0.0, 4.0]])).unwrap();
    let report = filter::run(&options(dir.path(), vec![[4.0, 6.0]])).unwrap();
    assert_eq!(report.total_items, 6);
    assert_eq!(listing(&dir.path().join(FILTERED_DIR)), names(4..6));
    assert_eq!(listing(&dir.path().join(INVERSE_DIR)), names(0..4));
}

#[test]
fn rate_scales_and_clamps_ranges() {
    let dir = tempfile::tempdir().unwrap();
    populate(dir.path(), 10);
    let mut opts = options(dir.path(), vec![[1.0, 2.5], [4.0, 9.0]]);
    opts.rate = Some(2.0);
    opts.min_gap = None;

    let report = filter::run(&opts).unwrap();
    assert_eq!(
        report.kept.ranges.ranges(),
        &[Range::new(2, 5), Range::new(8, 10)]
    );
    assert_eq!(listing(&dir.path().join(FILTERED_DIR)), names([2, 3, 4, 8, 9]));
    assert_eq!(
        listing(&dir.path().join(INVERSE_DIR)),
        names([0, 1, 5, 6, 7])
    );
}

#[test]
fn out_of_range_positions_fail_before_touching_output() {
    let dir = tempfile::tempdir().unwrap();
    populate(dir.path(), 5);

    let err = filter::run(&options(dir.path(), vec![[2.0, 8.0]])).unwrap_err();
    assert!(matches!(err, Error::IndexOutOfRange { len: 5, .. }));
    assert!(!dir.path().join(FILTERED_DIR).exists());
    assert!(!dir.path().join(INVERSE_DIR).exists());
}

#[test]
fn missing_source_directory_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nowhere");
    assert!(matches!(
        filter::run(&options(&missing, vec![[0.0, 1.0]])),
        Err(Error::NotADirectory(_))
    ));
}

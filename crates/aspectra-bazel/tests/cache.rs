mod common;

use aspectra_bazel::{AspectInfoCache, BazelError};
use common::{label, write_graph, FakeGenerator};
use tempfile::tempdir;

fn names(closure: &aspectra_bazel::TargetInfoSet) -> Vec<String> {
    closure.iter().map(|info| info.label.to_string()).collect()
}

fn diamond(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
    write_graph(
        dir,
        &[
            ("//app:a", "java_library", &["//lib:b", "//lib:c"]),
            ("//lib:b", "java_library", &["//base:d"]),
            ("//lib:c", "java_library", &["//base:d"]),
            ("//base:d", "java_library", &[]),
        ],
    )
}

#[test]
fn second_get_is_served_from_cache() {
    let dir = tempdir().unwrap();
    let generator = FakeGenerator::with_files(diamond(dir.path()));
    let cache = AspectInfoCache::new(Box::new(generator.clone()));

    let first = cache.get(&[label("//app:a")], "test").unwrap();
    assert_eq!(generator.calls().len(), 1);
    assert_eq!(cache.cache_hits(), 0);

    let second = cache.get(&[label("//app:a")], "test").unwrap();
    assert_eq!(generator.calls().len(), 1, "cache hit must not rebuild");
    assert_eq!(cache.cache_hits(), 1);
    assert_eq!(first, second);
    assert_eq!(
        names(&second[&label("//app:a")]),
        vec!["//base:d", "//lib:b", "//lib:c"]
    );
}

#[test]
fn only_misses_are_built_and_results_follow_request_order() {
    let dir = tempdir().unwrap();
    let generator = FakeGenerator::with_files(diamond(dir.path()));
    let cache = AspectInfoCache::new(Box::new(generator.clone()));

    cache.get(&[label("//lib:b")], "test").unwrap();
    let results = cache
        .get(&[label("//lib:c"), label("//lib:b"), label("//lib:c")], "test")
        .unwrap();

    assert_eq!(
        generator.calls(),
        vec![vec!["//lib:b".to_string()], vec!["//lib:c".to_string()]]
    );
    let order: Vec<String> = results.keys().map(|l| l.to_string()).collect();
    assert_eq!(order, vec!["//lib:c", "//lib:b"]);
}

#[test]
fn flush_label_leaves_other_entries_and_last_good() {
    let dir = tempdir().unwrap();
    let generator = FakeGenerator::with_files(diamond(dir.path()));
    let cache = AspectInfoCache::new(Box::new(generator.clone()));
    cache
        .get(&[label("//app:a"), label("//lib:b")], "test")
        .unwrap();

    assert!(cache.flush_label(&label("//app:a")));
    assert!(!cache.flush_label(&label("//app:a")));
    assert!(!cache.is_cached(&label("//app:a")));
    assert!(cache.is_cached(&label("//lib:b")));
    assert!(cache.last_good(&label("//app:a")).is_some());

    cache.get(&[label("//app:a")], "test").unwrap();
    assert_eq!(generator.calls().len(), 2);
}

#[test]
fn flush_all_keeps_last_good() {
    let dir = tempdir().unwrap();
    let generator = FakeGenerator::with_files(diamond(dir.path()));
    let cache = AspectInfoCache::new(Box::new(generator));
    cache
        .get(&[label("//app:a"), label("//lib:b")], "test")
        .unwrap();

    cache.flush();
    assert!(cache.current_labels().is_empty());
    assert!(cache.last_good(&label("//app:a")).is_some());
    assert!(cache.last_good(&label("//lib:b")).is_some());
}

#[test]
fn flush_for_package_removes_wildcard_and_concrete_entries_of_that_package_only() {
    let dir = tempdir().unwrap();
    let files = write_graph(
        dir.path(),
        &[
            ("//pkg:a", "java_library", &["//other:x"]),
            ("//pkg:b", "java_test", &["//pkg:a"]),
            ("//other:x", "java_library", &[]),
            ("//pkg/sub:c", "java_library", &[]),
        ],
    );
    let generator = FakeGenerator::with_files(files);
    let cache = AspectInfoCache::new(Box::new(generator));
    cache
        .get(
            &[label("//pkg:*"), label("//other:x"), label("//pkg/sub:c")],
            "test",
        )
        .unwrap();
    assert!(cache.is_cached(&label("//pkg:a")));

    let flushed = cache.flush_for_package(&label("//pkg:whatever"));
    let flushed: Vec<String> = flushed.iter().map(|l| l.to_string()).collect();
    assert_eq!(flushed, vec!["//pkg:a", "//pkg:b", "//pkg:*"]);

    let remaining: Vec<String> = cache
        .current_labels()
        .iter()
        .map(|l| l.to_string())
        .collect();
    assert_eq!(remaining, vec!["//other:x", "//pkg/sub:c"]);
    assert!(cache.last_good(&label("//pkg:*")).is_some());
}

#[test]
fn unparseable_build_falls_back_to_last_good() {
    let dir = tempdir().unwrap();
    let generator = FakeGenerator::with_files(diamond(dir.path()));
    let cache = AspectInfoCache::new(Box::new(generator.clone()));

    let good = cache.get(&[label("//app:a")], "test").unwrap();
    cache.flush();

    let broken = dir.path().join("broken.aspectra-info.json");
    std::fs::write(&broken, "{ not json").unwrap();
    generator.set_files(vec![broken]);

    let fallback = cache
        .get(&[label("//app:a"), label("//never:built")], "test")
        .unwrap();
    assert_eq!(fallback.len(), 1);
    assert_eq!(fallback[&label("//app:a")], good[&label("//app:a")]);
    // Stale results are not promoted back into the current cache.
    assert!(!cache.is_cached(&label("//app:a")));
}

#[test]
fn target_missing_from_a_partial_build_uses_last_good() {
    let dir = tempdir().unwrap();
    let all = diamond(dir.path());
    let generator = FakeGenerator::with_files(all.clone());
    let cache = AspectInfoCache::new(Box::new(generator.clone()));
    let good = cache.get(&[label("//lib:b")], "test").unwrap();
    cache.flush();

    // `//lib:b` fails to build this time; only `//base:d` produced a file.
    generator.set_files(vec![all[3].clone()]);
    let results = cache
        .get(&[label("//lib:b"), label("//base:d")], "test")
        .unwrap();

    assert_eq!(results[&label("//lib:b")], good[&label("//lib:b")]);
    assert!(results[&label("//base:d")].is_empty());
    assert!(!cache.is_cached(&label("//lib:b")));
    assert!(cache.is_cached(&label("//base:d")));
}

#[test]
fn no_generated_files_is_an_io_error() {
    let generator = FakeGenerator::with_files(Vec::new());
    let cache = AspectInfoCache::new(Box::new(generator));

    let err = cache.get(&[label("//app:a")], "test").unwrap_err();
    assert!(matches!(err, BazelError::NoAspectFiles { ref targets } if targets == "//app:a"));
    assert!(err.is_io());
    assert!(cache.current_labels().is_empty());
}

#[test]
fn wildcard_request_stores_package_targets_and_the_union() {
    let dir = tempdir().unwrap();
    let files = write_graph(
        dir.path(),
        &[
            ("//pkg:a", "java_library", &["//dep:x"]),
            ("//pkg:b", "java_library", &[]),
            ("//dep:x", "java_library", &[]),
        ],
    );
    let generator = FakeGenerator::with_files(files);
    let cache = AspectInfoCache::new(Box::new(generator.clone()));

    let results = cache.get(&[label("//pkg:all")], "test").unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(
        names(&results[&label("//pkg:*")]),
        vec!["//dep:x", "//pkg:a", "//pkg:b"]
    );
    assert_eq!(
        cache.current_labels(),
        vec![label("//pkg:a"), label("//pkg:b"), label("//pkg:*")]
    );

    // Concrete entries stored by the wildcard load are reused.
    let a = cache.get(&[label("//pkg:a")], "test").unwrap();
    assert_eq!(names(&a[&label("//pkg:a")]), vec!["//dep:x"]);
    assert_eq!(generator.calls().len(), 1);
}

#[test]
fn cached_concrete_labels_do_not_satisfy_a_wildcard_request() {
    let dir = tempdir().unwrap();
    let files = write_graph(
        dir.path(),
        &[
            ("//pkg:a", "java_library", &[]),
            ("//pkg:b", "java_library", &[]),
        ],
    );
    let generator = FakeGenerator::with_files(files);
    let cache = AspectInfoCache::new(Box::new(generator.clone()));

    cache
        .get(&[label("//pkg:a"), label("//pkg:b")], "test")
        .unwrap();
    cache.get(&[label("//pkg:*")], "test").unwrap();
    assert_eq!(
        generator.calls(),
        vec![
            vec!["//pkg:a".to_string(), "//pkg:b".to_string()],
            vec!["//pkg:*".to_string()],
        ]
    );
}

#[test]
fn concurrent_callers_build_once() {
    let dir = tempdir().unwrap();
    let generator = FakeGenerator::with_files(diamond(dir.path()));
    let cache = std::sync::Arc::new(AspectInfoCache::new(Box::new(generator.clone())));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = std::sync::Arc::clone(&cache);
            std::thread::spawn(move || cache.get(&[label("//app:a")], "thread").unwrap())
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap().len(), 1);
    }

    assert_eq!(generator.calls().len(), 1);
    assert_eq!(cache.cache_hits(), 7);
}

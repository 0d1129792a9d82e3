use std::{collections::HashSet, sync::Arc};

use metrics_util::debugging::DebuggingRecorder;
use vellum::{
    application::system_collections::{SystemCollectionManager, SystemCollectionSettings},
    cache::MemoryFreshnessCache,
    domain::{collections::Locale, tree::CollectionTree},
    infra::memory::InMemoryCollections,
};

#[tokio::test]
async fn rebuild_emits_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let manager = SystemCollectionManager::new(
        CollectionTree::empty(),
        Arc::new(InMemoryCollections::new()),
        Arc::new(MemoryFreshnessCache::new()),
        SystemCollectionSettings {
            locale: Locale::parse("en").expect("locale"),
            actor: None,
        },
    );
    manager.warm_up().await.expect("warm up");

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    for metric in [
        "vellum_system_collections_rebuild_total",
        "vellum_system_collections_rebuild_ms",
    ] {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}

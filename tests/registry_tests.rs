//! Registry and discovery tests

mod common;

use common::*;
use std::sync::Arc;

use osprey_core::module::{
    scan_manifest_dir, ModuleError, ModuleRegistry, ModuleSource, ModuleStatus, SearchFilter,
};

fn registry_with(sources: Vec<Arc<dyn ModuleSource>>) -> ModuleRegistry {
    let registry = ModuleRegistry::new();
    registry.discover(&sources, &[]);
    registry
}

#[test]
fn discovery_tolerates_raising_source() {
    init_tracing();
    let registry = ModuleRegistry::new();
    let sources: Vec<Arc<dyn ModuleSource>> = vec![
        collector_source(descriptor("alpha", &["ROOT"], &["DOMAIN"])),
        collector_source(descriptor("beta", &["DOMAIN"], &["IP"])),
        collector_source(descriptor("gamma", &["IP"], &["GEO"])),
        Arc::new(ExplodingSource {
            name: "boom".to_string(),
        }),
    ];
    let result = registry.discover(&sources, &[]);

    assert_eq!(result.total, 4);
    assert_eq!(result.loaded, 3);
    assert_eq!(result.failed, 1);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].0, "boom");

    // the three valid descriptors stay independently queryable
    for name in ["alpha", "beta", "gamma"] {
        let d = registry.get(name).expect("descriptor");
        assert_eq!(d.status, ModuleStatus::Loaded);
    }
    let failed = registry.get("boom").expect("failed placeholder");
    assert_eq!(failed.status, ModuleStatus::Failed);
    assert!(failed.error.as_deref().is_some());
    assert_eq!(registry.list_failed(), vec!["boom".to_string()]);
}

#[test]
fn rediscovery_replaces_whole_catalogue() {
    let registry = registry_with(vec![
        collector_source(descriptor("old_a", &["ROOT"], &["X"])),
        collector_source(descriptor("old_b", &["X"], &[])),
    ]);
    assert_eq!(registry.list_names().len(), 2);

    registry.discover(
        &[collector_source(descriptor("fresh", &["ROOT"], &["Y"]))],
        &[],
    );
    assert_eq!(registry.list_names(), vec!["fresh".to_string()]);
    assert!(registry.get("old_a").is_none());

    let stats = registry.stats();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.loaded, 1);
    assert_eq!(stats.failed, 0);
}

#[test]
fn ignore_list_skips_sources() {
    let registry = ModuleRegistry::new();
    let result = registry.discover(
        &[
            collector_source(descriptor("keep", &[], &["X"])),
            collector_source(descriptor("drop", &[], &["Y"])),
        ],
        &["drop".to_string()],
    );
    assert_eq!(result.total, 1);
    assert!(registry.get("drop").is_none());
}

#[test]
fn event_queries_delegate_to_graph() {
    let registry = registry_with(vec![
        collector_source(descriptor("resolver", &["DOMAIN"], &["IP"])),
        collector_source(descriptor("geo", &["IP"], &["GEO"])),
    ]);
    assert_eq!(registry.producers_of("IP"), vec!["resolver".to_string()]);
    assert_eq!(registry.consumers_of("IP"), vec!["geo".to_string()]);
    assert!(registry.producers_of("UNKNOWN").is_empty());
    let types = registry.all_event_types();
    assert!(types.contains("DOMAIN") && types.contains("IP") && types.contains("GEO"));

    let edges = registry.export_edges();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].from, "resolver");
    assert_eq!(edges[0].to, "geo");
}

#[test]
fn tag_queries_and_histograms() {
    let mut dns = descriptor("dns_axfr", &["DOMAIN"], &["DNS_RECORD"]);
    dns.categories.insert("dns".to_string());
    dns.flags.insert("slow".to_string());
    dns.use_cases.insert("Footprint".to_string());
    let mut whois = descriptor("whois_lookup", &["DOMAIN"], &["WHOIS"]);
    whois.categories.insert("dns".to_string());
    whois.use_cases.insert("Passive".to_string());

    let registry = registry_with(vec![collector_source(dns), collector_source(whois)]);

    assert_eq!(
        registry.by_category("dns"),
        vec!["dns_axfr".to_string(), "whois_lookup".to_string()]
    );
    assert_eq!(registry.by_flag("slow"), vec!["dns_axfr".to_string()]);
    assert_eq!(registry.by_use_case("Passive"), vec!["whois_lookup".to_string()]);
    assert_eq!(registry.categories().get("dns"), Some(&2));
    assert_eq!(registry.flags().get("slow"), Some(&1));
}

#[test]
fn search_combines_substring_and_filters() {
    let mut dns = descriptor("dns_axfr", &["DOMAIN"], &["DNS_RECORD"]).with_summary("Zone transfers");
    dns.categories.insert("dns".to_string());
    dns.author = "ana".to_string();
    let mut web = descriptor("web_spider", &["URL"], &["LINK"]).with_summary("Crawls dns-free pages");
    web.categories.insert("web".to_string());

    let registry = registry_with(vec![collector_source(dns), collector_source(web)]);

    // substring over name/summary
    let hits = registry.search("dns", &SearchFilter::default());
    assert_eq!(hits.len(), 2);

    // category filter narrows
    let filter = SearchFilter {
        categories: vec!["dns".to_string()],
        ..Default::default()
    };
    let hits = registry.search("dns", &filter);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].name, "dns_axfr");

    // author filter
    let filter = SearchFilter {
        author: Some("ANA".to_string()),
        ..Default::default()
    };
    assert_eq!(registry.search("", &filter).len(), 1);
}

#[test]
fn create_instance_gates_on_status() {
    let mut disabled = descriptor("asleep", &[], &["X"]);
    disabled.status = ModuleStatus::Disabled;
    let registry = ModuleRegistry::new();
    let sources: Vec<Arc<dyn ModuleSource>> = vec![
        collector_source(descriptor("fine", &[], &["X"])),
        collector_source(disabled),
        Arc::new(ExplodingSource {
            name: "broken".to_string(),
        }),
    ];
    registry.discover(&sources, &[]);

    assert!(matches!(
        registry.create_instance("missing", None, None),
        Err(ModuleError::UnknownModule(_))
    ));
    assert!(matches!(
        registry.create_instance("broken", None, None),
        Err(ModuleError::FailedModule(_))
    ));
    assert!(matches!(
        registry.create_instance("asleep", None, None),
        Err(ModuleError::DisabledModule(_))
    ));

    let instance = registry
        .create_instance("fine", None, None)
        .expect("instance");
    assert_eq!(instance.name(), "fine");
}

#[test]
fn manifest_directory_scan_reports_broken_manifests() {
    let dir = tempfile::TempDir::new().expect("tempdir");

    let good = dir.path().join("dns_resolve");
    std::fs::create_dir(&good).unwrap();
    std::fs::write(
        good.join("module.toml"),
        r#"
        name = "dns_resolve"
        summary = "Resolves domains"
        watched_events = ["DOMAIN"]
        produced_events = ["IP"]
        "#,
    )
    .unwrap();

    let broken = dir.path().join("broken");
    std::fs::create_dir(&broken).unwrap();
    std::fs::write(broken.join("module.toml"), "name = [not toml").unwrap();

    // no manifest: silently skipped
    std::fs::create_dir(dir.path().join("not_a_module")).unwrap();

    let sources = scan_manifest_dir(dir.path()).expect("scan");
    assert_eq!(sources.len(), 2);

    let registry = ModuleRegistry::new();
    let result = registry.discover(&sources, &[]);
    assert_eq!(result.loaded, 1);
    assert_eq!(result.failed, 1);
    assert_eq!(
        registry.get("dns_resolve").map(|d| d.status),
        Some(ModuleStatus::Loaded)
    );
    assert_eq!(registry.list_failed().len(), 1);
}

#[test]
fn missing_modules_dir_scans_empty() {
    let dir = tempfile::TempDir::new().expect("tempdir");
    let nonexistent = dir.path().join("nope");
    let sources = scan_manifest_dir(&nonexistent).expect("scan");
    assert!(sources.is_empty());
}

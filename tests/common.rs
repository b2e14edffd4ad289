//! Shared fixtures for integration tests

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use osprey_core::module::{
    EventSink, Module, ModuleDescriptor, ModuleError, ModuleSource, ModuleWiring, OptionValue,
    ResultStore, ScanEvent, ScanHandles, ScanTarget, StaticSource,
};

/// Install a subscriber honoring `RUST_LOG`, for debugging test runs.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// In-memory result store recording every (scan, event) pair.
#[derive(Default)]
pub struct MemoryStore {
    pub records: Mutex<Vec<(String, ScanEvent)>>,
}

impl ResultStore for MemoryStore {
    fn record(&self, scan_id: &str, event: &ScanEvent) -> Result<(), ModuleError> {
        self.records
            .lock()
            .map_err(|e| ModuleError::Operation(e.to_string()))?
            .push((scan_id.to_string(), event.clone()));
        Ok(())
    }
}

/// Event sink collecting emitted events.
#[derive(Default)]
pub struct CollectingSink {
    pub events: Mutex<Vec<ScanEvent>>,
}

impl EventSink for CollectingSink {
    fn emit(&self, event: ScanEvent) -> Result<(), ModuleError> {
        self.events
            .lock()
            .map_err(|e| ModuleError::Operation(e.to_string()))?
            .push(event);
        Ok(())
    }
}

/// Minimal collector used as the live instance behind test sources.
pub struct TestCollector {
    name: String,
    fail_configure: bool,
    fail_attach: bool,
    expect_opt: Option<(String, OptionValue)>,
    pub opts: BTreeMap<String, OptionValue>,
    pub wiring: Option<ModuleWiring>,
    pub received: Vec<ScanEvent>,
}

impl TestCollector {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fail_configure: false,
            fail_attach: false,
            expect_opt: None,
            opts: BTreeMap::new(),
            wiring: None,
            received: Vec::new(),
        }
    }

    pub fn failing_attach(name: &str) -> Self {
        let mut collector = Self::new(name);
        collector.fail_attach = true;
        collector
    }

    pub fn failing_configure(name: &str) -> Self {
        let mut collector = Self::new(name);
        collector.fail_configure = true;
        collector
    }

    /// Collector whose configure rejects any option map where `key` is not
    /// exactly `value`; loading succeeds only when the merge produced the
    /// expected result.
    pub fn expecting_opt(name: &str, key: &str, value: OptionValue) -> Self {
        let mut collector = Self::new(name);
        collector.expect_opt = Some((key.to_string(), value));
        collector
    }
}

impl Module for TestCollector {
    fn name(&self) -> &str {
        &self.name
    }

    fn configure(&mut self, opts: &BTreeMap<String, OptionValue>) -> Result<(), ModuleError> {
        if self.fail_configure {
            return Err(ModuleError::Configuration(format!(
                "{} rejects all configuration",
                self.name
            )));
        }
        if let Some((key, expected)) = &self.expect_opt {
            if opts.get(key) != Some(expected) {
                return Err(ModuleError::Configuration(format!(
                    "expected {}={:?}, got {:?}",
                    key,
                    expected,
                    opts.get(key)
                )));
            }
        }
        self.opts = opts.clone();
        Ok(())
    }

    fn attach(&mut self, wiring: ModuleWiring) -> Result<(), ModuleError> {
        if self.fail_attach {
            return Err(ModuleError::Wiring(format!(
                "{} failed queue validation",
                self.name
            )));
        }
        self.wiring = Some(wiring);
        Ok(())
    }

    fn handle_event(&mut self, event: &ScanEvent) -> Result<(), ModuleError> {
        self.received.push(event.clone());
        Ok(())
    }
}

/// Descriptor with the given event vocabularies.
pub fn descriptor(name: &str, watched: &[&str], produced: &[&str]) -> ModuleDescriptor {
    ModuleDescriptor::new(name).with_events(watched.iter().copied(), produced.iter().copied())
}

/// Source producing a plain [`TestCollector`].
pub fn collector_source(descriptor: ModuleDescriptor) -> Arc<dyn ModuleSource> {
    let name = descriptor.name.clone();
    Arc::new(StaticSource::new(
        descriptor,
        Box::new(move || Ok(Box::new(TestCollector::new(&name)) as Box<dyn Module>)),
    ))
}

/// Source producing a collector built by the given constructor.
pub fn collector_source_with<F>(descriptor: ModuleDescriptor, build: F) -> Arc<dyn ModuleSource>
where
    F: Fn(&str) -> TestCollector + Send + Sync + 'static,
{
    let name = descriptor.name.clone();
    Arc::new(StaticSource::new(
        descriptor,
        Box::new(move || Ok(Box::new(build(&name)) as Box<dyn Module>)),
    ))
}

/// Source whose metadata extraction raises.
pub struct ExplodingSource {
    pub name: String,
}

impl ModuleSource for ExplodingSource {
    fn source_name(&self) -> &str {
        &self.name
    }

    fn describe(&self) -> Result<ModuleDescriptor, ModuleError> {
        Err(ModuleError::Discovery(
            "metadata extraction raised".to_string(),
        ))
    }

    fn instantiate(&self) -> Result<Box<dyn Module>, ModuleError> {
        Err(ModuleError::Instantiation("unusable source".to_string()))
    }
}

/// Scan collaborators backed by in-memory fixtures.
pub fn scan_handles() -> ScanHandles {
    ScanHandles {
        store: Arc::new(MemoryStore::default()),
        pool: Arc::new(
            rayon::ThreadPoolBuilder::new()
                .num_threads(2)
                .build()
                .expect("worker pool"),
        ),
        target: ScanTarget::new("example.com", "domain"),
        sink: Arc::new(CollectingSink::default()),
    }
}

//! End-to-end tests for the section manager with custom tools.
//!
//! The tools here record what the core asks of them, so the tests can
//! check merge calls, teardown fan-out and failure containment from the
//! outside.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use folio_core::conversion::ExportRule;
use folio_core::{
    render_document, save_document, BlockTool, BlockTune, ConversionConfig, ConversionDirection, EditorConfig,
    EditorError, InsertParams, MenuItem, MutationFlow, NodeId, OutputSection, Section, SectionData,
    SectionManager, SharedSurface, Surface, ToolContext, ToolFactory, ToolRegistry, TuneContext, TuneFactory,
    TuneRender,
};
use parking_lot::Mutex;
use serde_json::{json, Value};

// ============================================================================
// Test tools
// ============================================================================

#[derive(Default)]
struct ToolLog {
    merges: Mutex<Vec<SectionData>>,
    destroyed: AtomicUsize,
    active_teardowns: AtomicUsize,
    max_teardowns: AtomicUsize,
}

/// Text tool with switchable capabilities.
struct EchoFactory {
    log: Arc<ToolLog>,
    conversion: Option<ConversionConfig>,
    mergeable: bool,
    slow_destroy: bool,
}

impl EchoFactory {
    fn new(log: &Arc<ToolLog>) -> Self {
        Self {
            log: log.clone(),
            conversion: None,
            mergeable: true,
            slow_destroy: false,
        }
    }
}

impl ToolFactory for EchoFactory {
    fn create(&self, ctx: ToolContext) -> anyhow::Result<Arc<dyn BlockTool>> {
        Ok(Arc::new(Echo {
            text: ctx.data.get("text").and_then(Value::as_str).unwrap_or_default().to_string(),
            surface: ctx.surface,
            log: self.log.clone(),
            mergeable: self.mergeable,
            slow_destroy: self.slow_destroy,
        }))
    }

    fn conversion_config(&self) -> Option<ConversionConfig> {
        self.conversion.clone()
    }
}

struct Echo {
    text: String,
    surface: SharedSurface,
    log: Arc<ToolLog>,
    mergeable: bool,
    slow_destroy: bool,
}

#[async_trait]
impl BlockTool for Echo {
    fn render(&self, surface: &mut Surface) -> NodeId {
        let root = surface.make("div", &[("contenteditable", "true")]);
        let text = surface.create_text(&self.text);
        surface.append_child(root, text);
        root
    }

    async fn save(&self, root: NodeId) -> anyhow::Result<SectionData> {
        let mut data = SectionData::new();
        data.insert("text".into(), json!(self.surface.read().text_content(root)));
        Ok(data)
    }

    fn is_mergeable(&self) -> bool {
        self.mergeable
    }

    async fn merge(&self, data: SectionData) -> anyhow::Result<()> {
        self.log.merges.lock().push(data);
        Ok(())
    }

    async fn destroy(&self) {
        self.log.destroyed.fetch_add(1, Ordering::SeqCst);
        if self.slow_destroy {
            let active = self.log.active_teardowns.fetch_add(1, Ordering::SeqCst) + 1;
            self.log.max_teardowns.fetch_max(active, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.log.active_teardowns.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Tool whose save fails, either with an error or a panic.
struct BrokenFactory {
    panic: bool,
}

impl ToolFactory for BrokenFactory {
    fn create(&self, _ctx: ToolContext) -> anyhow::Result<Arc<dyn BlockTool>> {
        Ok(Arc::new(Broken { panic: self.panic }))
    }
}

struct Broken {
    panic: bool,
}

#[async_trait]
impl BlockTool for Broken {
    fn render(&self, surface: &mut Surface) -> NodeId {
        surface.make("div", &[])
    }

    async fn save(&self, _root: NodeId) -> anyhow::Result<SectionData> {
        if self.panic {
            panic!("save exploded");
        }
        anyhow::bail!("save failed")
    }

    fn call(&self, _method: &str, _params: &Value) -> Option<anyhow::Result<()>> {
        if self.panic {
            panic!("hook exploded");
        }
        Some(Err(anyhow::anyhow!("hook failed")))
    }
}

/// User tune wrapping content and saving a fixed value, or failing.
struct MarkerTuneFactory {
    fail: bool,
}

impl TuneFactory for MarkerTuneFactory {
    fn create(&self, _ctx: TuneContext) -> anyhow::Result<Arc<dyn BlockTune>> {
        Ok(Arc::new(MarkerTune { fail: self.fail }))
    }
}

struct MarkerTune {
    fail: bool,
}

#[async_trait]
impl BlockTune for MarkerTune {
    fn render(&self, _surface: &mut Surface) -> TuneRender {
        TuneRender::Items(vec![MenuItem::new("marker", "Marker")])
    }

    fn wrap(&self, content: NodeId, surface: &mut Surface) -> anyhow::Result<NodeId> {
        let wrapper = surface.make("div", &[("class", "marker-wrapper")]);
        surface.append_child(wrapper, content);
        Ok(wrapper)
    }

    async fn save(&self) -> Option<anyhow::Result<Value>> {
        if self.fail {
            Some(Err(anyhow::anyhow!("tune save failed")))
        } else {
            Some(Ok(json!({"on": true})))
        }
    }
}

/// User tune that panics whenever it touches the surface.
struct ExplodingTuneFactory;

impl TuneFactory for ExplodingTuneFactory {
    fn create(&self, _ctx: TuneContext) -> anyhow::Result<Arc<dyn BlockTune>> {
        Ok(Arc::new(ExplodingTune))
    }
}

struct ExplodingTune;

#[async_trait]
impl BlockTune for ExplodingTune {
    fn render(&self, _surface: &mut Surface) -> TuneRender {
        panic!("tune render exploded");
    }

    fn wrap(&self, content: NodeId, surface: &mut Surface) -> anyhow::Result<NodeId> {
        let wrapper = surface.make("div", &[("class", "exploding-wrapper")]);
        surface.append_child(wrapper, content);
        panic!("tune wrap exploded");
    }
}

// ============================================================================
// Shared setup
// ============================================================================

fn text(value: &str) -> SectionData {
    let mut data = SectionData::new();
    data.insert("text".into(), json!(value));
    data
}

fn registry(log: &Arc<ToolLog>) -> ToolRegistry {
    let mut registry = ToolRegistry::with_builtins();
    registry.register_tool("echo", Arc::new(EchoFactory::new(log)));
    registry.register_tool(
        "plain",
        Arc::new(EchoFactory {
            mergeable: false,
            ..EchoFactory::new(log)
        }),
    );
    registry.register_tool(
        "importer",
        Arc::new(EchoFactory {
            conversion: Some(ConversionConfig::field("text")),
            ..EchoFactory::new(log)
        }),
    );
    registry.register_tool(
        "exporter",
        Arc::new(EchoFactory {
            conversion: Some(ConversionConfig::default().with_export(ExportRule::Field("text".into()))),
            ..EchoFactory::new(log)
        }),
    );
    registry.register_tool("failing", Arc::new(BrokenFactory { panic: false }));
    registry.register_tool("panicking", Arc::new(BrokenFactory { panic: true }));
    registry
}

fn manager(log: &Arc<ToolLog>) -> SectionManager {
    SectionManager::new(registry(log))
}

fn push(manager: &mut SectionManager, tool: &str, value: &str) -> Section {
    let end = manager.len();
    manager
        .insert(InsertParams::tool(tool).with_data(text(value)).at(end))
        .unwrap()
}

fn texts(manager: &SectionManager) -> Vec<String> {
    let surface = manager.surface().read();
    manager
        .sections()
        .iter()
        .map(|s| surface.text_content(s.holder()))
        .collect()
}

// ============================================================================
// Ordering
// ============================================================================

#[test]
fn test_collection_stays_synchronized_across_operations() {
    let log = Arc::new(ToolLog::default());
    let mut manager = manager(&log);
    for value in ["a", "b", "c", "d"] {
        push(&mut manager, "paragraph", value);
        assert!(manager.collection().is_synchronized());
    }
    manager.insert(InsertParams::tool("echo").with_data(text("x")).at(0)).unwrap();
    assert!(manager.collection().is_synchronized());
    manager.move_section(4, 0);
    assert!(manager.collection().is_synchronized());
    let second = manager.get_by_index(1).unwrap();
    manager.replace(&second, "header", text("H")).unwrap();
    assert!(manager.collection().is_synchronized());
    assert_eq!(texts(&manager), vec!["a", "H", "c", "d", "x"]);
}

#[test]
fn test_insert_shifts_later_sections() {
    let log = Arc::new(ToolLog::default());
    let mut manager = manager(&log);
    for value in ["a", "b", "c"] {
        push(&mut manager, "paragraph", value);
    }
    manager.set_current_index(Some(2));
    let mut sub = manager.subscribe("section.added");

    manager
        .insert(InsertParams::tool("paragraph").with_data(text("n")).at(1).without_focus())
        .unwrap();
    assert_eq!(texts(&manager), vec!["a", "n", "b", "c"]);
    assert_eq!(manager.current_index(), Some(3));
    assert_eq!(sub.try_recv().unwrap().payload.index(), 1);

    manager
        .insert(InsertParams::tool("paragraph").with_data(text("f")).at(1))
        .unwrap();
    assert_eq!(manager.current_index(), Some(1));
}

#[test]
fn test_move_matches_list_semantics_for_all_pairs() {
    let names = ["a", "b", "c", "d", "e"];
    for from in 0..names.len() {
        for to in 0..names.len() {
            let log = Arc::new(ToolLog::default());
            let mut manager = manager(&log);
            for value in names {
                push(&mut manager, "paragraph", value);
            }
            manager.move_section(to, from);

            let mut expected: Vec<&str> = names.to_vec();
            let item = expected.remove(from);
            expected.insert(to, item);
            assert_eq!(texts(&manager), expected, "move {from} -> {to}");
            assert!(manager.collection().is_synchronized());
            assert_eq!(manager.current_index(), Some(to));
        }
    }
}

// ============================================================================
// Identity
// ============================================================================

#[test]
fn test_changes_are_indexed_by_section_instance() {
    let log = Arc::new(ToolLog::default());
    let mut manager = manager(&log);
    let blocks = vec![
        OutputSection::new("echo", text("a")).with_id("dup"),
        OutputSection::new("echo", text("b")).with_id("dup"),
    ];
    render_document(&mut manager, blocks).unwrap();
    let first = manager.get_by_index(0).unwrap();
    let second = manager.get_by_index(1).unwrap();
    assert_ne!(first.id(), second.id());

    let mut sub = manager.subscribe("section.changed");
    {
        let mut surface = manager.surface().write();
        let extra = surface.create_text("!");
        surface.append_child(second.tool_root(), extra);
    }
    assert_eq!(manager.flush(), 1);
    let event = sub.try_recv().unwrap().payload;
    assert_eq!(event.index(), 1);
    assert_eq!(event.section().id, *second.id());
}

// ============================================================================
// Removal
// ============================================================================

#[tokio::test]
async fn test_removed_sections_release_surface_nodes() {
    let log = Arc::new(ToolLog::default());
    let mut manager = manager(&log);
    push(&mut manager, "echo", "kept");
    let baseline = manager.surface().read().node_count();

    for round in 0..100 {
        let section = push(&mut manager, "echo", &format!("line {round}"));
        manager.remove_section(&section, false).await.unwrap();
        assert!(!manager.surface().read().exists(section.holder()));
    }
    assert_eq!(manager.surface().read().node_count(), baseline);
    assert_eq!(log.destroyed.load(Ordering::SeqCst), 100);
    assert!(manager.collection().is_synchronized());
}

#[tokio::test]
async fn test_removing_last_section_adds_default() {
    let log = Arc::new(ToolLog::default());
    let mut manager = manager(&log);
    let only = push(&mut manager, "echo", "solo");
    let mut sub = manager.subscribe("section.*");

    manager.remove_section(&only, true).await.unwrap();
    assert_eq!(manager.len(), 1);
    assert_eq!(manager.current_index(), Some(0));
    assert_eq!(manager.first_section().unwrap().name(), "paragraph");
    assert_eq!(log.destroyed.load(Ordering::SeqCst), 1);

    let subjects: Vec<_> = sub.drain().into_iter().map(|m| m.subject).collect();
    assert_eq!(subjects, vec!["section.removed", "section.added"]);
}

#[tokio::test]
async fn test_removing_last_section_without_default() {
    let log = Arc::new(ToolLog::default());
    let mut manager = manager(&log);
    let only = push(&mut manager, "echo", "solo");
    manager.remove_section(&only, false).await.unwrap();
    assert!(manager.is_empty());
    assert_eq!(manager.current_index(), None);
}

#[tokio::test]
async fn test_clear_bounds_teardown_concurrency() {
    let log = Arc::new(ToolLog::default());
    let mut registry = registry(&log);
    registry.register_tool(
        "slow",
        Arc::new(EchoFactory {
            slow_destroy: true,
            ..EchoFactory::new(&log)
        }),
    );
    registry.configure(&EditorConfig {
        teardown_concurrency: 2,
        ..Default::default()
    });
    let mut manager = SectionManager::new(registry);
    for i in 0..6 {
        push(&mut manager, "slow", &i.to_string());
    }
    let mut sub = manager.subscribe("section.removed");

    manager.clear(false).await.unwrap();
    assert!(manager.is_empty());
    assert_eq!(manager.current_index(), None);
    assert_eq!(log.destroyed.load(Ordering::SeqCst), 6);
    let max = log.max_teardowns.load(Ordering::SeqCst);
    assert!((1..=2).contains(&max), "max concurrent teardowns was {max}");
    assert!(sub.drain().iter().all(|m| m.payload.index() == 0));
}

// ============================================================================
// Merge
// ============================================================================

#[tokio::test]
async fn test_merge_same_tool() {
    let log = Arc::new(ToolLog::default());
    let mut manager = manager(&log);
    let a = push(&mut manager, "echo", "Hello ");
    let b = push(&mut manager, "echo", "World");

    manager.merge_sections(&a, &b).await.unwrap();

    let merges = log.merges.lock().clone();
    assert_eq!(merges, vec![text("World")]);
    assert_eq!(manager.len(), 1);
    assert_eq!(manager.index_of(&a), Some(0));
    assert_eq!(manager.index_of(&b), None);
    assert_eq!(manager.current_index(), Some(0));
}

#[tokio::test]
async fn test_merge_without_conversion_is_noop() {
    let log = Arc::new(ToolLog::default());
    let mut manager = manager(&log);
    let a = push(&mut manager, "echo", "one");
    let b = push(&mut manager, "plain", "two");

    manager.merge_sections(&a, &b).await.unwrap();
    assert!(log.merges.lock().is_empty());
    assert_eq!(manager.len(), 2);

    manager.merge_sections(&b, &a).await.unwrap();
    assert_eq!(manager.len(), 2);
}

#[tokio::test]
async fn test_merge_with_missing_section_changes_nothing() {
    let log = Arc::new(ToolLog::default());
    let mut manager = manager(&log);
    let a = push(&mut manager, "echo", "Hello ");
    let b = push(&mut manager, "echo", "World");
    let c = push(&mut manager, "echo", "!");
    manager.remove_section(&b, false).await.unwrap();

    let err = manager.merge_sections(&a, &b).await.unwrap_err();
    assert!(matches!(err, EditorError::SectionNotFound(ref id) if id == b.id().as_str()));
    manager.remove_section(&a, false).await.unwrap();
    let err = manager.merge_sections(&a, &c).await.unwrap_err();
    assert!(matches!(err, EditorError::SectionNotFound(_)));

    assert!(log.merges.lock().is_empty());
    assert_eq!(manager.len(), 1);
    assert_eq!(texts(&manager), vec!["!"]);
}

#[tokio::test]
async fn test_merge_through_conversion() {
    let log = Arc::new(ToolLog::default());
    let mut manager = manager(&log);
    let target = push(&mut manager, "importer", "first");
    let source = push(&mut manager, "paragraph", "second");

    manager.merge_sections(&target, &source).await.unwrap();
    assert_eq!(log.merges.lock().clone(), vec![text("second")]);
    assert_eq!(manager.len(), 1);
}

// ============================================================================
// Convert
// ============================================================================

#[tokio::test]
async fn test_convert_between_tools() {
    let log = Arc::new(ToolLog::default());
    let mut manager = manager(&log);
    let section = push(&mut manager, "paragraph", "hi");

    let converted = manager.convert(&section, "importer", None).await.unwrap();
    assert_eq!(converted.name(), "importer");
    let saved = converted.save().await.unwrap();
    assert_eq!(saved.data, text("hi"));
    assert_eq!(manager.len(), 1);
    assert_eq!(manager.index_of(&converted), Some(0));
}

#[tokio::test]
async fn test_convert_with_overrides() {
    let log = Arc::new(ToolLog::default());
    let mut manager = manager(&log);
    let section = push(&mut manager, "paragraph", "Title");
    let mut overrides = SectionData::new();
    overrides.insert("level".into(), json!(4));

    let converted = manager.convert(&section, "header", Some(overrides)).await.unwrap();
    let saved = converted.save().await.unwrap();
    assert_eq!(saved.data["text"], json!("Title"));
    assert_eq!(saved.data["level"], json!(4));
}

#[tokio::test]
async fn test_convert_errors_name_the_tool() {
    let log = Arc::new(ToolLog::default());
    let mut manager = manager(&log);
    let section = push(&mut manager, "paragraph", "hi");

    let err = manager.convert(&section, "exporter", None).await.unwrap_err();
    assert!(matches!(
        &err,
        EditorError::NotConvertible { tool, direction: ConversionDirection::Import } if tool == "exporter"
    ));
    assert!(err.to_string().contains("exporter"));

    let plain = push(&mut manager, "plain", "x");
    let err = manager.convert(&plain, "paragraph", None).await.unwrap_err();
    assert!(matches!(
        &err,
        EditorError::NotConvertible { tool, direction: ConversionDirection::Export } if tool == "plain"
    ));

    let err = manager.convert(&section, "missing", None).await.unwrap_err();
    assert!(matches!(err, EditorError::ToolNotFound(name) if name == "missing"));
    assert_eq!(manager.len(), 2);
}

// ============================================================================
// Change detection
// ============================================================================

#[test]
fn test_exempt_and_mixed_batches() {
    let log = Arc::new(ToolLog::default());
    let mut manager = manager(&log);
    let section = push(&mut manager, "echo", "text");
    let badge = {
        let mut surface = manager.surface().write();
        let badge = surface.make("span", &[("data-mutation-free", "true")]);
        surface.append_child(section.tool_root(), badge);
        badge
    };
    manager.flush();
    let mut sub = manager.subscribe("section.changed");

    manager.surface().write().toggle_class(badge, "active", true);
    assert_eq!(manager.flush(), 0);
    assert!(sub.try_recv().is_none());

    {
        let mut surface = manager.surface().write();
        surface.toggle_class(badge, "active", false);
        let extra = surface.create_text("!");
        surface.append_child(section.tool_root(), extra);
    }
    assert_eq!(manager.flush(), 1);
    let event = sub.try_recv().unwrap().payload;
    assert!(matches!(event, MutationFlow::Changed { index: 0, .. }));
}

#[test]
fn test_manual_dispatch_fires_change() {
    let log = Arc::new(ToolLog::default());
    let mut manager = manager(&log);
    let section = push(&mut manager, "echo", "text");
    manager.flush();
    let mut sub = manager.subscribe("section.changed");

    section.api().dispatch_change();
    assert_eq!(manager.pump(), 1);
    assert_eq!(sub.try_recv().unwrap().payload.section().id, *section.id());
}

// ============================================================================
// Failure containment
// ============================================================================

#[tokio::test]
async fn test_failing_save_is_unavailable_not_error() {
    let log = Arc::new(ToolLog::default());
    let mut manager = manager(&log);
    let failing = push(&mut manager, "failing", "");
    let panicking = push(&mut manager, "panicking", "");
    push(&mut manager, "echo", "kept");

    assert!(failing.save().await.is_none());
    assert!(panicking.save().await.is_none());
    failing.call("rendered", &Value::Null);
    panicking.call("rendered", &Value::Null);

    let output = save_document(&manager).await;
    assert_eq!(output.blocks.len(), 1);
    assert_eq!(output.blocks[0].tool, "echo");
}

#[tokio::test]
async fn test_panicking_tune_is_contained() {
    let log = Arc::new(ToolLog::default());
    let mut registry = registry(&log);
    registry.register_tune("exploding", Arc::new(ExplodingTuneFactory));
    registry.configure(&EditorConfig {
        tunes: vec!["exploding".into()],
        ..Default::default()
    });
    let mut manager = SectionManager::new(registry);

    let section = push(&mut manager, "echo", "survives");
    assert!(manager.collection().is_synchronized());
    {
        let surface = manager.surface().read();
        assert!(surface.contains(section.holder(), section.tool_root()));
        assert_eq!(surface.text_content(section.holder()), "survives");
    }

    let tunes = section.get_tunes();
    let names: Vec<_> = tunes.common_tunes.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["move-up", "delete", "move-down"]);

    let saved = section.save().await.unwrap();
    assert_eq!(saved.data, text("survives"));
}

#[tokio::test]
async fn test_failing_tune_is_omitted_from_save() {
    let log = Arc::new(ToolLog::default());
    let mut registry = registry(&log);
    registry.register_tune("marker", Arc::new(MarkerTuneFactory { fail: false }));
    registry.register_tune("broken-marker", Arc::new(MarkerTuneFactory { fail: true }));
    registry.configure(&EditorConfig {
        tunes: vec!["marker".into(), "broken-marker".into()],
        ..Default::default()
    });
    let mut manager = SectionManager::new(registry);
    let section = push(&mut manager, "echo", "wrapped");

    let saved = section.save().await.unwrap();
    assert_eq!(saved.tunes.len(), 1);
    assert_eq!(saved.tunes["marker"], json!({"on": true}));

    let surface = manager.surface().read();
    let wrappers = surface.find_all(section.holder(), |n| n.has_class("marker-wrapper"));
    assert_eq!(wrappers.len(), 2);
    assert!(surface.contains(wrappers[0], section.tool_root()));
    drop(surface);

    let tunes = section.get_tunes();
    let names: Vec<_> = tunes.common_tunes.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["move-up", "delete", "move-down", "marker", "marker"]);
}

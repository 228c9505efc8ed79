//! # folio-core
//!
//! Structural core of the Folio block editor.
//!
//! A document is an ordered list of sections. Each section wraps one tool
//! instance (paragraph, header, ...) rendered onto a shared surface. The
//! core keeps that list and the surface in lockstep, turns raw surface
//! mutations into change notifications, and orchestrates insert, update,
//! merge, convert and removal across tools.
//!
//! - [`SectionManager`] is the entry point: composes sections, owns the
//!   current index and publishes indexed [`MutationFlow`] events.
//! - [`SectionCollection`] keeps section order and surface child order
//!   identical.
//! - [`Section`] owns one tool and its tunes, extracts data and filters
//!   mutations through the `data-mutation-free` marker.
//! - [`ToolRegistry`] holds tool and tune factories and their settings.
//! - [`save_document`] and [`render_document`] move whole documents in and
//!   out of the editor.

pub mod collection;
pub mod config;
pub mod conversion;
pub mod error;
pub mod flows;
pub mod manager;
pub mod renderer;
pub mod sanitizer;
pub mod saver;
pub mod scheduler;
pub mod section;
pub mod surface;
pub mod tools;

pub use collection::SectionCollection;
pub use config::{EditorConfig, ToolSettings};
pub use conversion::{ConversionConfig, ConversionDirection, ExportRule, ImportRule};
pub use error::{EditorError, Result};
pub use flows::{
    matches_pattern, shared_editor_flow_bus, shared_mutation_flow_bus, EditorFlow, FlowBus, FlowMessage,
    HasSubject, MutationFlow, SectionSnapshot, SharedEditorFlowBus, SharedMutationFlowBus, Subscription,
};
pub use manager::{ComposeParams, InsertParams, SectionManager};
pub use renderer::render_document;
pub use sanitizer::{SanitizeConfig, SanitizeRule, TagRule, TagRules};
pub use saver::save_document;
pub use scheduler::IdleScheduler;
pub use section::{Section, SectionApi, SectionParams, SectionTunes};
pub use surface::{
    shared_surface, InteractionKind, MutationKind, MutationRecord, NodeId, SharedSurface, Surface, SurfaceEvent,
};
pub use tools::{
    BlockTool, BlockTune, MenuItem, ToolAdapter, ToolContext, ToolFactory, ToolMethod, ToolRegistry, ToolboxEntry,
    TuneAdapter, TuneContext, TuneFactory, TuneRender, DEFAULT_TOOL,
};

pub use folio_types::{OutputData, OutputSection, SavedSection, SectionData, SectionId, TunesData};

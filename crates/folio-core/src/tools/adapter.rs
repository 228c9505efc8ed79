//! Adapters binding a factory to its name and configured settings.

use std::fmt;
use std::sync::Arc;

use folio_types::SectionData;
use serde_json::Value;

use super::{BlockTool, BlockTune, ToolContext, ToolFactory, ToolboxEntry, TuneContext, TuneFactory};
use crate::config::ToolSettings;
use crate::conversion::{ConversionConfig, ImportRule};
use crate::error::{EditorError, Result};
use crate::sanitizer::{self, SanitizeConfig, SanitizeRule, TagRules};

/// A registered tool: factory plus resolved settings, sanitize rules and tunes.
pub struct ToolAdapter {
    name: String,
    factory: Arc<dyn ToolFactory>,
    settings: ToolSettings,
    sanitize: SanitizeConfig,
    inline_base: TagRules,
    tunes: Vec<Arc<TuneAdapter>>,
}

impl fmt::Debug for ToolAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolAdapter")
            .field("name", &self.name)
            .field("internal", &self.is_internal())
            .field("tunes", &self.tunes.iter().map(|t| t.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl ToolAdapter {
    pub(crate) fn new(
        name: &str,
        factory: Arc<dyn ToolFactory>,
        settings: ToolSettings,
        inline_base: &TagRules,
        tunes: Vec<Arc<TuneAdapter>>,
    ) -> Self {
        let sanitize = sanitizer::with_base(&factory.sanitize_config(), inline_base);
        Self {
            name: name.to_string(),
            factory,
            settings,
            sanitize,
            inline_base: inline_base.clone(),
            tunes,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_internal(&self) -> bool {
        self.factory.is_internal()
    }

    /// Tool configuration from the editor config.
    pub fn config(&self) -> &Value {
        &self.settings.config
    }

    /// Tunes for this tool: user tunes first, then internal tunes.
    pub fn tunes(&self) -> &[Arc<TuneAdapter>] {
        &self.tunes
    }

    /// Construct an instance.
    pub fn create(&self, ctx: ToolContext) -> Result<Arc<dyn BlockTool>> {
        self.factory.create(ctx).map_err(|source| EditorError::ToolConstruction {
            tool: self.name.clone(),
            source,
        })
    }

    pub fn conversion_config(&self) -> Option<ConversionConfig> {
        self.factory.conversion_config()
    }

    pub fn can_export(&self) -> bool {
        self.conversion_config().map(|c| c.can_export()).unwrap_or(false)
    }

    pub fn can_import(&self) -> bool {
        self.conversion_config().map(|c| c.can_import()).unwrap_or(false)
    }

    /// Field rules with the inline base folded in.
    pub fn sanitize_config(&self) -> &SanitizeConfig {
        &self.sanitize
    }

    /// Sanitize saved data with this tool's rules.
    pub fn sanitize_data(&self, data: &SectionData) -> SectionData {
        sanitizer::sanitize_data(data, &self.sanitize, &self.inline_base)
    }

    /// Sanitize a string about to be imported into this tool.
    ///
    /// Uses the import field's rule when the tool imports through a field,
    /// otherwise every tag any field allows.
    pub fn sanitize_import(&self, value: &str) -> String {
        let field_rule = match self.conversion_config().and_then(|c| c.import) {
            Some(ImportRule::Field(field)) => self.sanitize.get(&field).cloned(),
            _ => None,
        };
        match field_rule {
            Some(SanitizeRule::Allow(true)) => value.to_string(),
            Some(SanitizeRule::Allow(false)) => sanitizer::sanitize_str(value, &TagRules::new()),
            Some(SanitizeRule::Tags(tags)) => sanitizer::sanitize_str(value, &tags),
            None => sanitizer::sanitize_str(value, &self.allowed_tags()),
        }
    }

    fn allowed_tags(&self) -> TagRules {
        let mut all = self.inline_base.clone();
        for rule in self.sanitize.values() {
            if let SanitizeRule::Tags(tags) = rule {
                all.extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
        all
    }

    /// Toolbox entries: configured override, else the tool's own.
    pub fn toolbox(&self) -> Vec<ToolboxEntry> {
        self.settings
            .toolbox
            .clone()
            .unwrap_or_else(|| self.factory.toolbox())
    }
}

/// A registered tune.
pub struct TuneAdapter {
    name: String,
    factory: Arc<dyn TuneFactory>,
    config: Value,
}

impl fmt::Debug for TuneAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TuneAdapter")
            .field("name", &self.name)
            .field("internal", &self.is_internal())
            .finish()
    }
}

impl TuneAdapter {
    pub(crate) fn new(name: &str, factory: Arc<dyn TuneFactory>, config: Value) -> Self {
        Self {
            name: name.to_string(),
            factory,
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_internal(&self) -> bool {
        self.factory.is_internal()
    }

    pub fn config(&self) -> &Value {
        &self.config
    }

    pub fn create(&self, ctx: TuneContext) -> anyhow::Result<Arc<dyn BlockTune>> {
        self.factory.create(ctx)
    }
}

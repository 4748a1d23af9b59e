//! Mailing renderers and the registry used to pick one by name.
//!
//! A renderer turns a batch of items into a subject line and an HTML body.
//! Variants are registered under a name; the workflow asks the registry for
//! one at construction time and never looks at the concrete type again.

use crate::model::{GroupDescriptor, Item, SourceDescriptor};
use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

pub mod baseline;

pub use baseline::BaselineRenderer;

/// Name of the variant used when none is requested.
pub const DEFAULT_VARIANT: &str = "baseline";

/// Free-form, variant-specific settings (e.g. `link_text`).
pub type RendererOptions = BTreeMap<String, String>;

/// Descriptors a renderer may use besides the items themselves.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub source: &'a SourceDescriptor,
    pub group: &'a GroupDescriptor,
}

pub trait Renderer: Send + Sync {
    fn subject(&self, ctx: &RenderContext<'_>, items: &[Item]) -> String;

    fn html(&self, ctx: &RenderContext<'_>, items: &[Item]) -> String;
}

type Factory = Arc<dyn Fn(&RendererOptions) -> Result<Box<dyn Renderer>> + Send + Sync>;

#[derive(Clone)]
pub struct RendererRegistry {
    factories: HashMap<String, Factory>,
}

impl std::fmt::Debug for RendererRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendererRegistry")
            .field("variants", &self.names())
            .finish()
    }
}

impl Default for RendererRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register(DEFAULT_VARIANT, |opts| {
                Ok(Box::new(BaselineRenderer::from_options(opts)) as Box<dyn Renderer>)
            })
            .expect("baseline registers into an empty registry");
        registry
    }
}

impl RendererRegistry {
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a variant. Names must be non-empty and unique.
    pub fn register<F>(&mut self, name: &str, factory: F) -> Result<()>
    where
        F: Fn(&RendererOptions) -> Result<Box<dyn Renderer>> + Send + Sync + 'static,
    {
        let name = name.trim();
        if name.is_empty() {
            return Err(anyhow!("renderer variant name must be non-empty"));
        }
        if self.factories.contains_key(name) {
            return Err(anyhow!("renderer variant '{}' already registered", name));
        }
        self.factories.insert(name.to_string(), Arc::new(factory));
        Ok(())
    }

    /// Build the named variant, or `None` if nothing is registered under it.
    pub fn create(
        &self,
        name: &str,
        options: &RendererOptions,
    ) -> Option<Result<Box<dyn Renderer>>> {
        self.factories.get(name.trim()).map(|factory| factory(options))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Escape text for inclusion in HTML, covering quotes as well so the result
/// is safe inside attribute values.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#039;")
}

/// Drop anything that looks like a markup tag, including an unterminated
/// trailing `<tag`. A `<` followed by whitespace is plain text.
pub fn strip_tags(s: &str) -> String {
    static TAG: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"<[^\s<>][^>]*(?:>|$)").expect("valid tag regex"));
    TAG.replace_all(s, "").into_owned()
}

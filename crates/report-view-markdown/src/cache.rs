use crate::MarkdownRender;
use crate::MarkdownRenderer;
use crate::RenderError;
use crate::RenderOptions;
use crate::StyledText;
use parking_lot::Mutex;
use report_view_core::theme::StyleVariant;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::OnceLock;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RenderKey {
    pub width: u16,
    pub variant: StyleVariant,
}

/// One [`MarkdownRenderer`] per `(width, variant)`, shared by every viewer in the process.
///
/// The lock is held across lookup and render, so concurrent renders with the same key are
/// serialized and never observe a half-built renderer. A failed render leaves the entry in place.
#[derive(Debug, Default)]
pub struct RendererCache {
    options: RenderOptions,
    renderers: Mutex<HashMap<RenderKey, MarkdownRenderer>>,
}

impl RendererCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: RenderOptions) -> Self {
        Self {
            options,
            renderers: Mutex::new(HashMap::new()),
        }
    }

    /// Process-wide cache used by viewers that were not handed one explicitly.
    pub fn shared() -> Arc<RendererCache> {
        static SHARED: OnceLock<Arc<RendererCache>> = OnceLock::new();
        SHARED.get_or_init(|| Arc::new(RendererCache::new())).clone()
    }

    pub fn len(&self) -> usize {
        self.renderers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.renderers.lock().is_empty()
    }

    pub fn contains(&self, key: RenderKey) -> bool {
        self.renderers.lock().contains_key(&key)
    }
}

impl MarkdownRender for RendererCache {
    fn render(
        &self,
        markdown: &str,
        width: u16,
        variant: StyleVariant,
    ) -> Result<StyledText, RenderError> {
        if width == 0 {
            return Err(RenderError::ZeroWidth);
        }
        let key = RenderKey { width, variant };
        let mut renderers = self.renderers.lock();
        let renderer = renderers.entry(key).or_insert_with(|| {
            log::debug!("creating markdown renderer for width={width} variant={variant:?}");
            MarkdownRenderer::with_options(width, variant, self.options.clone())
        });
        renderer.render(markdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn one_renderer_per_key() {
        let cache = RendererCache::new();
        cache.render("# A", 40, StyleVariant::Dark).expect("render");
        cache.render("# B", 40, StyleVariant::Dark).expect("render");
        assert_eq!(cache.len(), 1);
        cache.render("# A", 41, StyleVariant::Dark).expect("render");
        cache.render("# A", 40, StyleVariant::Light).expect("render");
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn zero_width_does_not_create_a_renderer() {
        let cache = RendererCache::new();
        assert!(cache.render("# A", 0, StyleVariant::Dark).is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn concurrent_renders_match_sequential_output() {
        let cache = Arc::new(RendererCache::new());
        let md = "# Report\n\n## Findings\n\nSome text that wraps across a few rows of output.\n";
        let expected = cache.render(md, 24, StyleVariant::Dark).expect("render");
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || cache.render(md, 24, StyleVariant::Dark).expect("render"))
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().expect("join"), expected);
        }
        assert!(cache.contains(RenderKey {
            width: 24,
            variant: StyleVariant::Dark
        }));
    }
}

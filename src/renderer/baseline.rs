//! Minimal HTML digest: a greeting, one `<article>` per item and the
//! unsubscribe/address footer. `{contact.*}`, `{action.*}` and `{domain.*}`
//! tokens are left for the mailing service to fill per recipient.

use super::{html_escape, strip_tags, RenderContext, Renderer, RendererOptions};
use crate::model::Item;

const DEFAULT_LINK_TEXT: &str = "Read Full Story";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaselineRenderer {
    link_text: String,
}

impl Default for BaselineRenderer {
    fn default() -> Self {
        Self {
            link_text: DEFAULT_LINK_TEXT.to_string(),
        }
    }
}

impl BaselineRenderer {
    /// Recognised options: `link_text`.
    pub fn from_options(options: &RendererOptions) -> Self {
        let link_text = options
            .get("link_text")
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_LINK_TEXT);
        Self {
            link_text: link_text.to_string(),
        }
    }

    fn article(&self, item: &Item) -> String {
        format!(
            "<article><h2>{}</h2>{}<a href=\"{}\">{}</a></article>",
            html_escape(&strip_tags(&item.title)),
            html_escape(&item.teaser),
            html_escape(&item.uri),
            html_escape(&self.link_text),
        )
    }
}

impl Renderer for BaselineRenderer {
    fn subject(&self, ctx: &RenderContext<'_>, items: &[Item]) -> String {
        format!("{} articles from {}", items.len(), ctx.source.name)
    }

    fn html(&self, _ctx: &RenderContext<'_>, items: &[Item]) -> String {
        let mut html = format!(
            "<p>Dear {{contact.first_name}},</p><p>Here's {} articles:</p>",
            items.len()
        );
        for item in items {
            html.push_str(&self.article(item));
        }
        html.push_str(
            "<p>You can <a href='{action.unsubscribeUrl}'>unsubscribe</a>.</p><p>{domain.address}</p>",
        );
        html
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GroupDescriptor, SourceDescriptor};

    fn source() -> SourceDescriptor {
        SourceDescriptor {
            id: 4,
            name: "Mock source".into(),
            uri: None,
        }
    }

    fn group() -> GroupDescriptor {
        GroupDescriptor {
            id: 2,
            title: "Test group 1".into(),
        }
    }

    fn item(id: i64, title: &str, teaser: &str) -> Item {
        Item {
            id,
            title: title.into(),
            teaser: teaser.into(),
            uri: format!("https://example.com/{}", id),
            consumption_key: id * 10,
        }
    }

    #[test]
    fn renders_single_item_digest() {
        let (s, g) = (source(), group());
        let ctx = RenderContext {
            source: &s,
            group: &g,
        };
        let items = vec![item(1, "Test item 1", "Teaser text 1")];
        let r = BaselineRenderer::default();

        assert_eq!(r.subject(&ctx, &items), "1 articles from Mock source");
        assert_eq!(
            r.html(&ctx, &items),
            "<p>Dear {contact.first_name},</p><p>Here's 1 articles:</p>\
             <article><h2>Test item 1</h2>Teaser text 1\
             <a href=\"https://example.com/1\">Read Full Story</a></article>\
             <p>You can <a href='{action.unsubscribeUrl}'>unsubscribe</a>.</p><p>{domain.address}</p>"
        );
    }

    #[test]
    fn title_markup_is_stripped_and_teaser_markup_is_escaped() {
        let (s, g) = (source(), group());
        let ctx = RenderContext {
            source: &s,
            group: &g,
        };
        let items = vec![item(1, "<b>Bold</b>", "<i>lean</i> & mean")];
        let html = BaselineRenderer::default().html(&ctx, &items);

        assert!(html.contains("<h2>Bold</h2>"));
        assert!(!html.contains("<b>"));
        assert!(html.contains("&lt;i&gt;lean&lt;/i&gt; &amp; mean"));
        assert_eq!(html.matches("<article>").count(), 1);
    }

    #[test]
    fn rendering_is_deterministic() {
        let (s, g) = (source(), group());
        let ctx = RenderContext {
            source: &s,
            group: &g,
        };
        let items = vec![item(1, "One", "a"), item(2, "Two", "b")];
        let r = BaselineRenderer::default();
        assert_eq!(r.subject(&ctx, &items), r.subject(&ctx, &items));
        assert_eq!(r.html(&ctx, &items), r.html(&ctx, &items));
        assert_eq!(r.html(&ctx, &items).matches("<article>").count(), 2);
    }

    #[test]
    fn link_text_option_overrides_default() {
        let (s, g) = (source(), group());
        let ctx = RenderContext {
            source: &s,
            group: &g,
        };
        let mut opts = RendererOptions::new();
        opts.insert("link_text".into(), "More".into());
        let html = BaselineRenderer::from_options(&opts).html(&ctx, &[item(5, "x", "y")]);
        assert!(html.contains(">More</a>"));

        opts.insert("link_text".into(), "   ".into());
        assert_eq!(BaselineRenderer::from_options(&opts), BaselineRenderer::default());
    }
}

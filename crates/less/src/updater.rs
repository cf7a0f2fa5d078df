use crate::style_id::style_id;
use async_trait::async_trait;
use livedev_clients::{DocumentUpdate, Session, UpdateError, Updater};
use livedev_protocol::{NodeId, ProtocolError, RemoteTransport};

/// Links the LESS browser runtime compiles into `<style>` elements.
pub const LESS_LINK_SELECTOR: &str = r#"link[rel="stylesheet/less"]"#;

/// Replaces the `<style>` element the LESS runtime generated for a
/// stylesheet with freshly compiled CSS.
///
/// Needs the `css` of a compiling analyzer in the document's analysis.
#[derive(Debug, Default, Clone, Copy)]
pub struct StyleUpdater;

impl StyleUpdater {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Updater for StyleUpdater {
    async fn update(&self, update: &DocumentUpdate, session: &Session) -> Result<(), UpdateError> {
        let transport = session.transport();
        if !transport.was_url_requested(&update.url) {
            return Err(UpdateError::failed("URL not requested"));
        }

        let style_id = find_style_id(transport, &update.url)
            .await?
            .ok_or_else(|| UpdateError::failed("Style ID attribute not found"))?;
        let node = find_style_node(transport, &style_id)
            .await?
            .ok_or_else(|| UpdateError::failed("Style ID node not found"))?;
        let css = update
            .analysis
            .as_deref()
            .and_then(|analysis| analysis.css())
            .ok_or_else(|| UpdateError::failed(format!("no compiled CSS for {}", update.url)))?;

        let html = format!(
            r#"<style type="text/css" id="{}">{css}</style>"#,
            html_escape(&style_id)
        );
        transport
            .replace_node_content(node, &html)
            .await
            .map_err(transport_error)?;
        log::debug!("{}: replaced {node} ({style_id})", session.id());
        Ok(())
    }
}

async fn find_style_id(
    transport: &dyn RemoteTransport,
    url: &str,
) -> Result<Option<String>, UpdateError> {
    let links = transport
        .find_nodes_matching(LESS_LINK_SELECTOR)
        .await
        .map_err(transport_error)?;

    for link in links {
        // The href property is absolute, unlike the attribute.
        let properties = transport.node_properties(link).await.map_err(transport_error)?;
        let Some(href) = properties.get("href") else {
            continue;
        };
        if href == url {
            let title = properties.get("title").map(String::as_str);
            return Ok(Some(style_id(title, href)));
        }
    }
    Ok(None)
}

async fn find_style_node(
    transport: &dyn RemoteTransport,
    style_id: &str,
) -> Result<Option<NodeId>, UpdateError> {
    let selector = format!(r#"style[id="{}"]"#, style_id.replace('"', "\\\""));
    let nodes = transport
        .find_nodes_matching(&selector)
        .await
        .map_err(transport_error)?;
    if nodes.len() > 1 {
        log::warn!("Found more than one style tag with ID {style_id}");
    }
    Ok(nodes.first().copied())
}

fn transport_error(err: ProtocolError) -> UpdateError {
    UpdateError::failed(err.to_string())
}

fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_attribute_values() {
        assert_eq!(html_escape(r#"less:a"b<c>&'"#), "less:a&quot;b&lt;c&gt;&amp;&#39;");
    }
}

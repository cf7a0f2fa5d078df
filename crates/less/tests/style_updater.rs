use async_trait::async_trait;
use livedev_clients::{ClientDescriptor, ClientRegistry, DocumentUpdate, Session, UpdateError, Updater};
use livedev_less::{StyleUpdater, LANGUAGE, LESS_LINK_SELECTOR};
use livedev_protocol::{
    AnalysisResult, LanguageId, MemoryDocument, NodeId, ProjectUrls, RemoteTransport, StaticServer, CSS,
};
use std::path::Path;
use pretty_assertions::assert_eq;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

const URL: &str = "http://localhost:8080/styles/main.less";

/// A page with LESS links and the style elements the runtime generated.
#[derive(Default)]
struct FakePage {
    requested: HashSet<String>,
    links: Vec<(NodeId, HashMap<String, String>)>,
    styles: HashMap<String, Vec<NodeId>>,
    queries: Mutex<Vec<String>>,
    replaced: Mutex<Vec<(NodeId, String)>>,
}

impl FakePage {
    fn with_link(mut self, node: u64, href: &str, title: Option<&str>) -> Self {
        let mut properties = HashMap::from([("href".to_string(), href.to_string())]);
        if let Some(title) = title {
            properties.insert("title".to_string(), title.to_string());
        }
        self.requested.insert(href.to_string());
        self.links.push((NodeId(node), properties));
        self
    }

    fn with_style(mut self, id: &str, node: u64) -> Self {
        self.styles.entry(id.to_string()).or_default().push(NodeId(node));
        self
    }
}

#[async_trait]
impl RemoteTransport for FakePage {
    async fn find_nodes_matching(&self, selector: &str) -> livedev_protocol::Result<Vec<NodeId>> {
        self.queries.lock().unwrap().push(selector.to_string());
        if selector == LESS_LINK_SELECTOR {
            return Ok(self.links.iter().map(|(node, _)| *node).collect());
        }
        let id = selector
            .strip_prefix("style[id=\"")
            .and_then(|rest| rest.strip_suffix("\"]"))
            .map(|id| id.replace("\\\"", "\""))
            .unwrap_or_default();
        Ok(self.styles.get(&id).cloned().unwrap_or_default())
    }

    async fn node_properties(
        &self,
        node: NodeId,
    ) -> livedev_protocol::Result<HashMap<String, String>> {
        Ok(self
            .links
            .iter()
            .find(|(candidate, _)| *candidate == node)
            .map(|(_, properties)| properties.clone())
            .unwrap_or_default())
    }

    async fn replace_node_content(&self, node: NodeId, html: &str) -> livedev_protocol::Result<()> {
        self.replaced.lock().unwrap().push((node, html.to_string()));
        Ok(())
    }

    fn was_url_requested(&self, url: &str) -> bool {
        self.requested.contains(url)
    }
}

async fn session_on(page: Arc<FakePage>) -> Arc<Session> {
    let registry = ClientRegistry::new();
    let client = registry
        .register_client(
            ClientDescriptor::new("chrome", "Google Chrome")
                .with_updater(LANGUAGE, Arc::new(StyleUpdater::new())),
        )
        .unwrap();
    client.connect(page).await.unwrap()
}

fn update_with_css(css: Option<&str>) -> DocumentUpdate {
    let analysis = css.map(|css| Arc::new(AnalysisResult::new().with(CSS, css)));
    DocumentUpdate {
        document: MemoryDocument::new("/site/styles/main.less", "a { color: red }"),
        url: URL.to_string(),
        language: LanguageId::new(LANGUAGE),
        analysis,
    }
}

#[tokio::test]
async fn replaces_the_generated_style_element() {
    let page = Arc::new(
        FakePage::default()
            .with_link(1, "http://localhost:8080/styles/other.less", None)
            .with_link(2, URL, None)
            .with_style("less:styles-main", 7),
    );
    let session = session_on(page.clone()).await;

    StyleUpdater
        .update(&update_with_css(Some("a{color:red}")), &session)
        .await
        .unwrap();

    assert_eq!(
        page.replaced.lock().unwrap().clone(),
        vec![(
            NodeId(7),
            r#"<style type="text/css" id="less:styles-main">a{color:red}</style>"#.to_string()
        )]
    );
}

#[tokio::test]
async fn link_title_names_the_style_and_is_escaped() {
    let page = Arc::new(
        FakePage::default()
            .with_link(2, URL, Some("say \"hi\""))
            .with_style("less:say \"hi\"", 9),
    );
    let session = session_on(page.clone()).await;

    StyleUpdater
        .update(&update_with_css(Some("b{}")), &session)
        .await
        .unwrap();

    assert!(page
        .queries
        .lock()
        .unwrap()
        .contains(&r#"style[id="less:say \"hi\""]"#.to_string()));
    assert_eq!(
        page.replaced.lock().unwrap()[0].1,
        r#"<style type="text/css" id="less:say &quot;hi&quot;">b{}</style>"#
    );
}

#[tokio::test]
async fn unrequested_url_is_rejected_before_any_query() {
    let page = Arc::new(FakePage::default());
    let session = session_on(page.clone()).await;

    let err = StyleUpdater
        .update(&update_with_css(Some("a{}")), &session)
        .await
        .unwrap_err();

    assert_eq!(err, UpdateError::failed("URL not requested"));
    assert!(page.queries.lock().unwrap().is_empty());
}

#[tokio::test]
async fn missing_pieces_fail_distinctly() {
    // Requested, but no link points at it.
    let mut no_link = FakePage::default().with_link(1, "http://localhost:8080/other.less", None);
    no_link.requested.insert(URL.to_string());
    let session = session_on(Arc::new(no_link)).await;
    let err = StyleUpdater
        .update(&update_with_css(Some("a{}")), &session)
        .await
        .unwrap_err();
    assert_eq!(err, UpdateError::failed("Style ID attribute not found"));

    let no_style = FakePage::default().with_link(2, URL, None);
    let session = session_on(Arc::new(no_style)).await;
    let err = StyleUpdater
        .update(&update_with_css(Some("a{}")), &session)
        .await
        .unwrap_err();
    assert_eq!(err, UpdateError::failed("Style ID node not found"));

    let no_css = FakePage::default()
        .with_link(2, URL, None)
        .with_style("less:styles-main", 7);
    let session = session_on(Arc::new(no_css)).await;
    let err = StyleUpdater
        .update(&update_with_css(None), &session)
        .await
        .unwrap_err();
    assert_eq!(err, UpdateError::failed(format!("no compiled CSS for {URL}")));
}

#[tokio::test]
async fn duplicate_style_elements_use_the_first() {
    let page = Arc::new(
        FakePage::default()
            .with_link(2, URL, None)
            .with_style("less:styles-main", 7)
            .with_style("less:styles-main", 8),
    );
    let session = session_on(page.clone()).await;

    StyleUpdater
        .update(&update_with_css(Some("a{}")), &session)
        .await
        .unwrap();

    assert_eq!(page.replaced.lock().unwrap()[0].0, NodeId(7));
}

#[tokio::test]
async fn finds_the_link_of_a_file_whose_name_needs_escaping() {
    let urls = ProjectUrls::new("http://localhost:8080/", "/site");
    let path = Path::new("/site/styles/my theme.less");
    // Browsers report the resolved, percent-encoded href.
    let href = "http://localhost:8080/styles/my%20theme.less";
    let page = Arc::new(
        FakePage::default()
            .with_link(3, href, None)
            .with_style("less:styles-my-20theme", 11),
    );
    let session = session_on(page.clone()).await;

    let update = DocumentUpdate {
        document: MemoryDocument::new(path, "a {}"),
        url: urls.url_for_path(path),
        language: LanguageId::new(LANGUAGE),
        analysis: Some(Arc::new(AnalysisResult::new().with(CSS, "a{}"))),
    };
    StyleUpdater.update(&update, &session).await.unwrap();

    assert_eq!(page.replaced.lock().unwrap()[0].0, NodeId(11));
}

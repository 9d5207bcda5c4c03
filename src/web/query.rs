//! One pass of the search page: read the sidebar settings, run the query
//! and build the view model that [`super::render`] turns into HTML.

use std::fmt::Write;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

use super::state::AppState;
use crate::config::Config;
use crate::indexer::images::is_safe_image_id;
use crate::store::{Collection, Document, search_documents};

/// Query string of `GET /`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub mode: Collection,
    #[serde(default)]
    pub q: String,
    /// Present (as `on`) when the rebuild checkbox was ticked.
    pub rebuild: Option<String>,
    /// Requested result count; unparsable values count as absent.
    #[serde(default, deserialize_with = "lenient_int")]
    pub k: Option<i64>,
}

fn lenient_int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|s| s.trim().parse().ok()))
}

impl SearchParams {
    #[must_use]
    pub fn rebuild_requested(&self) -> bool {
        matches!(self.rebuild.as_deref(), Some("on" | "true" | "1"))
    }

    /// Result count clamped to `[1, max_top_k]`; `search_top_k` when absent.
    #[must_use]
    pub fn top_k(&self, config: &Config) -> usize {
        let k = match self.k {
            Some(k) => usize::try_from(k).unwrap_or(0),
            None => config.search_top_k,
        };
        config.clamp_top_k(k)
    }

    /// URL of this page with the rebuild flag dropped.
    #[must_use]
    pub fn results_url(&self) -> String {
        let mut url = format!("/?mode={}", self.mode);
        if let Some(k) = self.k {
            let _ = write!(url, "&k={k}");
        }
        if !self.q.is_empty() {
            let _ = write!(url, "&q={}", urlencoding::encode(&self.q));
        }
        url
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// No query yet.
    Prompt,
    /// PM-JAY mode selected before that store finished loading.
    NotLoaded,
    Results { collection: String, hits: Vec<Hit> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub rank: usize,
    /// Page number, or `N/A` when the document has none.
    pub page: String,
    pub content: String,
    pub metadata_json: String,
    pub image: Option<ImageView>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageView {
    Found { url: String },
    Missing,
}

impl Hit {
    fn from_document(rank: usize, doc: Document, image_store: &Path) -> Result<Self> {
        let page = match doc.page() {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "N/A".to_string(),
        };

        let image = doc.image_id().map(|id| {
            if is_safe_image_id(id) && image_store.join(id).is_file() {
                ImageView::Found {
                    url: format!("/images/{}", urlencoding::encode(id)),
                }
            } else {
                debug!("Image {id} not in {}", image_store.display());
                ImageView::Missing
            }
        });

        Ok(Self {
            rank,
            page,
            metadata_json: serde_json::to_string_pretty(&doc.metadata)?,
            content: doc.page_content.trim().to_string(),
            image,
        })
    }
}

/// Run one page request. An empty query or an unloaded PM-JAY store stop
/// before any search is made. The rebuild flag is handled by the caller.
pub async fn handle_query(state: &AppState, params: &SearchParams) -> Result<SearchOutcome> {
    if params.q.trim().is_empty() {
        return Ok(SearchOutcome::Prompt);
    }

    let Some(store) = state.store(params.mode).await else {
        return Ok(SearchOutcome::NotLoaded);
    };

    let k = params.top_k(&state.config);
    let docs = search_documents(&store, &params.q, k).await?;

    let image_store = state.config.image_store_dir();
    let hits = docs
        .into_iter()
        .enumerate()
        .map(|(i, doc)| Hit::from_document(i + 1, doc, &image_store))
        .collect::<Result<Vec<_>>>()?;

    Ok(SearchOutcome::Results {
        collection: store.name().to_string(),
        hits,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::web::state::testing::loaded_state;
    use crate::web::state::testing::RecordingLoader;
    use serde_json::{Map, json};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn doc(text: &str, page: Option<u32>, image_id: Option<&str>) -> Document {
        let mut meta = Map::new();
        if let Some(page) = page {
            meta.insert("page".into(), json!(page));
        }
        if let Some(id) = image_id {
            meta.insert("image_id".into(), json!(id));
        }
        Document::new(text, meta)
    }

    async fn seed(state: &AppState, collection: Collection, docs: &[Document]) {
        let store = state.store(collection).await.unwrap();
        store.add_documents("seed.pdf", docs).await.unwrap();
    }

    fn params(mode: Collection, q: &str, k: Option<i64>) -> SearchParams {
        SearchParams {
            mode,
            q: q.to_string(),
            rebuild: None,
            k,
        }
    }

    #[tokio::test]
    async fn test_empty_query_prompts_without_search() {
        let (state, loader) = loaded_state(Config::default()).await;
        seed(&state, Collection::Text, &[doc("HTML basics", Some(1), None)]).await;

        for q in ["", "   ", "\t\n"] {
            let outcome = handle_query(&state, &params(Collection::Text, q, None)).await.unwrap();
            assert_eq!(outcome, SearchOutcome::Prompt);
        }
        assert_eq!(loader.embedder.query_count(), 0);
    }

    #[tokio::test]
    async fn test_pmjay_not_loaded_halts() {
        let loader = Arc::new(RecordingLoader::new());
        let (state, _) = AppState::startup(Arc::new(Config::default()), loader.clone(), false, false)
            .await
            .unwrap();

        let outcome = handle_query(&state, &params(Collection::Pmjay, "ayushman card", None))
            .await
            .unwrap();
        assert_eq!(outcome, SearchOutcome::NotLoaded);
        assert_eq!(loader.embedder.query_count(), 0);
    }

    #[tokio::test]
    async fn test_result_count_clamped() {
        let (state, _) = loaded_state(Config::default()).await;
        let docs: Vec<Document> = (1..=12)
            .map(|i| doc(&format!("CSS rule number {i}"), Some(i), None))
            .collect();
        seed(&state, Collection::Text, &docs).await;

        for (k, expected) in [
            (Some(-3), 1),
            (Some(0), 1),
            (Some(3), 3),
            (Some(10), 10),
            (Some(50), 10),
            (None, 5),
        ] {
            let SearchOutcome::Results { hits, collection } =
                handle_query(&state, &params(Collection::Text, "css rule", k)).await.unwrap()
            else {
                panic!("expected results for k={k:?}");
            };
            assert_eq!(hits.len(), expected, "k={k:?}");
            assert_eq!(collection, "HTML & CSS documents");
            let ranks: Vec<usize> = hits.iter().map(|h| h.rank).collect();
            assert_eq!(ranks, (1..=expected).collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn test_images_found_or_missing() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("card_p2_0.jpg"), [0xFF, 0xD8, 0xFF, 0xD9]).unwrap();
        let mut config = Config::default();
        config.image_store = dir.path().to_string_lossy().to_string();

        let (state, _) = loaded_state(config).await;
        seed(
            &state,
            Collection::Pmjay,
            &[
                doc("Ayushman card front", Some(2), Some("card_p2_0.jpg")),
                doc("Ayushman card back", Some(3), Some("card_p3_0.jpg")),
                doc("Ayushman card eligibility", None, None),
            ],
        )
        .await;

        let SearchOutcome::Results { hits, collection } =
            handle_query(&state, &params(Collection::Pmjay, "ayushman card", Some(10)))
                .await
                .unwrap()
        else {
            panic!("expected results");
        };
        assert_eq!(collection, "PM-JAY multimodal documents");
        assert_eq!(hits.len(), 3);

        let by_content = |c: &str| hits.iter().find(|h| h.content == c).unwrap();
        assert_eq!(
            by_content("Ayushman card front").image,
            Some(ImageView::Found {
                url: "/images/card_p2_0.jpg".into()
            })
        );
        assert_eq!(by_content("Ayushman card back").image, Some(ImageView::Missing));

        let plain = by_content("Ayushman card eligibility");
        assert_eq!(plain.image, None);
        assert_eq!(plain.page, "N/A");
        assert!(plain.metadata_json.contains("\"score\""));
    }

    #[tokio::test]
    async fn test_query_ignores_rebuild_flag() {
        let (state, loader) = loaded_state(Config::default()).await;
        seed(&state, Collection::Text, &[doc("HTML basics", Some(1), None)]).await;
        let calls_before = loader.calls().len();

        let mut request = params(Collection::Text, "html", None);
        request.rebuild = Some("on".into());
        let SearchOutcome::Results { hits, .. } = handle_query(&state, &request).await.unwrap() else {
            panic!("expected results");
        };

        assert_eq!(hits.len(), 1);
        assert_eq!(loader.calls().len(), calls_before);
    }

    fn parse(uri: &str) -> SearchParams {
        let uri: axum::http::Uri = uri.parse().unwrap();
        axum::extract::Query::<SearchParams>::try_from_uri(&uri).unwrap().0
    }

    #[test]
    fn test_k_parsed_leniently() {
        let config = Config::default();
        assert_eq!(parse("/?k=-3").top_k(&config), 1);
        assert_eq!(parse("/?k=").top_k(&config), 5);
        assert_eq!(parse("/?k=abc").top_k(&config), 5);
        assert_eq!(parse("/?k=%207").top_k(&config), 7);
        assert_eq!(parse("/?k=99").top_k(&config), 10);
        assert_eq!(parse("/?mode=pmjay&q=card").top_k(&config), 5);
    }

    #[test]
    fn test_results_url_drops_rebuild() {
        let request = parse("/?mode=pmjay&rebuild=on&k=3&q=ayushman+card%3F");
        assert!(request.rebuild_requested());

        let url = request.results_url();
        assert_eq!(url, "/?mode=pmjay&k=3&q=ayushman%20card%3F");

        let again = parse(&url);
        assert!(!again.rebuild_requested());
        assert_eq!(again.q, "ayushman card?");
        assert_eq!(again.mode, Collection::Pmjay);
    }

    #[test]
    fn test_rebuild_flag_values() {
        let mut p = SearchParams::default();
        assert!(!p.rebuild_requested());
        p.rebuild = Some("on".into());
        assert!(p.rebuild_requested());
        p.rebuild = Some("off".into());
        assert!(!p.rebuild_requested());
    }
}

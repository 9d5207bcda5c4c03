//! HTML for the search page.

use std::fmt::Write;

use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};

use super::query::{Hit, ImageView, SearchOutcome, SearchParams};
use crate::store::Collection;

pub const PAGE_TITLE: &str = "RAG Search - Neon Style";
pub const QUERY_PLACEHOLDER: &str = "e.g. What is HTML?  or  How to apply Ayushman card?";

pub const MSG_PROMPT: &str = "Enter your question above to start searching.";
pub const MSG_NOT_LOADED: &str = "PM-JAY vector store not loaded yet.";
pub const MSG_NO_RESULTS: &str = "No relevant documents found.";
pub const MSG_IMAGE_MISSING: &str = "Image file not found";

const STYLE: &str = r#"
body { margin: 0; display: flex; min-height: 100vh; font-family: system-ui, sans-serif;
       background: #05050a; color: #e0e0ff; }
aside { width: 18rem; padding: 1.5rem; background: #0d0d1a; border-right: 1px solid #1f1f3a; }
main { flex: 1; padding: 2rem 3rem; max-width: 60rem; }
fieldset { border: none; padding: 0; margin: 0 0 1.25rem; }
legend, label.field { display: block; margin-bottom: .4rem; font-weight: 600; }
input[type=text] { width: 100%; box-sizing: border-box; padding: .6rem .8rem; font-size: 1rem;
                   background: #1a1a2e; color: white; border: 1px solid #2c2c4a; border-radius: 8px; }
button { margin-top: .75rem; padding: .5rem 1.25rem; background: #3b3bff; color: white;
         border: none; border-radius: 8px; cursor: pointer; }
details { background: #10101f; border: 1px solid #24244a; border-radius: 8px;
          margin: .75rem 0; padding: .5rem .9rem; }
details details { background: #0a0a16; }
summary { cursor: pointer; font-weight: 600; }
pre { white-space: pre-wrap; word-break: break-word; }
img { max-width: 100%; border-radius: 6px; }
.info, .warning, .error { padding: .75rem 1rem; border-radius: 8px; margin: 1rem 0; }
.info { background: #102a43; }
.warning { background: #3d3200; }
.error { background: #4a1010; }
.caption { color: #9a9ac0; font-size: .9rem; }
"#;

/// Render the whole page. `k` is the clamped result count shown on the
/// slider; the rebuild checkbox always comes back unticked.
#[must_use]
pub fn render_page(params: &SearchParams, k: usize, max_k: usize, outcome: &SearchOutcome) -> String {
    let mut html = String::with_capacity(8 * 1024);

    let _ = write!(
        html,
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<style>{STYLE}</style>
</head>
<body>
<form method="get" action="/" id="search">
"#,
        title = text(PAGE_TITLE),
    );

    render_sidebar(&mut html, params.mode, k, max_k);

    let _ = write!(
        html,
        r#"<main>
<h1>&#128269; RAG Document Search</h1>
<p>Ask questions about <strong>HTML/CSS</strong> or <strong>PM-JAY documents</strong></p>
<label class="field" for="q">Your question:</label>
<input type="text" id="q" name="q" value="{value}" placeholder="{placeholder}" autofocus>
<button type="submit">Search</button>
"#,
        value = attr(&params.q),
        placeholder = attr(QUERY_PLACEHOLDER),
    );

    render_outcome(&mut html, outcome);

    html.push_str("</main>\n</form>\n</body>\n</html>\n");
    html
}

fn render_sidebar(html: &mut String, mode: Collection, k: usize, max_k: usize) {
    html.push_str("<aside>\n<h2>Settings</h2>\n<fieldset>\n<legend>Search Type</legend>\n");
    for collection in Collection::ALL {
        let checked = if collection == mode { " checked" } else { "" };
        let _ = writeln!(
            html,
            r#"<label><input type="radio" name="mode" value="{value}"{checked} onchange="this.form.submit()"> {label}</label><br>"#,
            value = collection.as_str(),
            label = text(collection.label()),
        );
    }
    html.push_str("</fieldset>\n");

    html.push_str(
        "<fieldset>\n<label><input type=\"checkbox\" name=\"rebuild\" value=\"on\"> Rebuild vector store (slow)</label>\n</fieldset>\n",
    );

    let _ = write!(
        html,
        r#"<fieldset>
<label class="field" for="k">Number of results</label>
<input type="range" id="k" name="k" min="1" max="{max_k}" value="{k}" oninput="this.nextElementSibling.value = this.value">
<output>{k}</output>
</fieldset>
</aside>
"#,
    );
}

fn render_outcome(html: &mut String, outcome: &SearchOutcome) {
    match outcome {
        SearchOutcome::Prompt => {
            let _ = writeln!(html, r#"<div class="info">{MSG_PROMPT}</div>"#);
        }
        SearchOutcome::NotLoaded => {
            let _ = writeln!(html, r#"<div class="error">{MSG_NOT_LOADED}</div>"#);
        }
        SearchOutcome::Results { collection, hits } => {
            let _ = writeln!(html, "<h2>Results from: {}</h2>", text(collection));
            if hits.is_empty() {
                let _ = writeln!(html, r#"<div class="warning">{MSG_NO_RESULTS}</div>"#);
            }
            for hit in hits {
                render_hit(html, hit);
            }
        }
    }
}

fn render_hit(html: &mut String, hit: &Hit) {
    let _ = write!(
        html,
        r#"<details class="result">
<summary>Result {rank} &#8211; Page {page}</summary>
<p><strong>Content:</strong></p>
<pre>{content}</pre>
<details>
<summary>Metadata</summary>
<pre>{metadata}</pre>
</details>
"#,
        rank = hit.rank,
        page = text(&hit.page),
        content = text(&hit.content),
        metadata = text(&hit.metadata_json),
    );

    match &hit.image {
        Some(ImageView::Found { url }) => {
            let _ = write!(
                html,
                r#"<figure><img src="{src}" alt="Extracted image"><figcaption class="caption">Extracted image</figcaption></figure>
"#,
                src = attr(url),
            );
        }
        Some(ImageView::Missing) => {
            let _ = writeln!(html, r#"<p class="caption">{MSG_IMAGE_MISSING}</p>"#);
        }
        None => {}
    }

    html.push_str("</details>\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(rank: usize, image: Option<ImageView>) -> Hit {
        Hit {
            rank,
            page: "3".into(),
            content: "Use <div> for blocks & more".into(),
            metadata_json: "{\n  \"page\": 3\n}".into(),
            image,
        }
    }

    #[test]
    fn test_prompt_page_has_controls() {
        let params = SearchParams::default();
        let html = render_page(&params, 5, 10, &SearchOutcome::Prompt);

        assert!(html.contains("<title>RAG Search - Neon Style</title>"));
        assert!(html.contains("Your question:"));
        assert!(html.contains(r#"placeholder="e.g. What is HTML?  or  How to apply Ayushman card?""#));
        assert!(html.contains(r#"value="text" checked"#));
        assert!(html.contains("Multimodal PM-JAY"));
        assert!(html.contains("Text documents (HTML/CSS)"));
        assert!(html.contains("Rebuild vector store (slow)"));
        assert!(html.contains(r#"min="1" max="10" value="5""#));
        assert!(html.contains(MSG_PROMPT));
    }

    #[test]
    fn test_rebuild_checkbox_never_ticked() {
        let params = SearchParams {
            rebuild: Some("on".into()),
            ..SearchParams::default()
        };
        let html = render_page(&params, 5, 10, &SearchOutcome::Prompt);
        assert!(html.contains(r#"<input type="checkbox" name="rebuild" value="on">"#));
    }

    #[test]
    fn test_results_escaped_with_images() {
        let params = SearchParams {
            mode: Collection::Pmjay,
            q: "\"card\" <b>".into(),
            ..SearchParams::default()
        };
        let outcome = SearchOutcome::Results {
            collection: "PM-JAY multimodal documents".into(),
            hits: vec![
                hit(
                    1,
                    Some(ImageView::Found {
                        url: "/images/card_p3_0.jpg".into(),
                    }),
                ),
                hit(2, Some(ImageView::Missing)),
                hit(3, None),
            ],
        };
        let html = render_page(&params, 3, 10, &outcome);

        assert!(html.contains("Results from: PM-JAY multimodal documents"));
        assert!(html.contains("Result 1 &#8211; Page 3"));
        assert!(html.contains("Result 3 &#8211; Page 3"));
        assert!(html.contains("Use &lt;div&gt; for blocks &amp; more"));
        assert!(html.contains(r#"value="&quot;card&quot; "#));
        assert!(html.contains(r#"value="pmjay" checked"#));
        assert!(html.contains(r#"<img src="/images/card_p3_0.jpg""#));
        assert_eq!(html.matches(MSG_IMAGE_MISSING).count(), 1);
        assert_eq!(html.matches("<details class=\"result\">").count(), 3);
    }

    #[test]
    fn test_messages() {
        let params = SearchParams::default();
        assert!(render_page(&params, 5, 10, &SearchOutcome::NotLoaded).contains(MSG_NOT_LOADED));

        let empty = SearchOutcome::Results {
            collection: "HTML & CSS documents".into(),
            hits: Vec::new(),
        };
        let html = render_page(&params, 5, 10, &empty);
        assert!(html.contains("Results from: HTML &amp; CSS documents"));
        assert!(html.contains(MSG_NO_RESULTS));
    }
}

//! Pulls feed nodes and detail fields out of fetched pages.

use crate::models::{ListingDetail, RawNode};
use anyhow::{anyhow, Result};
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;

const FEED_KEY: &str = "marketplace_search";

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("Invalid selector {}: {:?}", css, e))
}

/// Feed nodes from a search response.
///
/// The body may be the JSON payload itself or an HTML page with the payload
/// embedded in `application/json` script tags. `None` means no feed was found.
pub fn extract_nodes(body: &str) -> Result<Option<Vec<RawNode>>> {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        return Ok(nodes_from_value(&value));
    }

    let document = Html::parse_document(body);
    let scripts = selector(r#"script[type="application/json"]"#)?;

    for script in document.select(&scripts) {
        let text = script.text().collect::<String>();
        if !text.contains(FEED_KEY) {
            continue;
        }
        match serde_json::from_str::<Value>(&text) {
            Ok(value) => {
                if let Some(nodes) = nodes_from_value(&value) {
                    return Ok(Some(nodes));
                }
            }
            Err(e) => debug!("Skipping unparseable feed script: {}", e),
        }
    }

    Ok(None)
}

fn nodes_from_value(value: &Value) -> Option<Vec<RawNode>> {
    let search = find_key(value, FEED_KEY)?;
    let edges = search.pointer("/feed_units/edges")?.as_array()?;

    let nodes = edges
        .iter()
        .filter_map(|edge| edge.get("node"))
        .filter_map(|node| match serde_json::from_value::<RawNode>(node.clone()) {
            Ok(node) => Some(node),
            Err(e) => {
                debug!("Skipping malformed feed node: {}", e);
                None
            }
        })
        .collect();

    Some(nodes)
}

/// Depth-first search for the first object field named `key`
fn find_key<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map
            .get(key)
            .or_else(|| map.values().find_map(|v| find_key(v, key))),
        Value::Array(items) => items.iter().find_map(|v| find_key(v, key)),
        _ => None,
    }
}

/// Description and image from a listing page's meta tags
pub fn parse_detail(html: &str) -> Result<ListingDetail> {
    let document = Html::parse_document(html);

    let meta_content = |css: &str| -> Result<Option<String>> {
        let sel = selector(css)?;
        Ok(document
            .select(&sel)
            .filter_map(|el| el.value().attr("content"))
            .map(|c| c.trim().to_string())
            .find(|c| !c.is_empty()))
    };

    let description = match meta_content(r#"meta[property="og:description"]"#)? {
        Some(d) => d,
        None => meta_content(r#"meta[name="description"]"#)?.unwrap_or_default(),
    };
    let image = meta_content(r#"meta[property="og:image"]"#)?.unwrap_or_default();

    Ok(ListingDetail { description, image })
}

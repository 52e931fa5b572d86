//! Request classification.

use serde::{Deserialize, Serialize};

use crate::http::{Destination, Request, RequestMode};

/// Class of an intercepted request; selects the retrieval strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResourceClass {
    /// Documents: network first, cache fallback.
    Navigation,
    /// Data files: served from cache, refreshed in the background.
    DataResource,
    /// Everything else: cache first.
    StaticAsset,
}

/// Classify a request. Returns `None` for anything but GET, which the proxy
/// passes straight to the network.
///
/// Pure: depends only on the request and the configured data extensions.
pub fn classify(request: &Request, data_extensions: &[String]) -> Option<ResourceClass> {
    if !request.is_get() {
        return None;
    }

    let path = request.url.path().to_ascii_lowercase();

    if path == "/"
        || path.ends_with(".html")
        || request.destination == Destination::Document
        || request.mode == RequestMode::Navigate
    {
        return Some(ResourceClass::Navigation);
    }

    if request.destination == Destination::Json || data_extensions.iter().any(|ext| path.ends_with(ext.as_str())) {
        return Some(ResourceClass::DataResource);
    }

    Some(ResourceClass::StaticAsset)
}

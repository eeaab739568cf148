//! Query-parameter option sets for API server requests
//!
//! Empty string and zero values are omitted from the query, matching how the
//! API machinery codecs encode these option structs.

/// Types that encode themselves as URL query parameters.
pub trait QueryParams {
    /// Append this option set's non-empty parameters to `params`.
    fn append_to(&self, params: &mut Vec<(String, String)>);
}

/// Options for a single-object GET.
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    /// Resource version: "0" allows a stale read from the watch cache, an
    /// empty string demands a consistent (quorum) read.
    pub resource_version: String,
}

impl QueryParams for GetOptions {
    fn append_to(&self, params: &mut Vec<(String, String)>) {
        if !self.resource_version.is_empty() {
            params.push(("resourceVersion".to_string(), self.resource_version.clone()));
        }
    }
}

/// Options for collection LIST and WATCH requests.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Label selector.
    pub label_selector: String,
    /// Field selector.
    pub field_selector: String,
    /// Resource version; same semantics as [`GetOptions::resource_version`].
    pub resource_version: String,
    /// Page size; zero disables pagination.
    pub limit: i64,
    /// Request a watch stream instead of a plain list.
    pub watch: bool,
    /// Ask the server to stream the initial state before updates
    /// (watch-list).
    pub send_initial_events: Option<bool>,
    /// Resource version match semantics, e.g. "NotOlderThan".
    pub resource_version_match: String,
    /// Allow the server to send bookmark events.
    pub allow_watch_bookmarks: bool,
}

impl QueryParams for ListOptions {
    fn append_to(&self, params: &mut Vec<(String, String)>) {
        if !self.label_selector.is_empty() {
            params.push(("labelSelector".to_string(), self.label_selector.clone()));
        }
        if !self.field_selector.is_empty() {
            params.push(("fieldSelector".to_string(), self.field_selector.clone()));
        }
        if !self.resource_version.is_empty() {
            params.push(("resourceVersion".to_string(), self.resource_version.clone()));
        }
        if self.limit > 0 {
            params.push(("limit".to_string(), self.limit.to_string()));
        }
        if self.watch {
            params.push(("watch".to_string(), "true".to_string()));
        }
        if let Some(send_initial_events) = self.send_initial_events {
            params.push((
                "sendInitialEvents".to_string(),
                send_initial_events.to_string(),
            ));
        }
        if !self.resource_version_match.is_empty() {
            params.push((
                "resourceVersionMatch".to_string(),
                self.resource_version_match.clone(),
            ));
        }
        if self.allow_watch_bookmarks {
            params.push(("allowWatchBookmarks".to_string(), "true".to_string()));
        }
    }
}

/// Options for pod log retrieval.
#[derive(Debug, Clone, Default)]
pub struct PodLogOptions {
    /// Container to stream logs from.
    pub container: String,
    /// Number of lines from the end of the logs, if set.
    pub tail_lines: Option<i64>,
    /// Byte cap on the log output, if set.
    pub limit_bytes: Option<i64>,
}

impl QueryParams for PodLogOptions {
    fn append_to(&self, params: &mut Vec<(String, String)>) {
        if !self.container.is_empty() {
            params.push(("container".to_string(), self.container.clone()));
        }
        if let Some(tail_lines) = self.tail_lines {
            params.push(("tailLines".to_string(), tail_lines.to_string()));
        }
        if let Some(limit_bytes) = self.limit_bytes {
            params.push(("limitBytes".to_string(), limit_bytes.to_string()));
        }
    }
}

//! Shared constants for end-to-end tests

// ============================================================================
// Asset cache
// ============================================================================

/// Origin the application shell is served from in tests. Never resolved,
/// all network access goes through `MockFetcher`.
pub const ORIGIN: &str = "http://app.local/";

pub const CACHE_PREFIX: &str = "sheetmusic-cache-";

/// Shell assets, as listed in the scenario the cache has to survive.
pub const SHELL_ASSETS: &[&str] = &["./index.html", "./app.js"];

pub const INDEX_HTML: &str = "<!doctype html><title>Sheet music</title>";
pub const APP_JS: &str = "import './db.js';";

// ============================================================================
// Clock
// ============================================================================

/// What `FixedClock` reports until moved.
pub const START_TIME: &str = "2026-03-01T09:00:00Z";

//! Metrics definitions for the upload relay.

use shared::metrics_defs::{MetricDef, MetricType};

pub const CREDENTIALS_CACHE_HIT: MetricDef = MetricDef {
    name: "credentials.cache.hit",
    metric_type: MetricType::Counter,
    description: "Number of credential lookups served from a fresh cache entry",
};

pub const CREDENTIALS_CACHE_MISS: MetricDef = MetricDef {
    name: "credentials.cache.miss",
    metric_type: MetricType::Counter,
    description: "Number of credential lookups with no fresh cache entry",
};

pub const CREDENTIALS_STALE_FALLBACK: MetricDef = MetricDef {
    name: "credentials.cache.stale_fallback",
    metric_type: MetricType::Counter,
    description: "Number of times stale credentials were used because the backend fetch failed",
};

pub const CREDENTIALS_CACHE_SIZE: MetricDef = MetricDef {
    name: "credentials.cache.size",
    metric_type: MetricType::Gauge,
    description: "Number of subjects with cached credentials, fresh or stale",
};

pub const CREDENTIALS_FETCH_FAILURE: MetricDef = MetricDef {
    name: "credentials.fetch.failure",
    metric_type: MetricType::Counter,
    description: "Number of failed credential fetches from the backend",
};

pub const UPLOAD_REQUESTS: MetricDef = MetricDef {
    name: "upload.requests",
    metric_type: MetricType::Counter,
    description: "Number of upload requests received",
};

pub const UPLOAD_REJECTED: MetricDef = MetricDef {
    name: "upload.rejected",
    metric_type: MetricType::Counter,
    description: "Number of uploads rejected before contacting any collaborator, by reason",
};

pub const UPLOAD_FAILED: MetricDef = MetricDef {
    name: "upload.failed",
    metric_type: MetricType::Counter,
    description: "Number of uploads that failed after validation, by reason",
};

pub const UPLOAD_SUCCESS: MetricDef = MetricDef {
    name: "upload.success",
    metric_type: MetricType::Counter,
    description: "Number of uploads stored in the destination channel",
};

pub const UPLOAD_BYTES: MetricDef = MetricDef {
    name: "upload.bytes",
    metric_type: MetricType::Histogram,
    description: "Size of successfully forwarded payloads in bytes",
};

pub const UPLOAD_DURATION: MetricDef = MetricDef {
    name: "upload.duration",
    metric_type: MetricType::Histogram,
    description: "Time from validated request to normalized response in seconds",
};

pub const ALL_METRICS: &[MetricDef] = &[
    CREDENTIALS_CACHE_HIT,
    CREDENTIALS_CACHE_MISS,
    CREDENTIALS_STALE_FALLBACK,
    CREDENTIALS_CACHE_SIZE,
    CREDENTIALS_FETCH_FAILURE,
    UPLOAD_REQUESTS,
    UPLOAD_REJECTED,
    UPLOAD_FAILED,
    UPLOAD_SUCCESS,
    UPLOAD_BYTES,
    UPLOAD_DURATION,
];

//! Metrics definitions for the catalog.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Histogram,
}

impl MetricType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "Counter",
            MetricType::Histogram => "Histogram",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MetricDef {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub description: &'static str,
}

impl MetricDef {
    /// Registers the description with the installed recorder.
    pub fn describe(&self) {
        match self.metric_type {
            MetricType::Counter => metrics::describe_counter!(self.name, self.description),
            MetricType::Histogram => metrics::describe_histogram!(self.name, self.description),
        }
    }
}

/// Describes every catalog metric. Call once after installing a recorder.
pub fn describe_all() {
    for def in ALL_METRICS {
        def.describe();
    }
}

#[macro_export]
macro_rules! counter {
    ($def:expr) => {
        metrics::counter!($def.name)
    };
    ($def:expr, $($label:expr => $value:expr),+ $(,)?) => {
        metrics::counter!($def.name, $($label => $value),+)
    };
}

#[macro_export]
macro_rules! histogram {
    ($def:expr) => {
        metrics::histogram!($def.name)
    };
}

pub const MANIFEST_FETCH_DURATION: MetricDef = MetricDef {
    name: "manifest.fetch.duration",
    metric_type: MetricType::Histogram,
    description: "Time to fetch and decode the version manifest in seconds",
};

pub const BUILD_PUBLISHED: MetricDef = MetricDef {
    name: "build.publish.created",
    metric_type: MetricType::Counter,
    description: "Number of publish calls that created a new build",
};

pub const BUILD_PUBLISH_DUPLICATE: MetricDef = MetricDef {
    name: "build.publish.duplicate",
    metric_type: MetricType::Counter,
    description: "Number of publish calls for a build that already existed",
};

pub const ARTIFACT_CACHE_HIT: MetricDef = MetricDef {
    name: "artifact.cache.hit",
    metric_type: MetricType::Counter,
    description: "Number of artifact resolutions served from the local cache",
};

pub const ARTIFACT_CACHE_MISS: MetricDef = MetricDef {
    name: "artifact.cache.miss",
    metric_type: MetricType::Counter,
    description: "Number of artifact resolutions that had to consult a source",
};

pub const ARTIFACT_SOURCE_FAILURE: MetricDef = MetricDef {
    name: "artifact.source.failure",
    metric_type: MetricType::Counter,
    description: "Number of failed fetch attempts per artifact source, tagged by source",
};

pub const ARTIFACT_UNAVAILABLE: MetricDef = MetricDef {
    name: "artifact.unavailable",
    metric_type: MetricType::Counter,
    description: "Number of artifact resolutions where every source failed",
};

pub const ALL_METRICS: &[MetricDef] = &[
    MANIFEST_FETCH_DURATION,
    BUILD_PUBLISHED,
    BUILD_PUBLISH_DUPLICATE,
    ARTIFACT_CACHE_HIT,
    ARTIFACT_CACHE_MISS,
    ARTIFACT_SOURCE_FAILURE,
    ARTIFACT_UNAVAILABLE,
];

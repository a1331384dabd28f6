//! Pod discovery and event monitoring.
//!
//! The pipeline: a Pod watch feed is bridged by the [`detector::PodDetector`]
//! into register/unregister calls on the [`watcher::EventWatcher`], which
//! owns one event stream per watched Pod and turns abnormal events into
//! deduplicated alerts.

pub mod collector;
pub mod detector;
pub mod labels;
pub mod watcher;

use std::collections::BTreeMap;

/// Label set attached to a Pod.
pub type Labels = BTreeMap<String, String>;

/// Which Pods should be observed: any Pod in `namespace` whose labels match
/// one of `pod_label_groups` exactly (after stripping generated labels).
#[derive(Debug, Clone)]
pub struct Observable {
    pub namespace: String,
    pub pod_label_groups: Vec<Labels>,
}

/// Deployments whose pod-template labels define an [`Observable`].
#[derive(Debug, Clone)]
pub struct DeploymentTarget {
    pub namespace: String,
    pub deployments: Vec<String>,
}

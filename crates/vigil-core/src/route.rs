//! Per-route configuration supplied at registration time.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Static metadata about one route.
///
/// A `RouteConfig` is built once when the route is registered and handed to
/// the pipeline with every request for that route.
///
/// # Example
///
/// ```
/// use vigil_core::RouteConfig;
/// use std::time::Duration;
///
/// let route = RouteConfig::new("POST", "/cats", "cats", "create")
///     .max_duration_minutes(0.5);
///
/// assert_eq!(route.logical_identity(), "cats/create");
/// assert_eq!(route.max_duration(), Some(Duration::from_millis(30_000)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    method: String,
    template: String,
    component: String,
    operation: String,
    #[serde(default, with = "opt_millis")]
    max_duration: Option<Duration>,
}

impl RouteConfig {
    /// Creates a route configuration.
    ///
    /// `template` is the parameterized path (`/cats/:id`), used for metric
    /// labels instead of the raw URL.
    #[must_use]
    pub fn new(
        method: impl Into<String>,
        template: impl Into<String>,
        component: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        Self {
            method: method.into().to_ascii_uppercase(),
            template: template.into(),
            component: component.into(),
            operation: operation.into(),
            max_duration: None,
        }
    }

    /// Sets the maximum duration override, expressed in minutes.
    ///
    /// Converted to whole milliseconds. Negative or non-finite values leave
    /// the override unset.
    #[must_use]
    pub fn max_duration_minutes(mut self, minutes: f64) -> Self {
        if minutes.is_finite() && minutes >= 0.0 {
            let millis = (minutes * 60_000.0).round() as u64;
            self.max_duration = Some(Duration::from_millis(millis));
        }
        self
    }

    /// Sets the maximum duration override directly.
    #[must_use]
    pub fn with_max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = Some(max_duration);
        self
    }

    /// Returns the upper-cased method.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Returns the route template.
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Returns the logical component (e.g. `cats`).
    #[must_use]
    pub fn component(&self) -> &str {
        &self.component
    }

    /// Returns the logical operation (e.g. `find_one`).
    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Returns the maximum duration override, if any.
    #[must_use]
    pub fn max_duration(&self) -> Option<Duration> {
        self.max_duration
    }

    /// Returns `"<component>/<operation>"`.
    #[must_use]
    pub fn logical_identity(&self) -> String {
        format!("{}/{}", self.component, self.operation)
    }
}

mod opt_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}

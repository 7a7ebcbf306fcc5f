//! [`Preflight`] – launch interlock rule engine.
//!
//! Run before a sequence is allowed to leave `Idle`.  Every registered
//! [`PreflightRule`] is evaluated in order; the first failure blocks the
//! start and is returned to the caller.
//!
//! Built-in rules:
//! - [`RequiredTags`] – every tag the sequence's wiring refers to must have
//!   been discovered.  Reports all missing tags at once.
//! - [`TelemetryAvailable`] – every gating telemetry path must currently
//!   have a healthy value.

use ascent_types::{AscentError, TagDirectory, TelemetryView};

/// A single launch interlock.
pub trait PreflightRule: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    fn check(&self, tags: &dyn TagDirectory, telemetry: &dyn TelemetryView)
        -> Result<(), AscentError>;
}

/// Ordered set of [`PreflightRule`]s.
///
/// # Example
///
/// ```
/// use ascent_kernel::preflight::{Preflight, RequiredTags};
/// use ascent_types::{AscentError, TagDirectory, TelemetryView};
///
/// struct Tags(&'static [&'static str]);
/// impl TagDirectory for Tags {
///     fn has_tag(&self, tag: &str) -> bool { self.0.contains(&tag) }
/// }
/// struct NoTelemetry;
/// impl TelemetryView for NoTelemetry {
///     fn scalar(&self, _: &str) -> Option<f64> { None }
/// }
///
/// let mut preflight = Preflight::new();
/// preflight.add_rule(Box::new(RequiredTags::new(["ENGINE_1", "DECOUPLER_1"])));
///
/// let err = preflight.verify(&Tags(&["ENGINE_1"]), &NoTelemetry).unwrap_err();
/// assert_eq!(err, AscentError::DiscoveryMismatch { missing: vec!["DECOUPLER_1".into()] });
/// ```
#[derive(Default)]
pub struct Preflight {
    rules: Vec<Box<dyn PreflightRule>>,
}

impl Preflight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule.  Rules run in insertion order.
    pub fn add_rule(&mut self, rule: Box<dyn PreflightRule>) {
        self.rules.push(rule);
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn verify(
        &self,
        tags: &dyn TagDirectory,
        telemetry: &dyn TelemetryView,
    ) -> Result<(), AscentError> {
        for rule in &self.rules {
            if let Err(error) = rule.check(tags, telemetry) {
                tracing::warn!(rule = rule.name(), %error, "preflight check failed");
                return Err(error);
            }
        }
        Ok(())
    }
}

/// Fails with [`AscentError::DiscoveryMismatch`] listing every expected tag
/// the registry has not discovered.
pub struct RequiredTags {
    tags: Vec<String>,
}

impl RequiredTags {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }
}

impl PreflightRule for RequiredTags {
    fn name(&self) -> &str {
        "required_tags"
    }

    fn check(&self, tags: &dyn TagDirectory, _: &dyn TelemetryView) -> Result<(), AscentError> {
        let missing: Vec<String> = self
            .tags
            .iter()
            .filter(|t| !tags.has_tag(t))
            .cloned()
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(AscentError::DiscoveryMismatch { missing })
        }
    }
}

/// Fails with [`AscentError::TransientTelemetry`] for the first path that
/// has no healthy value.
pub struct TelemetryAvailable {
    paths: Vec<String>,
}

impl TelemetryAvailable {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }
}

impl PreflightRule for TelemetryAvailable {
    fn name(&self) -> &str {
        "telemetry_available"
    }

    fn check(
        &self,
        _: &dyn TagDirectory,
        telemetry: &dyn TelemetryView,
    ) -> Result<(), AscentError> {
        match self.paths.iter().find(|p| telemetry.scalar(p).is_none()) {
            Some(path) => Err(AscentError::TransientTelemetry { path: path.clone() }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use super::*;

    struct Tags(HashSet<String>);

    impl Tags {
        fn of(tags: &[&str]) -> Self {
            Self(tags.iter().map(|t| t.to_string()).collect())
        }
    }

    impl TagDirectory for Tags {
        fn has_tag(&self, tag: &str) -> bool {
            self.0.contains(tag)
        }
    }

    struct Values(HashMap<&'static str, f64>);

    impl TelemetryView for Values {
        fn scalar(&self, path: &str) -> Option<f64> {
            self.0.get(path).copied()
        }
    }

    fn no_values() -> Values {
        Values(HashMap::new())
    }

    #[test]
    fn empty_preflight_passes() {
        assert!(Preflight::new().verify(&Tags::of(&[]), &no_values()).is_ok());
    }

    #[test]
    fn required_tags_lists_every_missing_tag_in_order() {
        let rule = RequiredTags::new(["ENGINE_1", "DECOUPLER_1", "ENGINE_2", "FAIRING_1"]);
        let err = rule
            .check(&Tags::of(&["ENGINE_1", "ENGINE_2"]), &no_values())
            .unwrap_err();
        assert_eq!(
            err,
            AscentError::DiscoveryMismatch {
                missing: vec!["DECOUPLER_1".into(), "FAIRING_1".into()]
            }
        );
    }

    #[test]
    fn required_tags_passes_when_all_discovered() {
        let rule = RequiredTags::new(["ENGINE_1"]);
        assert!(rule.check(&Tags::of(&["ENGINE_1", "BPROBE_1"]), &no_values()).is_ok());
    }

    #[test]
    fn telemetry_rule_names_the_dead_path() {
        let rule = TelemetryAvailable::new(["flight.mean_altitude", "flight.vertical_speed"]);
        let values = Values(HashMap::from([("flight.mean_altitude", 0.0)]));
        assert_eq!(
            rule.check(&Tags::of(&[]), &values),
            Err(AscentError::TransientTelemetry {
                path: "flight.vertical_speed".into()
            })
        );
    }

    #[test]
    fn first_failing_rule_wins() {
        let mut preflight = Preflight::new();
        preflight.add_rule(Box::new(RequiredTags::new(["ENGINE_1"])));
        preflight.add_rule(Box::new(TelemetryAvailable::new(["flight.mean_altitude"])));
        assert_eq!(preflight.len(), 2);

        let err = preflight.verify(&Tags::of(&[]), &no_values()).unwrap_err();
        assert!(matches!(err, AscentError::DiscoveryMismatch { .. }));

        let err = preflight
            .verify(&Tags::of(&["ENGINE_1"]), &no_values())
            .unwrap_err();
        assert!(matches!(err, AscentError::TransientTelemetry { .. }));
    }
}

//! [`ComponentRegistry`] – discovery and lookup of vessel components.
//!
//! The registry is the single owner of every tracked [`Component`].  Callers
//! hold [`ComponentHandle`]s (stable ids) and resolve them on use, so a part
//! that disappears between cycles simply stops resolving.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use ascent_hal::{ComponentRegistry, SimVessel};
//! use ascent_types::CapabilityKind;
//!
//! let sim = Arc::new(SimVessel::new());
//! sim.add_part("LV-T45", Some("ENGINE_1"), &["ModuleEngines"]);
//! sim.add_part("Strut", None, &[]);
//!
//! let mut registry = ComponentRegistry::new(sim);
//! registry.refresh();
//!
//! assert_eq!(registry.len(), 1);
//! assert_eq!(registry.get_all_by_capability(CapabilityKind::Engine).len(), 1);
//! assert!(registry.get_by_tag("ENGINE_1").is_some());
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use ascent_link::VesselLink;
use ascent_types::{CapabilityKind, ComponentId, TagDirectory};
use tracing::{debug, info, warn};

use crate::component::Component;
use crate::control::{
    AntennaControl, DecouplerControl, EngineControl, FairingControl, LaunchClampControl,
    ProbeCoreControl, SolarPanelControl,
};
use crate::vessel::VesselControl;

/// Stable reference to a tracked component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentHandle(pub ComponentId);

/// What a [`ComponentRegistry::refresh`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub discovered: Vec<ComponentHandle>,
    pub removed: Vec<ComponentId>,
}

impl RefreshSummary {
    pub fn is_empty(&self) -> bool {
        self.discovered.is_empty() && self.removed.is_empty()
    }
}

pub struct ComponentRegistry {
    link: Arc<dyn VesselLink>,
    components: BTreeMap<ComponentId, Component>,
    enumeration_failing: bool,
}

impl ComponentRegistry {
    pub fn new(link: Arc<dyn VesselLink>) -> Self {
        Self {
            link,
            components: BTreeMap::new(),
            enumeration_failing: false,
        }
    }

    /// The link this registry talks through.
    pub fn link(&self) -> &Arc<dyn VesselLink> {
        &self.link
    }

    /// Reconcile the tracked set with the remote enumeration.
    ///
    /// New tagged parts are wrapped and logged once; parts that left the
    /// vessel are dropped.  Repeated calls against an unchanged vessel change
    /// nothing and log nothing.  A failed enumeration leaves the registry as
    /// it was.
    pub fn refresh(&mut self) -> RefreshSummary {
        let remote = match self.link.enumerate_components() {
            Ok(remote) => {
                if self.enumeration_failing {
                    self.enumeration_failing = false;
                    info!("component enumeration restored");
                }
                remote
            }
            Err(error) => {
                if !self.enumeration_failing {
                    self.enumeration_failing = true;
                    warn!(%error, "component enumeration failed, keeping last known parts");
                }
                return RefreshSummary::default();
            }
        };

        let mut summary = RefreshSummary::default();
        let present: BTreeSet<ComponentId> = remote.iter().map(|r| r.id).collect();

        for entry in &remote {
            if self.components.contains_key(&entry.id) {
                continue;
            }
            let Some(component) = Component::discover(entry) else {
                continue;
            };
            info!(
                component = %component.id(),
                tag = component.tag(),
                kind = %component.kind(),
                capabilities = ?component.capabilities(),
                "component discovered"
            );
            summary.discovered.push(ComponentHandle(component.id()));
            self.components.insert(component.id(), component);
        }

        self.components.retain(|id, component| {
            let keep = present.contains(id);
            if !keep {
                info!(component = %id, tag = component.tag(), "component left the vessel");
                summary.removed.push(*id);
            }
            keep
        });

        summary
    }

    /// Re-pull every tracked component's state.
    pub fn update_all_states(&mut self) {
        let link = self.link.as_ref();
        for component in self.components.values_mut() {
            component.update_state(link);
        }
        debug!(count = self.components.len(), "component states refreshed");
    }

    // ── Lookup ────────────────────────────────────────────────────────────

    /// First component carrying exactly `tag`.
    pub fn get_by_tag(&self, tag: &str) -> Option<ComponentHandle> {
        self.components
            .values()
            .find(|c| c.tag() == tag)
            .map(|c| ComponentHandle(c.id()))
    }

    /// Every component with `kind` among its capabilities, ordered by id.
    pub fn get_all_by_capability(&self, kind: CapabilityKind) -> Vec<ComponentHandle> {
        self.components
            .values()
            .filter(|c| c.has(kind))
            .map(|c| ComponentHandle(c.id()))
            .collect()
    }

    pub fn get(&self, handle: ComponentHandle) -> Option<&Component> {
        self.components.get(&handle.0)
    }

    /// Owned copies of every tracked component.
    pub fn snapshot(&self) -> Vec<Component> {
        self.components.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    // ── Control surfaces ──────────────────────────────────────────────────

    pub fn vessel(&self) -> VesselControl<'_> {
        VesselControl::new(self.link.as_ref())
    }

    pub fn engine(&mut self, handle: ComponentHandle) -> Option<EngineControl<'_>> {
        let (component, link) = self.split(handle, CapabilityKind::Engine)?;
        Some(EngineControl { component, link })
    }

    pub fn decoupler(&mut self, handle: ComponentHandle) -> Option<DecouplerControl<'_>> {
        let (component, link) = self.split(handle, CapabilityKind::Decoupler)?;
        Some(DecouplerControl { component, link })
    }

    pub fn fairing(&mut self, handle: ComponentHandle) -> Option<FairingControl<'_>> {
        let (component, link) = self.split(handle, CapabilityKind::Fairing)?;
        Some(FairingControl { component, link })
    }

    pub fn probe_core(&mut self, handle: ComponentHandle) -> Option<ProbeCoreControl<'_>> {
        let (component, link) = self.split(handle, CapabilityKind::ProbeCore)?;
        Some(ProbeCoreControl { component, link })
    }

    pub fn antenna(&mut self, handle: ComponentHandle) -> Option<AntennaControl<'_>> {
        let (component, link) = self.split(handle, CapabilityKind::Antenna)?;
        Some(AntennaControl { component, link })
    }

    pub fn solar_panel(&mut self, handle: ComponentHandle) -> Option<SolarPanelControl<'_>> {
        let (component, link) = self.split(handle, CapabilityKind::SolarPanel)?;
        Some(SolarPanelControl { component, link })
    }

    pub fn launch_clamp(&mut self, handle: ComponentHandle) -> Option<LaunchClampControl<'_>> {
        let (component, link) = self.split(handle, CapabilityKind::LaunchClamp)?;
        Some(LaunchClampControl { component, link })
    }

    fn split(
        &mut self,
        handle: ComponentHandle,
        kind: CapabilityKind,
    ) -> Option<(&mut Component, &dyn VesselLink)> {
        let component = self.components.get_mut(&handle.0).filter(|c| c.has(kind))?;
        Some((component, self.link.as_ref()))
    }
}

impl TagDirectory for ComponentRegistry {
    fn has_tag(&self, tag: &str) -> bool {
        self.get_by_tag(tag).is_some()
    }
}

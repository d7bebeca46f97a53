use crate::session::SessionPersistence;
use crate::storage::StorageError;
use lumen_state::{Node, ObservableStore};
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// Namespace of the scene settings store.
pub const DEFAULT_NAMESPACE: &str = "PG6201Config";

const PRESET_TABLE: &str = include_str!("presets.json");

#[derive(Debug, thiserror::Error)]
pub enum PresetError {
    #[error("unknown preset: {0}")]
    Unknown(String),
    #[error("preset table is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("preset {0} is missing from the table")]
    Missing(&'static str),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Complete settings snapshots that can replace the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preset {
    ReflectionOnly,
    ReflectionWithDiffuseSpecular,
    RefractionOnly,
    RefractionOnlyColors,
    RefractionDispersionAndEverything,
    OneWithEverything,
}

impl Preset {
    pub const ALL: [Preset; 6] = [
        Preset::ReflectionOnly,
        Preset::ReflectionWithDiffuseSpecular,
        Preset::RefractionOnly,
        Preset::RefractionOnlyColors,
        Preset::RefractionDispersionAndEverything,
        Preset::OneWithEverything,
    ];

    /// Key in the preset table, also accepted by [`FromStr`].
    pub fn name(self) -> &'static str {
        match self {
            Self::ReflectionOnly => "ReflectionOnly",
            Self::ReflectionWithDiffuseSpecular => "ReflectionWithDiffuseSpecular",
            Self::RefractionOnly => "RefractionOnly",
            Self::RefractionOnlyColors => "RefractionOnlyColors",
            Self::RefractionDispersionAndEverything => "RefractionDispersionAndEverything",
            Self::OneWithEverything => "OneWithEverything",
        }
    }

    /// Button label.
    pub fn label(self) -> &'static str {
        match self {
            Self::ReflectionOnly => "Reflection only",
            Self::ReflectionWithDiffuseSpecular => "Reflection with Diffuse/Specular",
            Self::RefractionOnly => "Refraction Only",
            Self::RefractionOnlyColors => "Refraction Only (color dispersion)",
            Self::RefractionDispersionAndEverything => {
                "Refraction (color dispersion) with Diffuse/Specular"
            }
            Self::OneWithEverything => "One with everything",
        }
    }

    pub fn snapshot(self) -> Result<Node, PresetError> {
        let table: Node = serde_json::from_str(PRESET_TABLE)?;
        table
            .field(self.name())
            .cloned()
            .ok_or(PresetError::Missing(self.name()))
    }

    /// Overwrite the stored snapshot of `namespace` with this preset.
    pub fn write(self, persistence: &SessionPersistence, namespace: &str) -> Result<(), PresetError> {
        persistence.write(namespace, &self.snapshot()?)?;
        info!(preset = self.name(), %namespace, "preset written");
        Ok(())
    }

    /// Replace the stored snapshot behind `store` and ask the host to
    /// remount. The store's own pending write is dropped first so it cannot
    /// overwrite the preset.
    pub fn load_into(
        self,
        store: &ObservableStore,
        persistence: &SessionPersistence,
    ) -> Result<(), PresetError> {
        store.cancel_pending_write();
        self.write(persistence, store.namespace())?;
        store.request_reload();
        Ok(())
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Preset {
    type Err = PresetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|preset| preset.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| PresetError::Unknown(s.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use lumen_state::{Clock, ManualClock, Persistence, Scope};
    use std::rc::Rc;

    #[test]
    fn every_preset_is_a_full_snapshot() {
        for preset in Preset::ALL {
            let snapshot = preset.snapshot().unwrap();
            for section in ["camera", "material", "lights", "mesh"] {
                assert!(snapshot.field(section).is_some(), "{preset}: {section}");
            }
            let lights = snapshot.field("lights").unwrap().len();
            assert!((1..=3).contains(&lights), "{preset}: {lights} lights");
        }
    }

    #[test]
    fn names_parse_back() {
        for preset in Preset::ALL {
            assert_eq!(preset.name().parse::<Preset>().unwrap(), preset);
        }
        assert_eq!(
            "oneWithEverything".parse::<Preset>().unwrap(),
            Preset::OneWithEverything
        );
        assert!(matches!(
            "Sepia".parse::<Preset>(),
            Err(PresetError::Unknown(name)) if name == "Sepia"
        ));
    }

    #[test]
    fn load_into_overwrites_and_requests_reload() {
        let persistence = SessionPersistence::new(Rc::new(MemoryStorage::new()));
        let clock = Rc::new(ManualClock::new());
        let dyn_persistence: Rc<dyn Persistence> = Rc::new(persistence.clone());
        let dyn_clock: Rc<dyn Clock> = clock.clone();
        let (store, _) =
            ObservableStore::mount(DEFAULT_NAMESPACE, dyn_persistence, dyn_clock, |root| {
                root.register_default("custom", true);
            });
        let scope: Rc<dyn Scope> = store.clone();
        scope.at("custom").set(false);
        assert!(store.persist_pending());

        Preset::RefractionOnly.load_into(&store, &persistence).unwrap();
        assert!(store.reload_requested());
        // The debounced write of the old state was dropped.
        clock.advance(std::time::Duration::from_secs(1));
        assert!(!store.poll());
        assert_eq!(
            persistence.load(DEFAULT_NAMESPACE),
            Some(Preset::RefractionOnly.snapshot().unwrap())
        );
    }
}

use crate::actions::apply_camera;
use crate::bindings::bind;
use crate::frame::{FrameLoop, FrameReport};
use crate::manager::ResourceManager;
use crate::schema::scene_schema;
use lumen_input::Action;
use lumen_panel::Panel;
use lumen_persist::{DEFAULT_NAMESPACE, Preset, PresetError, SessionPersistence};
use lumen_render::Backend;
use lumen_state::{Clock, ObservableStore, Scope, Subscription};
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Everything a host decides before mounting a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub namespace: String,
    /// Root directory of the skybox sets.
    pub assets: PathBuf,
    pub fps: f64,
    pub aspect: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_owned(),
            assets: PathBuf::from("assets/skybox"),
            fps: crate::frame::DEFAULT_FPS,
            aspect: 16.0 / 9.0,
        }
    }
}

/// One mounted scene: store, panel, GPU resources and frame loop.
///
/// A reload (preset or reset) drops the store, panel and listeners and
/// mounts them again from storage; the backend survives.
pub struct Session<B: Backend + 'static> {
    config: SessionConfig,
    persistence: SessionPersistence,
    clock: Rc<dyn Clock>,
    store: Rc<ObservableStore>,
    panel: Panel,
    manager: Rc<RefCell<ResourceManager<B>>>,
    frames: FrameLoop,
    subscriptions: Vec<Subscription>,
    last: Option<Instant>,
}

impl<B: Backend + 'static> Session<B> {
    pub fn mount(
        persistence: SessionPersistence,
        clock: Rc<dyn Clock>,
        backend: B,
        config: SessionConfig,
    ) -> Self {
        let manager = Rc::new(RefCell::new(ResourceManager::new(
            backend,
            config.assets.clone(),
            config.aspect,
        )));
        let (store, panel, subscriptions) = mount_store(&config, &persistence, &clock, &manager);
        Self {
            frames: FrameLoop::with_fps(config.fps),
            config,
            persistence,
            clock,
            store,
            panel,
            manager,
            subscriptions,
            last: None,
        }
    }

    pub fn store(&self) -> &Rc<ObservableStore> {
        &self.store
    }

    pub fn root(&self) -> Rc<dyn Scope> {
        self.store.clone()
    }

    pub fn panel(&self) -> &Panel {
        &self.panel
    }

    pub fn manager(&self) -> &Rc<RefCell<ResourceManager<B>>> {
        &self.manager
    }

    pub fn frames(&self) -> &FrameLoop {
        &self.frames
    }

    pub fn persistence(&self) -> &SessionPersistence {
        &self.persistence
    }

    /// Apply a user action. Returns whether it changed anything; reloading
    /// actions take effect on the next frame.
    pub fn apply(&self, action: &Action) -> Result<bool, PresetError> {
        match action {
            Action::Rotate(_) | Action::Zoom(_) | Action::ResetRotation(_) => {
                Ok(apply_camera(&*self.root(), action))
            }
            Action::LoadPreset(name) => {
                let preset: Preset = name.parse()?;
                preset.load_into(&self.store, &self.persistence)?;
                Ok(true)
            }
            Action::ResetSession => {
                self.store.reset();
                Ok(true)
            }
            Action::TogglePanel => Ok(false),
        }
    }

    pub fn reload_requested(&self) -> bool {
        self.store.reload_requested()
    }

    /// Drop everything mounted and mount it again from storage.
    pub fn reload(&mut self) {
        info!(namespace = %self.config.namespace, "reloading session");
        self.subscriptions.clear();
        if !self.store.reload_requested() {
            self.store.flush();
        }
        self.manager.borrow_mut().reset();
        let (store, panel, subscriptions) =
            mount_store(&self.config, &self.persistence, &self.clock, &self.manager);
        self.store = store;
        self.panel = panel;
        self.subscriptions = subscriptions;
        self.frames = FrameLoop::with_fps(self.config.fps);
        self.last = None;
    }

    /// Run one host callback after `elapsed` wall time: pending reloads,
    /// the debounced write, gathered wheel input, then the frame loop.
    pub fn frame(&mut self, elapsed: Duration) -> FrameReport {
        if self.reload_requested() {
            self.reload();
        }
        self.store.poll();
        let wheel = self.panel.flush_wheel();
        if wheel > 0 {
            debug!(fields = wheel, "wheel input committed");
        }
        let mut manager = self.manager.borrow_mut();
        self.frames.advance(elapsed, &mut *manager)
    }

    /// [`Session::frame`] driven by wall time.
    pub fn frame_at(&mut self, now: Instant) -> FrameReport {
        let elapsed = self
            .last
            .replace(now)
            .map_or(Duration::ZERO, |last| now.saturating_duration_since(last));
        self.frame(elapsed)
    }

    pub fn resize(&self, width: u32, height: u32) {
        self.manager.borrow_mut().resize(width, height);
    }
}

impl<B: Backend + 'static> Drop for Session<B> {
    fn drop(&mut self) {
        self.subscriptions.clear();
        if !self.store.reload_requested() {
            self.store.flush();
        }
        match self.manager.try_borrow_mut() {
            Ok(mut manager) => manager.release_all(),
            Err(_) => warn!("resource manager busy at teardown, handles leaked"),
        }
    }
}

fn mount_store<B: Backend + 'static>(
    config: &SessionConfig,
    persistence: &SessionPersistence,
    clock: &Rc<dyn Clock>,
    manager: &Rc<RefCell<ResourceManager<B>>>,
) -> (Rc<ObservableStore>, Panel, Vec<Subscription>) {
    let schema = scene_schema();
    let (store, panel) = ObservableStore::mount(
        config.namespace.clone(),
        Rc::new(persistence.clone()),
        Rc::clone(clock),
        |root| Panel::mount(root, &schema),
    );
    let root: Rc<dyn Scope> = store.clone();
    let subscriptions = bind(&root, &panel, manager);
    (store, panel, subscriptions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::Phase;
    use crate::schema::{LIGHTS, MATERIAL, MESH};
    use glam::Vec2;
    use lumen_persist::MemoryStorage;
    use lumen_render::{BackendError, RecordingBackend, ResourceKind};
    use lumen_state::{ManualClock, Node, Path};

    struct Fixture {
        clock: Rc<ManualClock>,
        persistence: SessionPersistence,
        session: Session<RecordingBackend>,
    }

    fn fixture() -> Fixture {
        let clock = Rc::new(ManualClock::new());
        let persistence = SessionPersistence::new(Rc::new(MemoryStorage::new()));
        let session = Session::mount(
            persistence.clone(),
            clock.clone(),
            RecordingBackend::new(),
            SessionConfig::default(),
        );
        session.manager().borrow_mut().backend_mut().clear_calls();
        Fixture {
            clock,
            persistence,
            session,
        }
    }

    fn counts(session: &Session<RecordingBackend>) -> (usize, usize, usize, usize, usize) {
        let manager = session.manager().borrow();
        let backend = manager.backend();
        (
            backend.created(ResourceKind::Buffer),
            backend.released(ResourceKind::Buffer),
            backend.created(ResourceKind::Program),
            backend.created(ResourceKind::Mesh),
            backend.texture_loads(),
        )
    }

    #[test]
    fn mount_initializes_resources() {
        let fixture = fixture();
        assert_eq!(fixture.session.store().revision(), 1);
        assert_eq!(fixture.session.manager().borrow().phase(), Phase::Running);
    }

    #[test]
    fn adding_a_light_rebuilds_buffer_and_program_only() {
        let fixture = fixture();
        let lights = fixture
            .session
            .panel()
            .list(&Path::root().child(LIGHTS))
            .unwrap();
        assert!(lights.increment());
        assert_eq!(counts(&fixture.session), (1, 1, 1, 0, 0));
    }

    #[test]
    fn switching_skybox_reloads_texture_only() {
        let fixture = fixture();
        let texture = fixture
            .session
            .panel()
            .dropdown(&Path::root().child(MESH).child("skyboxTexture"))
            .unwrap();
        assert_eq!(texture.value(), "totality");
        assert!(texture.select("druidcove"));
        assert_eq!(counts(&fixture.session), (0, 0, 0, 0, 1));
    }

    #[test]
    fn frames_update_and_render() {
        let mut fixture = fixture();
        let reports: Vec<u32> = [10, 10, 10]
            .into_iter()
            .map(|ms| fixture.session.frame(Duration::from_millis(ms)).updates)
            .collect();
        assert_eq!(reports, [0, 1, 0]);
        let manager = fixture.session.manager().borrow();
        assert_eq!(manager.backend().frames(), 3);
        assert!(manager.animation().spin > 0.0);
    }

    #[test]
    fn backend_error_stops_the_loop() {
        let mut fixture = fixture();
        fixture
            .session
            .manager()
            .borrow_mut()
            .backend_mut()
            .inject_error(BackendError::InvalidOperation);
        assert!(!fixture.session.frame(Duration::from_millis(20)).running);
        assert!(!fixture.session.frame(Duration::from_millis(20)).running);
        assert_eq!(fixture.session.manager().borrow().backend().frames(), 1);
    }

    #[test]
    fn edits_persist_after_the_debounce() {
        let mut fixture = fixture();
        assert!(fixture.session.apply(&Action::Zoom(10.0)).unwrap());
        fixture.session.frame(Duration::ZERO);
        assert_eq!(fixture.persistence.read(DEFAULT_NAMESPACE).unwrap(), None);

        fixture.clock.advance(Duration::from_millis(300));
        fixture.session.frame(Duration::ZERO);
        let stored = fixture.persistence.read(DEFAULT_NAMESPACE).unwrap().unwrap();
        let offset = stored
            .get_path(&["camera".into(), "offset".into()])
            .and_then(Node::as_f64);
        assert_eq!(offset, Some(11.0));
    }

    #[test]
    fn preset_reloads_from_storage() {
        let mut fixture = fixture();
        assert!(fixture.session.apply(&Action::Rotate(Vec2::new(5.0, 0.0))).unwrap());
        assert!(
            fixture
                .session
                .apply(&Action::LoadPreset("OneWithEverything".into()))
                .unwrap()
        );
        assert!(fixture.session.reload_requested());

        fixture.session.frame(Duration::ZERO);
        assert!(!fixture.session.reload_requested());
        let preset = Preset::OneWithEverything.snapshot().unwrap();
        let state = fixture.session.store().state();
        assert_eq!(state.field(MATERIAL), preset.field(MATERIAL));
        assert_eq!(state.field(LIGHTS).map(Node::len), Some(3));
        let manager = fixture.session.manager().borrow();
        assert_eq!(manager.phase(), Phase::Running);
        assert_eq!(manager.settings().light_count(), 3);
        assert_eq!(manager.backend().live(ResourceKind::Buffer), 3);
    }

    #[test]
    fn unknown_preset_is_an_error() {
        let fixture = fixture();
        assert!(fixture.session.apply(&Action::LoadPreset("Nope".into())).is_err());
        assert!(!fixture.session.reload_requested());
    }

    #[test]
    fn reset_returns_to_defaults() {
        let mut fixture = fixture();
        fixture.session.apply(&Action::Zoom(10.0)).unwrap();
        fixture.session.apply(&Action::ResetSession).unwrap();
        fixture.clock.advance(Duration::from_secs(1));
        fixture.session.frame(Duration::ZERO);
        let offset = fixture
            .session
            .store()
            .state()
            .get_path(&["camera".into(), "offset".into()])
            .and_then(Node::as_f64);
        assert_eq!(offset, Some(10.0));
    }

    #[test]
    fn drop_flushes_and_releases() {
        let fixture = fixture();
        fixture.session.apply(&Action::Zoom(-2.0)).unwrap();
        let manager = Rc::clone(fixture.session.manager());
        let persistence = fixture.persistence.clone();
        drop(fixture);
        assert!(persistence.read(DEFAULT_NAMESPACE).unwrap().is_some());
        for kind in ResourceKind::ALL {
            assert_eq!(manager.borrow().backend().live(kind), 0);
        }
    }
}

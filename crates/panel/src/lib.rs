//! Settings panel: a declarative control schema mounted onto a settings scope.
//!
//! Mounting registers every control's default (persisted values win) and
//! binds a controller that reads and writes through the scope. Rendering is
//! left to the host; controllers expose the text, pending state and actions
//! a widget needs.

mod field;
mod mount;
mod schema;

pub use field::{BoolField, DropdownField, FloatField, VectorField, WHEEL_FACTOR, format_value};
pub use mount::{ElementControls, ListView, Mounted, Panel, SectionView, mount_controls, walk};
pub use schema::{Control, FloatSpec, Header, VectorSpec, defaults};

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_state::{
        Bounds, ManualClock, MemoryPersistence, Node, ObservableStore, Path, Persistence, Scope,
    };
    use std::rc::Rc;

    fn schema() -> Vec<Control> {
        vec![
            Control::section(
                "camera",
                "Camera",
                vec![Control::float(
                    FloatSpec::new("fov", "Field of View", 45.0).range(10.0, 160.0),
                )],
            ),
            Control::list(
                "lights",
                "Lights",
                Bounds::new(1, 3),
                vec![
                    Control::dropdown("type", " ", &["Directional", "Spotlight"]),
                    Control::vector(
                        VectorSpec::new("ambient", "Ambient Color", &[0.05, 0.05, 0.05])
                            .range(0.0, 1.0)
                            .step(0.01),
                    ),
                ],
            ),
            Control::section(
                "mesh",
                "Mesh",
                vec![Control::bool("lowpoly", "Low Polygon", false)],
            ),
        ]
    }

    fn mount(persistence: Rc<dyn Persistence>) -> (Rc<ObservableStore>, Panel) {
        ObservableStore::mount("panel", persistence, Rc::new(ManualClock::new()), |root| {
            Panel::mount(root, &schema())
        })
    }

    fn path(keys: &[&str]) -> Path {
        keys.iter()
            .map(|key| match key.parse::<usize>() {
                Ok(index) => lumen_state::Key::Index(index),
                Err(_) => lumen_state::Key::from(*key),
            })
            .collect()
    }

    #[test]
    fn fresh_mount_commits_defaults_once() {
        let (store, _panel) = mount(Rc::new(MemoryPersistence::new()));
        assert_eq!(store.revision(), 1);
        assert_eq!(store.state(), defaults(&schema()));
    }

    #[test]
    fn persisted_values_win() {
        let persisted: Node = serde_json::from_str(
            r#"{"camera":{"fov":90},"lights":[{"type":"Spotlight"},{}]}"#,
        )
        .unwrap();
        let persistence = MemoryPersistence::with_snapshot("panel", persisted);
        let (store, panel) = mount(Rc::new(persistence));
        let state = store.state();
        assert_eq!(
            state.get_path(path(&["camera", "fov"]).keys()).and_then(Node::as_f64),
            Some(90.0)
        );
        assert_eq!(panel.list(&path(&["lights"])).map(|l| l.len()), Some(2));
        assert_eq!(
            panel.dropdown(&path(&["lights", "0", "type"])).map(|d| d.value()),
            Some("Spotlight".to_owned())
        );
        // The second element got its defaults filled in.
        assert_eq!(
            panel
                .dropdown(&path(&["lights", "1", "type"]))
                .map(|d| d.value()),
            Some("Directional".to_owned())
        );
        assert!(
            state
                .get_path(path(&["lights", "1", "ambient"]).keys())
                .is_some()
        );
    }

    #[test]
    fn list_elements_get_controls() {
        let (store, panel) = mount(Rc::new(MemoryPersistence::new()));
        let lights = panel.list(&path(&["lights"])).unwrap();
        assert!(lights.increment());
        assert_eq!(store.state().field("lights").map(Node::len), Some(2));

        let ambient = panel.vector(&path(&["lights", "1", "ambient"])).unwrap();
        assert!(ambient.edit(1, "0.5"));
        assert_eq!(ambient.values(), [0.05, 0.5, 0.05]);
        assert!(lights.decrement());
        assert!(panel.vector(&path(&["lights", "1", "ambient"])).is_none());
    }

    #[test]
    fn wheel_flush_walks_every_field() {
        let (_store, panel) = mount(Rc::new(MemoryPersistence::new()));
        let fov = panel.float(&path(&["camera", "fov"])).unwrap();
        let ambient = panel.vector(&path(&["lights", "0", "ambient"])).unwrap();
        fov.wheel(-10.0);
        ambient.wheel(0, -10.0);
        assert_eq!(panel.flush_wheel(), 2);
        assert!((fov.value() - 45.1).abs() < 1e-9);
        assert!((ambient.values()[0] - 0.06).abs() < 1e-9);
        assert_eq!(panel.flush_wheel(), 0);
    }

    #[test]
    fn toggles_resolve_by_path() {
        let (store, panel) = mount(Rc::new(MemoryPersistence::new()));
        let lowpoly = panel.toggle(&path(&["mesh", "lowpoly"])).unwrap();
        assert!(lowpoly.toggle());
        assert_eq!(
            store
                .state()
                .get_path(path(&["mesh", "lowpoly"]).keys())
                .and_then(Node::as_bool),
            Some(true)
        );
    }
}

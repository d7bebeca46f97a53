use crate::camera;
use crate::schema::CAMERA;
use crate::settings::read_quat;
use lumen_input::Action;
use lumen_state::{Node, Scope};
use tracing::trace;

fn quat_node(rotation: glam::Quat) -> Node {
    Node::from(rotation.to_array())
}

/// Apply a camera action to the settings under `root`. Returns whether
/// anything was committed; actions that are not camera actions return
/// `false`.
pub fn apply_camera(root: &dyn Scope, action: &Action) -> bool {
    let camera = root.at(CAMERA);
    let changed = match action {
        Action::Rotate(delta) => camera
            .at("rotation")
            .set_with(|current| quat_node(camera::rotate_by(read_quat(current), *delta))),
        Action::ResetRotation(axis) => camera
            .at("rotation")
            .set_with(|current| quat_node(camera::reset_axis(read_quat(current), *axis))),
        Action::Zoom(delta) => camera.at("offset").set_with(|current| {
            let offset = current
                .and_then(Node::as_f64)
                .unwrap_or(camera::MIN_OFFSET);
            Node::from(camera::zoom(offset, *delta))
        }),
        _ => return false,
    };
    trace!(?action, changed, "camera action");
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::scene_schema;
    use glam::{Quat, Vec2};
    use lumen_input::Axis;
    use lumen_panel::Panel;
    use lumen_state::{ManualClock, MemoryPersistence, ObservableStore};
    use std::rc::Rc;

    fn store() -> Rc<ObservableStore> {
        let (store, _panel) = ObservableStore::mount(
            "actions",
            Rc::new(MemoryPersistence::new()),
            Rc::new(ManualClock::new()),
            |root| Panel::mount(root, &scene_schema()),
        );
        store
    }

    fn rotation(store: &ObservableStore) -> Quat {
        read_quat(store.state().get_path(&["camera".into(), "rotation".into()]))
    }

    #[test]
    fn rotate_then_reset() {
        let store = store();
        assert!(apply_camera(&*store, &Action::Rotate(Vec2::new(40.0, 10.0))));
        assert_ne!(rotation(&store), Quat::IDENTITY);

        assert!(apply_camera(&*store, &Action::ResetRotation(Some(Axis::Pitch))));
        assert!(apply_camera(&*store, &Action::ResetRotation(None)));
        assert!(rotation(&store).abs_diff_eq(Quat::IDENTITY, 1e-6));
    }

    #[test]
    fn zoom_moves_offset() {
        let store = store();
        assert!(apply_camera(&*store, &Action::Zoom(10.0)));
        let offset = store
            .state()
            .get_path(&["camera".into(), "offset".into()])
            .and_then(Node::as_f64);
        assert_eq!(offset, Some(11.0));
        assert!(!apply_camera(&*store, &Action::TogglePanel));
    }
}

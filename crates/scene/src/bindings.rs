use crate::manager::ResourceManager;
use crate::schema::{CAMERA, LIGHTS, MATERIAL, MESH};
use lumen_panel::Panel;
use lumen_render::Backend;
use lumen_state::{ChangeEvent, Node, Path, Scope, Subscription};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, warn};

type Shared<B> = Rc<RefCell<ResourceManager<B>>>;

/// Run `f` on the manager unless it is already borrowed, which only happens
/// when a commit is made from inside a frame.
fn with_manager<B: Backend>(
    manager: &Shared<B>,
    section: &'static str,
    f: impl FnOnce(&mut ResourceManager<B>),
) {
    match manager.try_borrow_mut() {
        Ok(mut manager) => f(&mut manager),
        Err(_) => warn!(section, "change dropped, resource manager busy"),
    }
}

fn section_listener<B: Backend + 'static>(
    panel: &Panel,
    manager: &Shared<B>,
    section: &'static str,
    apply: fn(&mut ResourceManager<B>, &Node),
) -> Option<Subscription> {
    let Some(scope) = panel.scope(&Path::root().child(section)) else {
        warn!(section, "no mounted scope to listen on");
        return None;
    };
    let manager = Rc::clone(manager);
    let subscription = ChangeEvent::new()
        .on_change(move |state, _| with_manager(&manager, section, |m| apply(m, state)))
        .attach(&scope);
    Some(subscription)
}

/// Connect a mounted store and panel to the resource manager.
///
/// The root's ready edge allocates everything; each section then reports
/// its own changes so the manager only rebuilds what that section drives.
/// Dropping the returned subscriptions disconnects the manager.
pub fn bind<B: Backend + 'static>(
    root: &Rc<dyn Scope>,
    panel: &Panel,
    manager: &Shared<B>,
) -> Vec<Subscription> {
    let mut subscriptions = Vec::with_capacity(5);
    let init = Rc::clone(manager);
    subscriptions.push(
        ChangeEvent::new()
            .on_ready(move |state| with_manager(&init, "root", |m| m.initialize(state)))
            .attach(root),
    );

    let sections: [(&'static str, fn(&mut ResourceManager<B>, &Node)); 4] = [
        (CAMERA, ResourceManager::camera_changed),
        (MATERIAL, ResourceManager::material_changed),
        (LIGHTS, ResourceManager::lights_changed),
        (MESH, ResourceManager::mesh_changed),
    ];
    for (section, apply) in sections {
        subscriptions.extend(section_listener(panel, manager, section, apply));
    }
    debug!(listeners = subscriptions.len(), "scene bound to settings");
    subscriptions
}

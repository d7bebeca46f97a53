use crate::field::{BoolField, DropdownField, FloatField, VectorField};
use crate::schema::{Control, Header};
use lumen_input::Action;
use lumen_state::{Path, Scope, ScopedList, ScopedSection};
use std::rc::Rc;
use tracing::debug;

/// Controls of one list element.
pub type ElementControls = Vec<Mounted>;

/// A mounted control, bound to the scope it reads and writes.
pub enum Mounted {
    Float(Rc<FloatField>),
    Bool(Rc<BoolField>),
    Dropdown(Rc<DropdownField>),
    Vector(Rc<VectorField>),
    Section(SectionView),
    List(ListView),
    Label(String),
    Buttons {
        header: Header,
        buttons: Vec<(String, Action)>,
    },
}

pub struct SectionView {
    header: Header,
    section: Rc<ScopedSection>,
    children: Vec<Mounted>,
}

impl SectionView {
    pub fn header(&self) -> String {
        self.header.resolve(&self.section.state()).to_owned()
    }

    pub fn children(&self) -> &[Mounted] {
        &self.children
    }

    pub fn scope(&self) -> Rc<dyn Scope> {
        self.section.clone()
    }
}

pub struct ListView {
    header: Header,
    list: Rc<ScopedList<ElementControls>>,
}

impl ListView {
    pub fn header(&self) -> String {
        self.header.resolve(&self.list.state()).to_owned()
    }

    pub fn list(&self) -> &Rc<ScopedList<ElementControls>> {
        &self.list
    }
}

/// Register defaults for `controls` under `scope` and bind a controller to
/// each. Sections and lists mount their own scopes, so their defaults reach
/// the parent as one write each.
pub fn mount_controls(scope: &Rc<dyn Scope>, controls: &[Control]) -> Vec<Mounted> {
    controls
        .iter()
        .map(|control| mount_control(scope, control))
        .collect()
}

fn mount_control(scope: &Rc<dyn Scope>, control: &Control) -> Mounted {
    if let (Some(name), Some(default)) = (control.name(), control.default_value()) {
        // Sections and lists seed themselves from the stored value.
        if !matches!(control, Control::Section { .. } | Control::List { .. }) {
            scope.register_default(name, default);
        }
    }
    match control {
        Control::Float(spec) => Mounted::Float(Rc::new(FloatField::new(
            Rc::clone(scope),
            Path::root().child(spec.name.as_str()),
            spec.clone(),
        ))),
        Control::Bool {
            name,
            header,
            default,
        } => Mounted::Bool(Rc::new(BoolField::new(
            Rc::clone(scope),
            name.clone(),
            header.clone(),
            *default,
        ))),
        Control::Dropdown {
            name,
            header,
            options,
        } => Mounted::Dropdown(Rc::new(DropdownField::new(
            Rc::clone(scope),
            name.clone(),
            header.clone(),
            options.clone(),
        ))),
        Control::Vector(spec) => {
            Mounted::Vector(Rc::new(VectorField::new(Rc::clone(scope), spec.clone())))
        }
        Control::Section {
            name,
            header,
            children,
        } => {
            let (section, children) =
                ScopedSection::mount(scope, name.as_str(), |inner| mount_controls(inner, children));
            Mounted::Section(SectionView {
                header: header.clone(),
                section,
                children,
            })
        }
        Control::List {
            name,
            header,
            bounds,
            element,
        } => {
            let element = element.clone();
            let list = ScopedList::mount(scope, name.as_str(), *bounds, move |inner| {
                mount_controls(inner, &element)
            });
            debug!(name = %name, len = list.len(), "list mounted");
            Mounted::List(ListView {
                header: header.clone(),
                list,
            })
        }
        Control::Label(text) => Mounted::Label(text.clone()),
        Control::Buttons { header, buttons } => Mounted::Buttons {
            header: header.clone(),
            buttons: buttons.clone(),
        },
    }
}

/// Visit every mounted control depth first, list elements included.
pub fn walk(controls: &[Mounted], visit: &mut dyn FnMut(&Mounted)) {
    for control in controls {
        visit(control);
        match control {
            Mounted::Section(view) => walk(&view.children, visit),
            Mounted::List(view) => {
                for element in view.list.elements() {
                    walk(element.value(), visit);
                }
            }
            _ => {}
        }
    }
}

/// A mounted settings panel.
pub struct Panel {
    controls: Vec<Mounted>,
}

impl Panel {
    pub fn mount(scope: &Rc<dyn Scope>, schema: &[Control]) -> Self {
        Self {
            controls: mount_controls(scope, schema),
        }
    }

    pub fn controls(&self) -> &[Mounted] {
        &self.controls
    }

    /// Apply wheel movement gathered since the last frame. Returns the
    /// number of fields that committed.
    pub fn flush_wheel(&self) -> usize {
        let mut committed = 0;
        walk(&self.controls, &mut |control| {
            let changed = match control {
                Mounted::Float(field) => field.flush_wheel(),
                Mounted::Vector(field) => field.flush_wheel(),
                _ => false,
            };
            committed += usize::from(changed);
        });
        committed
    }

    /// The numeric field stored at `path`.
    pub fn float(&self, path: &Path) -> Option<Rc<FloatField>> {
        self.find(|control| match control {
            Mounted::Float(field) if field.path().as_ref() == Some(path) => Some(Rc::clone(field)),
            _ => None,
        })
    }

    pub fn vector(&self, path: &Path) -> Option<Rc<VectorField>> {
        self.find(|control| match control {
            Mounted::Vector(field) if field.path().as_ref() == Some(path) => Some(Rc::clone(field)),
            _ => None,
        })
    }

    pub fn toggle(&self, path: &Path) -> Option<Rc<BoolField>> {
        self.find(|control| match control {
            Mounted::Bool(field) if field.path().as_ref() == Some(path) => Some(Rc::clone(field)),
            _ => None,
        })
    }

    pub fn dropdown(&self, path: &Path) -> Option<Rc<DropdownField>> {
        self.find(|control| match control {
            Mounted::Dropdown(field) if field.path().as_ref() == Some(path) => {
                Some(Rc::clone(field))
            }
            _ => None,
        })
    }

    pub fn list(&self, path: &Path) -> Option<Rc<ScopedList<ElementControls>>> {
        self.find(|control| match control {
            Mounted::List(view) if view.list.path().as_ref() == Some(path) => {
                Some(Rc::clone(&view.list))
            }
            _ => None,
        })
    }

    /// Scope of the section or list stored at `path`.
    pub fn scope(&self, path: &Path) -> Option<Rc<dyn Scope>> {
        self.find(|control| match control {
            Mounted::Section(view) if view.section.path().as_ref() == Some(path) => {
                Some(view.scope())
            }
            Mounted::List(view) if view.list.path().as_ref() == Some(path) => {
                let scope: Rc<dyn Scope> = view.list.clone();
                Some(scope)
            }
            _ => None,
        })
    }

    fn find<T>(&self, mut pick: impl FnMut(&Mounted) -> Option<T>) -> Option<T> {
        let mut found = None;
        walk(&self.controls, &mut |control| {
            if found.is_none() {
                found = pick(control);
            }
        });
        found
    }
}

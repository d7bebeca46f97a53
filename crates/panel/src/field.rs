use crate::schema::{FloatSpec, Header, VectorSpec};
use lumen_state::{Handle, Key, Node, Path, Scope};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tracing::{debug, trace};

/// Wheel delta to scroll units.
pub const WHEEL_FACTOR: f64 = 0.1;

/// Display form of a number: truncated (not rounded) to `decimals` places.
pub fn format_value(value: f64, decimals: u32) -> String {
    let scale = 10f64.powi(decimals as i32);
    let truncated = (value * scale).trunc() / scale;
    // Avoid printing "-0".
    if truncated == 0.0 {
        return "0".to_owned();
    }
    truncated.to_string()
}

/// Controller for one numeric input.
///
/// Typed text only commits when it parses, is in range and reads back
/// exactly as typed; anything else is held as pending text and shown as
/// invalid. Wheel movement accumulates and is applied by
/// [`FloatField::flush_wheel`], once per frame.
pub struct FloatField {
    scope: Rc<dyn Scope>,
    path: Path,
    spec: FloatSpec,
    pending: RefCell<Option<String>>,
    scroll: Cell<f64>,
}

impl FloatField {
    /// A field for `scope[path]`.
    pub fn new(scope: Rc<dyn Scope>, path: Path, spec: FloatSpec) -> Self {
        Self {
            scope,
            path,
            spec,
            pending: RefCell::new(None),
            scroll: Cell::new(0.0),
        }
    }

    pub fn spec(&self) -> &FloatSpec {
        &self.spec
    }

    /// Absolute path of the value, if the owning scope is still attached.
    pub fn path(&self) -> Option<Path> {
        self.scope.path().map(|base| base.join(&self.path))
    }

    pub fn header(&self) -> String {
        self.spec.header.resolve(&self.scope.state()).to_owned()
    }

    /// Stored value, or the default when nothing is stored.
    pub fn value(&self) -> f64 {
        self.handle()
            .read()
            .and_then(|node| node.as_f64())
            .unwrap_or(self.spec.default)
    }

    /// What the input box shows.
    pub fn text(&self) -> String {
        match self.pending.borrow().as_ref() {
            Some(pending) => pending.clone(),
            None => format_value(self.value(), self.spec.decimals),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.borrow().is_some()
    }

    /// The user typed `text`. Returns whether a value was committed.
    pub fn edit(&self, text: &str) -> bool {
        match self.accept(text) {
            Some(value) => self.handle().set(value),
            None => false,
        }
    }

    /// Accumulate wheel movement. Ignored while the text is pending.
    pub fn wheel(&self, delta_y: f64) -> bool {
        if self.is_pending() {
            return false;
        }
        self.scroll.set(self.scroll.get() + delta_y * WHEEL_FACTOR);
        true
    }

    /// Apply accumulated wheel movement. Returns whether a value was committed.
    pub fn flush_wheel(&self) -> bool {
        match self.take_scroll() {
            Some(value) => self.handle().set(value),
            None => false,
        }
    }

    /// Parse typed text, updating the pending state. Returns the value to
    /// commit when the text is acceptable.
    fn accept(&self, text: &str) -> Option<f64> {
        let parsed = text
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .map(|value| self.spec.clamp(value));
        match parsed {
            Some(value) if value.to_string() == text => {
                self.pending.replace(None);
                Some(value)
            }
            _ => {
                trace!(name = %self.spec.name, text, "input pending");
                self.pending.replace(Some(text.to_owned()));
                None
            }
        }
    }

    fn take_scroll(&self) -> Option<f64> {
        let scroll = self.scroll.replace(0.0);
        if scroll == 0.0 {
            return None;
        }
        Some(self.spec.clamp(self.value() - scroll * self.spec.step))
    }

    fn handle(&self) -> Handle<'_, dyn Scope> {
        Handle::new(&*self.scope, self.path.clone())
    }
}

/// Controller for a checkbox.
pub struct BoolField {
    scope: Rc<dyn Scope>,
    name: String,
    header: Header,
    default: bool,
}

impl BoolField {
    pub fn new(scope: Rc<dyn Scope>, name: String, header: Header, default: bool) -> Self {
        Self {
            scope,
            name,
            header,
            default,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> Option<Path> {
        self.scope.path().map(|base| base.child(self.name.as_str()))
    }

    pub fn header(&self) -> String {
        self.header.resolve(&self.scope.state()).to_owned()
    }

    pub fn value(&self) -> bool {
        self.scope
            .get(self.name.as_str())
            .and_then(|node| node.as_bool())
            .unwrap_or(self.default)
    }

    pub fn toggle(&self) -> bool {
        let default = self.default;
        self.scope.at(self.name.as_str()).set_with(|current| {
            Node::from(!current.and_then(Node::as_bool).unwrap_or(default))
        })
    }
}

/// Controller for a string choice.
pub struct DropdownField {
    scope: Rc<dyn Scope>,
    name: String,
    header: Header,
    options: Vec<String>,
}

impl DropdownField {
    pub fn new(scope: Rc<dyn Scope>, name: String, header: Header, options: Vec<String>) -> Self {
        Self {
            scope,
            name,
            header,
            options,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> Option<Path> {
        self.scope.path().map(|base| base.child(self.name.as_str()))
    }

    pub fn header(&self) -> String {
        self.header.resolve(&self.scope.state()).to_owned()
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    pub fn value(&self) -> String {
        self.scope
            .get(self.name.as_str())
            .and_then(|node| node.as_str().map(str::to_owned))
            .or_else(|| self.options.first().cloned())
            .unwrap_or_default()
    }

    /// Choose `option`. Unknown options are refused.
    pub fn select(&self, option: &str) -> bool {
        if !self.options.iter().any(|known| known == option) {
            debug!(name = %self.name, option, "unknown option refused");
            return false;
        }
        self.scope.at(self.name.as_str()).set(option)
    }
}

/// Controller for a row of numeric inputs stored as one array.
pub struct VectorField {
    scope: Rc<dyn Scope>,
    spec: VectorSpec,
    components: Vec<FloatField>,
}

impl VectorField {
    pub fn new(scope: Rc<dyn Scope>, spec: VectorSpec) -> Self {
        let components = (0..spec.default.len())
            .map(|index| {
                let path: Path = [Key::from(spec.name.as_str()), Key::Index(index)]
                    .into_iter()
                    .collect();
                FloatField::new(Rc::clone(&scope), path, spec.component(index))
            })
            .collect();
        Self {
            scope,
            spec,
            components,
        }
    }

    pub fn spec(&self) -> &VectorSpec {
        &self.spec
    }

    pub fn path(&self) -> Option<Path> {
        self.scope.path().map(|base| base.child(self.spec.name.as_str()))
    }

    pub fn header(&self) -> String {
        self.spec.header.resolve(&self.scope.state()).to_owned()
    }

    pub fn components(&self) -> &[FloatField] {
        &self.components
    }

    pub fn values(&self) -> Vec<f64> {
        self.components.iter().map(FloatField::value).collect()
    }

    /// Whether component `index` accepts input.
    pub fn enabled(&self, index: usize) -> bool {
        match &self.spec.extra_components_when {
            Some(flag) if index > 0 => self
                .scope
                .get(flag.as_str())
                .and_then(|node| node.as_bool())
                .unwrap_or(false),
            _ => true,
        }
    }

    /// The user typed `text` into component `index`.
    pub fn edit(&self, index: usize, text: &str) -> bool {
        if !self.enabled(index) {
            return false;
        }
        let Some(component) = self.components.get(index) else {
            return false;
        };
        match component.accept(text) {
            Some(value) => self.commit(index, value),
            None => false,
        }
    }

    pub fn wheel(&self, index: usize, delta_y: f64) -> bool {
        self.enabled(index) && self.components.get(index).is_some_and(|c| c.wheel(delta_y))
    }

    pub fn flush_wheel(&self) -> bool {
        let mut changed = false;
        for (index, component) in self.components.iter().enumerate() {
            if let Some(value) = component.take_scroll() {
                changed |= self.commit(index, value);
            }
        }
        changed
    }

    fn commit(&self, index: usize, value: f64) -> bool {
        let mut values = self.values();
        values[index] = value;
        if self.spec.normalize {
            normalize(&mut values);
        }
        self.scope.at(self.spec.name.as_str()).set(values.as_slice())
    }
}

/// Scale to unit length; a zero vector is left alone.
fn normalize(values: &mut [f64]) {
    let length = values.iter().map(|v| v * v).sum::<f64>().sqrt();
    if length > 0.0 {
        for value in values {
            *value /= length;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_state::{ManualClock, MemoryPersistence, ObservableStore};

    fn store() -> Rc<ObservableStore> {
        let (store, _) = ObservableStore::mount(
            "test",
            Rc::new(MemoryPersistence::new()),
            Rc::new(ManualClock::new()),
            |root| {
                root.register_default("fov", 45.0);
                root.register_default("refractColors", false);
                root.register_default("index", [0.8, 0.85, 0.8]);
                root.register_default("vector", [0.0, 1.0, 0.0]);
            },
        );
        store
    }

    fn fov(scope: Rc<dyn Scope>) -> FloatField {
        let spec = FloatSpec::new("fov", "Field of View", 45.0).range(10.0, 160.0);
        FloatField::new(scope, Path::root().child("fov"), spec)
    }

    #[test]
    fn format_truncates() {
        assert_eq!(format_value(45.0, 2), "45");
        assert_eq!(format_value(0.129, 2), "0.12");
        assert_eq!(format_value(-0.001, 2), "0");
        assert_eq!(format_value(0.05, 2), "0.05");
    }

    #[test]
    fn valid_text_commits() {
        let store = store();
        let field = fov(store.clone());
        assert!(field.edit("60"));
        assert!(!field.is_pending());
        assert_eq!(field.value(), 60.0);
        assert_eq!(field.text(), "60");
    }

    #[test]
    fn invalid_text_is_pending() {
        let store = store();
        let field = fov(store.clone());
        let revision = store.revision();
        for text in ["", "abc", "60.", "1e2", "200", "5"] {
            assert!(!field.edit(text), "{text:?} committed");
            assert!(field.is_pending());
            assert_eq!(field.text(), text);
        }
        assert_eq!(store.revision(), revision);
        assert_eq!(field.value(), 45.0);

        assert!(field.edit("90"));
        assert!(!field.is_pending());
    }

    #[test]
    fn wheel_applies_once_per_flush() {
        let store = store();
        let field = fov(store.clone());
        assert!(field.wheel(-100.0));
        assert!(field.wheel(-50.0));
        // -15 scroll units at step 0.1.
        assert!(field.flush_wheel());
        assert!((field.value() - 46.5).abs() < 1e-9);
        assert!(!field.flush_wheel());
    }

    #[test]
    fn wheel_clamps_and_is_ignored_while_pending() {
        let store = store();
        let field = fov(store.clone());
        field.wheel(-100_000.0);
        field.flush_wheel();
        assert_eq!(field.value(), 160.0);

        field.edit("oops");
        assert!(!field.wheel(10.0));
        assert!(!field.flush_wheel());
    }

    #[test]
    fn bool_and_dropdown() {
        let store = store();
        let scope: Rc<dyn Scope> = store.clone();
        let flag = BoolField::new(scope.clone(), "refractColors".into(), "Refract".into(), true);
        assert!(!flag.value());
        assert!(flag.toggle());
        assert!(flag.value());

        let method = DropdownField::new(
            scope,
            "method".into(),
            "Method".into(),
            vec!["frustum plane".into(), "cube".into()],
        );
        assert_eq!(method.value(), "frustum plane");
        assert!(!method.select("sphere"));
        assert!(method.select("cube"));
        assert_eq!(method.value(), "cube");
    }

    #[test]
    fn extra_components_follow_flag() {
        let store = store();
        let scope: Rc<dyn Scope> = store.clone();
        let spec = VectorSpec::new("index", "Refraction Index", &[0.8, 0.85, 0.8])
            .range(0.0, 1.0)
            .step(0.01)
            .extra_components_when("refractColors");
        let field = VectorField::new(scope.clone(), spec);
        assert!(field.enabled(0));
        assert!(!field.enabled(1));
        assert!(!field.edit(1, "0.5"));
        assert!(field.edit(0, "0.5"));
        assert_eq!(field.values(), [0.5, 0.85, 0.8]);

        scope.at("refractColors").set(true);
        assert!(field.edit(2, "0.9"));
        assert_eq!(field.values(), [0.5, 0.85, 0.9]);
    }

    #[test]
    fn normalized_vector_commits_once() {
        let store = store();
        let scope: Rc<dyn Scope> = store.clone();
        let spec = VectorSpec::new("vector", "Direction", &[0.0, 1.0, 0.0])
            .range(-1.0, 1.0)
            .normalized();
        let field = VectorField::new(scope, spec);
        let revision = store.revision();
        assert!(field.edit(0, "1"));
        assert_eq!(store.revision(), revision + 1);
        let half = std::f64::consts::FRAC_1_SQRT_2;
        let values = field.values();
        assert!((values[0] - half).abs() < 1e-9 && (values[1] - half).abs() < 1e-9);
        assert_eq!(field.components()[0].text(), "0.7");
    }
}

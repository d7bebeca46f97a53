use lumen_input::Action;
use lumen_state::{Bounds, Node};

/// Text shown above a control.
#[derive(Debug, Clone, PartialEq)]
pub enum Header {
    Static(String),
    /// Picked from a sibling string field: the first case whose value
    /// matches, otherwise `fallback`.
    Switch {
        key: String,
        cases: Vec<(String, String)>,
        fallback: String,
    },
}

impl Header {
    /// Resolve against the state of the enclosing scope.
    pub fn resolve(&self, scope_state: &Node) -> &str {
        match self {
            Self::Static(text) => text.as_str(),
            Self::Switch {
                key,
                cases,
                fallback,
            } => {
                let current = scope_state.field(key).and_then(Node::as_str);
                cases
                    .iter()
                    .find(|(value, _)| Some(value.as_str()) == current)
                    .map_or(fallback.as_str(), |(_, text)| text.as_str())
            }
        }
    }
}

impl From<&str> for Header {
    fn from(text: &str) -> Self {
        Self::Static(text.to_owned())
    }
}

/// Numeric input. Unbounded unless a range is given.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatSpec {
    pub name: String,
    pub header: Header,
    pub default: f64,
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub decimals: u32,
}

impl FloatSpec {
    pub fn new(name: impl Into<String>, header: impl Into<Header>, default: f64) -> Self {
        Self {
            name: name.into(),
            header: header.into(),
            default,
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
            step: 0.1,
            decimals: 2,
        }
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = min;
        self
    }

    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn step(mut self, step: f64) -> Self {
        self.step = step;
        self
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }
}

/// A fixed-length row of numeric inputs stored as one array.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorSpec {
    pub name: String,
    pub header: Header,
    pub default: Vec<f64>,
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub decimals: u32,
    /// Rescale to unit length after every edit.
    pub normalize: bool,
    /// Components after the first are read-only unless this sibling
    /// boolean is set.
    pub extra_components_when: Option<String>,
}

impl VectorSpec {
    pub fn new(name: impl Into<String>, header: impl Into<Header>, default: &[f64]) -> Self {
        Self {
            name: name.into(),
            header: header.into(),
            default: default.to_vec(),
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
            step: 0.1,
            decimals: 2,
            normalize: false,
            extra_components_when: None,
        }
    }

    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn step(mut self, step: f64) -> Self {
        self.step = step;
        self
    }

    pub fn normalized(mut self) -> Self {
        self.normalize = true;
        self
    }

    pub fn extra_components_when(mut self, flag: impl Into<String>) -> Self {
        self.extra_components_when = Some(flag.into());
        self
    }

    /// The spec of component `index` as a standalone float.
    pub fn component(&self, index: usize) -> FloatSpec {
        FloatSpec {
            name: index.to_string(),
            header: Header::Static(String::new()),
            default: self.default.get(index).copied().unwrap_or_default(),
            min: self.min,
            max: self.max,
            step: self.step,
            decimals: self.decimals,
        }
    }
}

/// One entry of the settings panel.
#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    Float(FloatSpec),
    Bool {
        name: String,
        header: Header,
        default: bool,
    },
    /// A choice among strings; the first option is the default.
    Dropdown {
        name: String,
        header: Header,
        options: Vec<String>,
    },
    Vector(VectorSpec),
    Section {
        name: String,
        header: Header,
        children: Vec<Control>,
    },
    /// Every element is a section built from `element`.
    List {
        name: String,
        header: Header,
        bounds: Bounds,
        element: Vec<Control>,
    },
    Label(String),
    /// A row of buttons that each produce an action.
    Buttons {
        header: Header,
        buttons: Vec<(String, Action)>,
    },
}

impl Control {
    pub fn float(spec: FloatSpec) -> Self {
        Self::Float(spec)
    }

    pub fn vector(spec: VectorSpec) -> Self {
        Self::Vector(spec)
    }

    pub fn bool(name: impl Into<String>, header: impl Into<Header>, default: bool) -> Self {
        Self::Bool {
            name: name.into(),
            header: header.into(),
            default,
        }
    }

    pub fn dropdown(name: impl Into<String>, header: impl Into<Header>, options: &[&str]) -> Self {
        Self::Dropdown {
            name: name.into(),
            header: header.into(),
            options: options.iter().map(|option| (*option).to_owned()).collect(),
        }
    }

    pub fn section(
        name: impl Into<String>,
        header: impl Into<Header>,
        children: Vec<Control>,
    ) -> Self {
        Self::Section {
            name: name.into(),
            header: header.into(),
            children,
        }
    }

    pub fn list(
        name: impl Into<String>,
        header: impl Into<Header>,
        bounds: Bounds,
        element: Vec<Control>,
    ) -> Self {
        Self::List {
            name: name.into(),
            header: header.into(),
            bounds,
            element,
        }
    }

    /// Key this control stores its value under, if it stores one.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Float(spec) => Some(&spec.name),
            Self::Vector(spec) => Some(&spec.name),
            Self::Bool { name, .. }
            | Self::Dropdown { name, .. }
            | Self::Section { name, .. }
            | Self::List { name, .. } => Some(name),
            Self::Label(_) | Self::Buttons { .. } => None,
        }
    }

    /// The value a fresh mount registers for this control.
    pub fn default_value(&self) -> Option<Node> {
        match self {
            Self::Float(spec) => Some(Node::from(spec.default)),
            Self::Vector(spec) => Some(Node::from(spec.default.as_slice())),
            Self::Bool { default, .. } => Some(Node::from(*default)),
            Self::Dropdown { options, .. } => options.first().map(|first| Node::from(first.as_str())),
            Self::Section { children, .. } => Some(defaults(children)),
            Self::List { bounds, element, .. } => Some(Node::list(
                (0..bounds.min).map(|_| defaults(element)),
            )),
            Self::Label(_) | Self::Buttons { .. } => None,
        }
    }
}

/// The snapshot a fresh mount of `controls` produces with nothing stored.
pub fn defaults(controls: &[Control]) -> Node {
    Node::map(
        controls
            .iter()
            .filter_map(|control| Some((control.name()?.to_owned(), control.default_value()?))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn light() -> Vec<Control> {
        vec![
            Control::dropdown("type", " ", &["Directional", "Spotlight"]),
            Control::vector(
                VectorSpec::new(
                    "vector",
                    Header::Switch {
                        key: "type".into(),
                        cases: vec![("Directional".into(), "Direction".into())],
                        fallback: "Position".into(),
                    },
                    &[0.0, 1.0, 0.0],
                )
                .range(-1.0, 1.0)
                .normalized(),
            ),
        ]
    }

    #[test]
    fn switch_header_follows_sibling() {
        let Control::Vector(spec) = &light()[1] else {
            unreachable!()
        };
        let directional = Node::map([("type", Node::from("Directional"))]);
        let spot = Node::map([("type", Node::from("Spotlight"))]);
        assert_eq!(spec.header.resolve(&directional), "Direction");
        assert_eq!(spec.header.resolve(&spot), "Position");
        assert_eq!(spec.header.resolve(&Node::Null), "Position");
    }

    #[test]
    fn defaults_cover_stored_controls_only() {
        let schema = vec![
            Control::Label("Reset".into()),
            Control::float(FloatSpec::new("fov", "Field of View", 45.0).range(10.0, 160.0)),
            Control::list("lights", "Lights", Bounds::new(1, 3), light()),
        ];
        let snapshot = defaults(&schema);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.field("fov").and_then(Node::as_f64), Some(45.0));
        let lights = snapshot.field("lights").unwrap();
        assert_eq!(lights.len(), 1);
        assert_eq!(
            lights.get_path(&[0usize.into(), "type".into()]).and_then(Node::as_str),
            Some("Directional")
        );
    }

    #[test]
    fn clamp_respects_open_ranges() {
        let far = FloatSpec::new("far", "Far", 100.0).min(1.0);
        assert_eq!(far.clamp(0.5), 1.0);
        assert_eq!(far.clamp(1e9), 1e9);
    }

    #[test]
    fn vector_components_inherit_range() {
        let spec = VectorSpec::new("ambient", "Ambient", &[0.05, 0.05, 0.05])
            .range(0.0, 1.0)
            .step(0.01);
        let component = spec.component(2);
        assert_eq!(component.name, "2");
        assert_eq!((component.min, component.max, component.step), (0.0, 1.0, 0.01));
        assert_eq!(component.default, 0.05);
    }
}

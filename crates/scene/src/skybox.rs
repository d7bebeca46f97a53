use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown skybox: {0}")]
pub struct UnknownSkybox(pub String);

/// The bundled cubemap image sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SkyboxSet {
    #[default]
    Totality,
    DruidCove,
    ViolentDays,
    GreenSpace,
    LmCity,
    Hourglass,
}

impl SkyboxSet {
    pub const ALL: [SkyboxSet; 6] = [
        SkyboxSet::Totality,
        SkyboxSet::DruidCove,
        SkyboxSet::ViolentDays,
        SkyboxSet::GreenSpace,
        SkyboxSet::LmCity,
        SkyboxSet::Hourglass,
    ];

    /// Name stored in the settings and used as the directory name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Totality => "totality",
            Self::DruidCove => "druidcove",
            Self::ViolentDays => "violentdays",
            Self::GreenSpace => "greenspace",
            Self::LmCity => "lmcity",
            Self::Hourglass => "hourglass",
        }
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|set| set.name()).collect()
    }

    /// Face images under `root` in +x, -x, +y, -y, +z, -z order.
    pub fn faces(self, root: &Path) -> [PathBuf; 6] {
        let dir = root.join(self.name());
        match self {
            Self::GreenSpace => ["z_p", "z_n", "y_p", "y_n", "x_p", "x_n"]
                .map(|face| dir.join(format!("skybox_{face}.png"))),
            other => ["rt", "lf", "up", "dn", "ft", "bk"]
                .map(|face| dir.join(format!("{}_{face}.png", other.name()))),
        }
    }
}

impl fmt::Display for SkyboxSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SkyboxSet {
    type Err = UnknownSkybox;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|set| set.name() == s)
            .ok_or_else(|| UnknownSkybox(s.to_owned()))
    }
}

/// How the skybox is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SkyboxMethod {
    /// A full-screen quad unprojected through the inverse view-projection.
    #[default]
    FrustumPlane,
    Cube,
}

impl SkyboxMethod {
    pub const ALL: [SkyboxMethod; 2] = [SkyboxMethod::FrustumPlane, SkyboxMethod::Cube];

    pub fn name(self) -> &'static str {
        match self {
            Self::FrustumPlane => "frustum plane",
            Self::Cube => "cube",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|method| method.name() == name)
    }
}

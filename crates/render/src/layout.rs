use crate::backend::BackendError;
use glam::Mat4;

/// Scalar and vector types a uniform field can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Float,
    Vec3,
    Vec4,
    Mat4,
}

impl FieldKind {
    pub fn components(self) -> usize {
        match self {
            Self::Float => 1,
            Self::Vec3 => 3,
            Self::Vec4 => 4,
            Self::Mat4 => 16,
        }
    }

    fn align(self) -> usize {
        match self {
            Self::Float => 4,
            Self::Vec3 | Self::Vec4 | Self::Mat4 => 16,
        }
    }

    fn size(self) -> usize {
        self.components() * 4
    }
}

/// One declared field: a single value or a fixed-length array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub count: Option<usize>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            count: None,
        }
    }

    pub fn array(name: impl Into<String>, kind: FieldKind, count: usize) -> Self {
        Self {
            name: name.into(),
            kind,
            count: Some(count),
        }
    }
}

/// A named, writable location inside a uniform block. Array elements get
/// their own slot named `<field>_<index>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub name: String,
    pub kind: FieldKind,
    pub offset: usize,
}

/// Byte layout of a uniform block under std140 rules.
///
/// Scalars align to 4 bytes; vectors and matrices to 16, with a `vec3` only
/// occupying 12 so a following float packs into its tail. Array elements
/// have a 16 byte stride. The block size rounds up to 16.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformLayout {
    slots: Vec<Slot>,
    size: usize,
}

impl UniformLayout {
    pub fn std140(fields: &[FieldSpec]) -> Self {
        let mut offset = 0;
        let mut slots = Vec::new();
        for field in fields {
            match field.count {
                None => {
                    offset = round_up(offset, field.kind.align());
                    slots.push(Slot {
                        name: field.name.clone(),
                        kind: field.kind,
                        offset,
                    });
                    offset += field.kind.size();
                }
                Some(count) => {
                    offset = round_up(offset, 16);
                    let stride = round_up(field.kind.size(), 16);
                    for i in 0..count {
                        slots.push(Slot {
                            name: format!("{}_{i}", field.name),
                            kind: field.kind,
                            offset: offset + i * stride,
                        });
                    }
                    offset += count * stride;
                }
            }
        }
        Self {
            slots,
            size: round_up(offset.max(16), 16),
        }
    }

    /// Size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn slot(&self, name: &str) -> Option<&Slot> {
        self.slots.iter().find(|slot| slot.name == name)
    }
}

fn round_up(value: usize, align: usize) -> usize {
    value.div_ceil(align) * align
}

/// CPU-side contents of a uniform buffer, addressed by slot name.
#[derive(Debug, Clone)]
pub struct UniformBlock {
    layout: UniformLayout,
    data: Vec<f32>,
}

impl UniformBlock {
    pub fn new(layout: UniformLayout) -> Self {
        let data = vec![0.0; layout.size() / 4];
        Self { layout, data }
    }

    pub fn layout(&self) -> &UniformLayout {
        &self.layout
    }

    /// Copy `values` into the start of slot `name`. Fewer values than the
    /// slot holds leave the tail untouched.
    pub fn write(&mut self, name: &str, values: &[f32]) -> Result<(), BackendError> {
        let slot = self
            .layout
            .slot(name)
            .ok_or_else(|| BackendError::MissingResource(format!("uniform slot {name}")))?;
        if values.len() > slot.kind.components() {
            return Err(BackendError::InvalidValue);
        }
        let start = slot.offset / 4;
        self.data[start..start + values.len()].copy_from_slice(values);
        Ok(())
    }

    pub fn write_mat4(&mut self, name: &str, matrix: &Mat4) -> Result<(), BackendError> {
        self.write(name, &matrix.to_cols_array())
    }

    pub fn read(&self, name: &str) -> Option<&[f32]> {
        let slot = self.layout.slot(name)?;
        let start = slot.offset / 4;
        self.data.get(start..start + slot.kind.components())
    }

    pub fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use FieldKind::*;

    fn offsets(layout: &UniformLayout) -> Vec<(&str, usize)> {
        layout
            .slots()
            .iter()
            .map(|s| (s.name.as_str(), s.offset))
            .collect()
    }

    #[test]
    fn float_packs_into_vec3_tail() {
        let layout = UniformLayout::std140(&[
            FieldSpec::new("ambient_color", Vec3),
            FieldSpec::new("diffuse_color", Vec3),
            FieldSpec::new("specular_color", Vec3),
            FieldSpec::new("specular_highlight", Float),
            FieldSpec::new("refraction_index", Vec3),
            FieldSpec::new("refraction_scalar", Float),
            FieldSpec::new("reflection_scalar", Float),
        ]);
        assert_eq!(
            offsets(&layout),
            [
                ("ambient_color", 0),
                ("diffuse_color", 16),
                ("specular_color", 32),
                ("specular_highlight", 44),
                ("refraction_index", 48),
                ("refraction_scalar", 60),
                ("reflection_scalar", 64),
            ]
        );
        assert_eq!(layout.size(), 80);
    }

    #[test]
    fn arrays_use_sixteen_byte_stride() {
        let layout = UniformLayout::std140(&[
            FieldSpec::array("ambient_color", Vec3, 2),
            FieldSpec::array("scalar", Float, 2),
        ]);
        assert_eq!(
            offsets(&layout),
            [
                ("ambient_color_0", 0),
                ("ambient_color_1", 16),
                ("scalar_0", 32),
                ("scalar_1", 48),
            ]
        );
        assert_eq!(layout.size(), 64);
    }

    #[test]
    fn matrices_and_vec4() {
        let layout = UniformLayout::std140(&[
            FieldSpec::new("projection", Mat4),
            FieldSpec::new("view", Mat4),
            FieldSpec::new("position", Vec4),
        ]);
        assert_eq!(layout.slot("position").map(|s| s.offset), Some(128));
        assert_eq!(layout.size(), 144);
    }

    #[test]
    fn block_write_and_read() {
        let layout = UniformLayout::std140(&[
            FieldSpec::new("color", Vec3),
            FieldSpec::new("highlight", Float),
        ]);
        let mut block = UniformBlock::new(layout);
        block.write("color", &[0.1, 0.2, 0.3]).unwrap();
        block.write("highlight", &[32.0]).unwrap();
        assert_eq!(block.read("color"), Some(&[0.1, 0.2, 0.3][..]));
        assert_eq!(block.read("highlight"), Some(&[32.0][..]));
        assert_eq!(block.bytes().len(), 16);
        assert_eq!(&block.bytes()[12..16], &32.0f32.to_ne_bytes());
    }

    #[test]
    fn block_rejects_bad_writes() {
        let mut block = UniformBlock::new(UniformLayout::std140(&[FieldSpec::new("x", Float)]));
        assert!(matches!(
            block.write("y", &[1.0]),
            Err(BackendError::MissingResource(_))
        ));
        assert_eq!(block.write("x", &[1.0, 2.0]), Err(BackendError::InvalidValue));
    }
}
